//! WeTalk backend library.
//!
//! Real-time chat delivery over WebSockets with persisted history and
//! optional multi-instance fan-out through a Redis bus.

pub mod api;
pub mod auth;
pub mod chat;
pub mod db;
pub mod message;
pub mod user;
pub mod ws;
