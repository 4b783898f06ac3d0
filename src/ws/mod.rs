//! Realtime delivery fabric.
//!
//! One `ClientSession` per live WebSocket connection, a per-instance hub
//! owning the `user_id -> session` table, and an optional Redis-backed hub
//! that routes payloads to whichever instance currently holds the target
//! user's session.

mod handler;
mod hub;
mod redis_hub;
mod session;
mod types;

pub use handler::{MarkOffline, dispatch_frame, ws_handler};
pub use hub::{DisconnectHook, Hub, LocalHub};
pub use redis_hub::RedisHub;
pub use session::ClientSession;
pub use types::{BusEnvelope, IncomingMessage, OutgoingMessage, ReadAck};
