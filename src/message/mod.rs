//! Persisted chat messages.

mod models;
mod repository;

pub use models::Message;
pub use repository::MessageRepository;
