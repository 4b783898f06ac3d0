//! Message data models.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A persisted chat message.
///
/// `timestamp` is the client-supplied send time (Unix millis); ordering
/// across instances is reconciled by clients using it.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub chat_id: String,
    pub sender_id: String,
    pub message: String,
    pub timestamp: i64,
    pub is_read: bool,
}
