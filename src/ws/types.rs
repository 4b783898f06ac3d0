//! Wire frames exchanged with clients and between instances.

use serde::{Deserialize, Serialize};

/// A chat message sent by a client. The timestamp is client-supplied.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncomingMessage {
    pub chat_id: String,
    pub message: String,
    pub timestamp: i64,
}

/// Acknowledgment that a client has read a message.
///
/// Classification rule: any inbound frame that decodes with a non-empty
/// `messageId` is a read ack; everything else is treated as a message.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadAck {
    #[serde(default)]
    pub message_id: String,
    #[serde(default)]
    pub chat_id: String,
}

/// A message fanned out to recipients.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutgoingMessage {
    pub message_id: String,
    pub user_id: String,
    pub user_name: String,
    pub message: String,
    pub timestamp: i64,
    pub is_read: bool,
    pub chat_id: String,
}

/// Envelope published on `messages:{user_id}` for cross-instance delivery.
/// `payload` is the already-serialized outbound frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BusEnvelope {
    pub from_server_id: String,
    pub to_user_id: String,
    pub payload: String,
}
