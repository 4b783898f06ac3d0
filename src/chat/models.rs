//! Chat data models.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::user::UserInfo;

/// Kind of conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatType {
    /// 1-on-1 conversation; its display name is the peer's name.
    Personal,
    /// Multi-party conversation with admins and invitations.
    Group,
}

impl std::fmt::Display for ChatType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChatType::Personal => write!(f, "personal"),
            ChatType::Group => write!(f, "group"),
        }
    }
}

impl std::str::FromStr for ChatType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "personal" => Ok(ChatType::Personal),
            "group" => Ok(ChatType::Group),
            _ => Err(format!("unknown chat type: {}", s)),
        }
    }
}

impl TryFrom<String> for ChatType {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// A conversation.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Chat {
    pub id: String,
    pub name: String,
    #[sqlx(try_from = "String")]
    #[serde(rename = "type")]
    pub chat_type: ChatType,
    pub created_by: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// Membership row linking a user to a chat.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ChatParticipant {
    pub id: String,
    pub chat_id: String,
    pub user_id: String,
    /// "admin" or "member".
    pub role: String,
    pub joined_at: String,
    pub is_active: bool,
}

/// A pending or resolved group invitation.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ChatInvitation {
    pub id: String,
    pub chat_id: String,
    pub inviter_id: String,
    pub invitee_id: String,
    /// "pending", "accepted" or "rejected".
    pub status: String,
    pub created_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub responded_at: Option<String>,
}

/// A chat together with its participant roster.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatDetail {
    pub chat: Chat,
    pub participants: Vec<UserInfo>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePersonalChatRequest {
    pub participant_id: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateGroupChatRequest {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub user_ids: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InviteUsersRequest {
    pub user_ids: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RespondInvitationRequest {
    pub accept: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_type_round_trip() {
        assert_eq!("personal".parse::<ChatType>().unwrap(), ChatType::Personal);
        assert_eq!("Group".parse::<ChatType>().unwrap(), ChatType::Group);
        assert!("direct".parse::<ChatType>().is_err());
        assert_eq!(ChatType::Personal.to_string(), "personal");
    }
}
