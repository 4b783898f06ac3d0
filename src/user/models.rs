//! User data models.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A registered user.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct User {
    /// Unique user ID.
    pub id: String,
    /// Login name, unique.
    pub username: String,
    /// E-mail address, unique.
    pub email: String,
    /// bcrypt hash, never exposed.
    #[serde(skip_serializing)]
    pub password_hash: String,
    /// Display name shown to other participants.
    pub name: String,
    /// Whether the user currently holds a live connection somewhere.
    pub is_online: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl User {
    /// Public projection without credential material.
    pub fn info(&self) -> UserInfo {
        UserInfo {
            id: self.id.clone(),
            username: self.username.clone(),
            email: self.email.clone(),
            name: self.name.clone(),
            is_online: self.is_online,
        }
    }
}

/// Public view of a user.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserInfo {
    pub id: String,
    pub username: String,
    pub email: String,
    pub name: String,
    pub is_online: bool,
}

/// Request to register a new user.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateUserRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    /// Display name; defaults to the username.
    #[serde(default)]
    pub name: Option<String>,
}

/// Partial user update.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateUserRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}
