//! JWT claims.

use serde::{Deserialize, Serialize};

/// Access-token claims.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user ID).
    pub sub: String,
    /// Expiration time (Unix timestamp).
    pub exp: i64,
    /// Issued at (Unix timestamp).
    #[serde(default)]
    pub iat: Option<i64>,
    /// User's email.
    #[serde(default)]
    pub email: Option<String>,
    /// User's display name.
    #[serde(default)]
    pub name: Option<String>,
}
