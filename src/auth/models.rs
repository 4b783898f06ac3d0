//! Refresh-token data model.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A long-lived refresh token. The token value is an opaque random string
/// stored server-side; presenting it at `/auth/refresh` trades it for a new
/// access/refresh pair (rotation revokes the presented one).
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct RefreshToken {
    pub id: String,
    pub user_id: String,
    pub token: String,
    /// Expiry as a Unix timestamp.
    pub expires_at: i64,
    pub created_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revoked_at: Option<String>,
    pub is_revoked: bool,
}
