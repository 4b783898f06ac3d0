//! Refresh-token repository for database operations.

use anyhow::{Context, Result};
use sqlx::SqlitePool;
use tracing::instrument;

use super::models::RefreshToken;

const TOKEN_COLUMNS: &str =
    "id, user_id, token, expires_at, created_at, revoked_at, is_revoked";

/// Repository for refresh-token persistence and revocation.
#[derive(Debug, Clone)]
pub struct RefreshTokenRepository {
    pool: SqlitePool,
}

impl RefreshTokenRepository {
    /// Create a new refresh-token repository.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn generate_id() -> String {
        format!("rft_{}", nanoid::nanoid!(12))
    }

    /// Store a newly issued token.
    #[instrument(skip(self, token))]
    pub async fn create(&self, user_id: &str, token: &str, expires_at: i64) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO refresh_tokens (id, user_id, token, expires_at)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(Self::generate_id())
        .bind(user_id)
        .bind(token)
        .bind(expires_at)
        .execute(&self.pool)
        .await
        .context("Failed to insert refresh token")?;

        Ok(())
    }

    /// Look up a token by its value.
    pub async fn get_by_token(&self, token: &str) -> Result<Option<RefreshToken>> {
        sqlx::query_as::<_, RefreshToken>(&format!(
            "SELECT {TOKEN_COLUMNS} FROM refresh_tokens WHERE token = ?"
        ))
        .bind(token)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch refresh token")
    }

    /// Active (unrevoked, unexpired) tokens held by a user.
    #[instrument(skip(self))]
    pub async fn get_by_user_id(&self, user_id: &str) -> Result<Vec<RefreshToken>> {
        sqlx::query_as::<_, RefreshToken>(&format!(
            r#"
            SELECT {TOKEN_COLUMNS} FROM refresh_tokens
            WHERE user_id = ? AND is_revoked = 0
              AND expires_at > CAST(strftime('%s', 'now') AS INTEGER)
            "#
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch refresh tokens for user")
    }

    /// Revoke a single token.
    #[instrument(skip(self, token))]
    pub async fn revoke(&self, token: &str) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE refresh_tokens
            SET is_revoked = 1, revoked_at = datetime('now')
            WHERE token = ?
            "#,
        )
        .bind(token)
        .execute(&self.pool)
        .await
        .context("Failed to revoke refresh token")?;

        Ok(())
    }

    /// Revoke every active token a user holds.
    #[instrument(skip(self))]
    pub async fn revoke_all_for_user(&self, user_id: &str) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE refresh_tokens
            SET is_revoked = 1, revoked_at = datetime('now')
            WHERE user_id = ? AND is_revoked = 0
            "#,
        )
        .bind(user_id)
        .execute(&self.pool)
        .await
        .context("Failed to revoke refresh tokens for user")?;

        Ok(())
    }

    /// Drop expired rows. Returns how many were removed.
    #[instrument(skip(self))]
    pub async fn delete_expired(&self) -> Result<u64> {
        let result = sqlx::query(
            "DELETE FROM refresh_tokens WHERE expires_at < CAST(strftime('%s', 'now') AS INTEGER)",
        )
        .execute(&self.pool)
        .await
        .context("Failed to delete expired refresh tokens")?;

        Ok(result.rows_affected())
    }

    /// Whether a token has been revoked. Unknown tokens count as revoked.
    pub async fn is_revoked(&self, token: &str) -> Result<bool> {
        Ok(match self.get_by_token(token).await? {
            Some(stored) => stored.is_revoked,
            None => true,
        })
    }
}
