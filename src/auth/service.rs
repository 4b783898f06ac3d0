//! Authentication flows: registration, login, refresh rotation and logout.

use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use tracing::{info, instrument};

use super::error::AuthError;
use super::middleware::AuthState;
use super::repository::RefreshTokenRepository;
use crate::user::{CreateUserRequest, User, UserService};

/// Refresh tokens live for 30 days.
const REFRESH_TOKEN_TTL_SECS: i64 = 30 * 24 * 3600;

/// An issued access/refresh pair together with its owner.
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub user: User,
}

/// Service driving the token lifecycle. Access tokens are stateless JWTs;
/// refresh tokens are opaque random values held in the store so they can be
/// revoked.
#[derive(Clone)]
pub struct AuthService {
    users: Arc<UserService>,
    tokens: RefreshTokenRepository,
    state: AuthState,
}

impl AuthService {
    /// Create a new auth service.
    pub fn new(users: Arc<UserService>, tokens: RefreshTokenRepository, state: AuthState) -> Self {
        Self {
            users,
            tokens,
            state,
        }
    }

    /// Register a new account and issue its first token pair.
    #[instrument(skip(self, request), fields(username = %request.username))]
    pub async fn register(&self, request: CreateUserRequest) -> Result<TokenPair> {
        let user = self.users.create_user(request).await?;
        self.issue_pair(user).await
    }

    /// Verify credentials and issue a token pair.
    #[instrument(skip(self, password))]
    pub async fn login(&self, login: &str, password: &str) -> Result<TokenPair, AuthError> {
        let user = self
            .users
            .get_user_by_login(login)
            .await
            .map_err(internal)?
            .ok_or(AuthError::InvalidCredentials)?;

        if !self
            .users
            .verify_password(&user, password)
            .map_err(internal)?
        {
            return Err(AuthError::InvalidCredentials);
        }

        info!(user_id = %user.id, "User logged in");
        self.issue_pair(user).await.map_err(internal)
    }

    /// Trade a refresh token for a new pair. Rotation: the presented token
    /// is revoked, so each value is usable once.
    #[instrument(skip(self, refresh_token))]
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, AuthError> {
        let stored = self
            .tokens
            .get_by_token(refresh_token)
            .await
            .map_err(internal)?
            .ok_or_else(|| AuthError::InvalidToken("unknown refresh token".to_string()))?;

        if stored.is_revoked {
            return Err(AuthError::TokenRevoked);
        }
        if stored.expires_at <= Utc::now().timestamp() {
            return Err(AuthError::TokenExpired);
        }

        let user = self
            .users
            .get_user(&stored.user_id)
            .await
            .map_err(internal)?
            .ok_or_else(|| AuthError::InvalidToken("user no longer exists".to_string()))?;

        self.tokens.revoke(refresh_token).await.map_err(internal)?;
        self.issue_pair(user).await.map_err(internal)
    }

    /// Revoke one refresh token.
    pub async fn logout(&self, refresh_token: &str) -> Result<()> {
        self.tokens.revoke(refresh_token).await
    }

    /// Revoke every refresh token a user holds.
    #[instrument(skip(self))]
    pub async fn logout_all(&self, user_id: &str) -> Result<()> {
        self.tokens.revoke_all_for_user(user_id).await
    }

    /// Drop expired rows; run at startup.
    pub async fn purge_expired(&self) -> Result<u64> {
        self.tokens.delete_expired().await
    }

    async fn issue_pair(&self, user: User) -> Result<TokenPair> {
        let access_token = self.state.generate_token(&user)?;
        let refresh_token = generate_refresh_token();
        let expires_at = Utc::now().timestamp() + REFRESH_TOKEN_TTL_SECS;

        self.tokens
            .create(&user.id, &refresh_token, expires_at)
            .await?;

        Ok(TokenPair {
            access_token,
            refresh_token,
            user,
        })
    }
}

/// Opaque random token value; never decoded, only matched against the store.
fn generate_refresh_token() -> String {
    nanoid::nanoid!(43)
}

fn internal(err: anyhow::Error) -> AuthError {
    AuthError::Internal(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_refresh_tokens_are_unique_and_opaque() {
        let first = generate_refresh_token();
        let second = generate_refresh_token();
        assert_eq!(first.len(), 43);
        assert_ne!(first, second);
    }
}
