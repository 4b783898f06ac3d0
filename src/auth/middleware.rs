//! Token issuance, validation and the authentication middleware.

use std::sync::Arc;

use axum::{
    extract::{FromRequestParts, State},
    http::{header::AUTHORIZATION, request::Parts},
    middleware::Next,
    response::Response,
};
use chrono::Utc;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use log::warn;

use super::{AuthError, Claims};
use crate::user::User;

/// Access-token lifetime; kept short since refresh tokens rotate freely.
const ACCESS_TOKEN_TTL_SECS: i64 = 15 * 60;

/// Extract a Bearer token from an Authorization header value.
fn bearer_token_from_header(header_value: &str) -> Result<&str, AuthError> {
    let mut parts = header_value.split_whitespace();
    let scheme = parts.next().ok_or(AuthError::InvalidAuthHeader)?;

    if !scheme.eq_ignore_ascii_case("bearer") {
        return Err(AuthError::InvalidAuthHeader);
    }

    let token = parts.next().ok_or(AuthError::InvalidAuthHeader)?;
    if token.is_empty() || parts.next().is_some() {
        return Err(AuthError::InvalidAuthHeader);
    }

    Ok(token)
}

/// Authentication state shared across handlers.
#[derive(Clone)]
pub struct AuthState {
    secret: Arc<String>,
    decoding_key: Arc<DecodingKey>,
}

impl AuthState {
    /// Create auth state from the shared HS256 secret.
    pub fn new(secret: impl Into<String>) -> Self {
        let secret = secret.into();
        let decoding_key = DecodingKey::from_secret(secret.as_bytes());
        Self {
            secret: Arc::new(secret),
            decoding_key: Arc::new(decoding_key),
        }
    }

    /// Issue an access token for a user.
    pub fn generate_token(&self, user: &User) -> Result<String, AuthError> {
        let now = Utc::now().timestamp();
        let claims = Claims {
            sub: user.id.clone(),
            exp: now + ACCESS_TOKEN_TTL_SECS,
            iat: Some(now),
            email: Some(user.email.clone()),
            name: Some(user.name.clone()),
        };

        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )
        .map_err(|e| AuthError::Internal(e.to_string()))
    }

    /// Validate a token and return its claims.
    pub fn validate_token(&self, token: &str) -> Result<Claims, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.required_spec_claims.clear();

        let token_data = decode::<Claims>(token, &self.decoding_key, &validation).map_err(|e| {
            warn!("JWT validation failed: {:?}", e);
            match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::TokenExpired,
                _ => AuthError::InvalidToken(e.to_string()),
            }
        })?;

        Ok(token_data.claims)
    }
}

/// Authenticated user extracted from request extensions.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub claims: Claims,
}

impl CurrentUser {
    /// Get the user ID.
    pub fn id(&self) -> &str {
        &self.claims.sub
    }
}

impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<CurrentUser>()
            .cloned()
            .ok_or(AuthError::MissingAuthHeader)
    }
}

/// Authentication middleware.
///
/// Validates tokens and injects `CurrentUser` into request extensions.
/// Accepts, in priority order, `Authorization: Bearer <token>` and a
/// `?token=` query parameter.
pub async fn auth_middleware(
    State(auth): State<AuthState>,
    mut req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Result<Response, AuthError> {
    let auth_header = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok());

    let query_token = req.uri().query().and_then(|q| {
        q.split('&').find_map(|pair| {
            let mut parts = pair.splitn(2, '=');
            let key = parts.next()?;
            let value = parts.next()?;
            if key == "token" {
                urlencoding::decode(value).ok().map(|s| s.into_owned())
            } else {
                None
            }
        })
    });

    let claims = if let Some(header) = auth_header {
        let token = bearer_token_from_header(header)?;
        auth.validate_token(token)?
    } else if let Some(ref token) = query_token {
        auth.validate_token(token)?
    } else {
        return Err(AuthError::MissingAuthHeader);
    };

    req.extensions_mut().insert(CurrentUser { claims });
    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_user() -> User {
        User {
            id: "usr_test".to_string(),
            username: "alice".to_string(),
            email: "alice@example.com".to_string(),
            password_hash: String::new(),
            name: "Alice".to_string(),
            is_online: false,
            created_at: String::new(),
            updated_at: String::new(),
        }
    }

    #[test]
    fn test_bearer_token_from_header_valid() {
        assert_eq!(
            bearer_token_from_header("Bearer abc.def.ghi").unwrap(),
            "abc.def.ghi"
        );
        assert_eq!(
            bearer_token_from_header("bearer   token123").unwrap(),
            "token123"
        );
    }

    #[test]
    fn test_bearer_token_from_header_invalid() {
        for case in ["", "Bearer", "Bearer ", "Token x", "Bearer a b"] {
            assert!(bearer_token_from_header(case).is_err(), "{case} should fail");
        }
    }

    #[test]
    fn test_generate_and_validate_token() {
        let auth = AuthState::new("test-secret-for-unit-tests-minimum-32-chars");
        let token = auth.generate_token(&test_user()).unwrap();

        let claims = auth.validate_token(&token).unwrap();
        assert_eq!(claims.sub, "usr_test");
        assert_eq!(claims.email.as_deref(), Some("alice@example.com"));
    }

    #[test]
    fn test_validate_rejects_wrong_secret() {
        let issuing = AuthState::new("secret-one-with-enough-length-padding");
        let verifying = AuthState::new("secret-two-with-enough-length-padding");

        let token = issuing.generate_token(&test_user()).unwrap();
        assert!(verifying.validate_token(&token).is_err());
    }
}
