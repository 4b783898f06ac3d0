//! Authentication errors.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

/// Errors surfaced by token validation and the auth middleware.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("missing authorization")]
    MissingAuthHeader,

    #[error("invalid authorization header")]
    InvalidAuthHeader,

    #[error("invalid token: {0}")]
    InvalidToken(String),

    #[error("token has expired")]
    TokenExpired,

    #[error("token has been revoked")]
    TokenRevoked,

    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("authentication error: {0}")]
    Internal(String),
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = match self {
            AuthError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::UNAUTHORIZED,
        };

        let body = json!({
            "error": self.to_string(),
            "code": "UNAUTHORIZED",
        });

        (status, Json(body)).into_response()
    }
}
