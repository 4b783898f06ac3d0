//! Authentication module.
//!
//! Short-lived HS256 access tokens (bearer-header and query-parameter
//! transport, since browsers cannot set headers on WebSocket requests)
//! paired with revocable refresh tokens: opaque random values held in the
//! store and rotated on every refresh.

mod claims;
mod error;
mod middleware;
mod models;
mod repository;
mod service;

pub use claims::Claims;
pub use error::AuthError;
pub use middleware::{AuthState, CurrentUser, auth_middleware};
pub use models::RefreshToken;
pub use repository::RefreshTokenRepository;
pub use service::{AuthService, TokenPair};
