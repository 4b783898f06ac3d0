//! User management module.
//!
//! Provides user accounts, credential verification and online-presence
//! tracking consumed by the delivery pipeline.

mod models;
mod repository;
mod service;

pub use models::{CreateUserRequest, UpdateUserRequest, User, UserInfo};
pub use repository::UserRepository;
pub use service::UserService;
