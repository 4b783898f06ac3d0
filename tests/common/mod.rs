//! Test utilities and common setup.

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use wetalk::api::{self, AppState};
use wetalk::auth::{AuthService, AuthState, RefreshTokenRepository};
use wetalk::chat::{ChatRepository, ChatService};
use wetalk::db::Database;
use wetalk::message::MessageRepository;
use wetalk::user::{CreateUserRequest, User, UserRepository, UserService};
use wetalk::ws::{Hub, LocalHub, MarkOffline};

pub const TEST_SECRET: &str = "test-secret-for-integration-tests-minimum-32-chars";

/// Build application state over an in-memory database with a running local
/// hub. The database handle is returned for direct repository access.
pub async fn test_state() -> (AppState, Database) {
    let db = Database::in_memory().await.unwrap();

    let user_repo = UserRepository::new(db.pool().clone());
    let chat_repo = ChatRepository::new(db.pool().clone());
    let message_repo = MessageRepository::new(db.pool().clone());

    let users = Arc::new(UserService::new(user_repo.clone()));
    let chats = ChatService::new(chat_repo, user_repo, message_repo.clone());

    let hook = Arc::new(MarkOffline::new(users.clone()));
    let hub: Arc<dyn Hub> = Arc::new(LocalHub::new(hook));
    tokio::spawn(hub.clone().run());

    let auth = AuthState::new(TEST_SECRET);
    let token_repo = RefreshTokenRepository::new(db.pool().clone());
    let auth_service = AuthService::new(users.clone(), token_repo, auth.clone());

    let state = AppState::new(hub, users, chats, message_repo, auth, auth_service);
    (state, db)
}

/// Create a test application router.
#[allow(dead_code)]
pub async fn test_app() -> Router {
    let (state, _db) = test_state().await;
    api::create_router(state)
}

/// Register a user directly through the service.
#[allow(dead_code)]
pub async fn create_user(state: &AppState, username: &str) -> User {
    state
        .users
        .create_user(CreateUserRequest {
            username: username.to_string(),
            email: format!("{username}@example.com"),
            password: "password123".to_string(),
            name: None,
        })
        .await
        .unwrap()
}

/// Wait until the hub's client table reaches the expected size.
#[allow(dead_code)]
pub async fn wait_for_clients(state: &AppState, expected: usize) {
    for _ in 0..200 {
        if state.hub.client_count().await == expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!(
        "hub never reached {expected} clients, has {}",
        state.hub.client_count().await
    );
}
