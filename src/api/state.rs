//! Application state shared across handlers.

use std::sync::Arc;

use crate::auth::{AuthService, AuthState};
use crate::chat::ChatService;
use crate::message::MessageRepository;
use crate::user::UserService;
use crate::ws::Hub;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Hub owning the live sessions on this instance.
    pub hub: Arc<dyn Hub>,
    /// User service for accounts and presence.
    pub users: Arc<UserService>,
    /// Chat service for membership and invitations.
    pub chats: Arc<ChatService>,
    /// Message persistence used by the delivery pipeline.
    pub messages: Arc<MessageRepository>,
    /// Authentication state used by the middleware.
    pub auth: AuthState,
    /// Token lifecycle flows (login, refresh rotation, logout).
    pub auth_service: Arc<AuthService>,
}

impl AppState {
    /// Create new application state.
    pub fn new(
        hub: Arc<dyn Hub>,
        users: Arc<UserService>,
        chats: ChatService,
        messages: MessageRepository,
        auth: AuthState,
        auth_service: AuthService,
    ) -> Self {
        Self {
            hub,
            users,
            chats: Arc::new(chats),
            messages: Arc::new(messages),
            auth,
            auth_service: Arc::new(auth_service),
        }
    }
}
