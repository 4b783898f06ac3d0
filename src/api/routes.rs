//! API route definitions.

use axum::{
    Router, middleware,
    routing::{delete, get, post},
};
use tower_http::cors::CorsLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::Level;

use crate::auth::auth_middleware;
use crate::ws::ws_handler;

use super::handlers;
use super::state::AppState;

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::permissive();

    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
        .on_request(DefaultOnRequest::new().level(Level::INFO))
        .on_response(DefaultOnResponse::new().level(Level::INFO));

    let auth_state = state.auth.clone();

    let protected_routes = Router::new()
        .route("/auth/logout-all", post(handlers::logout_all))
        .route("/users", get(handlers::list_users))
        .route("/users/{user_id}", get(handlers::get_user))
        .route("/chats", get(handlers::list_chats))
        .route("/chats/personal", post(handlers::create_personal_chat))
        .route("/chats/group", post(handlers::create_group_chat))
        .route("/chats/{chat_id}", get(handlers::get_chat))
        .route("/chats/{chat_id}", delete(handlers::delete_chat))
        .route("/chats/{chat_id}/invite", post(handlers::invite_users))
        .route("/chats/{chat_id}/leave", post(handlers::leave_chat))
        .route("/chats/{chat_id}/messages", get(handlers::chat_messages))
        .route("/invitations", get(handlers::list_invitations))
        .route(
            "/invitations/{invitation_id}/respond",
            post(handlers::respond_invitation),
        )
        .layer(middleware::from_fn_with_state(auth_state, auth_middleware));

    let public_routes = Router::new()
        .route("/health", get(handlers::health))
        .route("/auth/register", post(handlers::register))
        .route("/auth/login", post(handlers::login))
        .route("/auth/refresh", post(handlers::refresh_token))
        .route("/auth/logout", post(handlers::logout))
        // The WS endpoint trusts the path user id; see the handler notes.
        .route("/ws/{user_id}", get(ws_handler));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(cors)
        .layer(trace_layer)
        .with_state(state)
}
