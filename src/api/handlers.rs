//! REST handlers for accounts, chats and history.

use axum::{
    Json,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode, header},
    response::{AppendHeaders, IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::warn;

use super::error::{ApiError, ApiResult};
use super::state::AppState;
use crate::auth::{CurrentUser, TokenPair};
use crate::chat::{
    Chat, ChatDetail, ChatInvitation, CreateGroupChatRequest, CreatePersonalChatRequest,
    InviteUsersRequest, RespondInvitationRequest,
};
use crate::message::Message;
use crate::user::{CreateUserRequest, UserInfo};

/// GET /health
pub async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    /// Username or email.
    pub login: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    pub access_token: String,
    pub user: UserInfo,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshTokenRequest {
    #[serde(default)]
    pub refresh_token: Option<String>,
}

/// Cookie carrying the refresh token. HttpOnly keeps it away from scripts;
/// the access token still travels in the JSON body.
const REFRESH_COOKIE: &str = "refresh_token";

/// Matches the 30-day refresh token lifetime.
const REFRESH_COOKIE_MAX_AGE_SECS: i64 = 30 * 24 * 60 * 60;

fn refresh_cookie(token: &str) -> String {
    format!(
        "{REFRESH_COOKIE}={token}; Path=/; HttpOnly; SameSite=Lax; Max-Age={REFRESH_COOKIE_MAX_AGE_SECS}"
    )
}

fn clear_refresh_cookie() -> String {
    format!("{REFRESH_COOKIE}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0")
}

fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(header::COOKIE)?
        .to_str()
        .ok()?
        .split(';')
        .map(str::trim)
        .find_map(|pair| {
            let (key, value) = pair.split_once('=')?;
            (key.trim() == name).then(|| value.trim().to_string())
        })
}

/// The refresh token comes from the cookie when present, with a JSON body
/// fallback for non-browser clients.
fn refresh_token_from_request(
    headers: &HeaderMap,
    body: Option<Json<RefreshTokenRequest>>,
) -> Option<String> {
    cookie_value(headers, REFRESH_COOKIE).or_else(|| body.and_then(|Json(req)| req.refresh_token))
}

/// Access token in the body, refresh token only in the cookie.
fn auth_success(pair: TokenPair) -> impl IntoResponse {
    (
        AppendHeaders([(header::SET_COOKIE, refresh_cookie(&pair.refresh_token))]),
        Json(AuthResponse {
            access_token: pair.access_token,
            user: pair.user.info(),
        }),
    )
}

/// POST /auth/register
pub async fn register(
    State(state): State<AppState>,
    Json(request): Json<CreateUserRequest>,
) -> ApiResult<Response> {
    let pair = state.auth_service.register(request).await?;
    Ok((StatusCode::CREATED, auth_success(pair)).into_response())
}

/// POST /auth/login
pub async fn login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> ApiResult<Response> {
    let pair = state
        .auth_service
        .login(&request.login, &request.password)
        .await?;

    Ok(auth_success(pair).into_response())
}

/// POST /auth/refresh
///
/// Trades a refresh token for a new access/refresh pair; the presented
/// token is spent. Rejections clear the cookie so clients stop retrying a
/// dead token.
pub async fn refresh_token(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Option<Json<RefreshTokenRequest>>,
) -> ApiResult<Response> {
    let Some(token) = refresh_token_from_request(&headers, body) else {
        return Err(ApiError::bad_request("refresh token is required"));
    };

    match state.auth_service.refresh(&token).await {
        Ok(pair) => Ok(auth_success(pair).into_response()),
        Err(err) => Ok((
            AppendHeaders([(header::SET_COOKIE, clear_refresh_cookie())]),
            ApiError::from(err),
        )
            .into_response()),
    }
}

/// POST /auth/logout
///
/// Revokes the presented refresh token and clears the cookie. Best-effort:
/// a missing or unknown token still logs the client out locally.
pub async fn logout(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Option<Json<RefreshTokenRequest>>,
) -> ApiResult<Response> {
    if let Some(token) = refresh_token_from_request(&headers, body) {
        if let Err(err) = state.auth_service.logout(&token).await {
            warn!("logout error: {:#}", err);
        }
    }

    Ok((
        AppendHeaders([(header::SET_COOKIE, clear_refresh_cookie())]),
        Json(json!({ "status": "logged out" })),
    )
        .into_response())
}

/// POST /auth/logout-all
pub async fn logout_all(
    State(state): State<AppState>,
    user: CurrentUser,
) -> ApiResult<Response> {
    state.auth_service.logout_all(user.id()).await?;

    Ok((
        AppendHeaders([(header::SET_COOKIE, clear_refresh_cookie())]),
        Json(json!({ "status": "logged out everywhere" })),
    )
        .into_response())
}

/// GET /users
pub async fn list_users(
    State(state): State<AppState>,
    _user: CurrentUser,
) -> ApiResult<Json<Vec<UserInfo>>> {
    let users = state.users.list_users(&[]).await?;
    Ok(Json(users.iter().map(|u| u.info()).collect()))
}

/// GET /users/{user_id}
pub async fn get_user(
    State(state): State<AppState>,
    _user: CurrentUser,
    Path(user_id): Path<String>,
) -> ApiResult<Json<UserInfo>> {
    let user = state
        .users
        .get_user(&user_id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("User not found: {user_id}")))?;

    Ok(Json(user.info()))
}

/// GET /chats
pub async fn list_chats(
    State(state): State<AppState>,
    user: CurrentUser,
) -> ApiResult<Json<Vec<Chat>>> {
    Ok(Json(state.chats.index(user.id()).await?))
}

/// POST /chats/personal
pub async fn create_personal_chat(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(request): Json<CreatePersonalChatRequest>,
) -> ApiResult<Json<Value>> {
    let chat_id = state
        .chats
        .create_personal_chat(user.id(), &request.participant_id)
        .await?;

    Ok(Json(json!({ "chatId": chat_id })))
}

/// POST /chats/group
pub async fn create_group_chat(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(request): Json<CreateGroupChatRequest>,
) -> ApiResult<Json<Value>> {
    let chat_id = state
        .chats
        .create_group_chat(
            &request.name,
            request.description,
            user.id(),
            &request.user_ids,
        )
        .await?;

    Ok(Json(json!({ "chatId": chat_id })))
}

/// GET /chats/{chat_id}
pub async fn get_chat(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(chat_id): Path<String>,
) -> ApiResult<Json<ChatDetail>> {
    Ok(Json(state.chats.get(&chat_id, user.id()).await?))
}

/// DELETE /chats/{chat_id}
pub async fn delete_chat(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(chat_id): Path<String>,
) -> ApiResult<Json<Value>> {
    state.chats.delete(&chat_id, user.id()).await?;
    Ok(Json(json!({ "status": "deleted" })))
}

/// POST /chats/{chat_id}/invite
pub async fn invite_users(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(chat_id): Path<String>,
    Json(request): Json<InviteUsersRequest>,
) -> ApiResult<Json<Value>> {
    state
        .chats
        .invite_users(&chat_id, user.id(), &request.user_ids)
        .await?;

    Ok(Json(json!({ "status": "invited" })))
}

/// POST /chats/{chat_id}/leave
pub async fn leave_chat(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(chat_id): Path<String>,
) -> ApiResult<Json<Value>> {
    state.chats.leave_group(&chat_id, user.id()).await?;
    Ok(Json(json!({ "status": "left" })))
}

#[derive(Debug, Default, Deserialize)]
pub struct HistoryQuery {
    #[serde(default)]
    pub limit: Option<i64>,
    #[serde(default)]
    pub offset: Option<i64>,
}

/// GET /chats/{chat_id}/messages
pub async fn chat_messages(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(chat_id): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> ApiResult<Json<Vec<Message>>> {
    let messages = state
        .chats
        .messages(
            &chat_id,
            user.id(),
            query.limit.unwrap_or(50),
            query.offset.unwrap_or(0),
        )
        .await?;

    Ok(Json(messages))
}

/// GET /invitations
pub async fn list_invitations(
    State(state): State<AppState>,
    user: CurrentUser,
) -> ApiResult<Json<Vec<ChatInvitation>>> {
    Ok(Json(state.chats.pending_invitations(user.id()).await?))
}

/// POST /invitations/{invitation_id}/respond
pub async fn respond_invitation(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(invitation_id): Path<String>,
    Json(request): Json<RespondInvitationRequest>,
) -> ApiResult<Json<Value>> {
    state
        .chats
        .respond_to_invitation(&invitation_id, user.id(), request.accept)
        .await?;

    let status = if request.accept { "accepted" } else { "rejected" };
    Ok(Json(json!({ "status": status })))
}
