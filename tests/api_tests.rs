//! API integration tests.

use axum::{
    Router,
    body::Body,
    http::{HeaderMap, Method, Request, StatusCode, header},
};
use serde_json::{Value, json};
use tower::ServiceExt;

mod common;
use common::test_app;

async fn send_json_full(
    app: &Router,
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, HeaderMap, Value) {
    let mut builder = Request::builder().uri(uri).method(method);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }

    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(serde_json::to_string(&body).unwrap()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };

    (status, headers, json)
}

async fn send_json(
    app: &Router,
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let (status, _headers, json) = send_json_full(app, method, uri, token, body).await;
    (status, json)
}

/// Extract the refresh token from a `Set-Cookie` header, if one was set.
fn refresh_cookie_value(headers: &HeaderMap) -> Option<String> {
    let raw = headers.get(header::SET_COOKIE)?.to_str().ok()?;
    let (name, value) = raw.split(';').next()?.split_once('=')?;
    (name == "refresh_token" && !value.is_empty()).then(|| value.to_string())
}

async fn register_full(app: &Router, username: &str) -> (String, String, String) {
    let (status, headers, body) = send_json_full(
        app,
        Method::POST,
        "/auth/register",
        None,
        Some(json!({
            "username": username,
            "email": format!("{username}@example.com"),
            "password": "password123",
        })),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED, "register failed: {body}");
    let refresh = refresh_cookie_value(&headers).expect("no refresh cookie on register");
    (
        body["accessToken"].as_str().unwrap().to_string(),
        body["user"]["id"].as_str().unwrap().to_string(),
        refresh,
    )
}

async fn register(app: &Router, username: &str) -> (String, String) {
    let (access, user_id, _refresh) = register_full(app, username).await;
    (access, user_id)
}

#[tokio::test]
async fn test_health_endpoint() {
    let app = test_app().await;
    let (status, body) = send_json(&app, Method::GET, "/health", None, None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert!(body["version"].is_string());
}

#[tokio::test]
async fn test_register_and_login() {
    let app = test_app().await;
    let (_token, user_id) = register(&app, "alice").await;
    assert!(user_id.starts_with("usr_"));

    let (status, headers, body) = send_json_full(
        &app,
        Method::POST,
        "/auth/login",
        None,
        Some(json!({ "login": "alice", "password": "password123" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["accessToken"].is_string());
    assert_eq!(body["user"]["username"], "alice");
    assert!(refresh_cookie_value(&headers).is_some());

    // Login by email works too.
    let (status, _) = send_json(
        &app,
        Method::POST,
        "/auth/login",
        None,
        Some(json!({ "login": "alice@example.com", "password": "password123" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    // Wrong password is refused.
    let (status, _) = send_json(
        &app,
        Method::POST,
        "/auth/login",
        None,
        Some(json!({ "login": "alice", "password": "wrong" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_register_validation() {
    let app = test_app().await;

    // Short username.
    let (status, _) = send_json(
        &app,
        Method::POST,
        "/auth/register",
        None,
        Some(json!({ "username": "ab", "email": "ab@example.com", "password": "password123" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Duplicate username.
    register(&app, "bob").await;
    let (status, _) = send_json(
        &app,
        Method::POST,
        "/auth/register",
        None,
        Some(json!({ "username": "bob", "email": "bob2@example.com", "password": "password123" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_refresh_rotation() {
    let app = test_app().await;
    let (_access, _user_id, refresh) = register_full(&app, "alice").await;

    // Refresh via the body fallback; a fresh pair comes back.
    let (status, headers, body) = send_json_full(
        &app,
        Method::POST,
        "/auth/refresh",
        None,
        Some(json!({ "refreshToken": refresh })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["accessToken"].is_string());
    let rotated = refresh_cookie_value(&headers).expect("no rotated cookie");
    assert_ne!(rotated, refresh);

    // The presented token was spent by rotation.
    let (status, headers, _body) = send_json_full(
        &app,
        Method::POST,
        "/auth/refresh",
        None,
        Some(json!({ "refreshToken": refresh })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    // The rejection clears the cookie.
    let raw = headers.get(header::SET_COOKIE).unwrap().to_str().unwrap();
    assert!(raw.starts_with("refresh_token=;"), "cookie not cleared: {raw}");

    // The rotated token still works.
    let (status, _body) = send_json(
        &app,
        Method::POST,
        "/auth/refresh",
        None,
        Some(json!({ "refreshToken": rotated })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_refresh_via_cookie() {
    let app = test_app().await;
    let (_access, _user_id, refresh) = register_full(&app, "alice").await;

    let request = Request::builder()
        .uri("/auth/refresh")
        .method(Method::POST)
        .header(header::COOKIE, format!("refresh_token={refresh}"))
        .body(Body::empty())
        .unwrap();

    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(refresh_cookie_value(response.headers()).is_some());
}

#[tokio::test]
async fn test_refresh_requires_token() {
    let app = test_app().await;
    let (status, _body) = send_json(&app, Method::POST, "/auth/refresh", None, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_logout_revokes_refresh_token() {
    let app = test_app().await;
    let (_access, _user_id, refresh) = register_full(&app, "alice").await;

    let (status, headers, _body) = send_json_full(
        &app,
        Method::POST,
        "/auth/logout",
        None,
        Some(json!({ "refreshToken": refresh })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let raw = headers.get(header::SET_COOKIE).unwrap().to_str().unwrap();
    assert!(raw.starts_with("refresh_token=;"));

    // The revoked token no longer refreshes.
    let (status, _body) = send_json(
        &app,
        Method::POST,
        "/auth/refresh",
        None,
        Some(json!({ "refreshToken": refresh })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_logout_all_devices() {
    let app = test_app().await;
    let (access, _user_id, first_refresh) = register_full(&app, "alice").await;

    // A second session from another device.
    let (status, headers, _body) = send_json_full(
        &app,
        Method::POST,
        "/auth/login",
        None,
        Some(json!({ "login": "alice", "password": "password123" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let second_refresh = refresh_cookie_value(&headers).unwrap();

    let (status, _body) = send_json(&app, Method::POST, "/auth/logout-all", Some(&access), None).await;
    assert_eq!(status, StatusCode::OK);

    for token in [first_refresh, second_refresh] {
        let (status, _body) = send_json(
            &app,
            Method::POST,
            "/auth/refresh",
            None,
            Some(json!({ "refreshToken": token })),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }
}

#[tokio::test]
async fn test_protected_routes_require_auth() {
    let app = test_app().await;

    let (status, _) = send_json(&app, Method::GET, "/chats", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send_json(&app, Method::GET, "/users", Some("garbage"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_personal_chat_lifecycle() {
    let app = test_app().await;
    let (alice_token, _alice_id) = register(&app, "alice").await;
    let (bob_token, bob_id) = register(&app, "bob").await;

    let (status, body) = send_json(
        &app,
        Method::POST,
        "/chats/personal",
        Some(&alice_token),
        Some(json!({ "participantId": bob_id })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let chat_id = body["chatId"].as_str().unwrap().to_string();

    // Creating the same personal chat again returns the existing one.
    let (status, body) = send_json(
        &app,
        Method::POST,
        "/chats/personal",
        Some(&alice_token),
        Some(json!({ "participantId": bob_id })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["chatId"], chat_id.as_str());

    // Both sides see the chat, renamed to the peer.
    let (status, body) = send_json(&app, Method::GET, "/chats", Some(&alice_token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);
    assert_eq!(body[0]["name"], "bob");

    let (_, body) = send_json(&app, Method::GET, "/chats", Some(&bob_token), None).await;
    assert_eq!(body[0]["name"], "alice");

    // Chat detail includes the roster.
    let (status, body) = send_json(
        &app,
        Method::GET,
        &format!("/chats/{chat_id}"),
        Some(&alice_token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["participants"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_group_invitation_flow() {
    let app = test_app().await;
    let (alice_token, _) = register(&app, "alice").await;
    let (_bob_token, bob_id) = register(&app, "bob").await;
    let (carol_token, carol_id) = register(&app, "carol").await;

    let (status, body) = send_json(
        &app,
        Method::POST,
        "/chats/group",
        Some(&alice_token),
        Some(json!({ "name": "team", "userIds": [bob_id] })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let chat_id = body["chatId"].as_str().unwrap().to_string();

    // Admin invites carol.
    let (status, _) = send_json(
        &app,
        Method::POST,
        &format!("/chats/{chat_id}/invite"),
        Some(&alice_token),
        Some(json!({ "userIds": [carol_id] })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    // Carol sees and accepts the invitation.
    let (status, body) = send_json(&app, Method::GET, "/invitations", Some(&carol_token), None).await;
    assert_eq!(status, StatusCode::OK);
    let invitations = body.as_array().unwrap();
    assert_eq!(invitations.len(), 1);
    let invitation_id = invitations[0]["id"].as_str().unwrap().to_string();

    let (status, _) = send_json(
        &app,
        Method::POST,
        &format!("/invitations/{invitation_id}/respond"),
        Some(&carol_token),
        Some(json!({ "accept": true })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    // Carol is now in the roster.
    let (_, body) = send_json(
        &app,
        Method::GET,
        &format!("/chats/{chat_id}"),
        Some(&carol_token),
        None,
    )
    .await;
    assert_eq!(body["participants"].as_array().unwrap().len(), 3);

    // Responding twice conflicts.
    let (status, _) = send_json(
        &app,
        Method::POST,
        &format!("/invitations/{invitation_id}/respond"),
        Some(&carol_token),
        Some(json!({ "accept": true })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_non_admin_cannot_invite() {
    let app = test_app().await;
    let (alice_token, _) = register(&app, "alice").await;
    let (bob_token, bob_id) = register(&app, "bob").await;
    let (_carol_token, carol_id) = register(&app, "carol").await;

    let (_, body) = send_json(
        &app,
        Method::POST,
        "/chats/group",
        Some(&alice_token),
        Some(json!({ "name": "team", "userIds": [bob_id] })),
    )
    .await;
    let chat_id = body["chatId"].as_str().unwrap().to_string();

    let (status, _) = send_json(
        &app,
        Method::POST,
        &format!("/chats/{chat_id}/invite"),
        Some(&bob_token),
        Some(json!({ "userIds": [carol_id] })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_history_requires_participation() {
    let app = test_app().await;
    let (alice_token, _) = register(&app, "alice").await;
    let (_bob_token, bob_id) = register(&app, "bob").await;
    let (carol_token, _) = register(&app, "carol").await;

    let (_, body) = send_json(
        &app,
        Method::POST,
        "/chats/personal",
        Some(&alice_token),
        Some(json!({ "participantId": bob_id })),
    )
    .await;
    let chat_id = body["chatId"].as_str().unwrap().to_string();

    let (status, _) = send_json(
        &app,
        Method::GET,
        &format!("/chats/{chat_id}/messages"),
        Some(&carol_token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = send_json(
        &app,
        Method::GET,
        &format!("/chats/{chat_id}/messages"),
        Some(&alice_token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn test_unknown_ws_user_is_refused() {
    let app = test_app().await;

    // The upgrade is refused before any session work when the user does not
    // exist; without upgrade headers this surfaces as a client error, never
    // a success.
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/ws/usr_missing")
                .method(Method::GET)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert!(response.status().is_client_error());
}
