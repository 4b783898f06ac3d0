//! WebSocket delivery handler: session bring-up and the inbound pipeline.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    extract::{
        Path, State, WebSocketUpgrade,
        ws::{Message as WsMessage, WebSocket},
    },
    response::Response,
};
use futures::StreamExt;
use log::{debug, error, info, warn};

use crate::api::{ApiError, AppState};
use crate::message::Message;
use crate::user::{User, UserService};

use super::hub::DisconnectHook;
use super::session::{ClientSession, write_pump};
use super::types::{IncomingMessage, OutgoingMessage, ReadAck};

/// Idle connections are dropped after this long without any inbound frame;
/// the 30s pings keep healthy peers inside the window.
const READ_TIMEOUT: Duration = Duration::from_secs(60);

/// Hub unregister hook: mark the user offline in the store.
pub struct MarkOffline {
    users: Arc<UserService>,
}

impl MarkOffline {
    pub fn new(users: Arc<UserService>) -> Self {
        Self { users }
    }
}

#[async_trait]
impl DisconnectHook for MarkOffline {
    async fn on_unregister(&self, user_id: &str) -> anyhow::Result<()> {
        self.users.handle_unregister(user_id).await
    }
}

/// WebSocket upgrade handler.
///
/// GET /ws/{user_id}
///
/// The user ID comes from the path and is not cross-checked against a token;
/// unknown users are refused before the upgrade.
pub async fn ws_handler(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    ws: WebSocketUpgrade,
) -> Result<Response, ApiError> {
    let user = state
        .users
        .get_user(&user_id)
        .await
        .map_err(ApiError::from)?
        .ok_or_else(|| ApiError::not_found(format!("User not found: {user_id}")))?;

    info!("WebSocket upgrade request from user {}", user.id);
    Ok(ws.on_upgrade(move |socket| handle_connection(socket, state, user)))
}

/// Run one connection: mark online, register, pump frames, unregister.
async fn handle_connection(socket: WebSocket, state: AppState, user: User) {
    if let Err(err) = state.users.set_online(&user.id, true).await {
        error!("failed to mark {} online: {:#}", user.id, err);
    }

    let (session, outbound_rx) = ClientSession::new(user.id.clone());
    state.hub.register(session.clone()).await;

    let (sink, mut stream) = socket.split();
    let writer = tokio::spawn(write_pump(session.clone(), outbound_rx, sink));

    // Reader pump. Terminates on read error, close, deadline or hub-driven
    // cancellation; it signals unregister exactly once on the way out.
    loop {
        let frame = tokio::select! {
            read = tokio::time::timeout(READ_TIMEOUT, stream.next()) => match read {
                Ok(frame) => frame,
                Err(_) => {
                    debug!("read deadline expired for {}", user.id);
                    break;
                }
            },
            _ = session.closed() => break,
        };

        match frame {
            Some(Ok(WsMessage::Text(text))) => dispatch_frame(&state, &user.id, text.as_str()).await,
            Some(Ok(WsMessage::Close(_))) | None => break,
            // Pings, pongs and binary frames only refresh the read deadline.
            Some(Ok(_)) => {}
            Some(Err(err)) => {
                debug!("read error for {}: {}", user.id, err);
                break;
            }
        }
    }

    state.hub.unregister(session).await;
    let _ = writer.await;
    info!("connection closed for {}", user.id);
}

/// Classify and process one inbound frame. A frame whose decoded form has a
/// non-empty `messageId` is a read ack; everything else is a message.
pub async fn dispatch_frame(state: &AppState, sender_id: &str, raw: &str) {
    if let Ok(ack) = serde_json::from_str::<ReadAck>(raw) {
        if !ack.message_id.is_empty() {
            handle_read_ack(state, ack).await;
            return;
        }
    }

    match serde_json::from_str::<IncomingMessage>(raw) {
        Ok(incoming) => handle_chat_message(state, sender_id, incoming).await,
        Err(err) => warn!("unknown frame from {}: {}", sender_id, err),
    }
}

/// Message path: persist, then fan out to every online participant except
/// the sender. Errors never propagate to the peer.
async fn handle_chat_message(state: &AppState, sender_id: &str, incoming: IncomingMessage) {
    let chat = match state.chats.get_chat(&incoming.chat_id).await {
        Ok(Some(chat)) => chat,
        Ok(None) => {
            warn!("chat not found: {}", incoming.chat_id);
            return;
        }
        Err(err) => {
            error!("get chat error: {:#}", err);
            return;
        }
    };

    let sender = match state.users.get_user(sender_id).await {
        Ok(Some(user)) => user,
        Ok(None) => {
            warn!("sender not found: {}", sender_id);
            return;
        }
        Err(err) => {
            error!("get sender error: {:#}", err);
            return;
        }
    };

    let record = Message {
        id: String::new(),
        chat_id: chat.id.clone(),
        sender_id: sender.id.clone(),
        message: incoming.message.clone(),
        timestamp: incoming.timestamp,
        is_read: false,
    };
    let message_id = match state.messages.create(&record).await {
        Ok(id) => id,
        Err(err) => {
            error!("persist message error: {:#}", err);
            return;
        }
    };

    let participant_ids = match state.chats.participant_ids(&chat.id).await {
        Ok(ids) => ids,
        Err(err) => {
            error!("get participants error: {:#}", err);
            return;
        }
    };

    if participant_ids.is_empty() {
        // An empty chat is irrecoverable; best-effort cleanup.
        warn!("no participants in chat: {}", chat.id);
        if let Err(err) = state.chats.delete_chat_unchecked(&chat.id).await {
            error!("delete empty chat error: {:#}", err);
        }
        return;
    }

    let online_ids: HashSet<String> = match state.users.get_online_users(&participant_ids).await {
        Ok(users) => users.into_iter().map(|u| u.id).collect(),
        Err(err) => {
            error!("get online users error: {:#}", err);
            return;
        }
    };

    let frame = OutgoingMessage {
        message_id,
        user_id: sender.id.clone(),
        user_name: sender.name.clone(),
        message: incoming.message,
        timestamp: incoming.timestamp,
        is_read: false,
        chat_id: chat.id.clone(),
    };
    let payload = match serde_json::to_string(&frame) {
        Ok(payload) => payload,
        Err(err) => {
            error!("encode outbound frame error: {}", err);
            return;
        }
    };

    // One delivery task per recipient; the frame completes only after every
    // send has returned. Offline participants are dropped.
    let mut deliveries = Vec::new();
    for user_id in participant_ids {
        if user_id == sender.id || !online_ids.contains(&user_id) {
            continue;
        }
        let hub = state.hub.clone();
        let payload = payload.clone();
        deliveries.push(tokio::spawn(async move {
            hub.send_to_client(&user_id, payload).await;
        }));
    }
    for delivery in deliveries {
        let _ = delivery.await;
    }
}

/// Read-ack path: flip the persisted flag, no fan-out.
async fn handle_read_ack(state: &AppState, ack: ReadAck) {
    match state.messages.get(&ack.message_id).await {
        Ok(Some(mut message)) => {
            message.is_read = true;
            if let Err(err) = state.messages.update(&message).await {
                error!("update read flag error: {:#}", err);
            }
        }
        Ok(None) => warn!("message not found for read ack: {}", ack.message_id),
        Err(err) => error!("get message error: {:#}", err),
    }
}
