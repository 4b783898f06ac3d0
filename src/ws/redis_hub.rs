//! Redis-backed hub for multi-instance deployments.
//!
//! Local sessions live in the same table as the in-memory hub; a send to a
//! user without a local session is published on `messages:{user_id}` and
//! picked up by whichever instance holds them. Presence keys
//! (`user:{user_id}:server`) record session ownership and carry no TTL; a
//! stale key after a crash means the publish lands on a channel nobody owns
//! and the payload is lost, which the delivery model tolerates.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::StreamExt;
use log::{error, info, warn};
use redis::aio::MultiplexedConnection;
use tokio::sync::{Mutex, RwLock, mpsc};

use super::hub::{COMMAND_BUFFER_SIZE, DisconnectHook, Hub, HubCommand};
use super::session::ClientSession;
use super::types::BusEnvelope;

const RECONNECT_BASE_DELAY: Duration = Duration::from_secs(1);
const RECONNECT_MAX_DELAY: Duration = Duration::from_secs(30);

/// Distributed hub: the local table plus a Redis pub/sub bus and presence
/// directory.
pub struct RedisHub {
    clients: RwLock<HashMap<String, Arc<ClientSession>>>,
    commands: mpsc::Sender<HubCommand>,
    command_rx: Mutex<Option<mpsc::Receiver<HubCommand>>>,
    redis: redis::Client,
    conn: MultiplexedConnection,
    server_id: String,
    on_unregister: Arc<dyn DisconnectHook>,
}

impl RedisHub {
    /// Connect to the bus. `server_id` must be unique per instance.
    pub async fn connect(
        redis_addr: &str,
        server_id: impl Into<String>,
        on_unregister: Arc<dyn DisconnectHook>,
    ) -> Result<Self> {
        let url = if redis_addr.contains("://") {
            redis_addr.to_string()
        } else {
            format!("redis://{redis_addr}")
        };

        let redis = redis::Client::open(url).context("opening Redis client")?;
        let conn = redis
            .get_multiplexed_async_connection()
            .await
            .context("connecting to Redis")?;

        let (tx, rx) = mpsc::channel(COMMAND_BUFFER_SIZE);
        Ok(Self {
            clients: RwLock::new(HashMap::new()),
            commands: tx,
            command_rx: Mutex::new(Some(rx)),
            redis,
            conn,
            server_id: server_id.into(),
            on_unregister,
        })
    }

    /// The instance identity used for loopback suppression.
    pub fn server_id(&self) -> &str {
        &self.server_id
    }

    async fn handle_register(&self, session: Arc<ClientSession>) {
        let replaced = {
            let mut clients = self.clients.write().await;
            clients.insert(session.user_id().to_string(), session.clone())
        };

        // Announce ownership so other instances route to us.
        let mut conn = self.conn.clone();
        let set: redis::RedisResult<()> = redis::cmd("SET")
            .arg(presence_key(session.user_id()))
            .arg(&self.server_id)
            .query_async(&mut conn)
            .await;
        if let Err(err) = set {
            warn!(
                "[{}] failed to announce presence for {}: {}",
                self.server_id,
                session.user_id(),
                err
            );
        }

        info!("[{}] {} connected", self.server_id, session.user_id());

        if let Some(prev) = replaced {
            if !Arc::ptr_eq(&prev, &session) {
                self.drain(prev).await;
            }
        }
    }

    async fn handle_unregister(&self, session: Arc<ClientSession>) {
        let removed = {
            let mut clients = self.clients.write().await;
            match clients.get(session.user_id()) {
                Some(current) if Arc::ptr_eq(current, &session) => {
                    clients.remove(session.user_id());
                    true
                }
                _ => false,
            }
        };

        // Only the removal that actually vacated the table clears presence;
        // a replaced session must not erase its successor's key.
        if removed {
            let mut conn = self.conn.clone();
            let del: redis::RedisResult<()> = redis::cmd("DEL")
                .arg(presence_key(session.user_id()))
                .query_async(&mut conn)
                .await;
            if let Err(err) = del {
                warn!(
                    "[{}] failed to clear presence for {}: {}",
                    self.server_id,
                    session.user_id(),
                    err
                );
            }

            info!("[{}] {} disconnected", self.server_id, session.user_id());
        }

        self.drain(session).await;
    }

    async fn drain(&self, session: Arc<ClientSession>) {
        session.close();
        if session.begin_unregister() {
            if let Err(err) = self.on_unregister.on_unregister(session.user_id()).await {
                error!("unregister hook error for {}: {:#}", session.user_id(), err);
            }
        }
    }

    async fn handle_broadcast(&self, payload: String) {
        let clients = self.clients.read().await;
        for (user_id, session) in clients.iter() {
            if !session.try_enqueue(payload.clone()) {
                warn!("failed to broadcast to client: {}", user_id);
            }
        }
    }

    /// Slow path: wrap the payload for another instance to deliver.
    async fn publish(&self, user_id: &str, payload: String) {
        let envelope = BusEnvelope {
            from_server_id: self.server_id.clone(),
            to_user_id: user_id.to_string(),
            payload,
        };

        let encoded = match serde_json::to_string(&envelope) {
            Ok(encoded) => encoded,
            Err(err) => {
                error!("failed to encode bus envelope: {}", err);
                return;
            }
        };

        let mut conn = self.conn.clone();
        let published: redis::RedisResult<()> = redis::cmd("PUBLISH")
            .arg(format!("messages:{user_id}"))
            .arg(encoded)
            .query_async(&mut conn)
            .await;

        match published {
            Ok(()) => info!("[{}] published message for user {}", self.server_id, user_id),
            Err(err) => warn!("[{}] failed to publish to bus: {}", self.server_id, err),
        }
    }

    /// Consume the pattern subscription, reconnecting with backoff when the
    /// stream ends. Local delivery keeps working during a bus outage.
    async fn run_subscriber(self: Arc<Self>) {
        let mut delay = RECONNECT_BASE_DELAY;

        loop {
            match self.redis.get_async_pubsub().await {
                Ok(mut pubsub) => match pubsub.psubscribe("messages:*").await {
                    Ok(()) => {
                        info!("[{}] bus subscriber started", self.server_id);
                        delay = RECONNECT_BASE_DELAY;

                        let mut stream = pubsub.on_message();
                        while let Some(msg) = stream.next().await {
                            let raw: String = match msg.get_payload() {
                                Ok(raw) => raw,
                                Err(err) => {
                                    warn!("unreadable bus payload: {}", err);
                                    continue;
                                }
                            };
                            self.deliver_from_bus(&raw).await;
                        }

                        warn!("[{}] bus subscription ended, reconnecting", self.server_id);
                    }
                    Err(err) => {
                        warn!("[{}] psubscribe failed: {}", self.server_id, err);
                    }
                },
                Err(err) => {
                    warn!("[{}] bus connection failed: {}", self.server_id, err);
                }
            }

            tokio::time::sleep(delay).await;
            delay = (delay * 2).min(RECONNECT_MAX_DELAY);
        }
    }

    async fn deliver_from_bus(&self, raw: &str) {
        let Some(envelope) = accept_envelope(raw, &self.server_id) else {
            return;
        };

        let clients = self.clients.read().await;
        let Some(session) = clients.get(&envelope.to_user_id) else {
            // The target moved or disconnected since the publish; drop.
            return;
        };

        info!(
            "[{}] received bus message for user {}",
            self.server_id, envelope.to_user_id
        );

        if !session.try_enqueue(envelope.payload) {
            warn!(
                "[{}] failed to send to local client {}",
                self.server_id, envelope.to_user_id
            );
        }
    }
}

#[async_trait]
impl Hub for RedisHub {
    async fn run(self: Arc<Self>) {
        let Some(mut commands) = self.command_rx.lock().await.take() else {
            warn!("hub event loop already running");
            return;
        };

        tokio::spawn(self.clone().run_subscriber());

        while let Some(command) = commands.recv().await {
            match command {
                HubCommand::Register(session) => self.handle_register(session).await,
                HubCommand::Unregister(session) => self.handle_unregister(session).await,
                HubCommand::Broadcast(payload) => self.handle_broadcast(payload).await,
            }
        }
    }

    async fn register(&self, session: Arc<ClientSession>) {
        if self.commands.send(HubCommand::Register(session)).await.is_err() {
            error!("hub event loop is gone; dropping register");
        }
    }

    async fn unregister(&self, session: Arc<ClientSession>) {
        if self
            .commands
            .send(HubCommand::Unregister(session))
            .await
            .is_err()
        {
            error!("hub event loop is gone; dropping unregister");
        }
    }

    async fn send_to_client(&self, user_id: &str, payload: String) {
        {
            let clients = self.clients.read().await;
            if let Some(session) = clients.get(user_id) {
                // Fast path: the user is connected to this instance.
                if !session.try_enqueue(payload) {
                    warn!(
                        "[{}] failed to send to local client {}",
                        self.server_id, user_id
                    );
                }
                return;
            }
        }

        // Slow path: the user may be on another instance.
        self.publish(user_id, payload).await;
    }

    async fn broadcast(&self, payload: String) {
        if self
            .commands
            .send(HubCommand::Broadcast(payload))
            .await
            .is_err()
        {
            error!("hub event loop is gone; dropping broadcast");
        }
    }

    async fn client_count(&self) -> usize {
        self.clients.read().await.len()
    }
}

fn presence_key(user_id: &str) -> String {
    format!("user:{user_id}:server")
}

/// Decode a bus payload, rejecting envelopes this instance published
/// itself: the publisher already took the fast path for its local users.
fn accept_envelope(raw: &str, server_id: &str) -> Option<BusEnvelope> {
    match serde_json::from_str::<BusEnvelope>(raw) {
        Ok(envelope) if envelope.from_server_id == server_id => None,
        Ok(envelope) => Some(envelope),
        Err(err) => {
            warn!("undecodable bus envelope: {}", err);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn envelope_json(from: &str, to: &str) -> String {
        serde_json::to_string(&BusEnvelope {
            from_server_id: from.to_string(),
            to_user_id: to.to_string(),
            payload: r#"{"messageId":"m1"}"#.to_string(),
        })
        .unwrap()
    }

    #[test]
    fn test_accept_envelope_from_peer() {
        let raw = envelope_json("server-2", "bob");
        let envelope = accept_envelope(&raw, "server-1").unwrap();
        assert_eq!(envelope.to_user_id, "bob");
    }

    #[test]
    fn test_loopback_envelope_is_dropped() {
        let raw = envelope_json("server-1", "bob");
        assert!(accept_envelope(&raw, "server-1").is_none());
    }

    #[test]
    fn test_garbage_envelope_is_dropped() {
        assert!(accept_envelope("not json", "server-1").is_none());
        assert!(accept_envelope(r#"{"unrelated":true}"#, "server-1").is_none());
    }

    #[test]
    fn test_presence_key_format() {
        assert_eq!(presence_key("usr_abc"), "user:usr_abc:server");
    }
}
