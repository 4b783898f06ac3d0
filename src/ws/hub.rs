//! Per-instance session registry.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use log::{error, info, warn};
use tokio::sync::{Mutex, RwLock, mpsc};

use super::session::ClientSession;

/// Slots in the hub command channel.
pub(crate) const COMMAND_BUFFER_SIZE: usize = 256;

/// Mutations serialized through the hub event loop. Lookups for
/// `send_to_client` bypass the loop and go through the read lock directly.
pub(crate) enum HubCommand {
    Register(Arc<ClientSession>),
    Unregister(Arc<ClientSession>),
    Broadcast(String),
}

/// Invoked exactly once per registered session, after it leaves the table.
/// Supplied at hub construction time.
#[async_trait]
pub trait DisconnectHook: Send + Sync {
    async fn on_unregister(&self, user_id: &str) -> anyhow::Result<()>;
}

/// Capability shared by the in-memory and Redis-backed hubs. The delivery
/// handler depends only on this.
#[async_trait]
pub trait Hub: Send + Sync {
    /// Drive the event loop. Call once, from a spawned task; a second call
    /// returns immediately.
    async fn run(self: Arc<Self>);

    /// Enqueue a session for registration.
    async fn register(&self, session: Arc<ClientSession>);

    /// Enqueue a session for unregistration. A second unregister for the
    /// same session is a no-op.
    async fn unregister(&self, session: Arc<ClientSession>);

    /// Deliver a serialized frame to one user, if reachable.
    async fn send_to_client(&self, user_id: &str, payload: String);

    /// Deliver a serialized frame to every connected client on this
    /// instance.
    async fn broadcast(&self, payload: String);

    /// Number of live sessions on this instance.
    async fn client_count(&self) -> usize;
}

/// Single-instance hub: one event loop owns all table mutations, sends read
/// the table under a shared lock.
pub struct LocalHub {
    clients: RwLock<HashMap<String, Arc<ClientSession>>>,
    commands: mpsc::Sender<HubCommand>,
    command_rx: Mutex<Option<mpsc::Receiver<HubCommand>>>,
    on_unregister: Arc<dyn DisconnectHook>,
}

impl LocalHub {
    /// Create a new hub with its unregister hook.
    pub fn new(on_unregister: Arc<dyn DisconnectHook>) -> Self {
        let (tx, rx) = mpsc::channel(COMMAND_BUFFER_SIZE);
        Self {
            clients: RwLock::new(HashMap::new()),
            commands: tx,
            command_rx: Mutex::new(Some(rx)),
            on_unregister,
        }
    }

    async fn handle_register(&self, session: Arc<ClientSession>) {
        let replaced = {
            let mut clients = self.clients.write().await;
            clients.insert(session.user_id().to_string(), session.clone())
        };

        info!("{} is connected", session.user_id());

        // A reconnect replaces the prior session; drain it so the table
        // never holds two live sessions for one user.
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

        if removed {
            info!("{} is disconnected", session.user_id());
        }

        self.drain(session).await;
    }

    /// Close the session and fire the hook, at most once per session. Runs
    /// after the table lock is released.
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
}

#[async_trait]
impl Hub for LocalHub {
    async fn run(self: Arc<Self>) {
        let Some(mut commands) = self.command_rx.lock().await.take() else {
            warn!("hub event loop already running");
            return;
        };

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
        // The read lock is held across the enqueue so the entry cannot be
        // closed between lookup and send.
        let clients = self.clients.read().await;
        if let Some(session) = clients.get(user_id) {
            if !session.try_enqueue(payload) {
                warn!("failed to send to client: {}", user_id);
            }
        }
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

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

    struct RecordingHook {
        calls: StdMutex<Vec<String>>,
    }

    impl RecordingHook {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                calls: StdMutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl DisconnectHook for RecordingHook {
        async fn on_unregister(&self, user_id: &str) -> anyhow::Result<()> {
            self.calls.lock().unwrap().push(user_id.to_string());
            Ok(())
        }
    }

    fn spawn_hub(hook: Arc<RecordingHook>) -> Arc<LocalHub> {
        let hub = Arc::new(LocalHub::new(hook));
        tokio::spawn(hub.clone().run());
        hub
    }

    async fn wait_for_count(hub: &Arc<LocalHub>, expected: usize) {
        for _ in 0..100 {
            if hub.client_count().await == expected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!(
            "client count never reached {expected}, is {}",
            hub.client_count().await
        );
    }

    #[tokio::test]
    async fn test_register_then_send_delivers() {
        let hub = spawn_hub(RecordingHook::new());
        let (session, mut rx) = ClientSession::new("alice");

        hub.register(session).await;
        wait_for_count(&hub, 1).await;

        hub.send_to_client("alice", "hello".into()).await;
        assert_eq!(rx.recv().await.unwrap(), "hello");
    }

    #[tokio::test]
    async fn test_send_to_absent_user_is_noop() {
        let hub = spawn_hub(RecordingHook::new());
        hub.send_to_client("ghost", "hello".into()).await;
        assert_eq!(hub.client_count().await, 0);
    }

    #[tokio::test]
    async fn test_unregister_fires_hook_once() {
        let hook = RecordingHook::new();
        let hub = spawn_hub(hook.clone());
        let (session, _rx) = ClientSession::new("alice");

        hub.register(session.clone()).await;
        wait_for_count(&hub, 1).await;

        hub.unregister(session.clone()).await;
        hub.unregister(session.clone()).await;
        wait_for_count(&hub, 0).await;

        // Let the second command drain before asserting.
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(hook.calls(), vec!["alice".to_string()]);
        assert!(session.is_closed());
    }

    #[tokio::test]
    async fn test_reregister_replaces_prior_session() {
        let hook = RecordingHook::new();
        let hub = spawn_hub(hook.clone());

        let (first, mut first_rx) = ClientSession::new("alice");
        hub.register(first.clone()).await;
        wait_for_count(&hub, 1).await;

        let (second, mut second_rx) = ClientSession::new("alice");
        hub.register(second.clone()).await;

        // The prior session is drained: closed and its hook fired.
        for _ in 0..100 {
            if first.is_closed() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(first.is_closed());
        assert!(!second.is_closed());
        assert_eq!(hub.client_count().await, 1);
        assert_eq!(hook.calls(), vec!["alice".to_string()]);

        // Sends now reach the replacement only.
        hub.send_to_client("alice", "hi".into()).await;
        assert_eq!(second_rx.recv().await.unwrap(), "hi");
        assert!(first_rx.try_recv().is_err());

        // The evicted session's own late unregister changes nothing.
        hub.unregister(first).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(hub.client_count().await, 1);
        assert_eq!(hook.calls(), vec!["alice".to_string()]);
    }

    #[tokio::test]
    async fn test_send_after_unregister_never_reaches_queue() {
        let hub = spawn_hub(RecordingHook::new());
        let (session, mut rx) = ClientSession::new("alice");

        hub.register(session.clone()).await;
        wait_for_count(&hub, 1).await;
        hub.unregister(session).await;
        wait_for_count(&hub, 0).await;

        hub.send_to_client("alice", "late".into()).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_broadcast_reaches_all_clients() {
        let hub = spawn_hub(RecordingHook::new());
        let (alice, mut alice_rx) = ClientSession::new("alice");
        let (bob, mut bob_rx) = ClientSession::new("bob");

        hub.register(alice).await;
        hub.register(bob).await;
        wait_for_count(&hub, 2).await;

        hub.broadcast("all hands".into()).await;
        assert_eq!(alice_rx.recv().await.unwrap(), "all hands");
        assert_eq!(bob_rx.recv().await.unwrap(), "all hands");
    }

    #[tokio::test]
    async fn test_broadcast_skips_saturated_session_without_eviction() {
        let hub = spawn_hub(RecordingHook::new());
        let (alice, _alice_rx) = ClientSession::new("alice");
        let (bob, mut bob_rx) = ClientSession::new("bob");

        hub.register(alice.clone()).await;
        hub.register(bob).await;
        wait_for_count(&hub, 2).await;

        // Saturate alice's queue; broadcasts drop for her but she stays
        // registered.
        while alice.try_enqueue("fill".into()) {}

        hub.broadcast("update".into()).await;
        assert_eq!(bob_rx.recv().await.unwrap(), "update");

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(hub.client_count().await, 2);
        assert!(!alice.is_closed());
    }
}
