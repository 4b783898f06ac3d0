//! Server-side handle to one live client connection.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::ws::{Message, WebSocket};
use futures::SinkExt;
use futures::stream::SplitSink;
use log::{debug, warn};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tokio_util::sync::WaitForCancellationFuture;

/// Slots in the per-session outbound queue.
const OUTBOUND_QUEUE_SIZE: usize = 256;

/// Keep-alive ping cadence.
const PING_INTERVAL: Duration = Duration::from_secs(30);

/// Deadline for a single outbound write.
const WRITE_TIMEOUT: Duration = Duration::from_secs(10);

/// One live connection: identity, bounded outbound queue and termination
/// signal. A user has at most one session per instance; a reconnect evicts
/// the prior session.
///
/// Teardown discipline: only the hub cancels the session (when processing an
/// unregister or replacing it on re-register). The reader pump never cancels;
/// it signals unregister and lets the hub drive the close. A failed write
/// also cancels, so the reader observes termination.
pub struct ClientSession {
    user_id: String,
    outbound: mpsc::Sender<String>,
    cancel: CancellationToken,
    unregistered: AtomicBool,
}

impl ClientSession {
    /// Create a session and the receiving end of its outbound queue, which
    /// the writer pump drains.
    pub fn new(user_id: impl Into<String>) -> (Arc<Self>, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(OUTBOUND_QUEUE_SIZE);
        let session = Arc::new(Self {
            user_id: user_id.into(),
            outbound: tx,
            cancel: CancellationToken::new(),
            unregistered: AtomicBool::new(false),
        });
        (session, rx)
    }

    /// The user this session belongs to.
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Non-blocking enqueue of a serialized frame. Returns false when the
    /// queue is full or the session is shutting down; the payload is dropped
    /// and the session stays alive.
    pub fn try_enqueue(&self, payload: String) -> bool {
        self.outbound.try_send(payload).is_ok()
    }

    /// Terminate both pumps. Idempotent.
    pub(crate) fn close(&self) {
        self.cancel.cancel();
    }

    /// Whether termination has been signalled.
    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Resolves once the session is closed.
    pub(crate) fn closed(&self) -> WaitForCancellationFuture<'_> {
        self.cancel.cancelled()
    }

    /// Claim responsibility for unregistering this session. The first caller
    /// wins, which keeps the unregister hook at exactly one invocation no
    /// matter which termination path fires first.
    pub(crate) fn begin_unregister(&self) -> bool {
        !self.unregistered.swap(true, Ordering::SeqCst)
    }
}

/// Writer pump: drains the outbound queue in order, writing each payload as
/// a text frame, and pings on a fixed cadence. Terminates on queue close,
/// write error, write timeout or session cancellation.
pub(crate) async fn write_pump(
    session: Arc<ClientSession>,
    mut outbound: mpsc::Receiver<String>,
    mut sink: SplitSink<WebSocket, Message>,
) {
    let mut ping = tokio::time::interval(PING_INTERVAL);

    loop {
        tokio::select! {
            maybe = outbound.recv() => {
                let Some(payload) = maybe else { break };
                if !write_with_deadline(&mut sink, Message::Text(payload.into()), session.user_id()).await {
                    break;
                }
            }
            _ = ping.tick() => {
                if !write_with_deadline(&mut sink, Message::Ping(Bytes::new()), session.user_id()).await {
                    break;
                }
            }
            _ = session.closed() => break,
        }
    }

    // A terminal write error must surface to the reader, which owns the
    // unregister signal.
    session.close();
    debug!("writer pump stopped for {}", session.user_id());
}

async fn write_with_deadline(
    sink: &mut SplitSink<WebSocket, Message>,
    message: Message,
    user_id: &str,
) -> bool {
    match tokio::time::timeout(WRITE_TIMEOUT, sink.send(message)).await {
        Ok(Ok(())) => true,
        Ok(Err(err)) => {
            debug!("write error for {}: {}", user_id, err);
            false
        }
        Err(_) => {
            warn!("write deadline expired for {}", user_id);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_enqueue_and_drain_in_order() {
        let (session, mut rx) = ClientSession::new("u1");
        assert!(session.try_enqueue("one".into()));
        assert!(session.try_enqueue("two".into()));

        assert_eq!(rx.recv().await.unwrap(), "one");
        assert_eq!(rx.recv().await.unwrap(), "two");
    }

    #[tokio::test]
    async fn test_full_queue_drops_payload() {
        let (session, _rx) = ClientSession::new("u1");
        for i in 0..OUTBOUND_QUEUE_SIZE {
            assert!(session.try_enqueue(format!("{i}")));
        }
        // Queue saturated; the next enqueue is dropped, not blocked.
        assert!(!session.try_enqueue("overflow".into()));
        assert!(!session.is_closed());
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let (session, _rx) = ClientSession::new("u1");
        session.close();
        session.close();
        assert!(session.is_closed());
    }

    #[tokio::test]
    async fn test_begin_unregister_claims_once() {
        let (session, _rx) = ClientSession::new("u1");
        assert!(session.begin_unregister());
        assert!(!session.begin_unregister());
    }
}
