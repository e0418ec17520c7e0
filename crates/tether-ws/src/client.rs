//! Per-connection client state.
//!
//! A [`Client`] is the application's handle on one live connection. It never
//! touches the socket: sends go through the bounded outbound queue drained
//! by the sender loop, and [`Client::shutdown`] fires a one-shot signal the
//! sender loop observes.
//!
//! The disconnected flag and the last-activity timestamp share a single
//! atomic: milliseconds since connect, with `-1` as the disconnected
//! sentinel. Once the sentinel is stored it is never overwritten.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tracing::warn;

use crate::context::Context;
use crate::error::{WsError, WsResult};
use crate::message::Envelope;

const DISCONNECTED: i64 = -1;

/// One browser session's live connection.
pub struct Client {
    id: String,
    outbound: mpsc::Sender<Bytes>,
    shutdown: Mutex<Option<oneshot::Sender<()>>>,
    connected_at: Instant,
    last_activity: AtomicI64,
    context: Context,
}

/// The receiving ends handed to the sender loop.
pub(crate) struct ClientChannels {
    pub(crate) outbound: mpsc::Receiver<Bytes>,
    pub(crate) shutdown: oneshot::Receiver<()>,
}

impl Client {
    /// Create a client and the channel ends its sender loop consumes.
    pub(crate) fn new(id: impl Into<String>, outbound_capacity: usize) -> (Arc<Self>, ClientChannels) {
        let (outbound_tx, outbound_rx) = mpsc::channel(outbound_capacity);
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let client = Arc::new(Self {
            id: id.into(),
            outbound: outbound_tx,
            shutdown: Mutex::new(Some(shutdown_tx)),
            connected_at: Instant::now(),
            last_activity: AtomicI64::new(0),
            context: Context::new(),
        });
        let channels = ClientChannels {
            outbound: outbound_rx,
            shutdown: shutdown_rx,
        };
        (client, channels)
    }

    /// The connection's identity.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Application context scoped to this connection.
    pub fn context(&self) -> &Context {
        &self.context
    }

    /// When the connection was established.
    pub fn connected_at(&self) -> Instant {
        self.connected_at
    }

    /// Last liveness-relevant event, or `None` once disconnected.
    pub fn last_activity(&self) -> Option<Instant> {
        match self.last_activity.load(Ordering::Acquire) {
            DISCONNECTED => None,
            ms => Some(self.connected_at + Duration::from_millis(ms.unsigned_abs())),
        }
    }

    /// Check if the client has been torn down.
    pub fn is_disconnected(&self) -> bool {
        self.last_activity.load(Ordering::Acquire) == DISCONNECTED
    }

    /// Record liveness. Has no effect after disconnect.
    pub(crate) fn touch(&self) {
        let now = i64::try_from(self.connected_at.elapsed().as_millis()).unwrap_or(i64::MAX);
        let _ = self
            .last_activity
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                (current != DISCONNECTED).then_some(now)
            });
    }

    /// Queue a payload for delivery, waiting while the queue is full.
    pub async fn send(&self, data: impl Into<Bytes>) -> WsResult<()> {
        if self.is_disconnected() {
            return Err(WsError::Disconnected);
        }
        self.outbound
            .send(data.into())
            .await
            .map_err(|_| WsError::Disconnected)
    }

    /// Queue a payload without waiting.
    pub fn try_send(&self, data: impl Into<Bytes>) -> WsResult<()> {
        if self.is_disconnected() {
            return Err(WsError::Disconnected);
        }
        self.outbound.try_send(data.into()).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => WsError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => WsError::Disconnected,
        })
    }

    /// Queue a `{"type": msg_type, "data": data}` message.
    pub async fn send_json<T: Serialize>(&self, msg_type: &str, data: &T) -> WsResult<()> {
        let payload = Envelope::new(msg_type, data).to_bytes().map_err(|e| {
            warn!(cid = %self.id, msg_type, error = %e, "Failed to encode message");
            e
        })?;
        self.send(payload).await
    }

    /// Begin graceful close of the connection.
    ///
    /// Succeeds exactly once. Every later call, and every call after the
    /// connection died on its own, returns [`WsError::Disconnected`].
    pub fn shutdown(&self) -> WsResult<()> {
        if self.last_activity.swap(DISCONNECTED, Ordering::AcqRel) == DISCONNECTED {
            return Err(WsError::Disconnected);
        }
        if let Some(signal) = self.shutdown.lock().take() {
            // The sender loop may already be gone; nothing left to signal then.
            let _ = signal.send(());
        }
        Ok(())
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("id", &self.id)
            .field("disconnected", &self.is_disconnected())
            .field("context", &self.context)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_send_enqueues() {
        let (client, mut channels) = Client::new("abcdefghijABCDEFGHIJ", 4);
        client.send("hello").await.unwrap();
        assert_eq!(channels.outbound.recv().await, Some(Bytes::from_static(b"hello")));
    }

    #[tokio::test]
    async fn test_send_json_envelope() {
        let (client, mut channels) = Client::new("abcdefghijABCDEFGHIJ", 4);
        client.send_json("answer", &json!({"value": 2})).await.unwrap();

        let payload = channels.outbound.recv().await.unwrap();
        let value: serde_json::Value = serde_json::from_slice(&payload).unwrap();
        assert_eq!(value, json!({"type": "answer", "data": {"value": 2}}));
    }

    #[tokio::test]
    async fn test_send_after_shutdown_fails_without_enqueue() {
        let (client, mut channels) = Client::new("abcdefghijABCDEFGHIJ", 4);
        client.shutdown().unwrap();

        assert!(matches!(client.send("late").await, Err(WsError::Disconnected)));
        assert!(matches!(client.try_send("late"), Err(WsError::Disconnected)));
        assert!(matches!(
            client.send_json("t", &1).await,
            Err(WsError::Disconnected)
        ));
        assert!(channels.outbound.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_shutdown_signals_once() {
        let (client, channels) = Client::new("abcdefghijABCDEFGHIJ", 4);
        assert!(client.shutdown().is_ok());
        assert!(client.is_disconnected());
        assert!(channels.shutdown.await.is_ok());

        assert!(matches!(client.shutdown(), Err(WsError::Disconnected)));
        assert!(client.is_disconnected());
    }

    #[test]
    fn test_concurrent_shutdown_single_winner() {
        let (client, _channels) = Client::new("abcdefghijABCDEFGHIJ", 4);
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let client = Arc::clone(&client);
                std::thread::spawn(move || client.shutdown().is_ok())
            })
            .collect();
        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();
        assert_eq!(winners, 1);
    }

    #[test]
    fn test_touch_never_revives() {
        let (client, _channels) = Client::new("abcdefghijABCDEFGHIJ", 4);
        assert!(client.last_activity().is_some());
        client.shutdown().unwrap();
        client.touch();
        assert!(client.is_disconnected());
        assert!(client.last_activity().is_none());
    }

    #[test]
    fn test_try_send_full_queue() {
        let (client, _channels) = Client::new("abcdefghijABCDEFGHIJ", 1);
        client.try_send("one").unwrap();
        assert!(matches!(client.try_send("two"), Err(WsError::QueueFull)));
    }

    #[test]
    fn test_send_waits_for_queue_space() {
        let (client, mut channels) = Client::new("abcdefghijABCDEFGHIJ", 1);
        client.try_send("one").unwrap();

        let mut send = tokio_test::task::spawn(client.send("two"));
        tokio_test::assert_pending!(send.poll());

        assert_eq!(channels.outbound.try_recv().unwrap(), Bytes::from("one"));
        assert!(send.is_woken());
        tokio_test::assert_ready_ok!(send.poll());
        assert_eq!(channels.outbound.try_recv().unwrap(), Bytes::from("two"));
    }

    #[tokio::test]
    async fn test_send_after_sender_loop_gone() {
        let (client, channels) = Client::new("abcdefghijABCDEFGHIJ", 4);
        drop(channels);
        assert!(matches!(client.send("x").await, Err(WsError::Disconnected)));
    }

    #[test]
    fn test_context_is_per_client() {
        let (a, _ca) = Client::new("aaaaaaaaaaaaaaaaaaaa", 1);
        let (b, _cb) = Client::new("bbbbbbbbbbbbbbbbbbbb", 1);
        a.context().insert("k", 1_u8);
        assert!(b.context().get::<u8>("k").is_none());
    }
}
