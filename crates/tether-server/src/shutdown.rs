//! Graceful shutdown.
//!
//! A [`ShutdownSignal`] is shared by the accept loop, every HTTP
//! connection and every live WebSocket session. Triggering it stops the
//! listener and asks each session to close; the [`ConnectionTracker`] then
//! lets the server wait for the sessions to finish their close handshake.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::{watch, Notify};
use tracing::{info, warn};

/// Cloneable, idempotent shutdown trigger.
///
/// ```rust
/// use tether_server::ShutdownSignal;
///
/// let shutdown = ShutdownSignal::new();
/// let other = shutdown.clone();
/// shutdown.trigger();
/// assert!(other.is_shutdown());
/// ```
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    state: Arc<watch::Sender<bool>>,
}

impl ShutdownSignal {
    /// Create an untriggered signal.
    #[must_use]
    pub fn new() -> Self {
        let (state, _) = watch::channel(false);
        Self {
            state: Arc::new(state),
        }
    }

    /// Trigger shutdown. Later calls do nothing.
    pub fn trigger(&self) {
        self.state.send_if_modified(|stopped| !std::mem::replace(stopped, true));
    }

    /// Whether shutdown has been triggered.
    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        *self.state.borrow()
    }

    /// Future that completes once shutdown is triggered, immediately if it
    /// already was.
    ///
    /// The future owns its subscription, so it can be created here and
    /// awaited on another task.
    pub fn recv(&self) -> impl Future<Output = ()> + Send + 'static {
        let mut state = self.state.subscribe();
        async move {
            // Err means every handle is gone and nothing can trigger any more.
            if state.wait_for(|stopped| *stopped).await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }

    /// Create a signal triggered by SIGTERM or SIGINT (Ctrl+C elsewhere).
    ///
    /// Must be called from within a Tokio runtime.
    #[must_use]
    pub fn with_os_signals() -> Self {
        let signal = Self::new();
        let trigger = signal.clone();

        tokio::spawn(async move {
            wait_for_os_signal().await;
            trigger.trigger();
        });

        signal
    }
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(unix)]
async fn wait_for_os_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let (mut term, mut int) = match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
        (Ok(term), Ok(int)) => (term, int),
        (Err(e), _) | (_, Err(e)) => {
            warn!(error = %e, "Cannot install signal handlers, listening for Ctrl+C only");
            wait_for_ctrl_c().await;
            return;
        }
    };

    let name = tokio::select! {
        _ = term.recv() => "SIGTERM",
        _ = int.recv() => "SIGINT",
    };
    info!(signal = name, "Shutting down");
}

#[cfg(not(unix))]
async fn wait_for_os_signal() {
    wait_for_ctrl_c().await;
}

async fn wait_for_ctrl_c() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!(signal = "Ctrl+C", "Shutting down"),
        Err(e) => {
            // Only a programmatic trigger can stop the server now.
            warn!(error = %e, "Cannot listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    }
}

#[derive(Debug, Default)]
struct Live {
    count: AtomicUsize,
    idle: Notify,
}

/// Counts live connections so shutdown can wait for them.
///
/// ```rust
/// use tether_server::ConnectionTracker;
///
/// let tracker = ConnectionTracker::new();
/// let token = tracker.acquire();
/// assert_eq!(tracker.active_connections(), 1);
/// drop(token);
/// assert_eq!(tracker.active_connections(), 0);
/// ```
#[derive(Debug, Clone, Default)]
pub struct ConnectionTracker {
    live: Arc<Live>,
}

impl ConnectionTracker {
    /// Create an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection. It counts as live until the token drops.
    #[must_use]
    pub fn acquire(&self) -> ConnectionToken {
        self.live.count.fetch_add(1, Ordering::AcqRel);
        ConnectionToken {
            live: Arc::clone(&self.live),
        }
    }

    /// Number of live connections.
    #[must_use]
    pub fn active_connections(&self) -> usize {
        self.live.count.load(Ordering::Acquire)
    }

    /// Wait until no connections are live.
    pub async fn wait_for_shutdown(&self) {
        loop {
            // Register before checking so a drop in between is not missed.
            let idle = self.live.idle.notified();
            if self.active_connections() == 0 {
                return;
            }
            idle.await;
        }
    }
}

/// Live-connection token from [`ConnectionTracker::acquire`].
#[derive(Debug)]
pub struct ConnectionToken {
    live: Arc<Live>,
}

impl Drop for ConnectionToken {
    fn drop(&mut self) {
        if self.live.count.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.live.idle.notify_waiters();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_trigger_is_shared_and_idempotent() {
        let signal = ShutdownSignal::new();
        let other = signal.clone();
        assert!(!other.is_shutdown());

        signal.trigger();
        signal.trigger();
        assert!(other.is_shutdown());
    }

    #[test]
    fn test_recv_woken_by_trigger() {
        let signal = ShutdownSignal::new();
        let mut stopped = tokio_test::task::spawn(signal.recv());
        tokio_test::assert_pending!(stopped.poll());

        signal.trigger();
        assert!(stopped.is_woken());
        tokio_test::assert_ready!(stopped.poll());
    }

    #[test]
    fn test_recv_after_trigger_is_ready() {
        let signal = ShutdownSignal::new();
        signal.trigger();
        let mut stopped = tokio_test::task::spawn(signal.recv());
        tokio_test::assert_ready!(stopped.poll());
    }

    #[tokio::test]
    async fn test_recv_from_another_task() {
        let signal = ShutdownSignal::new();
        let stopped = tokio::spawn(signal.recv());

        tokio::time::sleep(Duration::from_millis(10)).await;
        signal.trigger();

        tokio::time::timeout(Duration::from_secs(1), stopped)
            .await
            .expect("recv should complete")
            .unwrap();
    }

    #[tokio::test]
    async fn test_recv_stays_pending_without_trigger() {
        let signal = ShutdownSignal::new();
        let result = tokio::time::timeout(Duration::from_millis(20), signal.recv()).await;
        assert!(result.is_err());
    }

    #[test]
    fn test_tracker_counts_tokens() {
        let tracker = ConnectionTracker::new();
        let first = tracker.acquire();
        let second = tracker.clone().acquire();
        assert_eq!(tracker.active_connections(), 2);

        drop(first);
        assert_eq!(tracker.active_connections(), 1);
        drop(second);
        assert_eq!(tracker.active_connections(), 0);
    }

    #[test]
    fn test_wait_for_shutdown_when_idle() {
        let tracker = ConnectionTracker::new();
        let mut idle = tokio_test::task::spawn(tracker.wait_for_shutdown());
        tokio_test::assert_ready!(idle.poll());
    }

    #[test]
    fn test_wait_for_shutdown_woken_by_last_token() {
        let tracker = ConnectionTracker::new();
        let first = tracker.acquire();
        let second = tracker.acquire();

        let mut idle = tokio_test::task::spawn(tracker.wait_for_shutdown());
        tokio_test::assert_pending!(idle.poll());

        drop(first);
        tokio_test::assert_pending!(idle.poll());

        drop(second);
        assert!(idle.is_woken());
        tokio_test::assert_ready!(idle.poll());
    }
}
