//! Shutdown of a group of connection tasks.
//!
//! One root token fans out to every connection; a [`TaskTracker`] counts the
//! tasks still running so shutdown can wait for them to drain.

use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{info, warn};

/// Owns the root cancellation token and the set of tracked tasks.
#[derive(Clone, Default)]
pub struct ShutdownCoordinator {
    token: CancellationToken,
    tracker: TaskTracker,
}

impl ShutdownCoordinator {
    /// Create a coordinator with a fresh root token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a coordinator that also shuts down when `parent` is cancelled.
    pub fn child_of(parent: &CancellationToken) -> Self {
        Self {
            token: parent.child_token(),
            tracker: TaskTracker::new(),
        }
    }

    /// A clone of the root token.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Cancel the root token. Idempotent.
    pub fn shutdown(&self) {
        self.token.cancel();
    }

    /// Whether shutdown has begun.
    pub fn is_shutting_down(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Spawn a task that counts toward [`graceful_shutdown`](Self::graceful_shutdown).
    pub fn spawn<F>(&self, task: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.tracker.spawn(task)
    }

    /// Tracked tasks still running.
    pub fn active(&self) -> usize {
        self.tracker.len()
    }

    /// Cancel everything and wait up to `timeout` for tracked tasks to finish.
    ///
    /// Returns `true` if every task finished in time. Tasks that overrun are
    /// left running; their tokens are already cancelled.
    pub async fn graceful_shutdown(&self, timeout: Duration) -> bool {
        self.shutdown();
        let _ = self.tracker.close();
        info!(
            task_count = self.tracker.len(),
            timeout_secs = timeout.as_secs(),
            "waiting for connections to drain"
        );

        if tokio::time::timeout(timeout, self.tracker.wait()).await.is_err() {
            warn!(
                remaining = self.tracker.len(),
                "shutdown timed out after {timeout:?}"
            );
            return false;
        }
        true
    }
}
