//! Background worker pool for fire-and-forget continuations.
//!
//! Every continuation is tracked so the pool can be drained on shutdown. The
//! pool grows with demand and never makes a continuation wait for another.
//! It is owned by one executor; nothing here is process-global.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, warn};

use crate::error::{PersistenceError, Result};

/// Tracked pool of background tasks.
#[derive(Debug, Default)]
pub struct WorkerPool {
    tracker: TaskTracker,
    cancel: CancellationToken,
}

impl WorkerPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `task` in the background.
    ///
    /// Must be called from within a Tokio runtime. Fails once the pool has
    /// been closed.
    pub fn spawn<F>(&self, task: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if self.tracker.is_closed() {
            return Err(PersistenceError::shutdown("worker pool is closed"));
        }

        let cancel = self.cancel.clone();
        self.tracker.spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {
                    warn!("Background statement abandoned during shutdown");
                }
                _ = task => {}
            }
        });
        Ok(())
    }

    /// Number of tasks that have not finished yet.
    pub fn pending(&self) -> usize {
        self.tracker.len()
    }

    pub fn is_closed(&self) -> bool {
        self.tracker.is_closed()
    }

    /// Stops accepting tasks and waits for the running ones to finish.
    pub async fn shutdown(&self) {
        self.tracker.close();
        debug!(pending = self.tracker.len(), "Draining worker pool");
        self.tracker.wait().await;
    }

    /// Like [`shutdown`](Self::shutdown), but abandons tasks still running
    /// after `grace`. Returns true if everything finished in time.
    pub async fn shutdown_timeout(&self, grace: Duration) -> bool {
        self.tracker.close();
        if tokio::time::timeout(grace, self.tracker.wait()).await.is_ok() {
            return true;
        }
        warn!(
            pending = self.tracker.len(),
            "Worker pool did not drain in time, cancelling remaining tasks"
        );
        self.cancel.cancel();
        self.tracker.wait().await;
        false
    }
}
