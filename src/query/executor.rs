//! Statement execution with bounded write-timeout retry.
//!
//! Three ways to run a statement:
//!
//! - [`StatementExecutor::execute`] waits for the outcome and retries write
//!   timeouts up to [`MAX_RETRIES`] times, immediately and without backoff.
//! - [`StatementExecutor::execute_async`] hands the statement to the client
//!   and returns its future untouched.
//! - [`StatementExecutor::fire_and_forget`] returns at once; a continuation on
//!   the executor's worker pool logs rejected statements and sends every
//!   other failure through the retrying path.

use std::sync::{Arc, Weak};
use std::time::Duration;

use tracing::{debug, error, warn};

use super::stats::{ExecutorStats, StatsSnapshot};
use super::worker::WorkerPool;
use crate::db::{ClusterClient, ResultSet, ResultSetFuture, Statement};
use crate::error::{PersistenceError, Result};

/// Number of retries after the first attempt times out.
pub const MAX_RETRIES: u32 = 3;

/// Runs statements against a shared cluster client.
///
/// Cloning is cheap and clones share the client, the worker pool and the
/// counters.
#[derive(Clone)]
pub struct StatementExecutor {
    inner: Arc<ExecutorInner>,
}

struct ExecutorInner {
    client: Arc<dyn ClusterClient>,
    pool: WorkerPool,
    stats: ExecutorStats,
}

impl StatementExecutor {
    /// Creates an executor bound to `client` with its own worker pool.
    pub fn new(client: Arc<dyn ClusterClient>) -> Self {
        Self {
            inner: Arc::new(ExecutorInner {
                client,
                pool: WorkerPool::new(),
                stats: ExecutorStats::new(),
            }),
        }
    }

    /// Executes `statement`, retrying write timeouts.
    ///
    /// Returns the first successful result. A validation failure or any
    /// other non-timeout failure is returned after one attempt. If every
    /// attempt times out the last timeout is wrapped in
    /// [`PersistenceError::RetryExhausted`].
    ///
    /// Retried statements are resubmitted verbatim, so conditional writes
    /// should be used for anything that must not be applied twice.
    pub async fn execute(&self, statement: &Statement) -> Result<ResultSet> {
        execute_with_retry(self.inner.client.as_ref(), statement, &self.inner.stats).await
    }

    /// Submits `statement` without waiting and without retry.
    pub fn execute_async(&self, statement: Statement) -> ResultSetFuture {
        Arc::clone(&self.inner.client).execute_async(Arc::new(statement))
    }

    /// Submits `statement` and returns immediately.
    ///
    /// The outcome is handled in the background: a rejected statement is
    /// logged and dropped, any other failure falls back to
    /// [`execute`](Self::execute). Nothing is reported to the caller. After
    /// [`shutdown`](Self::shutdown) the statement is logged and dropped.
    pub fn fire_and_forget(&self, statement: Statement) {
        let statement = Arc::new(statement);
        let inner = Arc::clone(&self.inner);
        let task_statement = Arc::clone(&statement);
        // Only a continuation the pool accepted submits the statement.
        let spawned = self.inner.pool.spawn(async move {
            let pending = Arc::clone(&inner.client).execute_async(Arc::clone(&task_statement));
            inner.handle_outcome(pending, &task_statement).await;
        });

        match spawned {
            Ok(()) => {
                self.inner.stats.record_submitted();
                self.inner.stats.record_attempt();
            }
            Err(e) => {
                error!(error = %e, statement = %statement, "Executor is shut down, dropping statement");
            }
        }
    }

    /// Stops accepting fire-and-forget statements and waits for the
    /// outstanding continuations, including their fallbacks.
    pub async fn shutdown(&self) {
        self.inner.pool.shutdown().await;
    }

    /// Like [`shutdown`](Self::shutdown), but gives up on continuations still
    /// running after `grace`. Returns true if all of them finished.
    pub async fn shutdown_timeout(&self, grace: Duration) -> bool {
        self.inner.pool.shutdown_timeout(grace).await
    }

    /// Number of fire-and-forget continuations not yet finished.
    pub fn pending(&self) -> usize {
        self.inner.pool.pending()
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.pool.is_closed()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.inner.stats.snapshot()
    }

    /// The client this executor runs statements on.
    pub fn client(&self) -> &Arc<dyn ClusterClient> {
        &self.inner.client
    }

    pub(crate) fn downgrade(&self) -> WeakExecutor {
        WeakExecutor(Arc::downgrade(&self.inner))
    }
}

/// A handle that does not keep the executor alive.
///
/// Continuations still running hold the executor, so an executor dropped by
/// every caller can be upgraded until its background work is done.
#[derive(Clone)]
pub(crate) struct WeakExecutor(Weak<ExecutorInner>);

impl WeakExecutor {
    pub(crate) fn upgrade(&self) -> Option<StatementExecutor> {
        self.0.upgrade().map(|inner| StatementExecutor { inner })
    }

    pub(crate) fn is_alive(&self) -> bool {
        self.0.strong_count() > 0
    }
}

impl std::fmt::Debug for StatementExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatementExecutor")
            .field("pending", &self.pending())
            .field("stats", &self.stats())
            .finish()
    }
}

impl ExecutorInner {
    async fn handle_outcome(&self, pending: ResultSetFuture, statement: &Statement) {
        let err = match pending.await {
            Ok(_) => {
                debug!(statement = %statement, "Background statement succeeded");
                return;
            }
            Err(e) => e,
        };

        if err.is_validation() {
            self.stats.record_dropped();
            error!(
                error = %err,
                statement = %statement,
                "Statement rejected by the cluster, not retrying"
            );
            return;
        }

        self.stats.record_fallback();
        warn!(
            error = %err,
            statement = %statement,
            "Asynchronous execution failed, falling back to synchronous execution"
        );
        if let Err(e) = execute_with_retry(self.client.as_ref(), statement, &self.stats).await {
            error!(error = %e, statement = %statement, "Fallback execution failed");
        }
    }
}

async fn execute_with_retry(
    client: &dyn ClusterClient,
    statement: &Statement,
    stats: &ExecutorStats,
) -> Result<ResultSet> {
    let mut attempt = 0;
    loop {
        attempt += 1;
        stats.record_attempt();

        let err = match client.execute(statement).await {
            Ok(result) => return Ok(result),
            Err(e) => e,
        };

        if !err.kind().is_retryable() {
            return Err(PersistenceError::Query(err));
        }

        if attempt > MAX_RETRIES {
            stats.record_exhausted();
            error!(
                attempts = attempt,
                statement = %statement,
                "Timeout problems when storing data"
            );
            return Err(PersistenceError::retry_exhausted(attempt, err));
        }

        stats.record_retry();
        let write_type = err.write_type().map_or("UNKNOWN", |w| w.as_str());
        warn!(attempt, "Storing data failed with {write_type} problems, will retry");
    }
}
