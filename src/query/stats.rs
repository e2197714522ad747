//! Executor counters.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Running counters for one executor.
#[derive(Debug, Default)]
pub struct ExecutorStats {
    attempts: AtomicU64,
    timeouts_retried: AtomicU64,
    retries_exhausted: AtomicU64,
    fire_and_forget_submitted: AtomicU64,
    fallbacks: AtomicU64,
    dropped_after_validation: AtomicU64,
}

/// Point-in-time copy of [`ExecutorStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    /// Client executions started by the executor.
    pub attempts: u64,
    /// Write timeouts that led to another attempt.
    pub timeouts_retried: u64,
    /// Statements that failed with every attempt timing out.
    pub retries_exhausted: u64,
    pub fire_and_forget_submitted: u64,
    /// Fire-and-forget statements that fell back to the retrying path.
    pub fallbacks: u64,
    /// Fire-and-forget statements rejected by the cluster and dropped.
    pub dropped_after_validation: u64,
}

impl ExecutorStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_attempt(&self) {
        self.attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_retry(&self) {
        self.timeouts_retried.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_exhausted(&self) {
        self.retries_exhausted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_submitted(&self) {
        self.fire_and_forget_submitted
            .fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_fallback(&self) {
        self.fallbacks.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_dropped(&self) {
        self.dropped_after_validation
            .fetch_add(1, Ordering::Relaxed);
    }

    /// Reads every counter.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            attempts: self.attempts.load(Ordering::Relaxed),
            timeouts_retried: self.timeouts_retried.load(Ordering::Relaxed),
            retries_exhausted: self.retries_exhausted.load(Ordering::Relaxed),
            fire_and_forget_submitted: self.fire_and_forget_submitted.load(Ordering::Relaxed),
            fallbacks: self.fallbacks.load(Ordering::Relaxed),
            dropped_after_validation: self.dropped_after_validation.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_reflects_records() {
        let stats = ExecutorStats::new();
        stats.record_attempt();
        stats.record_attempt();
        stats.record_retry();
        stats.record_submitted();
        stats.record_dropped();

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.attempts, 2);
        assert_eq!(snapshot.timeouts_retried, 1);
        assert_eq!(snapshot.fire_and_forget_submitted, 1);
        assert_eq!(snapshot.dropped_after_validation, 1);
        assert_eq!(snapshot.fallbacks, 0);
        assert_eq!(snapshot.retries_exhausted, 0);
    }

    #[test]
    fn test_snapshot_serializes() {
        let json = serde_json::to_value(StatsSnapshot::default()).unwrap();
        assert_eq!(json["timeouts_retried"], 0);
    }
}
