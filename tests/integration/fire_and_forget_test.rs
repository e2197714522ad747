//! Fire-and-forget submission and its background fallback.

use std::sync::Arc;
use std::time::{Duration, Instant};

use super::common::{cluster, insert, with_faults, LogCapture};
use pretty_assertions::assert_eq;
use resilient_cql::db::{ClusterClient, Fault, FaultInjectingClient, MemoryCluster, Statement};
use resilient_cql::StatementExecutor;

/// Polls `memory` until `table` holds `rows` rows or `limit` passes.
async fn wait_for_rows(
    memory: &MemoryCluster,
    table: &str,
    rows: usize,
    limit: Duration,
) -> bool {
    let deadline = Instant::now() + limit;
    while Instant::now() < deadline {
        if memory.row_count(table) == Some(rows) {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    memory.row_count(table) == Some(rows)
}

#[tokio::test]
async fn test_returns_before_outcome_is_known() {
    let memory = Arc::new(MemoryCluster::new().with_latency(Duration::from_millis(200)));
    memory
        .execute(&Statement::new(
            "CREATE TABLE testtable1 (id int PRIMARY KEY, test text)",
        ))
        .await
        .unwrap();
    let inner: Arc<dyn ClusterClient> = memory.clone();
    let executor = StatementExecutor::new(inner);

    let started = Instant::now();
    executor.fire_and_forget(insert(1, "slow"));

    assert!(started.elapsed() < Duration::from_millis(100));
    assert_eq!(memory.row_count("testtable1"), Some(0));
    assert_eq!(executor.pending(), 1);

    executor.shutdown().await;
    assert_eq!(memory.row_count("testtable1"), Some(1));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_timed_out_statement_is_eventually_applied() {
    let memory = cluster().await;
    let client = with_faults(&memory, [Fault::timeout()]);
    let executor = StatementExecutor::new(client.clone());

    executor.fire_and_forget(insert(42, "eventually"));

    assert!(wait_for_rows(&memory, "testtable1", 1, Duration::from_secs(2)).await);
    assert_eq!(client.calls(), 2);
    executor.shutdown().await;
    assert_eq!(executor.stats().fallbacks, 1);
}

#[tokio::test]
async fn test_fallback_retries_until_exhausted() {
    let (logs, _guard) = LogCapture::install();
    let memory = cluster().await;
    let inner: Arc<dyn ClusterClient> = memory.clone();
    let client = Arc::new(FaultInjectingClient::new(inner).always(Fault::timeout()));
    let executor = StatementExecutor::new(client.clone());

    executor.fire_and_forget(insert(1, "doomed"));
    executor.shutdown().await;

    // One async attempt, then a full synchronous retry cycle.
    assert_eq!(client.calls(), 1 + 4);
    assert_eq!(logs.count("WARN", "falling back to synchronous execution"), 1);
    assert_eq!(logs.count("ERROR", "Fallback execution failed"), 1);
    assert_eq!(executor.stats().retries_exhausted, 1);
}

#[tokio::test]
async fn test_validation_failure_is_never_retried() {
    let (logs, _guard) = LogCapture::install();
    let memory = cluster().await;
    let client = with_faults(&memory, [Fault::Invalid("unconfigured table".to_string())]);
    let executor = StatementExecutor::new(client.clone());

    executor.fire_and_forget(insert(1, "rejected"));
    executor.shutdown().await;

    assert_eq!(client.calls(), 1);
    assert_eq!(memory.row_count("testtable1"), Some(0));
    assert_eq!(logs.count("ERROR", "not retrying"), 1);
    assert_eq!(logs.count("WARN", "falling back"), 0);
}

#[tokio::test]
async fn test_other_failures_fall_back() {
    let memory = cluster().await;
    let client = with_faults(&memory, [Fault::Unavailable]);
    let executor = StatementExecutor::new(client.clone());

    executor.fire_and_forget(insert(3, "after unavailable"));
    executor.shutdown().await;

    assert_eq!(client.calls(), 2);
    assert_eq!(memory.row_count("testtable1"), Some(1));
}

#[tokio::test]
async fn test_many_submissions_share_one_pool() {
    let memory = cluster().await;
    // At most MAX_RETRIES timeouts in total, so no fallback can exhaust its
    // retries however the background tasks interleave.
    let client = with_faults(&memory, (0..3).map(|_| Fault::timeout()));
    let executor = StatementExecutor::new(client.clone());

    for id in 0..20 {
        executor.fire_and_forget(insert(id, "bulk"));
    }
    executor.shutdown().await;

    assert_eq!(memory.row_count("testtable1"), Some(20));
    let stats = executor.stats();
    assert_eq!(stats.fire_and_forget_submitted, 20);
    assert!((1..=3).contains(&stats.fallbacks));
    assert_eq!(stats.retries_exhausted, 0);
    assert_eq!(client.calls(), 23);
}

#[tokio::test]
async fn test_statement_after_shutdown_is_dropped() {
    let (logs, _guard) = LogCapture::install();
    let memory = cluster().await;
    let client = with_faults(&memory, []);
    let executor = StatementExecutor::new(client.clone());

    executor.shutdown().await;
    executor.fire_and_forget(insert(1, "too late"));

    assert_eq!(client.calls(), 0);
    assert_eq!(logs.count("ERROR", "dropping statement"), 1);
}

#[tokio::test]
async fn test_shutdown_timeout_abandons_slow_fallbacks() {
    let memory = cluster().await;
    let client = with_faults(
        &memory,
        [Fault::timeout(), Fault::Delay(Duration::from_secs(30))],
    );
    let executor = StatementExecutor::new(client.clone());

    executor.fire_and_forget(insert(1, "stuck"));

    let drained = executor.shutdown_timeout(Duration::from_millis(50)).await;
    assert!(!drained);
    assert_eq!(executor.pending(), 0);
    assert_eq!(memory.row_count("testtable1"), Some(0));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_every_accepted_statement_is_handled_across_shutdown() {
    let memory = cluster().await;
    let inner: Arc<dyn ClusterClient> = memory.clone();
    let client = Arc::new(FaultInjectingClient::new(inner).always(Fault::Unavailable));
    let executor = StatementExecutor::new(client.clone());

    let submitter = {
        let executor = executor.clone();
        tokio::spawn(async move {
            for id in 0..500 {
                executor.fire_and_forget(insert(id, "racing"));
                tokio::task::yield_now().await;
            }
        })
    };
    tokio::time::sleep(Duration::from_millis(1)).await;
    executor.shutdown().await;
    submitter.await.unwrap();
    executor.shutdown().await;

    // Each accepted statement made its async attempt and then its fallback.
    let stats = executor.stats();
    assert_eq!(stats.fallbacks, stats.fire_and_forget_submitted);
    assert_eq!(client.calls() as u64, 2 * stats.fire_and_forget_submitted);
}
