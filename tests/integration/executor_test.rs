//! Synchronous and async execution against a misbehaving cluster.

use super::common::{cluster, insert, with_faults, LogCapture};
use pretty_assertions::assert_eq;
use resilient_cql::db::{ClusterClient, Consistency, Fault, Statement, Value, WriteType};
use resilient_cql::{QueryError, StatementExecutor, MAX_RETRIES};
use tokio_test::{assert_err, assert_ok};

#[tokio::test]
async fn test_first_attempt_success_makes_one_call() {
    let (logs, _guard) = LogCapture::install();
    let memory = cluster().await;
    let client = with_faults(&memory, []);
    let executor = StatementExecutor::new(client.clone());

    assert_ok!(executor.execute(&insert(1, "test")).await);

    assert_eq!(client.calls(), 1);
    assert_eq!(logs.count("WARN", "will retry"), 0);
}

#[tokio::test]
async fn test_two_timeouts_then_success_on_third_attempt() {
    let (logs, _guard) = LogCapture::install();
    let memory = cluster().await;
    memory
        .execute(&Statement::new("CREATE TABLE t (id int PRIMARY KEY)"))
        .await
        .unwrap();
    let client = with_faults(&memory, [Fault::timeout(), Fault::timeout()]);
    let executor = StatementExecutor::new(client.clone());

    let result = executor
        .execute(&Statement::new("INSERT INTO t(id) VALUES (1)"))
        .await;

    assert_ok!(result);
    assert_eq!(client.calls(), 3);
    assert_eq!(logs.count("WARN", "Storing data failed with SIMPLE problems"), 2);
    assert_eq!(memory.row_count("t"), Some(1));
}

#[tokio::test]
async fn test_timeouts_until_last_attempt_still_succeed() {
    let memory = cluster().await;
    let faults = (0..MAX_RETRIES).map(|_| Fault::timeout());
    let client = with_faults(&memory, faults);
    let executor = StatementExecutor::new(client.clone());

    assert_ok!(executor.execute(&insert(1, "late")).await);
    assert_eq!(client.calls(), (MAX_RETRIES + 1) as usize);
}

#[tokio::test]
async fn test_persistent_timeout_gives_up() {
    let (logs, _guard) = LogCapture::install();
    let memory = cluster().await;
    let faults = (0..=MAX_RETRIES + 2).map(|_| Fault::timeout());
    let client = with_faults(&memory, faults);
    let executor = StatementExecutor::new(client.clone());

    let err = assert_err!(executor.execute(&insert(1, "never")).await);

    assert_eq!(client.calls(), (MAX_RETRIES + 1) as usize);
    assert!(err.is_retry_exhausted());
    assert_eq!(err.category(), "Retry Exhausted");
    assert!(matches!(err.cause(), Some(QueryError::WriteTimeout { .. })));
    assert!(err.to_string().starts_with("Timeout problems when storing data"));
    assert_eq!(logs.count("WARN", "will retry"), MAX_RETRIES as usize);
    assert_eq!(logs.count("ERROR", "Timeout problems when storing data"), 1);
    assert_eq!(memory.row_count("testtable1"), Some(0));
}

#[tokio::test]
async fn test_validation_failure_after_one_call() {
    let memory = cluster().await;
    let client = with_faults(&memory, []);
    let executor = StatementExecutor::new(client.clone());
    let stmt = Statement::new("INSERT INTO testtable1 (id, test) VALUES (?, ?)")
        .with_values(vec![Value::Int(1), Value::Int(666)]);

    let err = assert_err!(executor.execute(&stmt).await);

    assert_eq!(client.calls(), 1);
    let cause = err.cause().expect("wrapped client error");
    assert!(cause.is_validation());
    assert!(cause.to_string().contains("\"test\""));
}

#[tokio::test]
async fn test_execution_failure_is_not_retried() {
    let memory = cluster().await;
    let client = with_faults(&memory, [Fault::Execution("read timed out".to_string())]);
    let executor = StatementExecutor::new(client.clone());

    let err = assert_err!(executor.execute(&insert(1, "x")).await);

    assert_eq!(client.calls(), 1);
    assert!(!err.is_retry_exhausted());
    assert_eq!(err.category(), "Execution Error");
}

#[tokio::test]
async fn test_cas_retry_applies_at_most_once() {
    let memory = cluster().await;
    let client = with_faults(
        &memory,
        [Fault::timeout_but_applied(), Fault::timeout_but_applied()],
    );
    let executor = StatementExecutor::new(client.clone());
    let stmt = Statement::new("INSERT INTO testtable1 (id, test) VALUES (?, ?) IF NOT EXISTS")
        .with_values(vec![Value::Int(9), Value::from("cas")])
        .with_serial_consistency(Consistency::Serial);
    let before = memory.mutation_count();

    let first = assert_ok!(executor.execute(&stmt).await);
    let second = assert_ok!(executor.execute(&stmt).await);

    assert!(!first.was_applied());
    assert!(!second.was_applied());
    assert_eq!(memory.mutation_count() - before, 1);
    assert_eq!(memory.row_count("testtable1"), Some(1));
}

#[tokio::test]
async fn test_execute_async_returns_raw_client_outcome() {
    let memory = cluster().await;
    let client = with_faults(
        &memory,
        [Fault::WriteTimeout {
            write_type: WriteType::Batch,
            applied: false,
        }],
    );
    let executor = StatementExecutor::new(client.clone());

    let err = assert_err!(executor.execute_async(insert(1, "a")).await);
    assert_eq!(err.write_type(), Some(WriteType::Batch));

    let ok = executor.execute_async(insert(2, "b")).await;
    assert_ok!(ok);
    assert_eq!(client.calls(), 2);
    assert_eq!(executor.stats().timeouts_retried, 0);
}

#[tokio::test]
async fn test_concurrent_callers_share_one_client() {
    let memory = cluster().await;
    let client = with_faults(&memory, [Fault::timeout(), Fault::timeout()]);
    let executor = StatementExecutor::new(client.clone());

    let calls = (0..10).map(|id| {
        let executor = executor.clone();
        async move { executor.execute(&insert(id, "parallel")).await }
    });
    let results = futures::future::join_all(calls).await;

    assert!(results.iter().all(|r| r.is_ok()));
    assert_eq!(client.calls(), 12);
    assert_eq!(memory.row_count("testtable1"), Some(10));
    assert_eq!(executor.stats().attempts, 12);
}

#[tokio::test]
async fn test_unbound_marker_after_commented_quote_is_rejected() {
    let memory = cluster().await;
    memory
        .execute(&Statement::new("CREATE TABLE t (id int PRIMARY KEY)"))
        .await
        .unwrap();
    let client = with_faults(&memory, []);
    let executor = StatementExecutor::new(client.clone());
    let query = "/* it's */ INSERT INTO t (id) VALUES (?)";

    let joined = tokio::spawn({
        let executor = executor.clone();
        async move { executor.execute(&Statement::new(query)).await }
    })
    .await;

    let err = assert_err!(joined.expect("execution must not panic"));
    assert!(err.cause().is_some_and(|e| e.is_validation()));
    assert_eq!(client.calls(), 1);

    assert_ok!(
        executor
            .execute(&Statement::new(query).with_values(vec![Value::Int(1)]))
            .await
    );
    assert_eq!(memory.row_count("t"), Some(1));
}
