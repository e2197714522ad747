//! Fault-injecting cluster client.
//!
//! Wraps another client and replays a script of failures, one per call to
//! `execute`, before passing statements through. Used to reproduce write
//! timeouts (including the ambiguous "timed out but applied" case) without a
//! real cluster under pressure.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::debug;

use super::{
    ClusterClient, Codec, CodecRegistry, DataType, PreparedStatement, ResultSet, Statement,
    TupleType, WriteType,
};
use crate::error::QueryError;

/// A failure injected into one `execute` call.
#[derive(Debug, Clone, PartialEq)]
pub enum Fault {
    /// Report a write timeout. With `applied`, the statement is run on the
    /// inner client first, so the write lands even though the caller is told
    /// it timed out.
    WriteTimeout { write_type: WriteType, applied: bool },
    /// Reject the statement as invalid.
    Invalid(String),
    /// Report too few live replicas.
    Unavailable,
    /// Report a generic execution failure.
    Execution(String),
    /// Wait before passing the statement through.
    Delay(Duration),
}

impl Fault {
    /// A write timeout on a statement that was not applied.
    pub fn timeout() -> Self {
        Self::WriteTimeout {
            write_type: WriteType::Simple,
            applied: false,
        }
    }

    /// A write timeout on a conditional write that was applied anyway.
    pub fn timeout_but_applied() -> Self {
        Self::WriteTimeout {
            write_type: WriteType::Cas,
            applied: true,
        }
    }
}

#[derive(Debug, Default)]
struct FaultPlan {
    script: VecDeque<Fault>,
    repeat: Option<Fault>,
}

/// A client that injects scripted faults in front of another client.
pub struct FaultInjectingClient {
    inner: Arc<dyn ClusterClient>,
    plan: Mutex<FaultPlan>,
    calls: AtomicUsize,
}

impl FaultInjectingClient {
    /// Wraps `inner` with an empty fault script.
    pub fn new(inner: Arc<dyn ClusterClient>) -> Self {
        Self {
            inner,
            plan: Mutex::new(FaultPlan::default()),
            calls: AtomicUsize::new(0),
        }
    }

    /// Queues faults for the next calls, in order.
    pub fn with_faults(self, faults: impl IntoIterator<Item = Fault>) -> Self {
        self.plan.lock().script.extend(faults);
        self
    }

    /// Injects `fault` into every call once the script is used up.
    pub fn always(self, fault: Fault) -> Self {
        self.plan.lock().repeat = Some(fault);
        self
    }

    /// Queues one more fault.
    pub fn push_fault(&self, fault: Fault) {
        self.plan.lock().script.push_back(fault);
    }

    /// Number of `execute` calls seen so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn next_fault(&self) -> Option<Fault> {
        let mut plan = self.plan.lock();
        plan.script.pop_front().or_else(|| plan.repeat.clone())
    }
}

#[async_trait]
impl ClusterClient for FaultInjectingClient {
    async fn execute(&self, statement: &Statement) -> Result<ResultSet, QueryError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        let Some(fault) = self.next_fault() else {
            return self.inner.execute(statement).await;
        };
        debug!(call, ?fault, "Injecting fault");

        match fault {
            Fault::WriteTimeout {
                write_type,
                applied,
            } => {
                if applied {
                    // The outcome is discarded: the caller only sees the timeout.
                    let _ = self.inner.execute(statement).await;
                }
                Err(QueryError::write_timeout(
                    write_type,
                    statement
                        .serial_consistency()
                        .filter(|_| write_type == WriteType::Cas)
                        .unwrap_or(statement.consistency()),
                ))
            }
            Fault::Invalid(msg) => Err(QueryError::invalid(msg)),
            Fault::Unavailable => {
                let consistency = statement.consistency();
                Err(QueryError::Unavailable {
                    consistency,
                    required: consistency.required_replicas(),
                    alive: 0,
                })
            }
            Fault::Execution(msg) => Err(QueryError::execution(msg)),
            Fault::Delay(delay) => {
                tokio::time::sleep(delay).await;
                self.inner.execute(statement).await
            }
        }
    }

    async fn prepare(&self, query: &str) -> Result<PreparedStatement, QueryError> {
        self.inner.prepare(query).await
    }

    fn register_codec(&self, codec: Arc<dyn Codec>) {
        self.inner.register_codec(codec);
    }

    fn codecs(&self) -> CodecRegistry {
        self.inner.codecs()
    }

    fn new_tuple_type(&self, components: Vec<DataType>) -> TupleType {
        self.inner.new_tuple_type(components)
    }

    async fn close(&self) -> Result<(), QueryError> {
        self.inner.close().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryCluster;

    async fn setup() -> (Arc<MemoryCluster>, FaultInjectingClient) {
        let memory = Arc::new(MemoryCluster::new());
        memory
            .execute(&Statement::new("CREATE TABLE t (id int PRIMARY KEY)"))
            .await
            .unwrap();
        let inner: Arc<dyn ClusterClient> = memory.clone();
        (memory, FaultInjectingClient::new(inner))
    }

    #[tokio::test]
    async fn test_script_is_consumed_in_order() {
        let (_memory, client) = setup().await;
        let client = client.with_faults([Fault::timeout(), Fault::Invalid("bad".to_string())]);
        let stmt = Statement::new("INSERT INTO t (id) VALUES (1)");

        let first = client.execute(&stmt).await.unwrap_err();
        assert_eq!(first.write_type(), Some(WriteType::Simple));
        assert!(client.execute(&stmt).await.unwrap_err().is_validation());
        assert!(client.execute(&stmt).await.is_ok());
        assert_eq!(client.calls(), 3);
    }

    #[tokio::test]
    async fn test_timeout_but_applied_writes_through() {
        let (memory, client) = setup().await;
        let client = client.with_faults([Fault::timeout_but_applied()]);
        let stmt = Statement::new("INSERT INTO t (id) VALUES (1) IF NOT EXISTS")
            .with_serial_consistency(crate::db::Consistency::Serial);

        let err = client.execute(&stmt).await.unwrap_err();
        assert_eq!(err.write_type(), Some(WriteType::Cas));
        assert!(err.to_string().contains("SERIAL"));
        assert_eq!(memory.row_count("t"), Some(1));
    }

    #[tokio::test]
    async fn test_always_repeats_after_script() {
        let (_memory, client) = setup().await;
        let client = client.always(Fault::Unavailable);
        let stmt = Statement::new("INSERT INTO t (id) VALUES (2)");

        for _ in 0..3 {
            let err = client.execute(&stmt).await.unwrap_err();
            assert!(matches!(err, QueryError::Unavailable { .. }));
        }
        assert_eq!(client.calls(), 3);
    }
}
