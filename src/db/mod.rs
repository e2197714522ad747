//! Cluster client abstraction for resilient-cql.
//!
//! Provides a trait-based interface to the underlying column store, so the
//! executor can run against a real driver adapter, the in-memory cluster or a
//! fault-injecting wrapper interchangeably.

mod codec;
mod fault;
mod memory;
mod parser;
mod statement;
mod types;

pub use codec::{temporal_codecs, Codec, CodecRegistry, DataType, SimpleCodec, TupleType};
pub use fault::{Fault, FaultInjectingClient};
pub use memory::MemoryCluster;
pub use statement::{Consistency, PreparedStatement, Statement, WriteType};
pub use types::{ColumnInfo, ResultSet, Row, Value, APPLIED_COLUMN};

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;

use crate::config::SessionConfig;
use crate::error::{QueryError, Result};

/// Supported cluster backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClusterBackend {
    /// In-process cluster, used for tests and local runs.
    #[default]
    Memory,
}

impl ClusterBackend {
    /// Returns the backend as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Memory => "memory",
        }
    }

    /// Parses a backend from a string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "memory" | "in-memory" => Some(Self::Memory),
            _ => None,
        }
    }
}

/// Creates a cluster client for the backend named in the configuration.
///
/// This is the central factory function for cluster connections.
pub async fn connect(config: &SessionConfig) -> Result<Arc<dyn ClusterClient>> {
    match config.backend {
        ClusterBackend::Memory => {
            let client = MemoryCluster::connect(config)?;
            Ok(Arc::new(client))
        }
    }
}

/// Trait defining the interface of the shared cluster connection.
///
/// Implementations must be safe for concurrent use by every executor and
/// caller; the executor adds no locking of its own.
#[async_trait]
pub trait ClusterClient: Send + Sync + 'static {
    /// Executes a statement and waits for the coordinator's response.
    async fn execute(&self, statement: &Statement) -> std::result::Result<ResultSet, QueryError>;

    /// Submits a statement on the client's own I/O tasks.
    ///
    /// The returned future resolves independently of whether anyone polls it.
    fn execute_async(self: Arc<Self>, statement: Arc<Statement>) -> ResultSetFuture {
        ResultSetFuture::spawn(async move { self.execute(&statement).await })
    }

    /// Prepares a query for repeated binding.
    async fn prepare(&self, query: &str) -> std::result::Result<PreparedStatement, QueryError>;

    /// Registers a codec with the client's codec registry.
    fn register_codec(&self, codec: Arc<dyn Codec>);

    /// Returns a snapshot of the codec registry.
    fn codecs(&self) -> CodecRegistry;

    /// Creates a tuple type through the cluster metadata.
    fn new_tuple_type(&self, components: Vec<DataType>) -> TupleType {
        TupleType::new(components)
    }

    /// Closes the connection.
    async fn close(&self) -> std::result::Result<(), QueryError>;
}

/// Handle to a statement running on the client's I/O tasks.
///
/// Dropping the handle does not cancel the statement.
#[derive(Debug)]
pub struct ResultSetFuture {
    handle: JoinHandle<std::result::Result<ResultSet, QueryError>>,
}

impl ResultSetFuture {
    /// Spawns `fut` on the current runtime.
    pub fn spawn<F>(fut: F) -> Self
    where
        F: Future<Output = std::result::Result<ResultSet, QueryError>> + Send + 'static,
    {
        Self {
            handle: tokio::spawn(fut),
        }
    }
}

impl Future for ResultSetFuture {
    type Output = std::result::Result<ResultSet, QueryError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.handle).poll(cx).map(|joined| match joined {
            Ok(outcome) => outcome,
            Err(e) => Err(QueryError::execution(format!(
                "Statement task did not complete: {e}"
            ))),
        })
    }
}
