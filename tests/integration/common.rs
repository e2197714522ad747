//! Shared helpers: an in-memory cluster with the test table and a log
//! capture for asserting on warnings.

use std::io;
use std::sync::{Arc, Mutex};

use resilient_cql::db::{ClusterClient, Fault, FaultInjectingClient, MemoryCluster, Statement};
use tracing::subscriber::DefaultGuard;

pub const KEYSPACE: &str = "executortest";

/// Captured `tracing` output.
#[derive(Clone, Default)]
pub struct LogCapture(Arc<Mutex<Vec<u8>>>);

impl io::Write for LogCapture {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl LogCapture {
    /// Installs a capturing subscriber for the current thread.
    ///
    /// Only works with the current-thread runtime `#[tokio::test]` uses by
    /// default, since spawned tasks must run on the same thread.
    pub fn install() -> (Self, DefaultGuard) {
        let capture = Self::default();
        let writer = capture.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::DEBUG)
            .finish();
        (capture, tracing::subscriber::set_default(subscriber))
    }

    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }

    /// Number of lines at `level` containing `needle`.
    pub fn count(&self, level: &str, needle: &str) -> usize {
        self.contents()
            .lines()
            .filter(|line| line.contains(level) && line.contains(needle))
            .count()
    }
}

/// A cluster with `testtable1 (id int PRIMARY KEY, test text)`.
pub async fn cluster() -> Arc<MemoryCluster> {
    let memory = Arc::new(MemoryCluster::new().with_keyspace(KEYSPACE));
    memory
        .execute(&Statement::new(
            "CREATE TABLE testtable1 (id int PRIMARY KEY, test text)",
        ))
        .await
        .expect("create test table");
    memory
}

/// Wraps `memory` with a scripted fault queue.
pub fn with_faults(
    memory: &Arc<MemoryCluster>,
    faults: impl IntoIterator<Item = Fault>,
) -> Arc<FaultInjectingClient> {
    let inner: Arc<dyn ClusterClient> = memory.clone();
    Arc::new(FaultInjectingClient::new(inner).with_faults(faults))
}

pub fn insert(id: i64, text: &str) -> Statement {
    Statement::new("INSERT INTO testtable1 (id, test) VALUES (?, ?)")
        .with_values(vec![id.into(), text.into()])
}
