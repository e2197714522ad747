//! The long-lived session shared by every executor.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use super::SchemaDefinition;
use crate::config::SessionConfig;
use crate::db::{
    self, temporal_codecs, ClusterClient, Codec, DataType, PreparedStatement, Statement, TupleType,
};
use crate::error::{PersistenceError, Result};
use crate::query::{StatementExecutor, WeakExecutor};

/// Owns the cluster client and hands out executors bound to it.
pub struct Session {
    config: SessionConfig,
    client: Arc<dyn ClusterClient>,
    executors: Mutex<Vec<WeakExecutor>>,
    closed: AtomicBool,
}

impl Session {
    /// Validates `config`, connects and bootstraps the keyspace if configured.
    pub async fn open(config: SessionConfig) -> Result<Self> {
        config.validate()?;
        let client = db::connect(&config).await?;
        Self::with_client(config, client).await
    }

    /// Builds a session on an existing client.
    ///
    /// The session takes over the client: if bootstrapping fails the client
    /// is closed before the error is returned.
    pub async fn with_client(
        config: SessionConfig,
        client: Arc<dyn ClusterClient>,
    ) -> Result<Self> {
        config.validate()?;
        for codec in temporal_codecs() {
            client.register_codec(codec);
        }

        let session = Self {
            config,
            client,
            executors: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        };

        if let Some(bootstrap) = session.config.bootstrap.clone() {
            let user = bootstrap
                .credentials
                .as_ref()
                .or(session.config.credentials.as_ref())
                .map(|c| c.username.clone());
            info!(
                keyspace = %session.config.keyspace,
                user = user.as_deref().unwrap_or("anonymous"),
                "Bootstrapping keyspace"
            );
            let create = Statement::new(session.config.create_keyspace_cql());
            if let Err(e) = session.run_bootstrap(&create, &bootstrap).await {
                if let Err(close_err) = session.client.close().await {
                    warn!(error = %close_err, "Closing the client after a failed bootstrap failed");
                }
                return Err(e);
            }
        }

        info!(session = %session.config.display_string(), "Session created");
        Ok(session)
    }

    async fn run_bootstrap(
        &self,
        create: &Statement,
        schema: &dyn SchemaDefinition,
    ) -> Result<()> {
        let executor = StatementExecutor::new(Arc::clone(&self.client));
        let outcome = async {
            executor.execute(create).await?;
            Self::run_schema(&executor, schema).await
        }
        .await;
        executor.shutdown().await;
        outcome
    }

    async fn run_schema(
        executor: &StatementExecutor,
        schema: &dyn SchemaDefinition,
    ) -> Result<()> {
        for statement in schema.statements() {
            debug!(schema = schema.name(), statement = %statement, "Applying schema statement");
            if let Err(e) = executor.execute(&statement).await {
                error!(schema = schema.name(), error = %e, "Schema bootstrap failed");
                return Err(e);
            }
        }
        Ok(())
    }

    /// Runs the statements of `schema` through the retrying executor.
    pub async fn apply_schema(&self, schema: &dyn SchemaDefinition) -> Result<()> {
        self.ensure_open()?;
        let executor = StatementExecutor::new(Arc::clone(&self.client));
        let outcome = Self::run_schema(&executor, schema).await;
        executor.shutdown().await;
        outcome
    }

    /// Prepares `query` with the session's default consistency.
    pub async fn prepare(&self, query: &str) -> Result<PreparedStatement> {
        self.ensure_open()?;
        let prepared = self.client.prepare(query).await?;
        debug!(id = %prepared.id(), markers = prepared.markers(), "Prepared statement");
        Ok(prepared.with_consistency(self.config.default_consistency))
    }

    /// Builds a statement carrying the session's default consistency.
    pub fn statement(&self, query: impl Into<String>) -> Statement {
        Statement::new(query).with_consistency(self.config.default_consistency)
    }

    /// Creates a new executor on the shared client with its own worker pool.
    ///
    /// The session shuts the executor down when it is closed, but does not
    /// keep it alive: an executor dropped by its callers is forgotten once its
    /// background work is done.
    pub fn executor(&self) -> Result<StatementExecutor> {
        self.ensure_open()?;
        let executor = StatementExecutor::new(Arc::clone(&self.client));
        let mut executors = self.executors.lock();
        executors.retain(WeakExecutor::is_alive);
        executors.push(executor.downgrade());
        Ok(executor)
    }

    /// Registers a codec with the client.
    pub fn register_codec(&self, codec: Arc<dyn Codec>) {
        self.client.register_codec(codec);
    }

    /// Creates a two-component tuple type.
    pub fn create_tuple_type(&self, first: DataType, second: DataType) -> TupleType {
        self.client.new_tuple_type(vec![first, second])
    }

    pub fn client(&self) -> &Arc<dyn ClusterClient> {
        &self.client
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Shuts down every executor handed out, then closes the client.
    ///
    /// Closing twice is a no-op.
    pub async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let executors = std::mem::take(&mut *self.executors.lock());
        for executor in executors.iter().filter_map(WeakExecutor::upgrade) {
            executor.shutdown().await;
        }
        self.client.close().await?;
        info!(keyspace = %self.config.keyspace, "Session closed");
        Ok(())
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(PersistenceError::shutdown("session is closed"));
        }
        Ok(())
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("session", &self.config.display_string())
            .field("closed", &self.is_closed())
            .finish()
    }
}
