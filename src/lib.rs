//! resilient-cql - a resilient statement executor for quorum column stores.
//!
//! This library exposes the session facade, the executor and the cluster
//! client boundary; the `rcql` binary is a thin driver on top of it.

pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod query;
pub mod repository;
pub mod session;

pub use error::{PersistenceError, QueryError, Result};
pub use query::{StatementExecutor, MAX_RETRIES};
pub use session::Session;
