//! Statement execution for resilient-cql.
//!
//! This module isolates the retry policy and the fire-and-forget machinery
//! from the session facade.

pub mod executor;
pub mod stats;
pub mod worker;

pub use executor::{StatementExecutor, MAX_RETRIES};
pub(crate) use executor::WeakExecutor;
pub use stats::{ExecutorStats, StatsSnapshot};
pub use worker::WorkerPool;
