//! Error types for resilient-cql.
//!
//! Two layers of errors live here: [`QueryError`] describes what the cluster
//! client reported for a single attempt, and [`PersistenceError`] is the fatal
//! error surfaced to callers of the executor and the session facade.

use thiserror::Error;

use crate::db::{Consistency, WriteType};

/// How a client failure is treated by the executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The statement itself is malformed or not allowed. Never retried.
    Validation,
    /// The store could not confirm a write in time. Retried up to the bound.
    Timeout,
    /// Any other execution failure. Never retried.
    OtherExecution,
}

impl FailureKind {
    /// Whether the synchronous path retries failures of this kind.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout)
    }
}

/// A failure reported by the cluster client for one execution attempt.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum QueryError {
    /// The statement could not be parsed.
    #[error("Syntax error: {0}")]
    Syntax(String),

    /// The statement parsed but is semantically invalid (unknown table, bad types, ...).
    #[error("Invalid query: {0}")]
    Invalid(String),

    /// The credentials in use may not run the statement.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// The coordinator did not get enough write acknowledgements in time.
    ///
    /// The write may or may not have been applied.
    #[error(
        "Write timeout during {write_type} write at consistency {consistency} \
         ({received} of {required} replicas acknowledged)"
    )]
    WriteTimeout {
        write_type: WriteType,
        consistency: Consistency,
        received: u32,
        required: u32,
    },

    /// The coordinator did not get enough read responses in time.
    #[error(
        "Read timeout at consistency {consistency} ({received} of {required} replicas responded)"
    )]
    ReadTimeout {
        consistency: Consistency,
        received: u32,
        required: u32,
    },

    /// Not enough replicas were alive to attempt the statement.
    #[error("Not enough replicas available at consistency {consistency} ({alive} of {required} alive)")]
    Unavailable {
        consistency: Consistency,
        required: u32,
        alive: u32,
    },

    /// Any other failure while executing the statement.
    #[error("Execution error: {0}")]
    Execution(String),
}

impl QueryError {
    /// Creates a syntax error with the given message.
    pub fn syntax(msg: impl Into<String>) -> Self {
        Self::Syntax(msg.into())
    }

    /// Creates an invalid-query error with the given message.
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::Invalid(msg.into())
    }

    /// Creates a generic execution error with the given message.
    pub fn execution(msg: impl Into<String>) -> Self {
        Self::Execution(msg.into())
    }

    /// Creates a write timeout for the given write type at `consistency`.
    pub fn write_timeout(write_type: WriteType, consistency: Consistency) -> Self {
        let required = consistency.required_replicas();
        Self::WriteTimeout {
            write_type,
            consistency,
            received: required.saturating_sub(1),
            required,
        }
    }

    /// Classifies this failure for retry purposes.
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Syntax(_) | Self::Invalid(_) | Self::Unauthorized(_) => FailureKind::Validation,
            Self::WriteTimeout { .. } => FailureKind::Timeout,
            Self::ReadTimeout { .. } | Self::Unavailable { .. } | Self::Execution(_) => {
                FailureKind::OtherExecution
            }
        }
    }

    /// Returns true if the statement itself was rejected.
    pub fn is_validation(&self) -> bool {
        self.kind() == FailureKind::Validation
    }

    /// Returns the write type if this is a write timeout.
    pub fn write_type(&self) -> Option<WriteType> {
        match self {
            Self::WriteTimeout { write_type, .. } => Some(*write_type),
            _ => None,
        }
    }
}

/// Fatal error surfaced by the executor and the session facade.
///
/// `Query` and `RetryExhausted` wrap the underlying client failure; the other
/// variants carry a plain message.
#[derive(Error, Debug)]
pub enum PersistenceError {
    /// A non-retryable client failure, surfaced after a single attempt.
    #[error("Query failed: {0}")]
    Query(#[source] QueryError),

    /// Every permitted attempt ended in a write timeout.
    #[error("Timeout problems when storing data (gave up after {attempts} attempts)")]
    RetryExhausted {
        attempts: u32,
        #[source]
        source: QueryError,
    },

    /// Configuration errors (invalid contact points, bad keyspace name, ...).
    #[error("Configuration error: {0}")]
    Config(String),

    /// The executor or session has already been shut down.
    #[error("Shut down: {0}")]
    Shutdown(String),

    /// Any other persistence problem described by a plain message.
    #[error("Persistence error: {0}")]
    Message(String),
}

impl PersistenceError {
    /// Creates a configuration error with the given message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Creates a shutdown error with the given message.
    pub fn shutdown(msg: impl Into<String>) -> Self {
        Self::Shutdown(msg.into())
    }

    /// Creates a plain-message persistence error.
    pub fn message(msg: impl Into<String>) -> Self {
        Self::Message(msg.into())
    }

    /// Wraps the last timeout after the retry budget was spent.
    pub fn retry_exhausted(attempts: u32, source: QueryError) -> Self {
        Self::RetryExhausted { attempts, source }
    }

    /// Returns the wrapped client failure, if any.
    pub fn cause(&self) -> Option<&QueryError> {
        match self {
            Self::Query(source) | Self::RetryExhausted { source, .. } => Some(source),
            _ => None,
        }
    }

    /// Returns true if this error was produced by retry exhaustion.
    pub fn is_retry_exhausted(&self) -> bool {
        matches!(self, Self::RetryExhausted { .. })
    }

    /// Returns the error category as a string for display purposes.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Query(source) => match source.kind() {
                FailureKind::Validation => "Validation Error",
                FailureKind::Timeout => "Timeout Error",
                FailureKind::OtherExecution => "Execution Error",
            },
            Self::RetryExhausted { .. } => "Retry Exhausted",
            Self::Config(_) => "Configuration Error",
            Self::Shutdown(_) => "Shutdown Error",
            Self::Message(_) => "Persistence Error",
        }
    }
}

impl From<QueryError> for PersistenceError {
    fn from(err: QueryError) -> Self {
        Self::Query(err)
    }
}

/// Result type alias using PersistenceError.
pub type Result<T> = std::result::Result<T, PersistenceError>;
