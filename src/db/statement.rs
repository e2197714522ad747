//! Statement types handed to the cluster client.
//!
//! A [`Statement`] is opaque to the executor: it is built by the caller,
//! moved into the executor and passed to the client unchanged.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::Value;
use crate::error::QueryError;

/// Consistency level requested for a statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Consistency {
    Any,
    One,
    Two,
    Three,
    #[default]
    Quorum,
    All,
    LocalQuorum,
    EachQuorum,
    Serial,
    LocalSerial,
    LocalOne,
}

impl Consistency {
    /// Returns the level in CQL notation (e.g. `LOCAL_QUORUM`).
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Any => "ANY",
            Self::One => "ONE",
            Self::Two => "TWO",
            Self::Three => "THREE",
            Self::Quorum => "QUORUM",
            Self::All => "ALL",
            Self::LocalQuorum => "LOCAL_QUORUM",
            Self::EachQuorum => "EACH_QUORUM",
            Self::Serial => "SERIAL",
            Self::LocalSerial => "LOCAL_SERIAL",
            Self::LocalOne => "LOCAL_ONE",
        }
    }

    /// Parses a level from either CQL or snake_case notation.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().replace('-', "_").as_str() {
            "ANY" => Some(Self::Any),
            "ONE" => Some(Self::One),
            "TWO" => Some(Self::Two),
            "THREE" => Some(Self::Three),
            "QUORUM" => Some(Self::Quorum),
            "ALL" => Some(Self::All),
            "LOCAL_QUORUM" => Some(Self::LocalQuorum),
            "EACH_QUORUM" => Some(Self::EachQuorum),
            "SERIAL" => Some(Self::Serial),
            "LOCAL_SERIAL" => Some(Self::LocalSerial),
            "LOCAL_ONE" => Some(Self::LocalOne),
            _ => None,
        }
    }

    /// Replica acknowledgements needed, assuming a replication factor of three.
    pub fn required_replicas(&self) -> u32 {
        match self {
            Self::Any | Self::One | Self::LocalOne => 1,
            Self::Two => 2,
            Self::Quorum
            | Self::LocalQuorum
            | Self::EachQuorum
            | Self::Serial
            | Self::LocalSerial => 2,
            Self::Three | Self::All => 3,
        }
    }
}

impl fmt::Display for Consistency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The kind of write that timed out, as reported by the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteType {
    Simple,
    Batch,
    UnloggedBatch,
    Counter,
    BatchLog,
    Cas,
    View,
    Cdc,
}

impl WriteType {
    /// Returns the write type in CQL notation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Simple => "SIMPLE",
            Self::Batch => "BATCH",
            Self::UnloggedBatch => "UNLOGGED_BATCH",
            Self::Counter => "COUNTER",
            Self::BatchLog => "BATCH_LOG",
            Self::Cas => "CAS",
            Self::View => "VIEW",
            Self::Cdc => "CDC",
        }
    }
}

impl fmt::Display for WriteType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A query with its bound values and execution options.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    query: String,
    values: Vec<Value>,
    consistency: Consistency,
    serial_consistency: Option<Consistency>,
}

impl Statement {
    /// Creates an unbound statement from query text.
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            values: Vec::new(),
            consistency: Consistency::default(),
            serial_consistency: None,
        }
    }

    /// Binds positional values to the `?` markers of the query.
    pub fn with_values(mut self, values: Vec<Value>) -> Self {
        self.values = values;
        self
    }

    /// Sets the consistency level.
    pub fn with_consistency(mut self, consistency: Consistency) -> Self {
        self.consistency = consistency;
        self
    }

    /// Sets the serial consistency used by conditional writes.
    pub fn with_serial_consistency(mut self, consistency: Consistency) -> Self {
        self.serial_consistency = Some(consistency);
        self
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn consistency(&self) -> Consistency {
        self.consistency
    }

    pub fn serial_consistency(&self) -> Option<Consistency> {
        self.serial_consistency
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.query)?;
        if !self.values.is_empty() {
            let values: Vec<String> = self.values.iter().map(|v| v.to_cql_literal()).collect();
            write!(f, " [{}]", values.join(", "))?;
        }
        Ok(())
    }
}

impl From<&str> for Statement {
    fn from(query: &str) -> Self {
        Self::new(query)
    }
}

impl From<String> for Statement {
    fn from(query: String) -> Self {
        Self::new(query)
    }
}

/// A statement parsed once by the cluster and bound many times.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedStatement {
    id: Uuid,
    query: String,
    markers: usize,
    consistency: Consistency,
}

impl PreparedStatement {
    /// Creates a prepared statement with `markers` bind markers.
    pub fn new(query: impl Into<String>, markers: usize) -> Self {
        Self {
            id: Uuid::new_v4(),
            query: query.into(),
            markers,
            consistency: Consistency::default(),
        }
    }

    /// Sets the consistency carried into every bound statement.
    pub fn with_consistency(mut self, consistency: Consistency) -> Self {
        self.consistency = consistency;
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    /// Number of `?` markers in the query.
    pub fn markers(&self) -> usize {
        self.markers
    }

    /// Binds values, producing an executable statement.
    pub fn bind(&self, values: Vec<Value>) -> Result<Statement, QueryError> {
        if values.len() != self.markers {
            return Err(QueryError::invalid(format!(
                "Expected {} bound values but got {}",
                self.markers,
                values.len()
            )));
        }
        Ok(Statement::new(self.query.clone())
            .with_values(values)
            .with_consistency(self.consistency))
    }
}
