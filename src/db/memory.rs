//! In-memory cluster client.
//!
//! A single-node stand-in for the real cluster. It keeps tables in memory and
//! answers the CQL subset understood by [`super::parser`], which is enough to
//! exercise every execution path of the executor in tests and local runs.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::debug;

use super::parser::{parse_statement, Operand, ParsedStatement};
use super::{
    ClusterClient, Codec, CodecRegistry, ColumnInfo, DataType, PreparedStatement, ResultSet, Row,
    Statement, Value,
};
use crate::config::SessionConfig;
use crate::error::{self, QueryError};

const DEFAULT_REPLICATION: &str = "{'class': 'SimpleStrategy', 'replication_factor': '1'}";

#[derive(Debug, Clone)]
struct Table {
    columns: Vec<(String, DataType)>,
    primary_key: usize,
    rows: BTreeMap<String, Row>,
}

impl Table {
    fn column_index(&self, name: &str) -> Result<usize, QueryError> {
        self.columns
            .iter()
            .position(|(c, _)| c == name)
            .ok_or_else(|| QueryError::invalid(format!("Undefined column name {name}")))
    }

    fn column_info(&self, idx: usize) -> ColumnInfo {
        let (name, data_type) = &self.columns[idx];
        ColumnInfo::new(name.clone(), data_type.clone())
    }
}

#[derive(Debug, Default)]
struct ClusterState {
    keyspaces: HashMap<String, String>,
    tables: HashMap<String, Table>,
}

/// An in-process cluster that applies statements to in-memory tables.
pub struct MemoryCluster {
    state: RwLock<ClusterState>,
    codecs: RwLock<CodecRegistry>,
    keyspace: Option<String>,
    latency: Duration,
    mutations: AtomicU64,
    closed: AtomicBool,
}

impl MemoryCluster {
    /// Creates an empty cluster with no keyspace selected.
    pub fn new() -> Self {
        Self {
            state: RwLock::new(ClusterState::default()),
            codecs: RwLock::new(CodecRegistry::new()),
            keyspace: None,
            latency: Duration::ZERO,
            mutations: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        }
    }

    /// Connects using the session configuration.
    pub fn connect(config: &SessionConfig) -> error::Result<Self> {
        let contact_points = config.contact_points()?;
        debug!(
            nodes = contact_points.len(),
            keyspace = %config.keyspace,
            "Connecting to in-memory cluster"
        );
        Ok(Self::new().with_keyspace(config.keyspace.clone()))
    }

    /// Sets the logged keyspace of the connection.
    pub fn with_keyspace(mut self, keyspace: impl Into<String>) -> Self {
        self.keyspace = Some(keyspace.into().to_lowercase());
        self
    }

    /// Delays every statement by `latency` to mimic network round trips.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Number of writes that changed table contents.
    pub fn mutation_count(&self) -> u64 {
        self.mutations.load(Ordering::SeqCst)
    }

    /// Returns true if the keyspace exists.
    pub fn has_keyspace(&self, name: &str) -> bool {
        self.state.read().keyspaces.contains_key(&name.to_lowercase())
    }

    /// Number of rows currently stored in `table`.
    pub fn row_count(&self, table: &str) -> Option<usize> {
        self.state
            .read()
            .tables
            .get(&table.to_lowercase())
            .map(|t| t.rows.len())
    }

    fn apply(&self, statement: &Statement) -> Result<ResultSet, QueryError> {
        let (parsed, expected) = parse_statement(statement.query())?;
        let bound = statement.values();
        if bound.len() != expected {
            return Err(QueryError::invalid(format!(
                "There were {expected} markers(?) in CQL but {} bound variables",
                bound.len()
            )));
        }
        let resolve = |operand: &Operand| -> Result<Value, QueryError> {
            match operand {
                Operand::Literal(v) => Ok(v.clone()),
                Operand::Marker(idx) => bound.get(*idx).cloned().ok_or_else(|| {
                    QueryError::invalid(format!("No value bound for marker {}", idx + 1))
                }),
            }
        };

        match parsed {
            ParsedStatement::CreateKeyspace {
                name,
                if_not_exists,
                replication,
            } => {
                let mut state = self.state.write();
                if state.keyspaces.contains_key(&name) {
                    if if_not_exists {
                        return Ok(ResultSet::new());
                    }
                    return Err(QueryError::Invalid(format!(
                        "Keyspace {name} already exists"
                    )));
                }
                state.keyspaces.insert(name, replication);
                Ok(ResultSet::new())
            }
            ParsedStatement::CreateTable {
                name,
                if_not_exists,
                columns,
                primary_key,
            } => {
                self.ensure_logged_keyspace();
                let mut state = self.state.write();
                if state.tables.contains_key(&name) {
                    if if_not_exists {
                        return Ok(ResultSet::new());
                    }
                    return Err(QueryError::Invalid(format!(
                        "Table {name} already exists"
                    )));
                }
                let primary_key = columns
                    .iter()
                    .position(|(c, _)| c == &primary_key)
                    .unwrap_or_default();
                state.tables.insert(
                    name,
                    Table {
                        columns,
                        primary_key,
                        rows: BTreeMap::new(),
                    },
                );
                Ok(ResultSet::new())
            }
            ParsedStatement::Insert {
                table,
                columns,
                values,
                if_not_exists,
            } => {
                let mut state = self.state.write();
                let target = state.tables.get_mut(&table).ok_or_else(|| {
                    QueryError::invalid(format!("unconfigured table {table}"))
                })?;

                let mut assignments = Vec::with_capacity(columns.len());
                for (column, operand) in columns.iter().zip(&values) {
                    let idx = target.column_index(column)?;
                    let value = coerce(resolve(operand)?, &target.columns[idx])?;
                    assignments.push((idx, value));
                }
                let key = assignments
                    .iter()
                    .find(|(idx, _)| *idx == target.primary_key)
                    .map(|(_, v)| v.clone())
                    .filter(|v| !v.is_null())
                    .ok_or_else(|| {
                        QueryError::invalid(format!(
                            "Some partition key parts are missing: {}",
                            target.columns[target.primary_key].0
                        ))
                    })?;
                let key = key.to_cql_literal();

                if if_not_exists && target.rows.contains_key(&key) {
                    return Ok(ResultSet::applied(false));
                }

                let width = target.columns.len();
                let row = target
                    .rows
                    .entry(key)
                    .or_insert_with(|| vec![Value::Null; width]);
                for (idx, value) in assignments {
                    row[idx] = value;
                }
                self.mutations.fetch_add(1, Ordering::SeqCst);

                if if_not_exists {
                    Ok(ResultSet::applied(true))
                } else {
                    Ok(ResultSet::new())
                }
            }
            ParsedStatement::Select {
                table,
                columns,
                filter,
            } => {
                let state = self.state.read();
                let source = state.tables.get(&table).ok_or_else(|| {
                    QueryError::invalid(format!("unconfigured table {table}"))
                })?;

                let selected: Vec<usize> = match columns {
                    None => (0..source.columns.len()).collect(),
                    Some(names) => names
                        .iter()
                        .map(|name| source.column_index(name))
                        .collect::<Result<_, _>>()?,
                };

                let matching: Vec<&Row> = match filter {
                    None => source.rows.values().collect(),
                    Some((column, operand)) => {
                        let idx = source.column_index(&column)?;
                        if idx != source.primary_key {
                            return Err(QueryError::invalid(
                                "Cannot execute this query as it might involve data filtering",
                            ));
                        }
                        let key = coerce(resolve(&operand)?, &source.columns[idx])?;
                        source.rows.get(&key.to_cql_literal()).into_iter().collect()
                    }
                };

                let columns = selected.iter().map(|&i| source.column_info(i)).collect();
                let rows = matching
                    .into_iter()
                    .map(|row| selected.iter().map(|&i| row[i].clone()).collect())
                    .collect();
                Ok(ResultSet::with_data(columns, rows))
            }
        }
    }

    /// A fresh cluster implicitly owns the logged keyspace.
    fn ensure_logged_keyspace(&self) {
        if let Some(ks) = &self.keyspace {
            self.state
                .write()
                .keyspaces
                .entry(ks.clone())
                .or_insert_with(|| DEFAULT_REPLICATION.to_string());
        }
    }
}

impl Default for MemoryCluster {
    fn default() -> Self {
        Self::new()
    }
}

/// Converts a value to the declared column type.
fn coerce(value: Value, column: &(String, DataType)) -> Result<Value, QueryError> {
    let (name, data_type) = column;
    let mismatch = |value: &Value| {
        QueryError::invalid(format!(
            "Invalid {} constant ({}) for \"{name}\" of type {data_type}",
            value_kind(value),
            value.to_display_string()
        ))
    };
    match (data_type, value) {
        (_, Value::Null) => Ok(Value::Null),
        (DataType::Int | DataType::BigInt | DataType::SmallInt, Value::Int(i)) => Ok(Value::Int(i)),
        (DataType::Text, Value::Text(s)) => Ok(Value::Text(s)),
        (DataType::Boolean, Value::Bool(b)) => Ok(Value::Bool(b)),
        (DataType::Double | DataType::Float, Value::Float(f)) => Ok(Value::Float(f)),
        (DataType::Double | DataType::Float, Value::Int(i)) => Ok(Value::Float(i as f64)),
        (DataType::Timestamp, Value::Timestamp(ms) | Value::Int(ms)) => Ok(Value::Timestamp(ms)),
        (DataType::Blob, Value::Bytes(b)) => Ok(Value::Bytes(b)),
        (_, other) => Err(mismatch(&other)),
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "NULL",
        Value::Bool(_) => "BOOLEAN",
        Value::Int(_) => "INTEGER",
        Value::Float(_) => "FLOAT",
        Value::Text(_) => "STRING",
        Value::Timestamp(_) => "TIMESTAMP",
        Value::Bytes(_) => "BLOB",
    }
}

#[async_trait]
impl ClusterClient for MemoryCluster {
    async fn execute(&self, statement: &Statement) -> Result<ResultSet, QueryError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(QueryError::execution("Connection has been closed"));
        }
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        let start = Instant::now();
        let result = self.apply(statement)?;
        Ok(result.with_execution_time(start.elapsed()))
    }

    async fn prepare(&self, query: &str) -> Result<PreparedStatement, QueryError> {
        let (_, markers) = parse_statement(query)?;
        Ok(PreparedStatement::new(query, markers))
    }

    fn register_codec(&self, codec: Arc<dyn Codec>) {
        self.codecs.write().register(codec);
    }

    fn codecs(&self) -> CodecRegistry {
        self.codecs.read().clone()
    }

    async fn close(&self) -> Result<(), QueryError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}
