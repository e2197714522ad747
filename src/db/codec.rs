//! CQL data types and the codec registry.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// A CQL column type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    Int,
    BigInt,
    SmallInt,
    Text,
    Boolean,
    Double,
    Float,
    Timestamp,
    Date,
    Time,
    Uuid,
    Blob,
    Tuple(Vec<DataType>),
}

impl DataType {
    /// Parses a CQL type name such as `int`, `varchar` or `timestamp`.
    pub fn parse(s: &str) -> Option<Self> {
        let lower = s.trim().to_ascii_lowercase();
        // sqlparser renders sized types as e.g. `INT(11)`
        let base = lower.split('(').next().unwrap_or_default().trim();
        match base {
            "int" | "integer" => Some(Self::Int),
            "bigint" | "counter" | "varint" => Some(Self::BigInt),
            "smallint" | "tinyint" => Some(Self::SmallInt),
            "text" | "varchar" | "ascii" | "string" | "character varying" => Some(Self::Text),
            "boolean" | "bool" => Some(Self::Boolean),
            "double" | "double precision" | "decimal" => Some(Self::Double),
            "float" | "real" => Some(Self::Float),
            "timestamp" => Some(Self::Timestamp),
            "date" => Some(Self::Date),
            "time" => Some(Self::Time),
            "uuid" | "timeuuid" => Some(Self::Uuid),
            "blob" | "bytea" => Some(Self::Blob),
            _ => None,
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int => f.write_str("int"),
            Self::BigInt => f.write_str("bigint"),
            Self::SmallInt => f.write_str("smallint"),
            Self::Text => f.write_str("text"),
            Self::Boolean => f.write_str("boolean"),
            Self::Double => f.write_str("double"),
            Self::Float => f.write_str("float"),
            Self::Timestamp => f.write_str("timestamp"),
            Self::Date => f.write_str("date"),
            Self::Time => f.write_str("time"),
            Self::Uuid => f.write_str("uuid"),
            Self::Blob => f.write_str("blob"),
            Self::Tuple(components) => {
                let inner: Vec<String> = components.iter().map(ToString::to_string).collect();
                write!(f, "tuple<{}>", inner.join(", "))
            }
        }
    }
}

/// A tuple type created through the cluster metadata.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TupleType {
    components: Vec<DataType>,
}

impl TupleType {
    pub fn new(components: Vec<DataType>) -> Self {
        Self { components }
    }

    pub fn components(&self) -> &[DataType] {
        &self.components
    }

    /// The tuple as a column type.
    pub fn data_type(&self) -> DataType {
        DataType::Tuple(self.components.clone())
    }
}

impl fmt::Display for TupleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.data_type().fmt(f)
    }
}

/// Maps a CQL type to an application type.
pub trait Codec: Send + Sync {
    /// The CQL type this codec reads and writes.
    fn cql_type(&self) -> DataType;

    /// Name of the application type on the other side of the mapping.
    fn rust_type(&self) -> &'static str;
}

/// A codec described by its two endpoint types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimpleCodec {
    cql_type: DataType,
    rust_type: &'static str,
}

impl SimpleCodec {
    pub const fn new(cql_type: DataType, rust_type: &'static str) -> Self {
        Self {
            cql_type,
            rust_type,
        }
    }
}

impl Codec for SimpleCodec {
    fn cql_type(&self) -> DataType {
        self.cql_type.clone()
    }

    fn rust_type(&self) -> &'static str {
        self.rust_type
    }
}

/// Temporal codecs registered on every new session.
pub fn temporal_codecs() -> Vec<Arc<dyn Codec>> {
    vec![
        Arc::new(SimpleCodec::new(DataType::Timestamp, "std::time::SystemTime")),
        Arc::new(SimpleCodec::new(DataType::Date, "Date")),
        Arc::new(SimpleCodec::new(DataType::Time, "Time")),
    ]
}

/// Registry of codecs known to a cluster client.
#[derive(Default, Clone)]
pub struct CodecRegistry {
    codecs: Vec<Arc<dyn Codec>>,
}

impl CodecRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a codec. Returns false if the same mapping is already present.
    pub fn register(&mut self, codec: Arc<dyn Codec>) -> bool {
        let cql_type = codec.cql_type();
        let rust_type = codec.rust_type();
        if self.lookup(&cql_type, rust_type).is_some() {
            warn!(%cql_type, rust_type, "Codec already registered, ignoring");
            return false;
        }
        debug!(%cql_type, rust_type, "Registered codec");
        self.codecs.push(codec);
        true
    }

    /// Finds the codec for the given pair of types.
    pub fn lookup(&self, cql_type: &DataType, rust_type: &str) -> Option<Arc<dyn Codec>> {
        self.codecs
            .iter()
            .find(|c| &c.cql_type() == cql_type && c.rust_type() == rust_type)
            .cloned()
    }

    /// All codecs that handle `cql_type`.
    pub fn codecs_for(&self, cql_type: &DataType) -> Vec<Arc<dyn Codec>> {
        self.codecs
            .iter()
            .filter(|c| &c.cql_type() == cql_type)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.codecs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codecs.is_empty()
    }
}

impl fmt::Debug for CodecRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let entries: Vec<String> = self
            .codecs
            .iter()
            .map(|c| format!("{} <-> {}", c.cql_type(), c.rust_type()))
            .collect();
        f.debug_struct("CodecRegistry")
            .field("codecs", &entries)
            .finish()
    }
}
