//! Schema definitions run when a session bootstraps its keyspace.

use crate::config::BootstrapConfig;
use crate::db::Statement;

/// Something that knows the statements creating its tables.
///
/// Implementations should only emit idempotent DDL (`IF NOT EXISTS`), since
/// bootstrap runs on every open and goes through the retrying executor.
pub trait SchemaDefinition: Send + Sync {
    /// Short name used in log output.
    fn name(&self) -> &str {
        "schema"
    }

    /// Statements to run, in order.
    fn statements(&self) -> Vec<Statement>;
}

impl SchemaDefinition for BootstrapConfig {
    fn name(&self) -> &str {
        "configured definitions"
    }

    fn statements(&self) -> Vec<Statement> {
        self.definitions
            .iter()
            .map(|cql| cql.trim())
            .filter(|cql| !cql.is_empty())
            .map(Statement::new)
            .collect()
    }
}

/// A fixed list of CQL strings.
#[derive(Debug, Clone)]
pub struct StaticSchema {
    name: String,
    statements: Vec<String>,
}

impl StaticSchema {
    pub fn new(
        name: impl Into<String>,
        statements: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            name: name.into(),
            statements: statements.into_iter().map(Into::into).collect(),
        }
    }
}

impl SchemaDefinition for StaticSchema {
    fn name(&self) -> &str {
        &self.name
    }

    fn statements(&self) -> Vec<Statement> {
        self.statements
            .iter()
            .map(|cql| Statement::new(cql.as_str()))
            .collect()
    }
}
