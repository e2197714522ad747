//! CQL statement parsing for the in-memory cluster.
//!
//! Uses sqlparser-rs with the generic dialect for the SQL-compatible subset of
//! CQL. The CQL-only pieces (`CREATE KEYSPACE`, the `IF NOT EXISTS` suffix of
//! conditional inserts) are recognised before handing the text to sqlparser.

use std::sync::OnceLock;

use regex::Regex;
use sqlparser::ast::{
    self, BinaryOperator, Expr, SelectItem, SetExpr, Statement as SqlStatement, TableFactor,
    UnaryOperator,
};
use sqlparser::dialect::GenericDialect;
use sqlparser::parser::Parser;

use super::{DataType, Value};
use crate::error::QueryError;

/// A value in a statement: either a literal or a positional bind marker.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Literal(Value),
    Marker(usize),
}

/// The statements understood by the in-memory cluster.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedStatement {
    CreateKeyspace {
        name: String,
        if_not_exists: bool,
        replication: String,
    },
    CreateTable {
        name: String,
        if_not_exists: bool,
        columns: Vec<(String, DataType)>,
        primary_key: String,
    },
    Insert {
        table: String,
        columns: Vec<String>,
        values: Vec<Operand>,
        if_not_exists: bool,
    },
    Select {
        table: String,
        /// `None` selects every column.
        columns: Option<Vec<String>>,
        filter: Option<(String, Operand)>,
    },
}

fn create_keyspace_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r"(?is)^\s*CREATE\s+KEYSPACE\s+(IF\s+NOT\s+EXISTS\s+)?([A-Za-z_][A-Za-z0-9_]*)\s+WITH\s+REPLICATION\s*=\s*(\{.*?\})",
        )
        .expect("keyspace pattern is valid")
    })
}

fn if_not_exists_suffix() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)\s+IF\s+NOT\s+EXISTS\s*$").expect("suffix pattern is valid")
    })
}

/// Parses one CQL statement, returning it with the number of `?` markers the
/// tokenizer found.
pub fn parse_statement(cql: &str) -> Result<(ParsedStatement, usize), QueryError> {
    let trimmed = cql.trim().trim_end_matches(';').trim_end();
    if trimmed.is_empty() {
        return Err(QueryError::syntax("Empty statement"));
    }

    if trimmed.to_ascii_uppercase().starts_with("CREATE KEYSPACE") {
        return parse_create_keyspace(trimmed).map(|parsed| (parsed, 0));
    }

    let (body, conditional) = match if_not_exists_suffix().find(trimmed) {
        Some(m) if trimmed.to_ascii_uppercase().starts_with("INSERT") => {
            (&trimmed[..m.start()], true)
        }
        _ => (trimmed, false),
    };

    let mut statements = Parser::parse_sql(&GenericDialect {}, body)
        .map_err(|e| QueryError::syntax(format!("line 1: {e}")))?;
    if statements.len() != 1 {
        return Err(QueryError::syntax(format!(
            "Expected exactly one statement, found {}",
            statements.len()
        )));
    }

    let mut markers = 0usize;
    let parsed = match statements.remove(0) {
        SqlStatement::CreateTable(create) => {
            let mut columns = Vec::with_capacity(create.columns.len());
            let mut primary_key = None;
            for column in &create.columns {
                let name = column.name.value.to_lowercase();
                let type_name = column.data_type.to_string();
                let data_type = DataType::parse(&type_name).ok_or_else(|| {
                    QueryError::invalid(format!("Unsupported type {type_name} for column {name}"))
                })?;
                if column
                    .options
                    .iter()
                    .any(|o| o.option.to_string().to_uppercase().contains("PRIMARY KEY"))
                {
                    primary_key = Some(name.clone());
                }
                columns.push((name, data_type));
            }
            if primary_key.is_none() {
                primary_key = create
                    .constraints
                    .iter()
                    .find_map(|c| primary_key_from_constraint(&c.to_string()));
            }
            let primary_key = primary_key.ok_or_else(|| {
                QueryError::invalid("No PRIMARY KEY specified (exactly one required)")
            })?;
            if !columns.iter().any(|(name, _)| name == &primary_key) {
                return Err(QueryError::invalid(format!(
                    "Unknown definition {primary_key} referenced in PRIMARY KEY"
                )));
            }
            Ok(ParsedStatement::CreateTable {
                name: object_name(&create.name),
                if_not_exists: create.if_not_exists,
                columns,
                primary_key,
            })
        }
        SqlStatement::Insert(insert) => {
            let columns: Vec<String> = insert
                .columns
                .iter()
                .map(|c| c.value.to_lowercase())
                .collect();
            if columns.is_empty() {
                return Err(QueryError::syntax("INSERT requires an explicit column list"));
            }
            let source = insert
                .source
                .as_ref()
                .ok_or_else(|| QueryError::syntax("INSERT requires a VALUES clause"))?;
            let rows = match source.body.as_ref() {
                SetExpr::Values(values) => &values.rows,
                _ => return Err(QueryError::syntax("INSERT requires a VALUES clause")),
            };
            if rows.len() != 1 {
                return Err(QueryError::invalid("INSERT accepts exactly one row of values"));
            }
            let values = rows[0]
                .iter()
                .map(|expr| operand(expr, &mut markers))
                .collect::<Result<Vec<_>, _>>()?;
            if values.len() != columns.len() {
                return Err(QueryError::invalid(
                    "Unmatched column names/values in INSERT",
                ));
            }
            Ok(ParsedStatement::Insert {
                table: object_name(&insert.table_name),
                columns,
                values,
                if_not_exists: conditional,
            })
        }
        SqlStatement::Query(query) => {
            let SetExpr::Select(select) = query.body.as_ref() else {
                return Err(QueryError::invalid("Only simple SELECT statements are supported"));
            };
            if select.from.len() != 1 || !select.from[0].joins.is_empty() {
                return Err(QueryError::invalid("SELECT must read from exactly one table"));
            }
            let table = match &select.from[0].relation {
                TableFactor::Table { name, .. } => object_name(name),
                _ => return Err(QueryError::invalid("SELECT must read from a table")),
            };
            let columns = projection(&select.projection)?;
            let filter = match &select.selection {
                None => None,
                Some(Expr::BinaryOp {
                    left,
                    op: BinaryOperator::Eq,
                    right,
                }) => match left.as_ref() {
                    Expr::Identifier(ident) => {
                        Some((ident.value.to_lowercase(), operand(right, &mut markers)?))
                    }
                    _ => {
                        return Err(QueryError::invalid(
                            "WHERE clause must compare a column to a value",
                        ))
                    }
                },
                Some(_) => {
                    return Err(QueryError::invalid(
                        "Only a single equality restriction on the primary key is supported",
                    ))
                }
            };
            Ok(ParsedStatement::Select {
                table,
                columns,
                filter,
            })
        }
        other => Err(QueryError::invalid(format!(
            "Unsupported statement: {}",
            other.to_string().split_whitespace().next().unwrap_or_default()
        ))),
    }?;
    Ok((parsed, markers))
}

fn parse_create_keyspace(cql: &str) -> Result<ParsedStatement, QueryError> {
    let caps = create_keyspace_pattern()
        .captures(cql)
        .ok_or_else(|| QueryError::syntax(format!("Malformed CREATE KEYSPACE: {cql}")))?;
    Ok(ParsedStatement::CreateKeyspace {
        name: caps[2].to_lowercase(),
        if_not_exists: caps.get(1).is_some(),
        replication: caps[3].to_string(),
    })
}

/// Extracts the first column of a rendered `PRIMARY KEY (a, b)` constraint.
fn primary_key_from_constraint(rendered: &str) -> Option<String> {
    let upper = rendered.to_uppercase();
    let at = upper.find("PRIMARY KEY")?;
    let rest = &rendered[at..];
    let open = rest.find('(')?;
    let close = rest.find(')')?;
    rest.get(open + 1..close)?
        .split(',')
        .next()
        .map(|c| c.trim().trim_matches('"').to_lowercase())
        .filter(|c| !c.is_empty())
}

fn object_name(name: &ast::ObjectName) -> String {
    name.0
        .last()
        .map(|ident| ident.value.to_lowercase())
        .unwrap_or_default()
}

fn projection(items: &[SelectItem]) -> Result<Option<Vec<String>>, QueryError> {
    let mut columns = Vec::with_capacity(items.len());
    for item in items {
        match item {
            SelectItem::Wildcard(_) => return Ok(None),
            SelectItem::UnnamedExpr(Expr::Identifier(ident)) => {
                columns.push(ident.value.to_lowercase())
            }
            other => {
                return Err(QueryError::invalid(format!(
                    "Unsupported selector: {other}"
                )))
            }
        }
    }
    Ok(Some(columns))
}

fn operand(expr: &Expr, markers: &mut usize) -> Result<Operand, QueryError> {
    match expr {
        Expr::Value(ast::Value::Placeholder(_)) => {
            let idx = *markers;
            *markers += 1;
            Ok(Operand::Marker(idx))
        }
        Expr::Value(value) => literal(value).map(Operand::Literal),
        Expr::UnaryOp {
            op: UnaryOperator::Minus,
            expr,
        } => match operand(expr, markers)? {
            Operand::Literal(Value::Int(i)) => Ok(Operand::Literal(Value::Int(-i))),
            Operand::Literal(Value::Float(f)) => Ok(Operand::Literal(Value::Float(-f))),
            _ => Err(QueryError::invalid(format!("Cannot negate {expr}"))),
        },
        Expr::Identifier(ident) if ident.value.eq_ignore_ascii_case("true") => {
            Ok(Operand::Literal(Value::Bool(true)))
        }
        Expr::Identifier(ident) if ident.value.eq_ignore_ascii_case("false") => {
            Ok(Operand::Literal(Value::Bool(false)))
        }
        other => Err(QueryError::invalid(format!("Unsupported term: {other}"))),
    }
}

fn literal(value: &ast::Value) -> Result<Value, QueryError> {
    match value {
        ast::Value::Number(n, _) => n
            .parse::<i64>()
            .map(Value::Int)
            .or_else(|_| n.parse::<f64>().map(Value::Float))
            .map_err(|_| QueryError::invalid(format!("Invalid number {n}"))),
        ast::Value::SingleQuotedString(s) => Ok(Value::Text(s.clone())),
        ast::Value::Boolean(b) => Ok(Value::Bool(*b)),
        ast::Value::Null => Ok(Value::Null),
        other => Err(QueryError::invalid(format!("Unsupported literal: {other}"))),
    }
}
