//! Session management for resilient-cql.
//!
//! Centralizes the session lifecycle: connect, bootstrap, hand out
//! executors, close.

pub mod facade;
pub mod schema;

pub use facade::Session;
pub use schema::{SchemaDefinition, StaticSchema};
