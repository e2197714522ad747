//! Integration tests for resilient-cql.

pub mod common;
pub mod executor_test;
pub mod fire_and_forget_test;
pub mod session_test;
