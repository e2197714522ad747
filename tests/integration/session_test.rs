//! Session lifecycle through the public facade.

use std::io::Write;

use pretty_assertions::assert_eq;
use resilient_cql::config::{BootstrapConfig, Config, Credentials, SessionConfig};
use resilient_cql::db::{Consistency, DataType, Value};
use resilient_cql::session::{SchemaDefinition, StaticSchema};
use resilient_cql::{PersistenceError, Session};

fn bootstrap_config() -> SessionConfig {
    SessionConfig::new("127.0.0.1:9042,127.0.0.2", "executortest")
        .with_credentials(Credentials::new("app", "app"))
        .with_bootstrap(BootstrapConfig {
            credentials: Some(Credentials::new("cassandra", "cassandra")),
            definitions: vec![
                "CREATE TABLE IF NOT EXISTS testtable1 (id int PRIMARY KEY, test text)".to_string(),
            ],
        })
}

#[tokio::test]
async fn test_open_from_config_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"
[session]
contact_points = "localhost"
keyspace = "from_file"
default_consistency = "local_quorum"

[session.bootstrap]
definitions = ["CREATE TABLE IF NOT EXISTS events (id int PRIMARY KEY, body text)"]
"#
    )
    .unwrap();

    let config = Config::load_from_file(file.path()).unwrap();
    let session = Session::open(config.session).await.unwrap();

    let prepared = session
        .prepare("INSERT INTO events (id, body) VALUES (?, ?)")
        .await
        .unwrap();
    let bound = prepared
        .bind(vec![Value::Int(1), Value::from("hello")])
        .unwrap();
    assert_eq!(bound.consistency(), Consistency::LocalQuorum);

    let executor = session.executor().unwrap();
    executor.execute(&bound).await.unwrap();

    let rows = executor
        .execute(&session.statement("SELECT body FROM events WHERE id = 1"))
        .await
        .unwrap();
    assert_eq!(rows.one(), Some(&vec![Value::from("hello")]));

    session.close().await.unwrap();
}

#[tokio::test]
async fn test_bootstrap_is_repeatable() {
    let session = Session::open(bootstrap_config()).await.unwrap();
    let schema = StaticSchema::new(
        "again",
        [
            "CREATE KEYSPACE IF NOT EXISTS executortest WITH REPLICATION = {'class': 'SimpleStrategy', 'replication_factor': '1'}",
            "CREATE TABLE IF NOT EXISTS testtable1 (id int PRIMARY KEY, test text)",
        ],
    );
    assert_eq!(schema.statements().len(), 2);

    session.apply_schema(&schema).await.unwrap();
    session.close().await.unwrap();
}

#[tokio::test]
async fn test_bind_arity_is_checked() {
    let session = Session::open(bootstrap_config()).await.unwrap();
    let prepared = session
        .prepare("INSERT INTO testtable1 (id, test) VALUES (?, ?)")
        .await
        .unwrap();

    let err = prepared.bind(vec![Value::Int(1)]).unwrap_err();
    assert!(err.is_validation());
    session.close().await.unwrap();
}

#[tokio::test]
async fn test_prepare_rejects_malformed_cql() {
    let session = Session::open(bootstrap_config()).await.unwrap();
    let err = session.prepare("INSERT INTO").await.unwrap_err();
    assert_eq!(err.category(), "Validation Error");
    session.close().await.unwrap();
}

#[tokio::test]
async fn test_tuple_types() {
    let session = Session::open(bootstrap_config()).await.unwrap();
    let tuple = session.create_tuple_type(DataType::Timestamp, DataType::Text);
    assert_eq!(tuple.to_string(), "tuple<timestamp, text>");
    session.close().await.unwrap();
}

#[tokio::test]
async fn test_closed_session_refuses_work() {
    let session = Session::open(bootstrap_config()).await.unwrap();
    let executor = session.executor().unwrap();
    session.close().await.unwrap();

    assert!(matches!(
        session.executor().unwrap_err(),
        PersistenceError::Shutdown(_)
    ));
    assert!(executor.is_shut_down());

    // The client itself is closed too.
    let err = executor
        .execute(&session.statement("SELECT * FROM testtable1"))
        .await
        .unwrap_err();
    assert_eq!(err.category(), "Execution Error");
}
