//! rcql - run CQL statements through the resilient executor.

mod cli;

use std::sync::Arc;

use cli::{Cli, Mode};
use resilient_cql::config::{Config, SessionConfig};
use resilient_cql::db::{self, ClusterClient, Fault, FaultInjectingClient, ResultSet};
use resilient_cql::error::{PersistenceError, Result};
use resilient_cql::logging;
use resilient_cql::query::StatsSnapshot;
use resilient_cql::session::Session;
use serde::Serialize;
use tracing::{error, info};

#[tokio::main]
async fn main() {
    // A missing .env file is fine.
    let _ = dotenvy::dotenv();

    let cli = Cli::parse_args();
    if cli.log_file {
        logging::init_file_logging();
    } else {
        logging::init_stderr_logging();
    }

    if let Err(e) = run(cli).await {
        error!("{}: {}", e.category(), e);
        std::process::exit(1);
    }
}

/// Outcome of one statement as printed by the binary.
#[derive(Debug, Serialize)]
struct StatementOutput {
    statement: String,
    /// `None` for fire-and-forget statements.
    result: Option<ResultSet>,
}

#[derive(Debug, Serialize)]
struct Report {
    statements: Vec<StatementOutput>,
    stats: StatsSnapshot,
}

async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config_path();
    info!("Loading config from: {}", config_path.display());
    let mut config = Config::load_from_file(&config_path)?.session;
    config.apply_env_overrides();
    cli.apply_overrides(&mut config);
    config.validate()?;
    info!("Session: {}", config.display_string());

    let (session, faults) = open_session(config).await?;
    for _ in 0..cli.inject_timeouts {
        faults.push_fault(Fault::timeout());
    }

    let outcome = execute_all(&cli, &session).await;
    let closed = session.close().await;
    let report = outcome?;
    closed?;

    print_report(&report, cli.json)
}

/// Opens a session whose client can have faults injected after bootstrap.
async fn open_session(config: SessionConfig) -> Result<(Session, Arc<FaultInjectingClient>)> {
    let client = db::connect(&config).await?;
    let faults = Arc::new(FaultInjectingClient::new(client));
    let shared: Arc<dyn ClusterClient> = faults.clone();
    let session = Session::with_client(config, shared).await?;
    Ok((session, faults))
}

async fn execute_all(cli: &Cli, session: &Session) -> Result<Report> {
    let executor = session.executor()?;
    let mut statements = Vec::with_capacity(cli.statements.len());

    for query in &cli.statements {
        let statement = session.statement(query.as_str());
        let result = match cli.mode {
            Mode::Sync => Some(executor.execute(&statement).await?),
            Mode::Async => Some(
                executor
                    .execute_async(statement)
                    .await
                    .map_err(PersistenceError::Query)?,
            ),
            Mode::FireAndForget => {
                executor.fire_and_forget(statement);
                None
            }
        };
        statements.push(StatementOutput {
            statement: query.clone(),
            result,
        });
    }

    executor.shutdown().await;
    Ok(Report {
        statements,
        stats: executor.stats(),
    })
}

fn print_report(report: &Report, json: bool) -> Result<()> {
    if json {
        let rendered = serde_json::to_string_pretty(report)
            .map_err(|e| PersistenceError::message(format!("Failed to render JSON: {e}")))?;
        println!("{rendered}");
        return Ok(());
    }

    for output in &report.statements {
        println!("> {}", output.statement);
        match &output.result {
            Some(result) => println!("{result}"),
            None => println!("(submitted)"),
        }
    }
    let stats = &report.stats;
    println!(
        "attempts: {}, timeouts retried: {}, retries exhausted: {}, fallbacks: {}",
        stats.attempts, stats.timeouts_retried, stats.retries_exhausted, stats.fallbacks
    );
    Ok(())
}
