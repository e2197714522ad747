//! Command-line argument parsing for rcql.

use clap::{Parser, ValueEnum};
use resilient_cql::config::{Config, SessionConfig};
use std::path::PathBuf;

/// How each statement is handed to the executor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum Mode {
    /// Wait for each statement, retrying write timeouts.
    #[default]
    Sync,
    /// Submit each statement and await its future without retry.
    Async,
    /// Submit and move on; failures are only logged.
    FireAndForget,
}

/// Runs CQL statements through the resilient executor.
#[derive(Parser, Debug)]
#[command(name = "rcql")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Statements to execute, in order
    #[arg(value_name = "STATEMENT", required = true)]
    pub statements: Vec<String>,

    /// Config file path
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Contact points, overriding the config file
    #[arg(long, value_name = "HOSTS")]
    pub contact_points: Option<String>,

    /// Keyspace to log into, overriding the config file
    #[arg(short = 'k', long, value_name = "KEYSPACE")]
    pub keyspace: Option<String>,

    /// Execution mode
    #[arg(short = 'm', long, value_enum, default_value_t = Mode::Sync)]
    pub mode: Mode,

    /// Make the first N executions fail with a write timeout
    #[arg(long, value_name = "N", default_value_t = 0)]
    pub inject_timeouts: usize,

    /// Print results and executor statistics as JSON
    #[arg(long)]
    pub json: bool,

    /// Log to a file instead of stderr
    #[arg(long)]
    pub log_file: bool,
}

impl Cli {
    /// Parses command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Returns the config file path to use.
    ///
    /// Uses the --config argument if provided, otherwise the default path.
    pub fn config_path(&self) -> PathBuf {
        self.config.clone().unwrap_or_else(Config::default_path)
    }

    /// Applies command-line overrides on top of the loaded session config.
    pub fn apply_overrides(&self, session: &mut SessionConfig) {
        if let Some(points) = &self.contact_points {
            session.contact_points = points.clone();
        }
        if let Some(keyspace) = &self.keyspace {
            session.keyspace = keyspace.clone();
        }
    }
}
