//! Configuration management for resilient-cql.
//!
//! Handles loading the session configuration from TOML files and environment
//! variables. The configuration is a plain struct validated when a session is
//! opened; every required field is checked there rather than enforced by a
//! staged builder.

use crate::db::{ClusterBackend, Consistency};
use crate::error::{PersistenceError, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Default CQL native protocol port.
pub const DEFAULT_PORT: u16 = 9042;

/// Main configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Cluster session settings.
    #[serde(default)]
    pub session: SessionConfig,
}

/// Settings for the single long-lived cluster session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Which client implementation to connect with.
    #[serde(default)]
    pub backend: ClusterBackend,

    /// Comma-separated `host[:port]` list of nodes to contact.
    #[serde(default = "default_contact_points")]
    pub contact_points: String,

    /// Keyspace the session is logged into.
    #[serde(default = "default_keyspace")]
    pub keyspace: String,

    /// Replication map used when the keyspace is created.
    #[serde(default = "default_replication")]
    pub replication: String,

    /// Local datacenter for datacenter-aware routing. Empty means none.
    #[serde(default)]
    pub datacenter: Option<String>,

    /// Credentials of the application user.
    #[serde(default)]
    pub credentials: Option<Credentials>,

    /// Schema bootstrap run once when the session is opened.
    #[serde(default)]
    pub bootstrap: Option<BootstrapConfig>,

    /// Consistency applied to statements built by the session.
    #[serde(default)]
    pub default_consistency: Consistency,
}

fn default_contact_points() -> String {
    format!("localhost:{DEFAULT_PORT}")
}

fn default_keyspace() -> String {
    "resilient".to_string()
}

fn default_replication() -> String {
    "{'class': 'SimpleStrategy', 'replication_factor': '1'}".to_string()
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            backend: ClusterBackend::default(),
            contact_points: default_contact_points(),
            keyspace: default_keyspace(),
            replication: default_replication(),
            datacenter: None,
            credentials: None,
            bootstrap: None,
            default_consistency: Consistency::default(),
        }
    }
}

/// Username and password for the cluster.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Keyspace and table creation performed when the session opens.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct BootstrapConfig {
    /// Privileged credentials used only for the bootstrap.
    #[serde(default)]
    pub credentials: Option<Credentials>,

    /// CQL statements run after the keyspace exists (usually `CREATE TABLE IF NOT EXISTS`).
    #[serde(default)]
    pub definitions: Vec<String>,
}

/// One node to contact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContactPoint {
    pub host: String,
    pub port: u16,
}

impl fmt::Display for ContactPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl SessionConfig {
    /// Creates a configuration for `keyspace` on the given contact points.
    pub fn new(contact_points: impl Into<String>, keyspace: impl Into<String>) -> Self {
        Self {
            contact_points: contact_points.into(),
            keyspace: keyspace.into(),
            ..Self::default()
        }
    }

    /// Sets the replication map used for keyspace creation.
    pub fn with_replication(mut self, replication: impl Into<String>) -> Self {
        self.replication = replication.into();
        self
    }

    /// Sets the local datacenter. An empty name clears it.
    pub fn with_datacenter(mut self, datacenter: impl Into<String>) -> Self {
        self.datacenter = Some(datacenter.into());
        self
    }

    /// Sets the application credentials.
    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// Enables schema bootstrap on open.
    pub fn with_bootstrap(mut self, bootstrap: BootstrapConfig) -> Self {
        self.bootstrap = Some(bootstrap);
        self
    }

    /// Returns the local datacenter, treating an empty name as unset.
    pub fn datacenter(&self) -> Option<&str> {
        self.datacenter
            .as_deref()
            .map(str::trim)
            .filter(|dc| !dc.is_empty())
    }

    /// Parses the contact point list.
    pub fn contact_points(&self) -> Result<Vec<ContactPoint>> {
        let mut points = Vec::new();
        for entry in self.contact_points.split(',') {
            let entry = entry.trim();
            if entry.is_empty() {
                continue;
            }
            let (host, port) = match entry.split_once(':') {
                Some((host, port)) => {
                    let port = port.trim().parse::<u16>().map_err(|_| {
                        PersistenceError::config(format!("Invalid port in contact point '{entry}'"))
                    })?;
                    (host.trim(), port)
                }
                None => (entry, DEFAULT_PORT),
            };
            if host.is_empty() {
                return Err(PersistenceError::config(format!(
                    "Missing host in contact point '{entry}'"
                )));
            }
            points.push(ContactPoint {
                host: host.to_string(),
                port,
            });
        }
        if points.is_empty() {
            return Err(PersistenceError::config("At least one contact point is required"));
        }
        Ok(points)
    }

    /// Checks every field needed to open a session.
    pub fn validate(&self) -> Result<()> {
        self.contact_points()?;

        let identifier = Regex::new(r"^[A-Za-z][A-Za-z0-9_]{0,47}$")
            .map_err(|e| PersistenceError::config(e.to_string()))?;
        if !identifier.is_match(&self.keyspace) {
            return Err(PersistenceError::config(format!(
                "Invalid keyspace name '{}'",
                self.keyspace
            )));
        }

        let replication = self.replication.trim();
        if !(replication.starts_with('{') && replication.ends_with('}')) {
            return Err(PersistenceError::config(format!(
                "Replication must be a CQL map, got '{replication}'"
            )));
        }

        for creds in self
            .credentials
            .iter()
            .chain(self.bootstrap.iter().filter_map(|b| b.credentials.as_ref()))
        {
            if creds.username.is_empty() {
                return Err(PersistenceError::config("Username must not be empty"));
            }
        }
        Ok(())
    }

    /// The statement that creates the keyspace if it is missing.
    pub fn create_keyspace_cql(&self) -> String {
        format!(
            "CREATE KEYSPACE IF NOT EXISTS {} WITH REPLICATION = {}",
            self.keyspace, self.replication
        )
    }

    /// Applies environment variables (CQL_CONTACT_POINTS, CQL_KEYSPACE, ...) as overrides.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(points) = std::env::var("CQL_CONTACT_POINTS") {
            self.contact_points = points;
        }
        if let Ok(keyspace) = std::env::var("CQL_KEYSPACE") {
            self.keyspace = keyspace;
        }
        if let Ok(dc) = std::env::var("CQL_DATACENTER") {
            self.datacenter = Some(dc);
        }
        if let (Ok(username), Ok(password)) =
            (std::env::var("CQL_USERNAME"), std::env::var("CQL_PASSWORD"))
        {
            self.credentials = Some(Credentials { username, password });
        }
    }

    /// Returns a display-safe string (no password) for log output.
    pub fn display_string(&self) -> String {
        match self.datacenter() {
            Some(dc) => format!("{} @ {} (dc {dc})", self.keyspace, self.contact_points),
            None => format!("{} @ {}", self.keyspace, self.contact_points),
        }
    }
}

impl Config {
    /// Returns the default config file path for the current platform.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("resilient-cql")
            .join("config.toml")
    }

    /// Loads configuration from a TOML file.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| PersistenceError::config(format!("Failed to read config file: {e}")))?;

        Self::parse_toml(&content, path)
    }

    /// Parses configuration from a TOML string.
    fn parse_toml(content: &str, path: &Path) -> Result<Self> {
        toml::from_str(content).map_err(|e| {
            PersistenceError::config(format!(
                "Configuration error in {}:\n  {}",
                path.display(),
                e
            ))
        })
    }
}
