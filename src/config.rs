//! Configuration module for the gateway.
//!
//! Provides JSON-based configuration loading for:
//! - The backend connection (one tagged variant per supported driver)
//! - Server settings (port, studio base URL override)
//! - Basic-auth credentials
//!
//! The connection is an explicit sum type discriminated by the `driver`
//! field; an unrecognized tag is a parse error, never a silent fallthrough.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::driver::DriverKind;

/// Default HTTP port.
pub const DEFAULT_PORT: u16 = 4000;

/// Default editor base URL; the driver suffix is appended at serve time.
pub const DEFAULT_STUDIO_URL: &str = "https://libsqlstudio.com/embed";

/// Config file looked up in the working directory when none is given.
pub const DEFAULT_CONFIG_FILE: &str = "sqlgate.json";

/// Configuration error types.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("cannot read config file: {0}")]
    Io(#[from] std::io::Error),

    /// The configuration is not a valid JSON document for this schema
    /// (includes an unrecognized `driver` tag).
    #[error("invalid config file: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Connection settings for an embedded SQLite file.
///
/// `file` and every attachment path are resolved relative to the directory
/// containing the config file, never the process working directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SqliteConnection {
    pub file: PathBuf,
    /// Additional files opened as named schemas, alias → path.
    #[serde(default)]
    pub attach: BTreeMap<String, PathBuf>,
}

/// Connection settings for a managed libsql/Turso database.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TursoConnection {
    pub url: String,
    /// Bearer token for the managed service.
    #[serde(default)]
    pub token: Option<String>,
    /// Additional databases attached as named schemas, alias → name.
    #[serde(default)]
    pub attach: BTreeMap<String, String>,
}

/// Connection settings for a MySQL server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MySqlConnection {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
}

/// Connection settings for a PostgreSQL server: a parameter bag where every
/// field is optional, libpq-style.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PostgresConnection {
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub database: Option<String>,
}

/// Backend connection, discriminated by the `driver` tag.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "driver", content = "connection", rename_all = "lowercase")]
pub enum ConnectionConfig {
    Sqlite(SqliteConnection),
    Turso(TursoConnection),
    Mysql(MySqlConnection),
    Postgres(PostgresConnection),
}

impl ConnectionConfig {
    /// The backend kind this configuration targets.
    pub fn kind(&self) -> DriverKind {
        match self {
            ConnectionConfig::Sqlite(_) => DriverKind::Sqlite,
            ConnectionConfig::Turso(_) => DriverKind::Turso,
            ConnectionConfig::Mysql(_) => DriverKind::Mysql,
            ConnectionConfig::Postgres(_) => DriverKind::Postgres,
        }
    }
}

/// Basic-auth credentials. The password defaults to the empty string.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    pub username: String,
    #[serde(default)]
    pub password: String,
}

/// Top-level config file schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(flatten)]
    pub connection: ConnectionConfig,

    /// HTTP port override.
    #[serde(default)]
    pub port: Option<u16>,

    /// Editor base URL override.
    #[serde(default)]
    pub studio: Option<String>,

    /// Basic-auth gate; enabled iff present.
    #[serde(default)]
    pub auth: Option<AuthConfig>,
}

impl GatewayConfig {
    /// Load configuration from a JSON file.
    ///
    /// # Errors
    /// Returns `ConfigError` if the file cannot be read or parsed.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&content)?;
        Ok(config)
    }
}
