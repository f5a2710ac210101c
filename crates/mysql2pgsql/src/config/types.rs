//! Configuration type definitions.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration structure.
///
/// Mirrors the YAML layout of the config file: a `mysql` source block, a
/// `destination` block holding either a `file` path or a `postgres` block,
/// table filters, and behavior flags.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Source database configuration (MySQL).
    pub mysql: SourceConfig,

    /// Destination configuration: file or PostgreSQL database.
    pub destination: DestinationConfig,

    /// If non-empty, only the listed tables are converted.
    #[serde(default)]
    pub only_tables: Vec<String>,

    /// Tables excluded from the conversion. Ignored for tables listed
    /// in `only_tables`.
    #[serde(default)]
    pub exclude_tables: Vec<String>,

    /// Export schema only, no data.
    #[serde(default)]
    pub supress_data: bool,

    /// Export data only, no schema.
    #[serde(default)]
    pub supress_ddl: bool,

    /// Truncate tables before loading instead of drop/create.
    #[serde(default)]
    pub force_truncate: bool,

    /// Abort the run on the first failed table.
    #[serde(default)]
    pub fail_fast: bool,

    /// Rows fetched from MySQL per batch (default: 10000).
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

/// Source database (MySQL) configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Database host.
    #[serde(default = "default_hostname")]
    pub hostname: String,

    /// Database port (default: 3306).
    #[serde(default = "default_mysql_port")]
    pub port: u16,

    /// Unix socket path. Takes precedence over hostname/port when set.
    #[serde(default)]
    pub socket: Option<PathBuf>,

    /// Username.
    pub username: String,

    /// Password.
    #[serde(default)]
    pub password: Option<String>,

    /// Database name.
    pub database: String,

    /// Connection character set (default: utf8mb4).
    #[serde(default = "default_charset")]
    pub charset: String,

    /// Wire compression flag. Accepted for config compatibility but
    /// has no effect on the connection.
    #[serde(default)]
    pub compress: bool,
}

impl std::fmt::Debug for SourceConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceConfig")
            .field("hostname", &self.hostname)
            .field("port", &self.port)
            .field("socket", &self.socket)
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .field("database", &self.database)
            .field("charset", &self.charset)
            .field("compress", &self.compress)
            .finish()
    }
}

/// Destination configuration. Exactly one of `file` or `postgres` must be set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DestinationConfig {
    /// Output file path. When set, output goes to the file.
    #[serde(default)]
    pub file: Option<PathBuf>,

    /// Target PostgreSQL database.
    #[serde(default)]
    pub postgres: Option<PostgresConfig>,
}

/// Target database (PostgreSQL) configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct PostgresConfig {
    /// Database host.
    #[serde(default = "default_hostname")]
    pub hostname: String,

    /// Database port (default: 5432).
    #[serde(default = "default_pg_port")]
    pub port: u16,

    /// Username.
    pub username: String,

    /// Password.
    #[serde(default)]
    pub password: Option<String>,

    /// Database name.
    pub database: String,
}

impl std::fmt::Debug for PostgresConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresConfig")
            .field("hostname", &self.hostname)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .field("database", &self.database)
            .finish()
    }
}

fn default_hostname() -> String {
    "localhost".to_string()
}

fn default_mysql_port() -> u16 {
    3306
}

fn default_pg_port() -> u16 {
    5432
}

fn default_charset() -> String {
    "utf8mb4".to_string()
}

fn default_batch_size() -> usize {
    10_000
}
