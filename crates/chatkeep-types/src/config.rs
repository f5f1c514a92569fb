//! Configuration types for Chatkeep.
//!
//! `AppConfig` mirrors the optional `chatkeep.toml` file. Every field has a
//! default, so an empty file (or no file) is a valid configuration.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Default location of the database file, relative to the working directory.
pub const DEFAULT_DATABASE_PATH: &str = "./chat_history.db";

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Settings for the embedded SQLite store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Path of the single database file.
    #[serde(default = "default_path")]
    pub path: PathBuf,

    /// How long SQLite waits on a locked database before reporting busy.
    #[serde(default = "default_busy_timeout_secs")]
    pub busy_timeout_secs: u64,

    /// Size of the read-only connection pool.
    #[serde(default = "default_max_readers")]
    pub max_readers: u32,

    /// Attempts made to acquire a connection when the database is busy.
    #[serde(default = "default_acquire_retries")]
    pub acquire_retries: u32,
}

fn default_path() -> PathBuf {
    PathBuf::from(DEFAULT_DATABASE_PATH)
}

fn default_busy_timeout_secs() -> u64 {
    5
}

fn default_max_readers() -> u32 {
    8
}

fn default_acquire_retries() -> u32 {
    3
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_path(),
            busy_timeout_secs: default_busy_timeout_secs(),
            max_readers: default_max_readers(),
            acquire_retries: default_acquire_retries(),
        }
    }
}

impl DatabaseConfig {
    /// Defaults with a specific database file.
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }
}

/// Log output settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,

    /// Export spans through OpenTelemetry (stdout exporter).
    #[serde(default)]
    pub otel: bool,
}
