//! Configuration loader for Chatkeep.
//!
//! Reads `chatkeep.toml` and deserializes it into [`AppConfig`]. A missing
//! file means defaults; a malformed one is reported to the caller. The
//! `DATABASE_PATH` environment variable overrides the configured database file.

use std::path::Path;

use chatkeep_types::config::AppConfig;
use chatkeep_types::error::ConfigError;

/// Default config file name, looked up in the working directory.
pub const CONFIG_FILE_NAME: &str = "chatkeep.toml";

/// Environment variable that overrides `database.path`.
pub const DATABASE_PATH_ENV: &str = "DATABASE_PATH";

/// Load configuration from `path`.
///
/// A missing file yields [`AppConfig::default()`]. A file that exists but
/// cannot be read or parsed is an error, left to the caller to report.
pub async fn load_config(path: &Path) -> Result<AppConfig, ConfigError> {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No config found at {}, using defaults", path.display());
            return Ok(AppConfig::default());
        }
        Err(source) => {
            return Err(ConfigError::Read {
                path: path.display().to_string(),
                source,
            });
        }
    };

    toml::from_str::<AppConfig>(&content).map_err(|e| ConfigError::Parse {
        path: path.display().to_string(),
        source: Box::new(e),
    })
}

/// Replace the database path with `value` when it is set and non-blank.
pub fn apply_database_path_override(config: &mut AppConfig, value: Option<String>) {
    if let Some(path) = value.filter(|v| !v.trim().is_empty()) {
        tracing::debug!(%path, "Database path overridden");
        config.database.path = path.into();
    }
}

/// Apply overrides from the process environment.
pub fn apply_env_overrides(config: &mut AppConfig) {
    apply_database_path_override(config, std::env::var(DATABASE_PATH_ENV).ok());
}
