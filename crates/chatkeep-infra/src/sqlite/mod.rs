//! SQLite storage layer.
//!
//! Repository implementations backed by SQLite with WAL mode and split
//! read/write connection pools, plus the schema migration runner.

pub mod base;
pub mod message;
pub mod migrate;
pub mod pool;
pub mod user;

use chatkeep_types::config::DatabaseConfig;
use chatkeep_types::error::MigrationError;
use tracing::info;

use self::migrate::{MigrationReport, MigrationRunner};
use self::pool::ConnectionManager;

/// Open the database and bring its schema up to date.
///
/// This is the startup path: repositories should only be handed a manager
/// returned from here. The report says what this call applied.
pub async fn open_store(
    config: &DatabaseConfig,
) -> Result<(ConnectionManager, MigrationReport), MigrationError> {
    let db = ConnectionManager::open(config).await?;
    let report = MigrationRunner::embedded(db.clone()).run().await?;
    info!(
        path = %db.path().display(),
        schema_version = report.current_version,
        applied = report.applied.len(),
        "Database ready"
    );
    Ok((db, report))
}

#[cfg(test)]
pub(crate) async fn test_store() -> (tempfile::TempDir, ConnectionManager) {
    let dir = tempfile::tempdir().unwrap();
    let (db, _) = open_store(&DatabaseConfig::at(dir.path().join("chat_history.db")))
        .await
        .unwrap();
    (dir, db)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_open_store_is_repeatable() {
        let dir = tempfile::tempdir().unwrap();
        let config = DatabaseConfig::at(dir.path().join("again.db"));

        let (first, report) = open_store(&config).await.unwrap();
        assert_eq!(report.applied, vec![1, 2, 3]);
        first.close().await;

        let (second, report) = open_store(&config).await.unwrap();
        assert!(report.applied.is_empty());
        let version = MigrationRunner::embedded(second).current_version().await.unwrap();
        assert_eq!(version, 3);
    }

    #[tokio::test]
    async fn test_open_store_in_missing_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let config = DatabaseConfig::at(dir.path().join("nope").join("chat.db"));
        let err = open_store(&config).await.err().unwrap();
        assert!(matches!(err, MigrationError::Storage(_)), "got {err:?}");
    }
}
