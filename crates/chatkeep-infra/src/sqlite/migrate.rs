//! Schema migration set and runner.
//!
//! Migrations are numbered units of SQL, applied in ascending version order,
//! each in its own transaction together with its bookkeeping row in
//! `schema_migrations`. Only versions above the highest recorded one are
//! applied, so an interrupted run resumes where it stopped. The runner holds
//! the writer connection exclusively for the whole convergence.

use std::borrow::Cow;
use std::collections::{BTreeMap, HashSet};

use chatkeep_types::error::MigrationError;
use chatkeep_types::migration::MigrationRecord;
use sha2::{Digest, Sha256};
use sqlx::sqlite::{SqliteConnection, SqliteRow};
use sqlx::{Connection, Row};
use tracing::{debug, info, warn};

use super::base::{format_datetime, now, parse_datetime};
use super::pool::ConnectionManager;

const BOOKKEEPING_TABLE_SQL: &str = "CREATE TABLE IF NOT EXISTS schema_migrations (
    version     INTEGER PRIMARY KEY,
    description TEXT NOT NULL,
    checksum    TEXT NOT NULL,
    applied_at  TEXT NOT NULL
)";

/// Application schema, embedded at compile time.
const EMBEDDED: &[Migration] = &[
    Migration::embedded(
        1,
        "create users",
        include_str!("../../../../migrations/0001_create_users.sql"),
    ),
    Migration::embedded(
        2,
        "create chat messages",
        include_str!("../../../../migrations/0002_create_chat_messages.sql"),
    ),
    Migration::embedded(
        3,
        "index chat messages by user and time",
        include_str!("../../../../migrations/0003_index_chat_messages.sql"),
    ),
];

/// One versioned schema change. `sql` may hold several statements.
#[derive(Debug, Clone)]
pub struct Migration {
    pub version: i64,
    pub description: Cow<'static, str>,
    pub sql: Cow<'static, str>,
}

impl Migration {
    pub const fn embedded(version: i64, description: &'static str, sql: &'static str) -> Self {
        Self {
            version,
            description: Cow::Borrowed(description),
            sql: Cow::Borrowed(sql),
        }
    }

    pub fn new(version: i64, description: impl Into<String>, sql: impl Into<String>) -> Self {
        Self {
            version,
            description: Cow::Owned(description.into()),
            sql: Cow::Owned(sql.into()),
        }
    }

    /// Lowercase hex SHA-256 of the SQL text.
    pub fn checksum(&self) -> String {
        format!("{:x}", Sha256::digest(self.sql.as_bytes()))
    }
}

/// An ordered set of migrations with unique, positive versions.
///
/// Gaps between versions are allowed.
#[derive(Debug, Clone)]
pub struct MigrationSet {
    migrations: Vec<Migration>,
}

impl MigrationSet {
    pub fn new(mut migrations: Vec<Migration>) -> Result<Self, MigrationError> {
        if let Some(bad) = migrations.iter().find(|m| m.version <= 0) {
            return Err(MigrationError::InvalidVersion(bad.version));
        }
        migrations.sort_by_key(|m| m.version);
        if let Some(pair) = migrations.windows(2).find(|w| w[0].version == w[1].version) {
            return Err(MigrationError::DuplicateVersion(pair[0].version));
        }
        Ok(Self { migrations })
    }

    /// The schema this build of the application expects.
    pub fn embedded() -> Self {
        Self {
            migrations: EMBEDDED.to_vec(),
        }
    }

    /// Highest known version, 0 for an empty set.
    pub fn latest_version(&self) -> i64 {
        self.migrations.last().map_or(0, |m| m.version)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Migration> {
        self.migrations.iter()
    }

    fn get(&self, version: i64) -> Option<&Migration> {
        self.migrations
            .binary_search_by_key(&version, |m| m.version)
            .ok()
            .map(|i| &self.migrations[i])
    }
}

/// Outcome of one convergence run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationReport {
    /// Versions applied by this run, ascending.
    pub applied: Vec<i64>,
    /// Highest recorded version after the run.
    pub current_version: i64,
}

/// Brings a database's schema to the latest version of a [`MigrationSet`].
pub struct MigrationRunner {
    db: ConnectionManager,
    migrations: MigrationSet,
}

impl MigrationRunner {
    pub fn new(db: ConnectionManager, migrations: MigrationSet) -> Self {
        Self { db, migrations }
    }

    /// Runner over the embedded application schema.
    pub fn embedded(db: ConnectionManager) -> Self {
        Self::new(db, MigrationSet::embedded())
    }

    /// Apply every pending migration. A no-op on a converged database.
    ///
    /// Stops at the first failing migration; its transaction is rolled back
    /// and nothing after it is attempted.
    pub async fn run(&self) -> Result<MigrationReport, MigrationError> {
        let mut exclusive = self.db.exclusive().await?;
        let conn: &mut SqliteConnection = &mut exclusive;

        sqlx::query(BOOKKEEPING_TABLE_SQL)
            .execute(&mut *conn)
            .await
            .map_err(|e| MigrationError::Bookkeeping(e.to_string()))?;

        let recorded = load_records(&mut *conn).await?;
        self.verify_checksums(&recorded)?;

        let current = recorded.keys().next_back().copied().unwrap_or(0);
        let latest = self.migrations.latest_version();
        if current > latest {
            warn!(
                current,
                latest, "Database schema is newer than this build knows about"
            );
        }
        for skipped in self
            .migrations
            .iter()
            .filter(|m| m.version < current && !recorded.contains_key(&m.version))
        {
            warn!(
                version = skipped.version,
                current, "Migration below the recorded version was never applied; skipping"
            );
        }

        let mut applied = Vec::new();
        for migration in self.migrations.iter().filter(|m| m.version > current) {
            apply_one(&mut *conn, migration).await?;
            info!(
                version = migration.version,
                description = %migration.description,
                "Applied migration"
            );
            applied.push(migration.version);
        }

        let current_version = applied.last().copied().unwrap_or(current);
        if applied.is_empty() {
            debug!(current_version, "Schema already up to date");
        }
        Ok(MigrationReport {
            applied,
            current_version,
        })
    }

    /// Highest recorded version; 0 when the bookkeeping table does not exist.
    pub async fn current_version(&self) -> Result<i64, MigrationError> {
        Ok(self.history().await?.last().map_or(0, |r| r.version))
    }

    /// Applied migrations in version order.
    pub async fn history(&self) -> Result<Vec<MigrationRecord>, MigrationError> {
        let mut pooled = self.db.read().await?;
        let conn: &mut SqliteConnection = &mut pooled;
        if !bookkeeping_exists(&mut *conn).await? {
            return Ok(Vec::new());
        }
        Ok(load_records(&mut *conn).await?.into_values().collect())
    }

    fn verify_checksums(&self, recorded: &BTreeMap<i64, MigrationRecord>) -> Result<(), MigrationError> {
        let mut unknown = HashSet::new();
        for record in recorded.values() {
            match self.migrations.get(record.version) {
                Some(known) => {
                    let expected = known.checksum();
                    if expected != record.checksum {
                        return Err(MigrationError::ChecksumMismatch {
                            version: record.version,
                            recorded: record.checksum.clone(),
                            expected,
                        });
                    }
                }
                None => {
                    unknown.insert(record.version);
                }
            }
        }
        if !unknown.is_empty() {
            warn!(?unknown, "Database records migrations this build does not know");
        }
        Ok(())
    }
}

async fn apply_one(conn: &mut SqliteConnection, migration: &Migration) -> Result<(), MigrationError> {
    let failed = |e: sqlx::Error| MigrationError::Failed {
        version: migration.version,
        description: migration.description.to_string(),
        source: Box::new(e),
    };

    let mut tx = conn.begin_with("BEGIN IMMEDIATE").await.map_err(failed)?;

    sqlx::Executor::execute(&mut *tx, sqlx::raw_sql(&migration.sql))
        .await
        .map_err(failed)?;

    sqlx::query(
        "INSERT INTO schema_migrations (version, description, checksum, applied_at)
         VALUES (?, ?, ?, ?)",
    )
    .bind(migration.version)
    .bind(&*migration.description)
    .bind(migration.checksum())
    .bind(format_datetime(&now()))
    .execute(&mut *tx)
    .await
    .map_err(failed)?;

    tx.commit().await.map_err(failed)
}

async fn bookkeeping_exists(conn: &mut SqliteConnection) -> Result<bool, MigrationError> {
    let row: (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'schema_migrations'",
    )
    .fetch_one(&mut *conn)
    .await
    .map_err(|e| MigrationError::Bookkeeping(e.to_string()))?;
    Ok(row.0 > 0)
}

async fn load_records(conn: &mut SqliteConnection) -> Result<BTreeMap<i64, MigrationRecord>, MigrationError> {
    let rows = sqlx::query(
        "SELECT version, description, checksum, applied_at FROM schema_migrations ORDER BY version",
    )
    .fetch_all(&mut *conn)
    .await
    .map_err(|e| MigrationError::Bookkeeping(e.to_string()))?;

    rows.iter()
        .map(|row| record_from_row(row).map(|r| (r.version, r)))
        .collect()
}

fn record_from_row(row: &SqliteRow) -> Result<MigrationRecord, MigrationError> {
    let bookkeeping = |e: sqlx::Error| MigrationError::Bookkeeping(e.to_string());
    let applied_at: String = row.try_get("applied_at").map_err(bookkeeping)?;
    Ok(MigrationRecord {
        version: row.try_get("version").map_err(bookkeeping)?,
        description: row.try_get("description").map_err(bookkeeping)?,
        checksum: row.try_get("checksum").map_err(bookkeeping)?,
        applied_at: parse_datetime(&applied_at)
            .map_err(|e| MigrationError::Bookkeeping(e.to_string()))?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatkeep_types::config::DatabaseConfig;

    async fn test_manager() -> (tempfile::TempDir, ConnectionManager) {
        let dir = tempfile::tempdir().unwrap();
        let manager = ConnectionManager::open(&DatabaseConfig::at(dir.path().join("migrate.db")))
            .await
            .unwrap();
        (dir, manager)
    }

    async fn table_names(manager: &ConnectionManager) -> Vec<String> {
        let mut conn = manager.read().await.unwrap();
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
        )
        .fetch_all(&mut *conn)
        .await
        .unwrap();
        rows.into_iter().map(|r| r.0).collect()
    }

    async fn schema_sql(manager: &ConnectionManager) -> Vec<String> {
        let mut conn = manager.read().await.unwrap();
        let rows: Vec<(Option<String>,)> =
            sqlx::query_as("SELECT sql FROM sqlite_master ORDER BY type, name")
                .fetch_all(&mut *conn)
                .await
                .unwrap();
        rows.into_iter().filter_map(|r| r.0).collect()
    }

    fn set(migrations: Vec<Migration>) -> MigrationSet {
        MigrationSet::new(migrations).unwrap()
    }

    #[test]
    fn test_embedded_set_is_valid() {
        let embedded = MigrationSet::new(EMBEDDED.to_vec()).unwrap();
        let versions: Vec<i64> = embedded.iter().map(|m| m.version).collect();
        assert_eq!(versions, vec![1, 2, 3]);
        assert_eq!(MigrationSet::embedded().latest_version(), 3);
    }

    #[test]
    fn test_set_sorts_and_tolerates_gaps() {
        let s = set(vec![
            Migration::new(10, "c", "SELECT 1"),
            Migration::new(1, "a", "SELECT 1"),
            Migration::new(5, "b", "SELECT 1"),
        ]);
        let versions: Vec<i64> = s.iter().map(|m| m.version).collect();
        assert_eq!(versions, vec![1, 5, 10]);
        assert_eq!(s.latest_version(), 10);
    }

    #[test]
    fn test_set_rejects_duplicates_and_non_positive() {
        let dup = MigrationSet::new(vec![
            Migration::new(1, "a", "SELECT 1"),
            Migration::new(1, "b", "SELECT 2"),
        ]);
        assert!(matches!(dup, Err(MigrationError::DuplicateVersion(1))));

        let zero = MigrationSet::new(vec![Migration::new(0, "a", "SELECT 1")]);
        assert!(matches!(zero, Err(MigrationError::InvalidVersion(0))));
    }

    #[test]
    fn test_checksum_tracks_sql() {
        let a = Migration::new(1, "a", "CREATE TABLE a (x INTEGER)");
        let b = Migration::new(1, "a", "CREATE TABLE a (y INTEGER)");
        assert_eq!(a.checksum().len(), 64);
        assert_ne!(a.checksum(), b.checksum());
    }

    #[tokio::test]
    async fn test_fresh_database_is_version_zero() {
        let (_dir, manager) = test_manager().await;
        let runner = MigrationRunner::embedded(manager);
        assert_eq!(runner.current_version().await.unwrap(), 0);
        assert!(runner.history().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_embedded_migrations_create_schema() {
        let (_dir, manager) = test_manager().await;
        let runner = MigrationRunner::embedded(manager.clone());

        let report = runner.run().await.unwrap();
        assert_eq!(report.applied, vec![1, 2, 3]);
        assert_eq!(report.current_version, 3);

        let tables = table_names(&manager).await;
        assert!(tables.contains(&"users".to_string()), "users table missing");
        assert!(tables.contains(&"chat_messages".to_string()), "chat_messages table missing");
        assert!(tables.contains(&"schema_migrations".to_string()));

        let history = runner.history().await.unwrap();
        assert_eq!(history.len(), 3);
        assert_eq!(history[1].description, "create chat messages");
    }

    #[tokio::test]
    async fn test_second_run_is_noop() {
        let (_dir, manager) = test_manager().await;
        let runner = MigrationRunner::embedded(manager.clone());

        runner.run().await.unwrap();
        let history_once = runner.history().await.unwrap();
        let schema_once = schema_sql(&manager).await;

        let report = runner.run().await.unwrap();
        assert!(report.applied.is_empty());
        assert_eq!(report.current_version, 3);
        assert_eq!(runner.history().await.unwrap(), history_once);
        assert_eq!(schema_sql(&manager).await, schema_once);
    }

    #[tokio::test]
    async fn test_resume_after_interruption_applies_only_remaining() {
        let (_dir, manager) = test_manager().await;
        let v1 = Migration::new(1, "first", "CREATE TABLE first (id INTEGER PRIMARY KEY)");
        let v2 = Migration::new(2, "second", "CREATE TABLE second (id INTEGER PRIMARY KEY)");

        // Interrupted after version 1: only version 1 made it.
        MigrationRunner::new(manager.clone(), set(vec![v1.clone()]))
            .run()
            .await
            .unwrap();
        let runner = MigrationRunner::new(manager.clone(), set(vec![v1, v2]));
        let v1_record = runner.history().await.unwrap().remove(0);

        let report = runner.run().await.unwrap();
        assert_eq!(report.applied, vec![2]);

        let history = runner.history().await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0], v1_record, "version 1 bookkeeping must be unchanged");
        assert!(table_names(&manager).await.contains(&"second".to_string()));
    }

    #[tokio::test]
    async fn test_failed_migration_rolls_back_and_stops() {
        let (_dir, manager) = test_manager().await;
        let runner = MigrationRunner::new(
            manager.clone(),
            set(vec![
                Migration::new(1, "good", "CREATE TABLE good (id INTEGER)"),
                Migration::new(
                    2,
                    "broken",
                    "CREATE TABLE partial (id INTEGER); CREATE TABL oops (id INTEGER);",
                ),
                Migration::new(3, "after", "CREATE TABLE after_broken (id INTEGER)"),
            ]),
        );

        let err = runner.run().await.unwrap_err();
        assert!(matches!(err, MigrationError::Failed { version: 2, .. }), "got {err:?}");
        assert_eq!(err.version(), Some(2));

        assert_eq!(runner.current_version().await.unwrap(), 1);
        let tables = table_names(&manager).await;
        assert!(tables.contains(&"good".to_string()));
        assert!(!tables.contains(&"partial".to_string()), "failed migration must roll back entirely");
        assert!(!tables.contains(&"after_broken".to_string()), "later migrations must not run");
    }

    #[tokio::test]
    async fn test_fixed_migration_applies_on_rerun() {
        let (_dir, manager) = test_manager().await;
        let good = Migration::new(1, "good", "CREATE TABLE good (id INTEGER)");
        let broken = MigrationRunner::new(
            manager.clone(),
            set(vec![good.clone(), Migration::new(2, "fix me", "NOT SQL")]),
        );
        assert!(broken.run().await.is_err());

        let fixed = MigrationRunner::new(
            manager,
            set(vec![good, Migration::new(2, "fix me", "CREATE TABLE fixed (id INTEGER)")]),
        );
        assert_eq!(fixed.run().await.unwrap().applied, vec![2]);
    }

    #[tokio::test]
    async fn test_modified_applied_migration_is_rejected() {
        let (_dir, manager) = test_manager().await;
        MigrationRunner::new(
            manager.clone(),
            set(vec![Migration::new(1, "t", "CREATE TABLE t (a INTEGER)")]),
        )
        .run()
        .await
        .unwrap();

        let drifted = MigrationRunner::new(
            manager,
            set(vec![
                Migration::new(1, "t", "CREATE TABLE t (b INTEGER)"),
                Migration::new(2, "u", "CREATE TABLE u (a INTEGER)"),
            ]),
        );
        let err = drifted.run().await.unwrap_err();
        assert!(matches!(err, MigrationError::ChecksumMismatch { version: 1, .. }));
        assert_eq!(drifted.current_version().await.unwrap(), 1);
    }

    fn assert_send<T: Send>(_: &T) {}

    #[tokio::test]
    async fn test_run_and_history_futures_are_send() {
        let (_dir, manager) = test_manager().await;
        let runner = MigrationRunner::embedded(manager);

        let run = runner.run();
        assert_send(&run);
        run.await.unwrap();

        let history = runner.history();
        assert_send(&history);
        assert_eq!(history.await.unwrap().len(), 3);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_runs_apply_each_version_once() {
        let (_dir, manager) = test_manager().await;

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let runner = MigrationRunner::embedded(manager.clone());
                tokio::spawn(async move { runner.run().await })
            })
            .collect();

        let mut applied = Vec::new();
        for handle in handles {
            applied.extend(handle.await.unwrap().unwrap().applied);
        }
        applied.sort();
        assert_eq!(applied, vec![1, 2, 3]);

        let history = MigrationRunner::embedded(manager).history().await.unwrap();
        assert_eq!(history.len(), 3);
    }
}
