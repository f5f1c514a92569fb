//! Connection manager with split reader/writer pools in WAL mode.
//!
//! SQLite allows only one writer at a time. `ConnectionManager` owns a
//! multi-connection read-only pool for concurrent reads and a single-connection
//! writer pool for serialized writes. Writers queue on an async gate, so a
//! second writer waits for the first instead of failing. Both pools use WAL
//! journal mode, enforce foreign keys, and set a busy timeout.
//!
//! Handles are RAII scoped: dropping a [`WriteTransaction`] without committing
//! rolls it back and returns the connection, which also covers cancellation
//! of the future that held it.

use std::ops::{Deref, DerefMut};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chatkeep_types::config::DatabaseConfig;
use chatkeep_types::error::StorageError;
use sqlx::pool::PoolConnection;
use sqlx::sqlite::{
    Sqlite, SqliteConnectOptions, SqliteConnection, SqliteJournalMode, SqlitePool,
    SqlitePoolOptions,
};
use sqlx::Transaction;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, warn};

/// Delay before the first retry of a busy acquisition; doubles per attempt.
const RETRY_BASE_DELAY: Duration = Duration::from_millis(50);

/// Process-wide access point to the database file.
///
/// Cheap to clone: clones share the same pools and writer gate. Every
/// repository receives a clone at construction time.
#[derive(Clone)]
pub struct ConnectionManager {
    reader: SqlitePool,
    writer: SqlitePool,
    write_gate: Arc<Mutex<()>>,
    path: Arc<PathBuf>,
    acquire_retries: u32,
}

impl ConnectionManager {
    /// Open (creating if missing) the database file described by `config`.
    ///
    /// The parent directory must already exist. Does not run migrations; see
    /// [`crate::sqlite::open_store`] for the startup path that does.
    pub async fn open(config: &DatabaseConfig) -> Result<Self, StorageError> {
        let path = config.path.clone();
        let open_error = |e: sqlx::Error| StorageError::Open {
            path: path.display().to_string(),
            source: Box::new(e),
        };

        let base_opts = SqliteConnectOptions::new()
            .filename(&path)
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(config.busy_timeout_secs));

        let read_opts = base_opts.clone().read_only(true).create_if_missing(false);
        let write_opts = base_opts.create_if_missing(true);

        // Writer first: it creates the file and switches it to WAL before
        // any read-only connection opens it.
        let writer = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(write_opts)
            .await
            .map_err(open_error)?;

        let reader = SqlitePoolOptions::new()
            .max_connections(config.max_readers.max(1))
            .connect_with(read_opts)
            .await
            .map_err(open_error)?;

        debug!(path = %path.display(), "Database opened");

        Ok(Self {
            reader,
            writer,
            write_gate: Arc::new(Mutex::new(())),
            path: Arc::new(path),
            acquire_retries: config.acquire_retries.max(1),
        })
    }

    /// Path of the underlying database file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Acquire a read-only connection for one logical operation.
    ///
    /// Reads never wait for the writer gate.
    pub async fn read(&self) -> Result<PoolConnection<Sqlite>, StorageError> {
        self.with_retry("read", || self.reader.acquire()).await
    }

    /// Acquire exclusive use of the writer connection without opening a
    /// transaction. Used by the migration runner, which commits one
    /// transaction per migration while holding exclusivity throughout.
    pub async fn exclusive(&self) -> Result<ExclusiveConnection, StorageError> {
        let permit = self.write_gate.clone().lock_owned().await;
        let conn = self.with_retry("exclusive", || self.writer.acquire()).await?;
        Ok(ExclusiveConnection {
            conn,
            _permit: permit,
        })
    }

    /// Begin a write transaction. Waits (without erroring) while another
    /// writer holds the gate.
    ///
    /// The transaction starts with `BEGIN IMMEDIATE`, so the database write
    /// lock is taken here, where busy timeout and retry apply, rather than
    /// at the first write statement. Another process holding the lock shows
    /// up as a wait here instead of a busy error mid-transaction.
    pub async fn begin_write(&self) -> Result<WriteTransaction, StorageError> {
        let permit = self.write_gate.clone().lock_owned().await;
        let tx = self
            .with_retry("begin_write", || self.writer.begin_with("BEGIN IMMEDIATE"))
            .await?;
        Ok(WriteTransaction { tx, _permit: permit })
    }

    /// Close both pools. Outstanding handles finish first.
    pub async fn close(&self) {
        self.writer.close().await;
        self.reader.close().await;
        debug!(path = %self.path.display(), "Database closed");
    }

    async fn with_retry<T, F, Fut>(&self, op: &'static str, mut attempt_fn: F) -> Result<T, StorageError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, sqlx::Error>>,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match attempt_fn().await {
                Ok(value) => return Ok(value),
                Err(err) if is_transient(&err) && attempt < self.acquire_retries => {
                    let delay = RETRY_BASE_DELAY * 2u32.pow(attempt - 1);
                    warn!(op, attempt, delay_ms = delay.as_millis() as u64, "Database busy, retrying");
                    tokio::time::sleep(delay).await;
                }
                Err(err) => return Err(storage_error(err, attempt)),
            }
        }
    }
}

/// Exclusive hold on the writer connection.
///
/// Derefs to the raw connection; transactions opened on it roll back on drop.
pub struct ExclusiveConnection {
    conn: PoolConnection<Sqlite>,
    _permit: OwnedMutexGuard<()>,
}

impl Deref for ExclusiveConnection {
    type Target = SqliteConnection;

    fn deref(&self) -> &SqliteConnection {
        &self.conn
    }
}

impl DerefMut for ExclusiveConnection {
    fn deref_mut(&mut self) -> &mut SqliteConnection {
        &mut self.conn
    }
}

/// An open write transaction holding the writer gate.
///
/// Either [`commit`](Self::commit) it, or drop it to roll back.
pub struct WriteTransaction {
    // Field order matters: the transaction (and its connection) is released
    // before the gate opens for the next writer.
    tx: Transaction<'static, Sqlite>,
    _permit: OwnedMutexGuard<()>,
}

impl WriteTransaction {
    pub async fn commit(self) -> Result<(), StorageError> {
        self.tx.commit().await.map_err(|e| storage_error(e, 1))
    }

    pub async fn rollback(self) -> Result<(), StorageError> {
        self.tx.rollback().await.map_err(|e| storage_error(e, 1))
    }
}

impl Deref for WriteTransaction {
    type Target = SqliteConnection;

    fn deref(&self) -> &SqliteConnection {
        &self.tx
    }
}

impl DerefMut for WriteTransaction {
    fn deref_mut(&mut self) -> &mut SqliteConnection {
        &mut self.tx
    }
}

/// SQLITE_BUSY / SQLITE_LOCKED (including extended codes) or pool exhaustion.
pub(crate) fn is_transient(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::PoolTimedOut => true,
        sqlx::Error::Database(db) => db
            .code()
            .and_then(|code| code.parse::<i32>().ok())
            .is_some_and(|code| matches!(code & 0xff, 5 | 6)),
        _ => false,
    }
}

pub(crate) fn storage_error(err: sqlx::Error, attempts: u32) -> StorageError {
    if is_transient(&err) {
        StorageError::Busy {
            attempts,
            source: Box::new(err),
        }
    } else {
        StorageError::Connection(Box::new(err))
    }
}
