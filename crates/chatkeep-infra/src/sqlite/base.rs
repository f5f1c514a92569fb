//! Statement execution helpers shared by the SQLite repositories.
//!
//! Every statement is parameterized: values travel as positional [`Param`]s
//! and are bound by the driver, never spliced into SQL text. Driver errors
//! are translated into [`RepositoryError`] here, so nothing above this module
//! sees a `sqlx::Error`.

use chatkeep_types::chat::MessageId;
use chatkeep_types::error::{RepositoryError, StorageError};
use chatkeep_types::user::UserId;
use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use sqlx::error::ErrorKind;
use sqlx::query::Query;
use sqlx::sqlite::{Sqlite, SqliteArguments, SqliteRow};
use sqlx::Executor;

use super::pool;

/// A positional statement parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum Param {
    Int(i64),
    Text(String),
    Null,
}

impl From<i64> for Param {
    fn from(v: i64) -> Self {
        Param::Int(v)
    }
}

impl From<u32> for Param {
    fn from(v: u32) -> Self {
        Param::Int(i64::from(v))
    }
}

impl From<&str> for Param {
    fn from(v: &str) -> Self {
        Param::Text(v.to_string())
    }
}

impl From<String> for Param {
    fn from(v: String) -> Self {
        Param::Text(v)
    }
}

impl From<UserId> for Param {
    fn from(v: UserId) -> Self {
        Param::Int(v.0)
    }
}

impl From<MessageId> for Param {
    fn from(v: MessageId) -> Self {
        Param::Int(v.0)
    }
}

impl From<&DateTime<Utc>> for Param {
    fn from(v: &DateTime<Utc>) -> Self {
        Param::Text(format_datetime(v))
    }
}

impl<T: Into<Param>> From<Option<T>> for Param {
    fn from(v: Option<T>) -> Self {
        v.map_or(Param::Null, Into::into)
    }
}

fn bind_params<'q>(sql: &'q str, params: &'q [Param]) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    params.iter().fold(sqlx::query(sql), |query, param| match param {
        Param::Int(v) => query.bind(*v),
        Param::Text(v) => query.bind(v.as_str()),
        Param::Null => query.bind(Option::<i64>::None),
    })
}

/// Execute and return exactly one row. No row is [`RepositoryError::NotFound`].
pub async fn fetch_one<'c, E>(executor: E, sql: &str, params: &[Param]) -> Result<SqliteRow, RepositoryError>
where
    E: Executor<'c, Database = Sqlite>,
{
    bind_params(sql, params)
        .fetch_one(executor)
        .await
        .map_err(translate)
}

/// Execute and return at most one row.
pub async fn fetch_optional<'c, E>(
    executor: E,
    sql: &str,
    params: &[Param],
) -> Result<Option<SqliteRow>, RepositoryError>
where
    E: Executor<'c, Database = Sqlite>,
{
    bind_params(sql, params)
        .fetch_optional(executor)
        .await
        .map_err(translate)
}

/// Execute and return every row.
pub async fn fetch_all<'c, E>(executor: E, sql: &str, params: &[Param]) -> Result<Vec<SqliteRow>, RepositoryError>
where
    E: Executor<'c, Database = Sqlite>,
{
    bind_params(sql, params)
        .fetch_all(executor)
        .await
        .map_err(translate)
}

/// Execute for effect only. Returns the number of affected rows.
pub async fn execute<'c, E>(executor: E, sql: &str, params: &[Param]) -> Result<u64, RepositoryError>
where
    E: Executor<'c, Database = Sqlite>,
{
    bind_params(sql, params)
        .execute(executor)
        .await
        .map(|done| done.rows_affected())
        .map_err(translate)
}

/// Execute an INSERT and return the generated rowid.
pub async fn insert_returning_id<'c, E>(executor: E, sql: &str, params: &[Param]) -> Result<i64, RepositoryError>
where
    E: Executor<'c, Database = Sqlite>,
{
    bind_params(sql, params)
        .execute(executor)
        .await
        .map(|done| done.last_insert_rowid())
        .map_err(translate)
}

/// Map a driver error onto the repository error taxonomy, keeping the cause.
pub fn translate(err: sqlx::Error) -> RepositoryError {
    if pool::is_transient(&err) {
        return RepositoryError::Storage(pool::storage_error(err, 1));
    }

    match err {
        sqlx::Error::RowNotFound => RepositoryError::NotFound,
        sqlx::Error::Database(db) => {
            let message = db.message().to_string();
            let kind = db.kind();
            let source = Box::new(sqlx::Error::Database(db));
            match kind {
                ErrorKind::UniqueViolation => RepositoryError::Conflict { message, source },
                ErrorKind::ForeignKeyViolation => RepositoryError::ForeignKey { message, source },
                ErrorKind::NotNullViolation | ErrorKind::CheckViolation => {
                    RepositoryError::Constraint { message, source }
                }
                _ => RepositoryError::Statement { message, source },
            }
        }
        err @ (sqlx::Error::ColumnNotFound(_)
        | sqlx::Error::ColumnDecode { .. }
        | sqlx::Error::ColumnIndexOutOfBounds { .. }
        | sqlx::Error::Decode(_)) => RepositoryError::Mapping(err.to_string()),
        err @ (sqlx::Error::Io(_)
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed
        | sqlx::Error::Configuration(_)) => {
            RepositoryError::Storage(StorageError::Connection(Box::new(err)))
        }
        err => RepositoryError::Statement {
            message: err.to_string(),
            source: Box::new(err),
        },
    }
}

/// Current time at the precision the store keeps.
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// Fixed-width RFC 3339 (microseconds, `Z` suffix) so that lexical order of
/// stored timestamps equals chronological order.
pub fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn parse_datetime(s: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Mapping(format!("invalid datetime '{s}': {e}")))
}
