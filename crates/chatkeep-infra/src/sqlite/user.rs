//! SQLite user repository implementation.
//!
//! Implements `UserRepository` from `chatkeep-core`. Uniqueness is enforced by
//! the `normalized_username` column, so two callers racing to create the same
//! user (in any casing) end up with one row.

use chatkeep_core::repository::user::UserRepository;
use chatkeep_types::error::RepositoryError;
use chatkeep_types::user::{normalize_username, validate_username, User, UserId};
use sqlx::Row;
use sqlx::sqlite::{SqliteConnection, SqliteRow};
use tracing::debug;

use super::base::{self, Param, parse_datetime};
use super::pool::ConnectionManager;

const SELECT_USER: &str = "SELECT id, username, created_at, updated_at FROM users";

/// SQLite-backed implementation of `UserRepository`.
pub struct SqliteUserRepository {
    db: ConnectionManager,
}

impl SqliteUserRepository {
    pub fn new(db: ConnectionManager) -> Self {
        Self { db }
    }

    async fn find_normalized(
        conn: &mut SqliteConnection,
        normalized: &str,
    ) -> Result<Option<User>, RepositoryError> {
        let row = base::fetch_optional(
            conn,
            &format!("{SELECT_USER} WHERE normalized_username = ?"),
            &[normalized.into()],
        )
        .await?;
        row.map(|r| UserRow::from_row(&r)?.into_user()).transpose()
    }
}

/// Internal row type for mapping SQLite rows to domain User.
struct UserRow {
    id: i64,
    username: String,
    created_at: String,
    updated_at: String,
}

impl UserRow {
    fn from_row(row: &SqliteRow) -> Result<Self, RepositoryError> {
        Ok(Self {
            id: row.try_get("id").map_err(base::translate)?,
            username: row.try_get("username").map_err(base::translate)?,
            created_at: row.try_get("created_at").map_err(base::translate)?,
            updated_at: row.try_get("updated_at").map_err(base::translate)?,
        })
    }

    fn into_user(self) -> Result<User, RepositoryError> {
        Ok(User {
            id: UserId(self.id),
            username: self.username,
            created_at: parse_datetime(&self.created_at)?,
            updated_at: parse_datetime(&self.updated_at)?,
        })
    }
}

impl UserRepository for SqliteUserRepository {
    async fn find_by_username(&self, username: &str) -> Result<Option<User>, RepositoryError> {
        let normalized = normalize_username(username);
        if normalized.is_empty() {
            return Ok(None);
        }
        let mut conn = self.db.read().await?;
        Self::find_normalized(&mut conn, &normalized).await
    }

    async fn find_by_id(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
        let mut conn = self.db.read().await?;
        let row = base::fetch_optional(
            &mut *conn,
            &format!("{SELECT_USER} WHERE id = ?"),
            &[id.into()],
        )
        .await?;
        row.map(|r| UserRow::from_row(&r)?.into_user()).transpose()
    }

    async fn get_or_create(&self, username: &str) -> Result<User, RepositoryError> {
        let username = validate_username(username)?;
        let normalized = normalize_username(username);

        if let Some(existing) = self.find_by_username(&normalized).await? {
            return Ok(existing);
        }

        let mut tx = self.db.begin_write().await?;

        // The write lock is held from here on. A row committed by another
        // writer (in this process or another) while this one waited is visible.
        if let Some(existing) = Self::find_normalized(&mut tx, &normalized).await? {
            tx.rollback().await?;
            return Ok(existing);
        }

        let now = base::now();
        let inserted = base::insert_returning_id(
            &mut *tx,
            "INSERT INTO users (username, normalized_username, created_at, updated_at)
             VALUES (?, ?, ?, ?)",
            &[
                username.into(),
                normalized.as_str().into(),
                Param::from(&now),
                Param::from(&now),
            ],
        )
        .await;

        match inserted {
            Ok(id) => {
                tx.commit().await?;
                debug!(user_id = id, username, "Created user");
                Ok(User {
                    id: UserId(id),
                    username: username.to_string(),
                    created_at: now,
                    updated_at: now,
                })
            }
            Err(err) if err.is_conflict() => {
                // Lost a race against a writer outside this process.
                drop(tx);
                debug!(username, "User created concurrently; re-reading");
                self.find_by_username(&normalized)
                    .await?
                    .ok_or(RepositoryError::NotFound)
            }
            Err(err) => Err(err),
        }
    }

    async fn touch(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
        let mut tx = self.db.begin_write().await?;
        let updated = base::execute(
            &mut *tx,
            "UPDATE users SET updated_at = ? WHERE id = ?",
            &[Param::from(&base::now()), id.into()],
        )
        .await?;
        if updated == 0 {
            return Ok(None);
        }

        let row = base::fetch_one(&mut *tx, &format!("{SELECT_USER} WHERE id = ?"), &[id.into()]).await?;
        let user = UserRow::from_row(&row)?.into_user()?;
        tx.commit().await?;
        Ok(Some(user))
    }

    async fn delete(&self, id: UserId) -> Result<bool, RepositoryError> {
        let mut tx = self.db.begin_write().await?;
        let removed = base::execute(&mut *tx, "DELETE FROM users WHERE id = ?", &[id.into()]).await?;
        tx.commit().await?;
        if removed > 0 {
            debug!(user_id = %id, "Deleted user and its messages");
        }
        Ok(removed > 0)
    }
}
