//! SQLite message repository implementation.
//!
//! Messages are append-only. Retrieval order is newest first by timestamp,
//! with ties broken by ascending id so insertion order is stable.

use chatkeep_core::repository::message::MessageRepository;
use chatkeep_types::chat::{ChatMessage, MessageId, MessageRole, NewChatMessage, Provider};
use chatkeep_types::error::RepositoryError;
use chatkeep_types::user::UserId;
use chrono::SubsecRound;
use sqlx::Row;
use sqlx::sqlite::SqliteRow;
use tracing::debug;

use super::base::{self, Param, parse_datetime};
use super::pool::ConnectionManager;

const SELECT_MESSAGE: &str =
    "SELECT id, user_id, provider, role, content, timestamp FROM chat_messages";

/// SQLite-backed implementation of `MessageRepository`.
pub struct SqliteMessageRepository {
    db: ConnectionManager,
}

impl SqliteMessageRepository {
    pub fn new(db: ConnectionManager) -> Self {
        Self { db }
    }
}

struct MessageRow {
    id: i64,
    user_id: i64,
    provider: String,
    role: String,
    content: String,
    timestamp: String,
}

impl MessageRow {
    fn from_row(row: &SqliteRow) -> Result<Self, RepositoryError> {
        Ok(Self {
            id: row.try_get("id").map_err(base::translate)?,
            user_id: row.try_get("user_id").map_err(base::translate)?,
            provider: row.try_get("provider").map_err(base::translate)?,
            role: row.try_get("role").map_err(base::translate)?,
            content: row.try_get("content").map_err(base::translate)?,
            timestamp: row.try_get("timestamp").map_err(base::translate)?,
        })
    }

    fn into_message(self) -> Result<ChatMessage, RepositoryError> {
        let provider: Provider = self
            .provider
            .parse()
            .map_err(|e| RepositoryError::Mapping(format!("stored message {}: {e}", self.id)))?;
        let role: MessageRole = self
            .role
            .parse()
            .map_err(|e| RepositoryError::Mapping(format!("stored message {}: {e}", self.id)))?;

        Ok(ChatMessage {
            id: MessageId(self.id),
            user_id: UserId(self.user_id),
            provider,
            role,
            content: self.content,
            timestamp: parse_datetime(&self.timestamp)?,
        })
    }
}

fn into_messages(rows: Vec<SqliteRow>) -> Result<Vec<ChatMessage>, RepositoryError> {
    rows.iter()
        .map(|row| MessageRow::from_row(row)?.into_message())
        .collect()
}

impl MessageRepository for SqliteMessageRepository {
    async fn save(&self, message: &NewChatMessage) -> Result<ChatMessage, RepositoryError> {
        let user_id = UserId::parse(message.user_id.0)?;
        let timestamp = message.timestamp.trunc_subsecs(6);

        let mut tx = self.db.begin_write().await?;
        let id = base::insert_returning_id(
            &mut *tx,
            "INSERT INTO chat_messages (user_id, provider, role, content, timestamp)
             VALUES (?, ?, ?, ?, ?)",
            &[
                user_id.into(),
                message.provider.as_str().into(),
                message.role.as_str().into(),
                message.content.as_str().into(),
                Param::from(&timestamp),
            ],
        )
        .await?;
        tx.commit().await?;

        debug!(message_id = id, user_id = %user_id, role = %message.role, "Saved message");
        Ok(message.clone().at(timestamp).into_stored(MessageId(id)))
    }

    async fn find_by_id(&self, id: MessageId) -> Result<Option<ChatMessage>, RepositoryError> {
        let mut conn = self.db.read().await?;
        let row = base::fetch_optional(
            &mut *conn,
            &format!("{SELECT_MESSAGE} WHERE id = ?"),
            &[id.into()],
        )
        .await?;
        row.map(|r| MessageRow::from_row(&r)?.into_message())
            .transpose()
    }

    async fn find_by_user(
        &self,
        user_id: UserId,
        limit: u32,
    ) -> Result<Vec<ChatMessage>, RepositoryError> {
        self.find_by_user_paged(user_id, limit, 0).await
    }

    async fn find_by_user_paged(
        &self,
        user_id: UserId,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<ChatMessage>, RepositoryError> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let mut conn = self.db.read().await?;
        let rows = base::fetch_all(
            &mut *conn,
            &format!(
                "{SELECT_MESSAGE} WHERE user_id = ? ORDER BY timestamp DESC, id ASC LIMIT ? OFFSET ?"
            ),
            &[user_id.into(), limit.into(), offset.into()],
        )
        .await?;
        into_messages(rows)
    }

    async fn count_by_user(&self, user_id: UserId) -> Result<u64, RepositoryError> {
        let mut conn = self.db.read().await?;
        let row = base::fetch_one(
            &mut *conn,
            "SELECT COUNT(*) AS n FROM chat_messages WHERE user_id = ?",
            &[user_id.into()],
        )
        .await?;
        let n: i64 = row.try_get("n").map_err(base::translate)?;
        Ok(n.max(0) as u64)
    }

    async fn clear_by_user(&self, user_id: UserId) -> Result<u64, RepositoryError> {
        let mut tx = self.db.begin_write().await?;
        let removed = base::execute(
            &mut *tx,
            "DELETE FROM chat_messages WHERE user_id = ?",
            &[user_id.into()],
        )
        .await?;
        tx.commit().await?;
        debug!(user_id = %user_id, removed, "Cleared messages");
        Ok(removed)
    }
}
