//! Message repository trait definition.
//!
//! Defines append-only storage and ordered retrieval of conversation turns.
//! The infrastructure layer (chatkeep-infra) implements this trait with
//! SQLite persistence.

use chatkeep_types::chat::{ChatMessage, MessageId, NewChatMessage};
use chatkeep_types::error::RepositoryError;
use chatkeep_types::user::UserId;

/// Repository trait for chat message persistence.
///
/// Messages are never updated. They are created one at a time and removed
/// only in bulk per owner (or by cascade when the owner is deleted).
pub trait MessageRepository: Send + Sync {
    /// Insert a message and return it with its storage-assigned id.
    fn save(
        &self,
        message: &NewChatMessage,
    ) -> impl std::future::Future<Output = Result<ChatMessage, RepositoryError>> + Send;

    /// Lookup by storage id.
    fn find_by_id(
        &self,
        id: MessageId,
    ) -> impl std::future::Future<Output = Result<Option<ChatMessage>, RepositoryError>> + Send;

    /// Most recent messages of a user: timestamp DESC, ties by id ASC.
    fn find_by_user(
        &self,
        user_id: UserId,
        limit: u32,
    ) -> impl std::future::Future<Output = Result<Vec<ChatMessage>, RepositoryError>> + Send;

    /// Same ordering as [`find_by_user`](Self::find_by_user), skipping `offset` rows.
    fn find_by_user_paged(
        &self,
        user_id: UserId,
        limit: u32,
        offset: u32,
    ) -> impl std::future::Future<Output = Result<Vec<ChatMessage>, RepositoryError>> + Send;

    /// Number of messages owned by a user.
    fn count_by_user(
        &self,
        user_id: UserId,
    ) -> impl std::future::Future<Output = Result<u64, RepositoryError>> + Send;

    /// Delete every message of a user in one statement. Returns the count removed.
    /// The user row itself is untouched.
    fn clear_by_user(
        &self,
        user_id: UserId,
    ) -> impl std::future::Future<Output = Result<u64, RepositoryError>> + Send;
}
