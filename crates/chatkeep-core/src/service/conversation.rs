//! Conversation service: the use-case layer over the user and message
//! repositories.
//!
//! Adapters (chat UI, CLI) go through this service to resolve the speaking
//! user, persist turns, and load history for provider context.

use chatkeep_types::chat::{ChatMessage, MessageRole, NewChatMessage, Provider};
use chatkeep_types::error::RepositoryError;
use chatkeep_types::user::{User, UserId};
use tracing::{debug, info};

use crate::repository::{MessageRepository, UserRepository};

/// Default number of turns loaded as provider context.
pub const DEFAULT_HISTORY_LIMIT: u32 = 50;

/// Orchestrates users and their conversation history.
///
/// Generic over `UserRepository` and `MessageRepository` so chatkeep-core
/// never depends on chatkeep-infra.
pub struct ConversationService<U: UserRepository, M: MessageRepository> {
    users: U,
    messages: M,
}

impl<U: UserRepository, M: MessageRepository> ConversationService<U, M> {
    pub fn new(users: U, messages: M) -> Self {
        Self { users, messages }
    }

    pub fn users(&self) -> &U {
        &self.users
    }

    pub fn messages(&self) -> &M {
        &self.messages
    }

    /// Resolve the speaking user, creating it on first contact.
    pub async fn start(&self, username: &str) -> Result<User, RepositoryError> {
        let user = self.users.get_or_create(username).await?;
        debug!(user_id = %user.id, username = %user.username, "Conversation started");
        Ok(user)
    }

    /// Persist one turn given untyped role/provider names.
    ///
    /// Unknown roles or providers are rejected before the store is touched.
    pub async fn record(
        &self,
        user_id: UserId,
        provider: &str,
        role: &str,
        content: impl Into<String>,
    ) -> Result<ChatMessage, RepositoryError> {
        let message = NewChatMessage::parse(user_id.0, provider, role, content)?;
        self.messages.save(&message).await
    }

    /// Persist one already-typed turn.
    pub async fn record_turn(
        &self,
        user_id: UserId,
        provider: Provider,
        role: MessageRole,
        content: impl Into<String>,
    ) -> Result<ChatMessage, RepositoryError> {
        let message = NewChatMessage::new(user_id, provider, role, content);
        self.messages.save(&message).await
    }

    /// The most recent `limit` turns, oldest first, ready for provider context.
    pub async fn history(
        &self,
        user_id: UserId,
        limit: u32,
    ) -> Result<Vec<ChatMessage>, RepositoryError> {
        let mut recent = self.messages.find_by_user(user_id, limit).await?;
        recent.reverse();
        Ok(recent)
    }

    /// Drop a user's history, keeping the user.
    pub async fn forget(&self, user_id: UserId) -> Result<u64, RepositoryError> {
        let removed = self.messages.clear_by_user(user_id).await?;
        info!(user_id = %user_id, removed, "Conversation history cleared");
        Ok(removed)
    }

    /// Delete a user and, by cascade, everything they said.
    /// Returns `false` if no such user exists.
    pub async fn remove_user(&self, username: &str) -> Result<bool, RepositoryError> {
        match self.users.find_by_username(username).await? {
            Some(user) => {
                let removed = self.users.delete(user.id).await?;
                if removed {
                    info!(user_id = %user.id, username = %user.username, "User deleted");
                }
                Ok(removed)
            }
            None => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatkeep_types::chat::MessageId;
    use chatkeep_types::error::ValidationError;
    use chatkeep_types::user::normalize_username;
    use chrono::{Duration, Utc};
    use std::sync::Mutex;

    // --- In-memory fakes ---

    #[derive(Default)]
    struct FakeUsers {
        rows: Mutex<Vec<User>>,
    }

    impl UserRepository for FakeUsers {
        async fn find_by_username(&self, username: &str) -> Result<Option<User>, RepositoryError> {
            let key = normalize_username(username);
            let rows = self.rows.lock().unwrap();
            Ok(rows.iter().find(|u| u.normalized_username() == key).cloned())
        }

        async fn find_by_id(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
            let rows = self.rows.lock().unwrap();
            Ok(rows.iter().find(|u| u.id == id).cloned())
        }

        async fn get_or_create(&self, username: &str) -> Result<User, RepositoryError> {
            let key = normalize_username(username);
            let mut rows = self.rows.lock().unwrap();
            if let Some(user) = rows.iter().find(|u| u.normalized_username() == key) {
                return Ok(user.clone());
            }
            let now = Utc::now();
            let user = User {
                id: UserId(rows.len() as i64 + 1),
                username: username.to_string(),
                created_at: now,
                updated_at: now,
            };
            rows.push(user.clone());
            Ok(user)
        }

        async fn touch(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
            let mut rows = self.rows.lock().unwrap();
            Ok(rows.iter_mut().find(|u| u.id == id).map(|u| {
                u.updated_at = Utc::now();
                u.clone()
            }))
        }

        async fn delete(&self, id: UserId) -> Result<bool, RepositoryError> {
            let mut rows = self.rows.lock().unwrap();
            let before = rows.len();
            rows.retain(|u| u.id != id);
            Ok(rows.len() < before)
        }
    }

    #[derive(Default)]
    struct FakeMessages {
        rows: Mutex<Vec<ChatMessage>>,
    }

    impl FakeMessages {
        fn sorted_for(&self, user_id: UserId) -> Vec<ChatMessage> {
            let rows = self.rows.lock().unwrap();
            let mut owned: Vec<ChatMessage> =
                rows.iter().filter(|m| m.user_id == user_id).cloned().collect();
            owned.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then(a.id.cmp(&b.id)));
            owned
        }
    }

    impl MessageRepository for FakeMessages {
        async fn save(&self, message: &NewChatMessage) -> Result<ChatMessage, RepositoryError> {
            let mut rows = self.rows.lock().unwrap();
            let stored = message.clone().into_stored(MessageId(rows.len() as i64 + 1));
            rows.push(stored.clone());
            Ok(stored)
        }

        async fn find_by_id(&self, id: MessageId) -> Result<Option<ChatMessage>, RepositoryError> {
            let rows = self.rows.lock().unwrap();
            Ok(rows.iter().find(|m| m.id == id).cloned())
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
            Ok(self
                .sorted_for(user_id)
                .into_iter()
                .skip(offset as usize)
                .take(limit as usize)
                .collect())
        }

        async fn count_by_user(&self, user_id: UserId) -> Result<u64, RepositoryError> {
            Ok(self.sorted_for(user_id).len() as u64)
        }

        async fn clear_by_user(&self, user_id: UserId) -> Result<u64, RepositoryError> {
            let mut rows = self.rows.lock().unwrap();
            let before = rows.len();
            rows.retain(|m| m.user_id != user_id);
            Ok((before - rows.len()) as u64)
        }
    }

    fn service() -> ConversationService<FakeUsers, FakeMessages> {
        ConversationService::new(FakeUsers::default(), FakeMessages::default())
    }

    // --- Tests ---

    #[tokio::test]
    async fn test_start_is_idempotent_across_casing() {
        let svc = service();
        let first = svc.start("Alice").await.unwrap();
        let second = svc.start("alice").await.unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(second.username, "Alice");
    }

    #[tokio::test]
    async fn test_record_rejects_unknown_role() {
        let svc = service();
        let user = svc.start("bob").await.unwrap();

        let err = svc.record(user.id, "ollama", "moderator", "hi").await.unwrap_err();
        assert!(matches!(
            err,
            RepositoryError::Validation(ValidationError::UnknownRole(_))
        ));
        assert_eq!(svc.messages().count_by_user(user.id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_record_rejects_unknown_provider() {
        let svc = service();
        let user = svc.start("bob").await.unwrap();

        let err = svc.record(user.id, "skynet", "user", "hi").await.unwrap_err();
        assert!(matches!(
            err,
            RepositoryError::Validation(ValidationError::UnknownProvider(_))
        ));
    }

    #[tokio::test]
    async fn test_history_is_chronological() {
        let svc = service();
        let user = svc.start("carol").await.unwrap();
        let base = Utc::now();

        for (i, text) in ["one", "two", "three"].iter().enumerate() {
            let msg = NewChatMessage::new(user.id, Provider::Ollama, MessageRole::User, *text)
                .at(base + Duration::seconds(i as i64));
            svc.messages().save(&msg).await.unwrap();
        }

        let history = svc.history(user.id, 2).await.unwrap();
        let texts: Vec<&str> = history.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(texts, vec!["two", "three"]);
    }

    #[tokio::test]
    async fn test_forget_keeps_user() {
        let svc = service();
        let user = svc.start("dave").await.unwrap();
        svc.record_turn(user.id, Provider::Zai, MessageRole::User, "hello")
            .await
            .unwrap();

        assert_eq!(svc.forget(user.id).await.unwrap(), 1);
        assert!(svc.history(user.id, 10).await.unwrap().is_empty());
        assert!(svc.users().find_by_id(user.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_remove_user_missing() {
        let svc = service();
        assert!(!svc.remove_user("nobody").await.unwrap());

        svc.start("Erin").await.unwrap();
        assert!(svc.remove_user("ERIN").await.unwrap());
        assert!(svc.users().find_by_username("erin").await.unwrap().is_none());
    }
}
