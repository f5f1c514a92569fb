//! Chat message domain types.
//!
//! Messages are immutable turns of a conversation. `MessageRole` and
//! `Provider` are closed enumerations: any other string is a
//! [`ValidationError`] at the boundary.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::user::UserId;

/// Storage-assigned message identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub i64);

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Role of the message author.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
    System,
}

impl MessageRole {
    pub const ALL: [MessageRole; 3] = [MessageRole::User, MessageRole::Assistant, MessageRole::System];

    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
            MessageRole::System => "system",
        }
    }
}

impl fmt::Display for MessageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageRole {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "user" => Ok(MessageRole::User),
            "assistant" => Ok(MessageRole::Assistant),
            "system" => Ok(MessageRole::System),
            _ => Err(ValidationError::UnknownRole(s.to_string())),
        }
    }
}

/// LLM provider that produced (or received) a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Ollama,
    OpenRouter,
    Zai,
}

impl Provider {
    pub const ALL: [Provider; 3] = [Provider::Ollama, Provider::OpenRouter, Provider::Zai];

    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Ollama => "ollama",
            Provider::OpenRouter => "openrouter",
            Provider::Zai => "zai",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ollama" => Ok(Provider::Ollama),
            "openrouter" => Ok(Provider::OpenRouter),
            "zai" => Ok(Provider::Zai),
            _ => Err(ValidationError::UnknownProvider(s.to_string())),
        }
    }
}

/// A stored conversation turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: MessageId,
    pub user_id: UserId,
    pub provider: Provider,
    pub role: MessageRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

/// A message that has not been stored yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewChatMessage {
    pub user_id: UserId,
    pub provider: Provider,
    pub role: MessageRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl NewChatMessage {
    /// Build a message stamped with the current time.
    pub fn new(
        user_id: UserId,
        provider: Provider,
        role: MessageRole,
        content: impl Into<String>,
    ) -> Self {
        Self {
            user_id,
            provider,
            role,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    /// Build a message from untyped input, validating role and provider.
    pub fn parse(
        user_id: i64,
        provider: &str,
        role: &str,
        content: impl Into<String>,
    ) -> Result<Self, ValidationError> {
        let user_id = UserId::parse(user_id)?;
        let provider: Provider = provider.parse()?;
        let role: MessageRole = role.parse()?;
        Ok(Self::new(user_id, provider, role, content))
    }

    /// Override the creation timestamp.
    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Attach the storage-assigned id.
    pub fn into_stored(self, id: MessageId) -> ChatMessage {
        ChatMessage {
            id,
            user_id: self.user_id,
            provider: self.provider,
            role: self.role,
            content: self.content,
            timestamp: self.timestamp,
        }
    }
}
