//! User domain types.
//!
//! A user is the identity anchor for message ownership. Usernames are unique
//! case-insensitively: the lowercase form is the storage key, while the
//! original casing is kept for display.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Storage-assigned user identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub i64);

impl UserId {
    /// Validate an id coming from outside the store.
    pub fn parse(raw: i64) -> Result<Self, ValidationError> {
        if raw > 0 {
            Ok(Self(raw))
        } else {
            Err(ValidationError::InvalidId(raw))
        }
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A stored user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    /// Display form, original casing preserved.
    pub username: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// The case-insensitive storage key for this user.
    pub fn normalized_username(&self) -> String {
        normalize_username(&self.username)
    }
}

/// Trim surrounding whitespace and reject empty usernames.
///
/// Returns the display form; use [`normalize_username`] for the storage key.
pub fn validate_username(raw: &str) -> Result<&str, ValidationError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::EmptyUsername);
    }
    Ok(trimmed)
}

/// Lowercase storage key for a username.
pub fn normalize_username(username: &str) -> String {
    username.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_username_is_case_insensitive() {
        assert_eq!(normalize_username("Alice"), "alice");
        assert_eq!(normalize_username("  ALICE "), "alice");
        assert_eq!(normalize_username("Ärger"), normalize_username("äRGER"));
    }

    #[test]
    fn test_validate_username_rejects_blank() {
        assert_eq!(validate_username("   "), Err(ValidationError::EmptyUsername));
        assert_eq!(validate_username(" Bob "), Ok("Bob"));
    }

    #[test]
    fn test_user_id_parse() {
        assert_eq!(UserId::parse(7), Ok(UserId(7)));
        assert_eq!(UserId::parse(0), Err(ValidationError::InvalidId(0)));
    }

    #[test]
    fn test_user_normalized_username_keeps_display() {
        let now = Utc::now();
        let user = User {
            id: UserId(1),
            username: "Alice".to_string(),
            created_at: now,
            updated_at: now,
        };
        assert_eq!(user.username, "Alice");
        assert_eq!(user.normalized_username(), "alice");
    }
}
