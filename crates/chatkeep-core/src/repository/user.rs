//! User repository trait definition.

use chatkeep_types::error::RepositoryError;
use chatkeep_types::user::{User, UserId};

/// Repository trait for user persistence.
///
/// Usernames are unique case-insensitively. Uses native async fn in traits
/// (RPITIT, Rust 2024 edition).
pub trait UserRepository: Send + Sync {
    /// Case-insensitive lookup. A missing user is `Ok(None)`, not an error.
    fn find_by_username(
        &self,
        username: &str,
    ) -> impl std::future::Future<Output = Result<Option<User>, RepositoryError>> + Send;

    /// Lookup by storage id.
    fn find_by_id(
        &self,
        id: UserId,
    ) -> impl std::future::Future<Output = Result<Option<User>, RepositoryError>> + Send;

    /// Return the user with this username, creating it if absent.
    ///
    /// Concurrent calls for the same username (in any casing) resolve to a
    /// single stored row.
    fn get_or_create(
        &self,
        username: &str,
    ) -> impl std::future::Future<Output = Result<User, RepositoryError>> + Send;

    /// Refresh `updated_at`. Returns the rewritten user, or `None` if absent.
    fn touch(
        &self,
        id: UserId,
    ) -> impl std::future::Future<Output = Result<Option<User>, RepositoryError>> + Send;

    /// Delete the user and, by cascade, all of its messages.
    /// Returns `true` if a row was removed.
    fn delete(
        &self,
        id: UserId,
    ) -> impl std::future::Future<Output = Result<bool, RepositoryError>> + Send;
}
