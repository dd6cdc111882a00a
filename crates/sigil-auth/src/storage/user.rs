//! User lookup trait.

use async_trait::async_trait;
use time::OffsetDateTime;

use crate::AuthResult;
use crate::types::{User, UserId};

/// Read access to user accounts.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Finds the user whose `field` equals `value`.
    ///
    /// Unknown fields match nothing.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn find_by_identifier(&self, field: &str, value: &UserId) -> AuthResult<Option<User>>;

    /// Finds a user by login name.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn find_by_username(&self, username: &str) -> AuthResult<Option<User>>;

    /// Records a successful login.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn update_last_login(&self, user_id: i64, at: OffsetDateTime) -> AuthResult<()>;
}
