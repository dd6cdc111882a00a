//! Revocation record storage trait.
//!
//! Outstanding records are written when a refresh token is issued, and
//! blacklisted records link one-to-one to an outstanding record when the
//! token is revoked. Both creation paths are create-or-get so concurrent
//! rotations of the same token converge on one record.

use async_trait::async_trait;
use time::OffsetDateTime;

use crate::AuthResult;
use crate::types::{BlacklistedToken, NewOutstandingToken, OutstandingToken, UserId};

/// Storage for outstanding and blacklisted refresh tokens.
#[async_trait]
pub trait RevocationStore: Send + Sync {
    /// Inserts a new outstanding record.
    ///
    /// # Errors
    ///
    /// Returns an error if a record with the same `jti` exists or the
    /// storage operation fails.
    async fn create_outstanding(&self, token: NewOutstandingToken) -> AuthResult<OutstandingToken>;

    /// Returns the outstanding record for `token.jti`, inserting `token` if
    /// there is none.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn get_or_create_outstanding(
        &self,
        token: NewOutstandingToken,
    ) -> AuthResult<OutstandingToken>;

    /// Finds an outstanding record by `jti`.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn find_outstanding(&self, jti: &str) -> AuthResult<Option<OutstandingToken>>;

    /// Lists outstanding records owned by `user_id`, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn list_outstanding_for_user(&self, user_id: &UserId) -> AuthResult<Vec<OutstandingToken>>;

    /// Returns the blacklist record for `outstanding_id`, creating it with
    /// `blacklisted_at` if there is none.
    ///
    /// # Errors
    ///
    /// Returns an error if the outstanding record does not exist or the
    /// storage operation fails.
    async fn get_or_create_blacklisted(
        &self,
        outstanding_id: i64,
        blacklisted_at: OffsetDateTime,
    ) -> AuthResult<BlacklistedToken>;

    /// Returns `true` if the outstanding record for `jti` is blacklisted.
    ///
    /// Called on every refresh token verification.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn is_blacklisted(&self, jti: &str) -> AuthResult<bool>;

    /// Deletes outstanding records with `expires_at <= now` together with
    /// their blacklist records.
    ///
    /// # Returns
    ///
    /// The number of outstanding records deleted.
    ///
    /// # Errors
    ///
    /// Returns an error if the cleanup operation fails.
    async fn flush_expired(&self, now: OffsetDateTime) -> AuthResult<u64>;
}
