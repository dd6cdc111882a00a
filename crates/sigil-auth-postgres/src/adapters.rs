//! Arc-owning storage adapters implementing the sigil-auth storage traits.
//!
//! These wrap the lifetime-based storage types and own an `Arc<PgPool>`, so
//! they can be handed to the token layer as `Arc<dyn RevocationStore>` or
//! `Arc<dyn UserStore>`.

use std::sync::Arc;

use async_trait::async_trait;
use sigil_auth::storage::{RevocationStore, UserStore};
use sigil_auth::types::{BlacklistedToken, NewOutstandingToken, OutstandingToken, User, UserId};
use sigil_auth::AuthResult;
use time::OffsetDateTime;

use crate::PgPool;
use crate::blacklist::BlacklistedTokenStorage;
use crate::outstanding::OutstandingTokenStorage;
use crate::user::UserStorage;

// =============================================================================
// Revocation Store
// =============================================================================

/// PostgreSQL revocation store.
#[derive(Debug, Clone)]
pub struct PostgresRevocationStore {
    pool: Arc<PgPool>,
}

impl PostgresRevocationStore {
    #[must_use]
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RevocationStore for PostgresRevocationStore {
    async fn create_outstanding(&self, token: NewOutstandingToken) -> AuthResult<OutstandingToken> {
        let storage = OutstandingTokenStorage::new(&self.pool);
        Ok(storage.create(&token).await?)
    }

    async fn get_or_create_outstanding(
        &self,
        token: NewOutstandingToken,
    ) -> AuthResult<OutstandingToken> {
        let storage = OutstandingTokenStorage::new(&self.pool);
        Ok(storage.get_or_create(&token).await?)
    }

    async fn find_outstanding(&self, jti: &str) -> AuthResult<Option<OutstandingToken>> {
        let storage = OutstandingTokenStorage::new(&self.pool);
        Ok(storage.find_by_jti(jti).await?)
    }

    async fn list_outstanding_for_user(&self, user_id: &UserId) -> AuthResult<Vec<OutstandingToken>> {
        let storage = OutstandingTokenStorage::new(&self.pool);
        Ok(storage.list_for_user(user_id).await?)
    }

    async fn get_or_create_blacklisted(
        &self,
        outstanding_id: i64,
        blacklisted_at: OffsetDateTime,
    ) -> AuthResult<BlacklistedToken> {
        let storage = BlacklistedTokenStorage::new(&self.pool);
        Ok(storage.get_or_create(outstanding_id, blacklisted_at).await?)
    }

    async fn is_blacklisted(&self, jti: &str) -> AuthResult<bool> {
        let storage = BlacklistedTokenStorage::new(&self.pool);
        Ok(storage.is_blacklisted(jti).await?)
    }

    async fn flush_expired(&self, now: OffsetDateTime) -> AuthResult<u64> {
        let storage = OutstandingTokenStorage::new(&self.pool);
        let removed = storage.delete_expired(now).await?;
        tracing::info!(removed, "Flushed expired outstanding tokens");
        Ok(removed)
    }
}

// =============================================================================
// User Store
// =============================================================================

/// PostgreSQL user store.
#[derive(Debug, Clone)]
pub struct PostgresUserStore {
    pool: Arc<PgPool>,
}

impl PostgresUserStore {
    #[must_use]
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    /// Creates a user unless the username is taken.
    ///
    /// Returns `None` if a user with that name already exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub async fn create_if_missing(
        &self,
        username: &str,
        password_hash: Option<&str>,
        is_active: bool,
    ) -> AuthResult<Option<User>> {
        let storage = UserStorage::new(&self.pool);
        match storage.create(username, password_hash, is_active).await {
            Ok(user) => Ok(Some(user)),
            Err(e) if e.is_conflict() => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl UserStore for PostgresUserStore {
    async fn find_by_identifier(&self, field: &str, value: &UserId) -> AuthResult<Option<User>> {
        let storage = UserStorage::new(&self.pool);
        Ok(storage.find_by_identifier(field, value).await?)
    }

    async fn find_by_username(&self, username: &str) -> AuthResult<Option<User>> {
        let storage = UserStorage::new(&self.pool);
        Ok(storage.find_by_username(username).await?)
    }

    async fn update_last_login(&self, user_id: i64, at: OffsetDateTime) -> AuthResult<()> {
        let storage = UserStorage::new(&self.pool);
        Ok(storage.update_last_login(user_id, at).await?)
    }
}
