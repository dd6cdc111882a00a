//! PostgreSQL storage backend for sigil-auth
//!
//! Provides persistent storage for:
//!
//! - Outstanding refresh tokens (`sigil_outstanding_token`)
//! - Blacklisted refresh tokens (`sigil_blacklisted_token`)
//! - Users (`sigil_user`)
//!
//! Tables are created by the embedded migrations in [`migrations`].
//!
//! # Example
//!
//! ```ignore
//! use sigil_auth_postgres::PostgresAuthStorage;
//!
//! let storage = PostgresAuthStorage::connect("postgres://localhost/sigil").await?;
//! storage.migrate().await?;
//!
//! let ctx = TokenContext::new(settings, clock)?
//!     .with_revocation_store(Arc::new(storage.revocation_store()));
//! ```

pub mod adapters;
pub mod blacklist;
pub mod migrations;
pub mod outstanding;
pub mod user;

use std::sync::Arc;

use sigil_auth::AuthError;
use sqlx_core::pool::Pool;
use sqlx_postgres::Postgres;

/// PostgreSQL connection pool type alias.
pub type PgPool = Pool<Postgres>;

pub use adapters::{PostgresRevocationStore, PostgresUserStore};
pub use blacklist::BlacklistedTokenStorage;
pub use outstanding::OutstandingTokenStorage;
pub use user::UserStorage;

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] sqlx_core::Error),

    /// Requested record was not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Record already exists (conflict).
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Serialization/deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Schema migration failed.
    #[error("Migration error: {0}")]
    Migration(String),
}

impl StorageError {
    // -------------------------------------------------------------------------
    // Constructor Methods
    // -------------------------------------------------------------------------

    /// Create a `NotFound` error.
    #[must_use]
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound(resource.into())
    }

    /// Create a `Conflict` error.
    #[must_use]
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }

    // -------------------------------------------------------------------------
    // Predicate Methods
    // -------------------------------------------------------------------------

    /// Returns `true` if this is a `NotFound` error.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Returns `true` if this is a `Conflict` error.
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }

    /// Returns `true` if this is a database error.
    #[must_use]
    pub fn is_database_error(&self) -> bool {
        matches!(self, Self::Database(_))
    }
}

impl From<StorageError> for AuthError {
    fn from(e: StorageError) -> Self {
        AuthError::storage(e.to_string())
    }
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Maps a unique violation to `Conflict` and leaves other errors as they are.
pub(crate) fn conflict_on_unique(e: sqlx_core::Error, message: impl Into<String>) -> StorageError {
    match &e {
        sqlx_core::Error::Database(db) if db.is_unique_violation() => {
            StorageError::conflict(message)
        }
        _ => StorageError::Database(e),
    }
}

// =============================================================================
// PostgreSQL Auth Storage
// =============================================================================

/// PostgreSQL storage backend.
///
/// Holds a connection pool and hands out the borrowed storage types and the
/// `Arc`-owning trait adapters.
#[derive(Debug, Clone)]
pub struct PostgresAuthStorage {
    pool: Arc<PgPool>,
}

impl PostgresAuthStorage {
    /// Create new storage with an existing connection pool.
    #[must_use]
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    /// Create new storage by connecting to the database.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection fails.
    pub async fn connect(database_url: &str) -> StorageResult<Self> {
        use sqlx_core::pool::PoolOptions;
        let pool = PoolOptions::<Postgres>::new().connect(database_url).await?;
        Ok(Self::new(Arc::new(pool)))
    }

    /// Applies pending schema migrations.
    ///
    /// # Errors
    ///
    /// Returns an error if a migration fails.
    pub async fn migrate(&self) -> StorageResult<()> {
        migrations::run(&self.pool).await
    }

    /// Get a reference to the connection pool.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    // -------------------------------------------------------------------------
    // Storage Accessors
    // -------------------------------------------------------------------------

    #[must_use]
    pub fn outstanding(&self) -> OutstandingTokenStorage<'_> {
        OutstandingTokenStorage::new(&self.pool)
    }

    #[must_use]
    pub fn blacklist(&self) -> BlacklistedTokenStorage<'_> {
        BlacklistedTokenStorage::new(&self.pool)
    }

    #[must_use]
    pub fn users(&self) -> UserStorage<'_> {
        UserStorage::new(&self.pool)
    }

    /// Revocation store adapter sharing this pool.
    #[must_use]
    pub fn revocation_store(&self) -> PostgresRevocationStore {
        PostgresRevocationStore::new(Arc::clone(&self.pool))
    }

    /// User store adapter sharing this pool.
    #[must_use]
    pub fn user_store(&self) -> PostgresUserStore {
        PostgresUserStore::new(Arc::clone(&self.pool))
    }
}

// =============================================================================
// Tests
// =============================================================================
