//! Blacklisted refresh token storage for PostgreSQL.
//!
//! At most one row per outstanding record (`token_id` is unique). Rows are
//! removed with their outstanding record.

use sigil_auth::types::BlacklistedToken;
use sqlx_core::query::query;
use sqlx_core::query_as::query_as;
use sqlx_core::query_scalar::query_scalar;
use time::OffsetDateTime;

use crate::{PgPool, StorageError, StorageResult};

type BlacklistedTuple = (i64, i64, OffsetDateTime);

fn from_tuple((id, token_id, blacklisted_at): BlacklistedTuple) -> BlacklistedToken {
    BlacklistedToken {
        id,
        token_id,
        blacklisted_at,
    }
}

// =============================================================================
// Blacklisted Token Storage
// =============================================================================

/// Blacklist operations on `sigil_blacklisted_token`.
pub struct BlacklistedTokenStorage<'a> {
    pool: &'a PgPool,
}

impl<'a> BlacklistedTokenStorage<'a> {
    #[must_use]
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Blacklists an outstanding record, returning the existing row if it
    /// is already blacklisted.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if no outstanding record has id `token_id`, or a
    /// database error.
    pub async fn get_or_create(
        &self,
        token_id: i64,
        blacklisted_at: OffsetDateTime,
    ) -> StorageResult<BlacklistedToken> {
        query(
            r#"
            INSERT INTO sigil_blacklisted_token (token_id, blacklisted_at)
            VALUES ($1, $2)
            ON CONFLICT (token_id) DO NOTHING
            "#,
        )
        .bind(token_id)
        .bind(blacklisted_at)
        .execute(self.pool)
        .await
        .map_err(|e| match &e {
            sqlx_core::Error::Database(db) if db.is_foreign_key_violation() => {
                StorageError::not_found(format!("Outstanding token {token_id}"))
            }
            _ => StorageError::Database(e),
        })?;

        let row: BlacklistedTuple = query_as(
            r#"
            SELECT id, token_id, blacklisted_at
            FROM sigil_blacklisted_token
            WHERE token_id = $1
            "#,
        )
        .bind(token_id)
        .fetch_one(self.pool)
        .await?;

        Ok(from_tuple(row))
    }

    /// Returns `true` if the outstanding record for `jti` is blacklisted.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn is_blacklisted(&self, jti: &str) -> StorageResult<bool> {
        let exists: bool = query_scalar(
            r#"
            SELECT EXISTS(
                SELECT 1
                FROM sigil_blacklisted_token b
                JOIN sigil_outstanding_token o ON o.id = b.token_id
                WHERE o.jti = $1
            )
            "#,
        )
        .bind(jti)
        .fetch_one(self.pool)
        .await?;

        Ok(exists)
    }

    /// Get the count of blacklisted tokens.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn count(&self) -> StorageResult<i64> {
        let count: i64 = query_scalar("SELECT COUNT(*) FROM sigil_blacklisted_token")
            .fetch_one(self.pool)
            .await?;

        Ok(count)
    }
}
