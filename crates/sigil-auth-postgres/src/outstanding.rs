//! Outstanding refresh token storage for PostgreSQL.
//!
//! One row per issued refresh token, keyed by `jti`. The owning user id is
//! stored as JSONB so integer and string identifiers round-trip unchanged.

use serde_json::Value;
use sigil_auth::types::{NewOutstandingToken, OutstandingToken, UserId};
use sqlx_core::query::query;
use sqlx_core::query_as::query_as;
use time::OffsetDateTime;

use crate::{PgPool, StorageResult, conflict_on_unique};

type OutstandingTuple = (
    i64,
    Option<Value>,
    String,
    String,
    Option<OffsetDateTime>,
    OffsetDateTime,
);

const COLUMNS: &str = "id, user_id, jti, token_hash, created_at, expires_at";

pub(crate) fn from_tuple(row: OutstandingTuple) -> OutstandingToken {
    let (id, user_id, jti, token_hash, created_at, expires_at) = row;
    OutstandingToken {
        id,
        user_id: user_id.as_ref().and_then(UserId::from_claim),
        jti,
        token_hash,
        created_at,
        expires_at,
    }
}

// =============================================================================
// Outstanding Token Storage
// =============================================================================

/// Outstanding refresh token operations on `sigil_outstanding_token`.
pub struct OutstandingTokenStorage<'a> {
    pool: &'a PgPool,
}

impl<'a> OutstandingTokenStorage<'a> {
    #[must_use]
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Inserts a record.
    ///
    /// # Errors
    ///
    /// Returns `Conflict` if the `jti` is already tracked, or a database
    /// error.
    pub async fn create(&self, token: &NewOutstandingToken) -> StorageResult<OutstandingToken> {
        let row: OutstandingTuple = query_as(&format!(
            r#"
            INSERT INTO sigil_outstanding_token (user_id, jti, token_hash, created_at, expires_at)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {COLUMNS}
            "#
        ))
        .bind(token.user_id.as_ref().map(UserId::to_claim))
        .bind(&token.jti)
        .bind(&token.token_hash)
        .bind(token.created_at)
        .bind(token.expires_at)
        .fetch_one(self.pool)
        .await
        .map_err(|e| conflict_on_unique(e, format!("Outstanding token {} already exists", token.jti)))?;

        Ok(from_tuple(row))
    }

    /// Inserts a record unless one exists for the `jti`, then returns the
    /// stored record.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub async fn get_or_create(&self, token: &NewOutstandingToken) -> StorageResult<OutstandingToken> {
        // DO NOTHING waits on a concurrent insert of the same jti, so the
        // following select sees whichever row won.
        query(
            r#"
            INSERT INTO sigil_outstanding_token (user_id, jti, token_hash, created_at, expires_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (jti) DO NOTHING
            "#,
        )
        .bind(token.user_id.as_ref().map(UserId::to_claim))
        .bind(&token.jti)
        .bind(&token.token_hash)
        .bind(token.created_at)
        .bind(token.expires_at)
        .execute(self.pool)
        .await?;

        let row: OutstandingTuple = query_as(&format!(
            "SELECT {COLUMNS} FROM sigil_outstanding_token WHERE jti = $1"
        ))
        .bind(&token.jti)
        .fetch_one(self.pool)
        .await?;

        Ok(from_tuple(row))
    }

    /// Finds a record by `jti`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn find_by_jti(&self, jti: &str) -> StorageResult<Option<OutstandingToken>> {
        let row: Option<OutstandingTuple> = query_as(&format!(
            "SELECT {COLUMNS} FROM sigil_outstanding_token WHERE jti = $1"
        ))
        .bind(jti)
        .fetch_optional(self.pool)
        .await?;

        Ok(row.map(from_tuple))
    }

    /// Lists records owned by `user_id`, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn list_for_user(&self, user_id: &UserId) -> StorageResult<Vec<OutstandingToken>> {
        let rows: Vec<OutstandingTuple> = query_as(&format!(
            "SELECT {COLUMNS} FROM sigil_outstanding_token WHERE user_id = $1 ORDER BY id"
        ))
        .bind(user_id.to_claim())
        .fetch_all(self.pool)
        .await?;

        Ok(rows.into_iter().map(from_tuple).collect())
    }

    /// Deletes records with `expires_at <= now`. Their blacklist records go
    /// with them through `ON DELETE CASCADE`.
    ///
    /// # Returns
    ///
    /// The number of outstanding records deleted.
    ///
    /// # Errors
    ///
    /// Returns an error if the database delete fails.
    pub async fn delete_expired(&self, now: OffsetDateTime) -> StorageResult<u64> {
        let result = query("DELETE FROM sigil_outstanding_token WHERE expires_at <= $1")
            .bind(now)
            .execute(self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use time::macros::datetime;

    #[test]
    fn test_from_tuple_reads_user_id() {
        let expires_at = datetime!(2024-06-02 8:00 UTC);
        let record = from_tuple((
            3,
            Some(json!(42)),
            "jti".to_string(),
            "hash".to_string(),
            None,
            expires_at,
        ));
        assert_eq!(record.id, 3);
        assert_eq!(record.user_id, Some(UserId::Int(42)));
        assert_eq!(record.expires_at, expires_at);

        let record = from_tuple((
            4,
            Some(json!("u-7")),
            "jti2".to_string(),
            "hash".to_string(),
            None,
            expires_at,
        ));
        assert_eq!(record.user_id, Some(UserId::Str("u-7".to_string())));
    }

    #[test]
    fn test_from_tuple_without_user() {
        let record = from_tuple((
            5,
            None,
            "jti".to_string(),
            "hash".to_string(),
            None,
            datetime!(2024-06-02 8:00 UTC),
        ));
        assert_eq!(record.user_id, None);
    }
}
