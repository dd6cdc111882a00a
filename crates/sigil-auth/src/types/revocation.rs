//! Outstanding and blacklisted refresh token records.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use time::OffsetDateTime;

use super::user::UserId;

/// An issued refresh token tracked for revocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutstandingToken {
    /// Record id.
    pub id: i64,

    /// Owning user. Kept as a plain reference so deleting the user leaves
    /// the audit record in place.
    pub user_id: Option<UserId>,

    /// Unique token id.
    pub jti: String,

    /// SHA-256 hex digest of the signed token string. Audit only.
    pub token_hash: String,

    /// When the token was issued, if known.
    #[serde(with = "time::serde::rfc3339::option")]
    pub created_at: Option<OffsetDateTime>,

    /// When the token expires.
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,
}

impl OutstandingToken {
    /// Returns `true` if the record is due for removal at `now`.
    #[must_use]
    pub fn is_expired_at(&self, now: OffsetDateTime) -> bool {
        self.expires_at <= now
    }
}

/// Data for inserting a new outstanding record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOutstandingToken {
    pub user_id: Option<UserId>,
    pub jti: String,
    pub token_hash: String,
    pub created_at: Option<OffsetDateTime>,
    pub expires_at: OffsetDateTime,
}

impl NewOutstandingToken {
    /// Builds a record for a signed token, hashing the token string.
    #[must_use]
    pub fn new(
        jti: impl Into<String>,
        token: &str,
        user_id: Option<UserId>,
        created_at: Option<OffsetDateTime>,
        expires_at: OffsetDateTime,
    ) -> Self {
        Self {
            user_id,
            jti: jti.into(),
            token_hash: hash_token(token),
            created_at,
            expires_at,
        }
    }

    /// Materializes the record with a store-assigned id.
    #[must_use]
    pub fn into_record(self, id: i64) -> OutstandingToken {
        OutstandingToken {
            id,
            user_id: self.user_id,
            jti: self.jti,
            token_hash: self.token_hash,
            created_at: self.created_at,
            expires_at: self.expires_at,
        }
    }
}

/// Marks an outstanding token as revoked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlacklistedToken {
    /// Record id.
    pub id: i64,

    /// The revoked outstanding record. Unique.
    pub token_id: i64,

    /// When the token was revoked.
    #[serde(with = "time::serde::rfc3339")]
    pub blacklisted_at: OffsetDateTime,
}

/// Hashes a token string for audit storage.
#[must_use]
pub fn hash_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}
