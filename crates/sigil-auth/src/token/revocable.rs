//! Revocation capability for refresh tokens.

use async_trait::async_trait;

use crate::error::TokenError;
use crate::types::{BlacklistedToken, NewOutstandingToken, OutstandingToken, UserId};

use super::kinds::Refresh;
use super::{Token, numeric_claim_time};

/// Operations available on tokens that can be revoked before they expire.
///
/// Only [`Token<Refresh>`] implements this. Callers reach it through
/// [`TokenKind::revocable`](super::TokenKind::revocable), which also returns
/// `None` when no revocation store is configured.
#[async_trait]
pub trait Revocable: Send + Sync {
    /// Fails if the token's jti has been blacklisted.
    async fn check_blacklist(&self) -> Result<(), TokenError>;

    /// Blacklists the token, creating its outstanding record first if the
    /// store has never seen it. Idempotent.
    async fn blacklist(&self) -> Result<BlacklistedToken, TokenError>;

    /// Records the token as issued to `user_id`.
    async fn track_outstanding(
        &self,
        user_id: Option<UserId>,
    ) -> Result<OutstandingToken, TokenError>;
}

impl Token<Refresh> {
    fn require_jti(&self) -> Result<&str, TokenError> {
        self.jti().ok_or_else(|| TokenError::invalid("Token has no id"))
    }

    fn new_outstanding(
        &self,
        user_id: Option<UserId>,
        created_at: Option<time::OffsetDateTime>,
    ) -> Result<NewOutstandingToken, TokenError> {
        let jti = self.require_jti()?;
        let expires_at = numeric_claim_time(self.claims(), "exp")?;
        let token = self.encode()?;
        Ok(NewOutstandingToken::new(
            jti, &token, user_id, created_at, expires_at,
        ))
    }
}

#[async_trait]
impl Revocable for Token<Refresh> {
    async fn check_blacklist(&self) -> Result<(), TokenError> {
        let Some(store) = self.context().revocation_store() else {
            return Ok(());
        };

        let jti = self.require_jti()?;
        if store.is_blacklisted(jti).await? {
            tracing::debug!(jti, "Rejected blacklisted token");
            return Err(TokenError::invalid("Token is blacklisted"));
        }
        Ok(())
    }

    async fn blacklist(&self) -> Result<BlacklistedToken, TokenError> {
        let store = self
            .context()
            .revocation_store()
            .ok_or_else(|| TokenError::storage("Revocation is not enabled"))?;

        let outstanding = store
            .get_or_create_outstanding(self.new_outstanding(None, None)?)
            .await?;
        let record = store
            .get_or_create_blacklisted(outstanding.id, self.context().now())
            .await?;

        tracing::info!(jti = %outstanding.jti, "Token blacklisted");
        Ok(record)
    }

    async fn track_outstanding(
        &self,
        user_id: Option<UserId>,
    ) -> Result<OutstandingToken, TokenError> {
        let store = self
            .context()
            .revocation_store()
            .ok_or_else(|| TokenError::storage("Revocation is not enabled"))?;

        let record = store
            .create_outstanding(self.new_outstanding(user_id, Some(self.current_time()))?)
            .await?;

        tracing::debug!(jti = %record.jti, user_id = ?record.user_id, "Tracking outstanding token");
        Ok(record)
    }
}
