//! Token issuance and rotation workflows.
//!
//! [`TokenService`] implements the four token endpoints independently of any
//! HTTP framework:
//!
//! - obtain a pair from username/password
//! - refresh an access token (optionally rotating the refresh token)
//! - blacklist a refresh token
//! - rotate: blacklist and reissue in one call
//!
//! All token failures surface as [`AuthError::InvalidToken`].

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::AuthResult;
use crate::error::AuthError;
use crate::password::verify_password;
use crate::storage::UserStore;
use crate::types::User;

use super::context::SharedContext;
use super::kinds::Refresh;
use super::Token;

/// Access and refresh token strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    pub access: String,
    pub refresh: String,
}

/// Result of a refresh: always an access token, plus a new refresh token
/// when rotation is enabled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshedTokens {
    pub access: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh: Option<String>,
}

/// Issues and rotates tokens.
#[derive(Clone)]
pub struct TokenService {
    context: SharedContext,
    users: Arc<dyn UserStore>,
}

impl TokenService {
    /// Creates a new token service.
    pub fn new(context: SharedContext, users: Arc<dyn UserStore>) -> Self {
        Self { context, users }
    }

    #[must_use]
    pub fn context(&self) -> &SharedContext {
        &self.context
    }

    #[must_use]
    pub fn users(&self) -> &Arc<dyn UserStore> {
        &self.users
    }

    /// Exchanges credentials for a token pair.
    ///
    /// # Errors
    ///
    /// Returns `AuthenticationFailed` with code `no_active_account` if the
    /// user does not exist, is inactive or the password does not match.
    pub async fn obtain_pair(&self, username: &str, password: &str) -> AuthResult<TokenPair> {
        let ctx = self.context.load();

        let user = self.authenticate_credentials(username, password).await?;

        let refresh = Token::<Refresh>::for_user(&ctx, &user).await?;
        let access = refresh.access_token();

        if ctx.settings().update_last_login {
            self.users.update_last_login(user.id, ctx.now()).await?;
        }

        tracing::info!(user_id = user.id, jti = refresh.jti().unwrap_or_default(), "Issued token pair");

        Ok(TokenPair {
            access: access.encode()?,
            refresh: refresh.encode()?,
        })
    }

    /// Issues a new access token from a refresh token.
    ///
    /// With `rotate_refresh_tokens`, the refresh token is also reissued with
    /// a new jti, `exp` and `iat`, and with `blacklist_after_rotation` the
    /// consumed one is blacklisted first.
    ///
    /// # Errors
    ///
    /// Returns `InvalidToken` if `raw` is not a valid, unrevoked refresh
    /// token.
    pub async fn refresh(&self, raw: &str) -> AuthResult<RefreshedTokens> {
        let ctx = self.context.load();
        let settings = ctx.settings();

        let mut refresh = Token::<Refresh>::decode(&ctx, raw).await?;
        let access = refresh.access_token().encode()?;

        if !settings.rotate_refresh_tokens {
            return Ok(RefreshedTokens {
                access,
                refresh: None,
            });
        }

        if settings.blacklist_after_rotation {
            refresh.blacklist_if_supported().await?;
        }
        refresh.rotate();
        refresh.track_if_supported().await?;

        tracing::debug!(jti = refresh.jti().unwrap_or_default(), "Rotated refresh token");

        Ok(RefreshedTokens {
            access,
            refresh: Some(refresh.encode()?),
        })
    }

    /// Blacklists a refresh token. Idempotent; a no-op when revocation is
    /// not enabled.
    ///
    /// # Errors
    ///
    /// Returns `InvalidToken` if `raw` is not a valid, unrevoked refresh
    /// token.
    pub async fn blacklist(&self, raw: &str) -> AuthResult<()> {
        let ctx = self.context.load();
        let refresh = Token::<Refresh>::decode(&ctx, raw).await?;
        refresh.blacklist_if_supported().await?;
        Ok(())
    }

    /// Blacklists a refresh token and reissues both tokens, regardless of
    /// the rotation settings.
    ///
    /// # Errors
    ///
    /// Returns `InvalidToken` if `raw` is not a valid, unrevoked refresh
    /// token.
    pub async fn rotate(&self, raw: &str) -> AuthResult<TokenPair> {
        let ctx = self.context.load();

        let mut refresh = Token::<Refresh>::decode(&ctx, raw).await?;
        refresh.blacklist_if_supported().await?;

        let access = refresh.access_token().encode()?;
        refresh.rotate();
        refresh.track_if_supported().await?;

        Ok(TokenPair {
            access,
            refresh: refresh.encode()?,
        })
    }

    /// Resolves username/password to an active user.
    async fn authenticate_credentials(&self, username: &str, password: &str) -> AuthResult<User> {
        let user = self.users.find_by_username(username).await?;

        let Some(user) = user.filter(|u| u.is_active) else {
            tracing::debug!(username, "No active account for credentials");
            return Err(AuthError::no_active_account());
        };
        let Some(hash) = user.password_hash.clone() else {
            tracing::debug!(username, "Account has no password");
            return Err(AuthError::no_active_account());
        };

        // Argon2 is CPU bound.
        let password = password.to_string();
        let matches = tokio::task::spawn_blocking(move || verify_password(&password, &hash))
            .await
            .map_err(|e| AuthError::internal(format!("Password verification task failed: {e}")))?;

        if !matches {
            tracing::debug!(username, "Password mismatch");
            return Err(AuthError::no_active_account());
        }
        Ok(user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::config::AuthSettings;
    use crate::storage::{InMemoryRevocationStore, InMemoryUserStore, RevocationStore};
    use crate::token::TokenContext;
    use std::time::Duration;
    use time::OffsetDateTime;
    use time::macros::datetime;

    const T0: OffsetDateTime = datetime!(2024-03-01 12:00 UTC);

    struct Fixture {
        service: TokenService,
        clock: Arc<FixedClock>,
        revocations: Arc<InMemoryRevocationStore>,
        users: Arc<InMemoryUserStore>,
    }

    fn fixture(configure: impl FnOnce(&mut AuthSettings)) -> Fixture {
        let mut settings = AuthSettings::with_secret("service-secret");
        configure(&mut settings);

        let clock = Arc::new(FixedClock::new(T0));
        let revocations = Arc::new(InMemoryRevocationStore::new());
        let users = Arc::new(InMemoryUserStore::new());
        users.create_user("alice", "wonderland").unwrap();
        let inactive = users.create_user("mallory", "secret").unwrap();
        users.insert(inactive.deactivated());

        let ctx = TokenContext::new(settings, clock.clone())
            .unwrap()
            .with_revocation_store(revocations.clone());
        let service = TokenService::new(SharedContext::new(ctx), users.clone());

        Fixture {
            service,
            clock,
            revocations,
            users,
        }
    }

    #[tokio::test]
    async fn test_obtain_pair() {
        let f = fixture(|_| {});
        let pair = f.service.obtain_pair("alice", "wonderland").await.unwrap();

        let ctx = f.service.context().load();
        let refresh = Token::<Refresh>::decode(&ctx, &pair.refresh).await.unwrap();
        assert_eq!(refresh.get("user_id"), Some(&serde_json::json!(1)));
        assert_eq!(f.revocations.outstanding_count(), 1);

        let outstanding = f
            .revocations
            .find_outstanding(refresh.jti().unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(outstanding.created_at, Some(T0));
        assert_eq!(outstanding.expires_at, T0 + Duration::from_secs(86400));
    }

    #[tokio::test]
    async fn test_obtain_pair_rejects_bad_credentials() {
        let f = fixture(|_| {});

        for (username, password) in [
            ("alice", "wrong"),
            ("nobody", "wonderland"),
            ("mallory", "secret"),
        ] {
            let err = f.service.obtain_pair(username, password).await.unwrap_err();
            assert_eq!(err.code(), "no_active_account");
        }
        assert_eq!(f.revocations.outstanding_count(), 0);
    }

    #[tokio::test]
    async fn test_obtain_pair_updates_last_login() {
        let f = fixture(|s| s.update_last_login = true);
        f.service.obtain_pair("alice", "wonderland").await.unwrap();
        assert_eq!(f.users.get(1).unwrap().last_login, Some(T0));

        let f = fixture(|_| {});
        f.service.obtain_pair("alice", "wonderland").await.unwrap();
        assert_eq!(f.users.get(1).unwrap().last_login, None);
    }

    #[tokio::test]
    async fn test_refresh_without_rotation() {
        let f = fixture(|_| {});
        let pair = f.service.obtain_pair("alice", "wonderland").await.unwrap();

        let refreshed = f.service.refresh(&pair.refresh).await.unwrap();
        assert!(refreshed.refresh.is_none());

        // Original refresh token stays usable.
        assert!(f.service.refresh(&pair.refresh).await.is_ok());
    }

    #[tokio::test]
    async fn test_refresh_with_rotation_and_blacklist() {
        let f = fixture(|s| {
            s.rotate_refresh_tokens = true;
            s.blacklist_after_rotation = true;
        });
        let pair = f.service.obtain_pair("alice", "wonderland").await.unwrap();
        let ctx = f.service.context().load();
        let old = Token::<Refresh>::decode(&ctx, &pair.refresh).await.unwrap();

        f.clock.advance(Duration::from_secs(60));
        let refreshed = f.service.refresh(&pair.refresh).await.unwrap();
        let new_raw = refreshed.refresh.unwrap();
        let new = Token::<Refresh>::decode(&ctx, &new_raw).await.unwrap();

        assert_ne!(new.jti(), old.jti());
        assert!(new.expires_at() > old.expires_at());
        assert!(f.revocations.is_blacklisted(old.jti().unwrap()).await.unwrap());

        let err = f.service.refresh(&pair.refresh).await.unwrap_err();
        assert!(err.is_token_error());
        assert_eq!(err.to_string(), "Token is blacklisted");
    }

    #[tokio::test]
    async fn test_blacklist_is_idempotent_until_rejected() {
        let f = fixture(|_| {});
        let pair = f.service.obtain_pair("alice", "wonderland").await.unwrap();

        f.service.blacklist(&pair.refresh).await.unwrap();
        assert_eq!(f.revocations.blacklisted_count(), 1);

        // A blacklisted token no longer verifies.
        let err = f.service.blacklist(&pair.refresh).await.unwrap_err();
        assert!(err.is_token_error());
        assert_eq!(f.revocations.blacklisted_count(), 1);
    }

    #[tokio::test]
    async fn test_blacklist_rejects_access_token() {
        let f = fixture(|_| {});
        let pair = f.service.obtain_pair("alice", "wonderland").await.unwrap();

        let err = f.service.blacklist(&pair.access).await.unwrap_err();
        assert_eq!(err.to_string(), "Token has wrong type");
    }

    #[tokio::test]
    async fn test_rotate_always_reissues() {
        let f = fixture(|_| {});
        let pair = f.service.obtain_pair("alice", "wonderland").await.unwrap();

        let rotated = f.service.rotate(&pair.refresh).await.unwrap();
        assert_ne!(rotated.refresh, pair.refresh);
        assert!(f.service.refresh(&rotated.refresh).await.is_ok());
        assert!(f.service.refresh(&pair.refresh).await.is_err());
        assert_eq!(f.revocations.outstanding_count(), 2);
    }
}
