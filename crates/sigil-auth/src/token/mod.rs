//! Typed tokens.
//!
//! A [`Token<K>`] wraps a claim set together with its kind `K`, the context
//! it was created in and the instant it was created. Tokens are either
//! minted with [`Token::new`] / [`Token::for_user`], or decoded from a signed
//! string with [`Token::decode`], which also runs [`Token::verify`].
//!
//! ```ignore
//! let refresh = Token::<Refresh>::for_user(&ctx, &user).await?;
//! let access = refresh.access_token();
//! let pair = (access.encode()?, refresh.encode()?);
//! ```

pub mod context;
pub mod kinds;
pub mod revocable;
pub mod service;

use std::fmt;
use std::marker::PhantomData;
use std::time::Duration;

use serde_json::Value;
use time::{OffsetDateTime, PrimitiveDateTime};
use uuid::Uuid;

use crate::backend::numeric_date;
use crate::error::{BackendError, TokenError};
use crate::types::{AuthUser, BlacklistedToken, OutstandingToken};

pub use context::{SharedContext, TokenContext};
pub use kinds::{Access, Refresh, TokenClass, TokenKind, Untyped};
pub use revocable::Revocable;
pub use service::{RefreshedTokens, TokenPair, TokenService};

/// Ordered claim name to value mapping.
pub type Claims = serde_json::Map<String, Value>;

/// Claims never copied from a refresh token into a derived access token,
/// besides the configured type and jti claims.
const NO_COPY_CLAIMS: [&str; 2] = ["exp", "jti"];

/// A token of kind `K`.
pub struct Token<K: TokenKind> {
    ctx: TokenContext,
    payload: Claims,
    current_time: OffsetDateTime,
    token: Option<String>,
    kind: PhantomData<K>,
}

impl<K: TokenKind> Token<K> {
    /// Mints a token with the type, `exp`, `iat` and jti claims set.
    #[must_use]
    pub fn new(ctx: &TokenContext) -> Self {
        let mut token = Self {
            ctx: ctx.clone(),
            payload: Claims::new(),
            current_time: ctx.now(),
            token: None,
            kind: PhantomData,
        };
        token.payload.insert(
            ctx.settings().token_type_claim.clone(),
            Value::String(K::TOKEN_TYPE.to_string()),
        );
        token.set_exp(None, None, None);
        token.set_iat(None, None);
        token.set_jti();
        token
    }

    /// Decodes `raw`, checking the signature, and verifies the claims.
    ///
    /// # Errors
    ///
    /// Returns a [`TokenError`] if the backend rejects the token or
    /// [`verify`](Self::verify) fails.
    pub async fn decode(ctx: &TokenContext, raw: &str) -> Result<Self, TokenError> {
        let token = Self::from_payload(ctx, raw, ctx.backend().decode(raw, true).await?);
        token.verify().await?;
        Ok(token)
    }

    /// Decodes `raw` without checking the signature or any claim.
    ///
    /// # Errors
    ///
    /// Returns a [`TokenError`] if `raw` is not structurally a token.
    pub async fn decode_unverified(ctx: &TokenContext, raw: &str) -> Result<Self, TokenError> {
        let payload = ctx.backend().decode(raw, false).await?;
        Ok(Self::from_payload(ctx, raw, payload))
    }

    fn from_payload(ctx: &TokenContext, raw: &str, payload: Claims) -> Self {
        Self {
            ctx: ctx.clone(),
            payload,
            current_time: ctx.now(),
            token: Some(raw.to_string()),
            kind: PhantomData,
        }
    }

    /// Mints a token carrying `user`'s identifier.
    ///
    /// Revocable kinds also record the token as outstanding.
    ///
    /// # Errors
    ///
    /// Returns a [`TokenError`] if the user has no value for the configured
    /// identifier field or the outstanding record cannot be written.
    pub async fn for_user<U: AuthUser + ?Sized>(
        ctx: &TokenContext,
        user: &U,
    ) -> Result<Self, TokenError> {
        let settings = ctx.settings();
        let user_id = user.identifier(&settings.user_id_field).ok_or_else(|| {
            TokenError::invalid(format!(
                "User has no '{}' identifier",
                settings.user_id_field
            ))
        })?;

        let mut token = Self::new(ctx);
        token.insert(settings.user_id_claim.clone(), user_id.to_claim());

        if let Some(revocable) = K::revocable(&token) {
            revocable.track_outstanding(Some(user_id)).await?;
        }

        tracing::debug!(
            token_type = K::TOKEN_TYPE,
            jti = token.jti().unwrap_or_default(),
            "Issued token"
        );
        Ok(token)
    }

    /// Signs the claims. Every call signs again.
    ///
    /// # Errors
    ///
    /// Returns a [`BackendError`] if signing fails.
    pub fn encode(&self) -> Result<String, BackendError> {
        self.ctx.backend().encode(&self.payload)
    }

    /// The string this token was decoded from, if any.
    #[must_use]
    pub fn raw(&self) -> Option<&str> {
        self.token.as_deref()
    }

    // ========================================================================
    // Claims
    // ========================================================================

    #[must_use]
    pub fn get(&self, claim: &str) -> Option<&Value> {
        self.payload.get(claim)
    }

    pub fn insert(&mut self, claim: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.payload.insert(claim.into(), value.into())
    }

    pub fn remove(&mut self, claim: &str) -> Option<Value> {
        self.payload.shift_remove(claim)
    }

    #[must_use]
    pub fn contains(&self, claim: &str) -> bool {
        self.payload.contains_key(claim)
    }

    #[must_use]
    pub fn claims(&self) -> &Claims {
        &self.payload
    }

    #[must_use]
    pub fn into_claims(self) -> Claims {
        self.payload
    }

    /// The instant this token object was created.
    #[must_use]
    pub fn current_time(&self) -> OffsetDateTime {
        self.current_time
    }

    #[must_use]
    pub fn context(&self) -> &TokenContext {
        &self.ctx
    }

    /// Lifetime of this kind under the token's settings.
    #[must_use]
    pub fn lifetime(&self) -> Duration {
        K::lifetime(self.ctx.settings())
    }

    /// Value of the configured jti claim.
    #[must_use]
    pub fn jti(&self) -> Option<&str> {
        self.payload
            .get(&self.ctx.settings().jti_claim)
            .and_then(Value::as_str)
    }

    /// Value of the configured token type claim.
    #[must_use]
    pub fn token_type(&self) -> Option<&str> {
        self.payload
            .get(&self.ctx.settings().token_type_claim)
            .and_then(Value::as_str)
    }

    /// Expiry time, if the `exp` claim is present and numeric.
    #[must_use]
    pub fn expires_at(&self) -> Option<OffsetDateTime> {
        numeric_claim_time(&self.payload, "exp").ok()
    }

    // ========================================================================
    // Mutators
    // ========================================================================

    /// Sets `claim` (default `exp`) to `from` (default: creation time) plus
    /// `lifetime` (default: the kind's lifetime).
    ///
    /// A sum past the largest representable time saturates to it.
    pub fn set_exp(
        &mut self,
        claim: Option<&str>,
        from: Option<OffsetDateTime>,
        lifetime: Option<Duration>,
    ) {
        let from = from.unwrap_or(self.current_time);
        let lifetime = lifetime.unwrap_or_else(|| self.lifetime());
        let exp = shift(from, lifetime, true).unwrap_or(PrimitiveDateTime::MAX.assume_utc());
        self.insert(claim.unwrap_or("exp"), exp.unix_timestamp());
    }

    /// Sets `claim` (default `iat`) to `at` (default: creation time).
    pub fn set_iat(&mut self, claim: Option<&str>, at: Option<OffsetDateTime>) {
        let at = at.unwrap_or(self.current_time);
        self.insert(claim.unwrap_or("iat"), at.unix_timestamp());
    }

    /// Sets the jti claim to a fresh random identifier.
    pub fn set_jti(&mut self) {
        let claim = self.ctx.settings().jti_claim.clone();
        self.insert(claim, Uuid::new_v4().simple().to_string());
    }

    // ========================================================================
    // Verification
    // ========================================================================

    /// Fails if `claim` (default `exp`) is missing or at or before
    /// `reference` (default: creation time) minus the leeway.
    ///
    /// # Errors
    ///
    /// Returns a [`TokenError`] if the claim is missing, not a number, or
    /// expired, or if the leeway cannot be applied to `reference`.
    pub fn check_exp(
        &self,
        claim: Option<&str>,
        reference: Option<OffsetDateTime>,
    ) -> Result<(), TokenError> {
        let claim = claim.unwrap_or("exp");
        let reference = shift(
            reference.unwrap_or(self.current_time),
            self.ctx.backend().leeway(),
            false,
        )
        .ok_or_else(|| TokenError::invalid("Leeway is out of range"))?;

        let claim_time = numeric_claim_time(&self.payload, claim)?;
        if claim_time.unix_timestamp() <= reference.unix_timestamp() {
            return Err(TokenError::invalid(format!(
                "Token '{claim}' claim has expired"
            )));
        }
        Ok(())
    }

    /// Runs the claim checks not covered by signature verification.
    ///
    /// Revocable kinds check the blacklist first. Then `exp`, the jti claim
    /// and, unless the kind skips it, the token type are checked.
    ///
    /// # Errors
    ///
    /// Returns a [`TokenError`] naming the first failed check.
    pub async fn verify(&self) -> Result<(), TokenError> {
        if let Some(revocable) = K::revocable(self) {
            revocable.check_blacklist().await?;
        }

        self.check_exp(None, None)?;

        if !self.contains(&self.ctx.settings().jti_claim) {
            return Err(TokenError::invalid("Token has no id"));
        }

        if K::CHECKS_TYPE {
            self.verify_token_type()?;
        }

        Ok(())
    }

    fn verify_token_type(&self) -> Result<(), TokenError> {
        let token_type = self
            .payload
            .get(&self.ctx.settings().token_type_claim)
            .ok_or_else(|| TokenError::invalid("Token has no type"))?;

        if token_type.as_str() != Some(K::TOKEN_TYPE) {
            return Err(TokenError::invalid("Token has wrong type"));
        }
        Ok(())
    }

    // ========================================================================
    // Revocation
    // ========================================================================

    /// Blacklists the token if its kind is revocable.
    ///
    /// Returns `Ok(None)` for kinds without revocation support.
    ///
    /// # Errors
    ///
    /// Returns a [`TokenError`] if the store operation fails.
    pub async fn blacklist_if_supported(&self) -> Result<Option<BlacklistedToken>, TokenError> {
        match K::revocable(self) {
            Some(revocable) => revocable.blacklist().await.map(Some),
            None => {
                tracing::debug!(token_type = K::TOKEN_TYPE, "Token kind is not revocable");
                Ok(None)
            }
        }
    }

    /// Records the token as outstanding if its kind is revocable.
    ///
    /// # Errors
    ///
    /// Returns a [`TokenError`] if the store operation fails.
    pub async fn track_if_supported(&self) -> Result<Option<OutstandingToken>, TokenError> {
        let user_id = self
            .payload
            .get(&self.ctx.settings().user_id_claim)
            .and_then(crate::types::UserId::from_claim);

        match K::revocable(self) {
            Some(revocable) => revocable.track_outstanding(user_id).await.map(Some),
            None => Ok(None),
        }
    }
}

impl Token<Refresh> {
    /// Derives an access token from this refresh token.
    ///
    /// All claims are copied except the type, `exp` and jti claims. `exp` is
    /// measured from this token's creation time; `iat` is inherited.
    #[must_use]
    pub fn access_token(&self) -> Token<Access> {
        let settings = self.ctx.settings();
        let mut access = Token::<Access>::new(&self.ctx);
        access.set_exp(None, Some(self.current_time), None);

        for (claim, value) in &self.payload {
            let skip = claim == &settings.token_type_claim
                || claim == &settings.jti_claim
                || NO_COPY_CLAIMS.contains(&claim.as_str());
            if !skip {
                access.insert(claim.clone(), value.clone());
            }
        }

        access
    }

    /// Turns this token into a new one: fresh jti, `exp` and `iat`.
    pub fn rotate(&mut self) {
        self.set_jti();
        self.set_exp(None, None, None);
        self.set_iat(None, None);
        self.token = None;
    }
}

impl<K: TokenKind> Clone for Token<K> {
    fn clone(&self) -> Self {
        Self {
            ctx: self.ctx.clone(),
            payload: self.payload.clone(),
            current_time: self.current_time,
            token: self.token.clone(),
            kind: PhantomData,
        }
    }
}

impl<K: TokenKind> fmt::Debug for Token<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Token")
            .field("kind", &K::CLASS)
            .field("payload", &self.payload)
            .field("current_time", &self.current_time)
            .finish_non_exhaustive()
    }
}

/// Reads an epoch-seconds claim as a timestamp.
pub(crate) fn numeric_claim_time(claims: &Claims, claim: &str) -> Result<OffsetDateTime, TokenError> {
    let value = claims
        .get(claim)
        .ok_or_else(|| TokenError::invalid(format!("Token has no '{claim}' claim")))?;

    numeric_date(value)
        .and_then(|secs| OffsetDateTime::from_unix_timestamp(secs).ok())
        .ok_or_else(|| TokenError::invalid(format!("Token '{claim}' claim is not a valid time")))
}

/// Moves `at` by `by`, or `None` when the result is not representable.
fn shift(at: OffsetDateTime, by: Duration, forward: bool) -> Option<OffsetDateTime> {
    let by = time::Duration::try_from(by).ok()?;
    if forward {
        at.checked_add(by)
    } else {
        at.checked_sub(by)
    }
}
