//! Request authentication from a JWT in a header.
//!
//! [`JwtAuthenticator`] walks the same steps for every request:
//!
//! 1. Read the configured header (absent means anonymous)
//! 2. Split it into scheme and token (unknown scheme means anonymous)
//! 3. Validate the token against each accepted token class in order
//! 4. Load the user named by the user id claim and require it to be active

use std::sync::Arc;

use axum::http::HeaderMap;
use serde_json::Value;

use crate::AuthResult;
use crate::error::{AuthError, TokenFailure};
use crate::storage::UserStore;
use crate::token::{Claims, SharedContext, TokenClass, TokenService};
use crate::types::{AuthUser, User, UserId};

/// Realm advertised in `WWW-Authenticate` challenges.
pub const REALM: &str = "api";

/// Claims that passed validation as a particular token class.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedToken {
    class: TokenClass,
    claims: Claims,
}

impl ValidatedToken {
    /// The class the token validated as.
    #[must_use]
    pub fn token_class(&self) -> TokenClass {
        self.class
    }

    #[must_use]
    pub fn claims(&self) -> &Claims {
        &self.claims
    }

    #[must_use]
    pub fn get(&self, claim: &str) -> Option<&Value> {
        self.claims.get(claim)
    }
}

/// An authenticated request principal.
#[derive(Debug, Clone)]
pub struct Authenticated {
    pub user: User,
    pub token: ValidatedToken,
}

/// Authenticates requests from their headers.
#[derive(Clone)]
pub struct JwtAuthenticator {
    context: SharedContext,
    users: Arc<dyn UserStore>,
}

impl JwtAuthenticator {
    /// Creates a new authenticator.
    pub fn new(context: SharedContext, users: Arc<dyn UserStore>) -> Self {
        Self { context, users }
    }

    /// Creates an authenticator sharing a token service's context and users.
    #[must_use]
    pub fn from_service(service: &TokenService) -> Self {
        Self::new(service.context().clone(), service.users().clone())
    }

    /// Authenticates a request.
    ///
    /// Returns `Ok(None)` when the request carries no credential this
    /// authenticator recognizes.
    ///
    /// # Errors
    ///
    /// Returns an error if the header is malformed, the token is invalid, or
    /// the user is missing or inactive.
    pub async fn authenticate(&self, headers: &HeaderMap) -> AuthResult<Option<Authenticated>> {
        let Some(header) = self.extract_header(headers) else {
            return Ok(None);
        };
        let Some(raw) = self.extract_token(header)? else {
            return Ok(None);
        };

        let token = self.validate(&raw).await?;
        let user = self.resolve_user(token.claims()).await?;

        tracing::debug!(
            user_id = user.id,
            token_class = %token.token_class(),
            "Request authenticated"
        );
        Ok(Some(Authenticated { user, token }))
    }

    /// Returns the raw value of the configured credential header.
    #[must_use]
    pub fn extract_header<'a>(&self, headers: &'a HeaderMap) -> Option<&'a [u8]> {
        let ctx = self.context.load();
        headers
            .get(ctx.settings().auth_header_name.as_str())
            .map(|value| value.as_bytes())
    }

    /// Extracts the token from a header value.
    ///
    /// Returns `Ok(None)` for an empty header or a scheme that is not
    /// accepted.
    ///
    /// # Errors
    ///
    /// Returns `bad_authorization_header` if the scheme is accepted but the
    /// header does not have exactly two parts.
    pub fn extract_token(&self, header: &[u8]) -> AuthResult<Option<String>> {
        let parts: Vec<&[u8]> = header
            .split(u8::is_ascii_whitespace)
            .filter(|part| !part.is_empty())
            .collect();

        let Some(scheme) = parts.first() else {
            return Ok(None);
        };

        let ctx = self.context.load();
        let accepted = ctx
            .settings()
            .auth_header_types
            .iter()
            .any(|t| t.as_bytes() == *scheme);
        if !accepted {
            return Ok(None);
        }

        match parts.as_slice() {
            [_, token] => Ok(Some(String::from_utf8_lossy(token).into_owned())),
            _ => Err(AuthError::bad_authorization_header()),
        }
    }

    /// Validates `raw` against each accepted token class in order.
    ///
    /// # Errors
    ///
    /// Returns `InvalidToken` listing every class's failure if no class
    /// accepts the token. Storage failures are returned as they occur.
    pub async fn validate(&self, raw: &str) -> AuthResult<ValidatedToken> {
        let ctx = self.context.load();
        let classes = &ctx.settings().auth_token_classes;
        let mut messages = Vec::with_capacity(classes.len());

        for &class in classes {
            match class.validate(&ctx, raw).await {
                Ok(claims) => return Ok(ValidatedToken { class, claims }),
                Err(e) if e.is_invalid() => messages.push(TokenFailure {
                    token_class: class.class_name().to_string(),
                    token_type: class.token_type().to_string(),
                    message: e.message().to_string(),
                }),
                Err(e) => return Err(e.into()),
            }
        }

        tracing::debug!(failures = messages.len(), "Token rejected by every token class");
        Err(AuthError::invalid_token_with_messages(
            "Given token not valid for any token type",
            messages,
        ))
    }

    /// Loads the active user named by the user id claim.
    ///
    /// # Errors
    ///
    /// Returns `InvalidToken` if the claim is missing, `user_not_found` if
    /// no user matches, and `user_inactive` if the user is disabled.
    pub async fn resolve_user(&self, claims: &Claims) -> AuthResult<User> {
        let ctx = self.context.load();
        let settings = ctx.settings();

        let user_id = claims
            .get(&settings.user_id_claim)
            .and_then(UserId::from_claim)
            .ok_or_else(|| {
                AuthError::invalid_token("Token contained no recognizable user identification")
            })?;

        let user = self
            .users
            .find_by_identifier(&settings.user_id_field, &user_id)
            .await?
            .ok_or_else(AuthError::user_not_found)?;

        if !user.is_active() {
            return Err(AuthError::user_inactive());
        }
        Ok(user)
    }

    /// Value for the `WWW-Authenticate` response header.
    #[must_use]
    pub fn www_authenticate(&self) -> String {
        let ctx = self.context.load();
        challenge(ctx.settings().primary_header_type())
    }
}

/// Builds a `WWW-Authenticate` challenge for `scheme`.
#[must_use]
pub fn challenge(scheme: &str) -> String {
    format!("{scheme} realm=\"{REALM}\"")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::config::AuthSettings;
    use crate::storage::InMemoryUserStore;
    use crate::token::{Access, Refresh, Token, TokenContext};
    use axum::http::HeaderValue;

    fn authenticator(configure: impl FnOnce(&mut AuthSettings)) -> (JwtAuthenticator, TokenContext, Arc<InMemoryUserStore>) {
        let mut settings = AuthSettings::with_secret("resolver-secret");
        configure(&mut settings);
        let ctx = TokenContext::new(settings, Arc::new(SystemClock)).unwrap();
        let users = Arc::new(InMemoryUserStore::new());
        users.insert(User::new(42, "alice"));
        users.insert(User::new(7, "bob").deactivated());
        let auth = JwtAuthenticator::new(SharedContext::new(ctx.clone()), users.clone());
        (auth, ctx, users)
    }

    #[test]
    fn test_extract_token() {
        let (auth, _, _) = authenticator(|_| {});

        assert_eq!(
            auth.extract_token(b"Bearer abc.def.ghi").unwrap(),
            Some("abc.def.ghi".to_string())
        );
        assert_eq!(auth.extract_token(b"").unwrap(), None);
        assert_eq!(auth.extract_token(b"   ").unwrap(), None);
        assert_eq!(auth.extract_token(b"Basic abc123").unwrap(), None);

        let err = auth.extract_token(b"Bearer").unwrap_err();
        assert_eq!(err.code(), "bad_authorization_header");
        let err = auth.extract_token(b"Bearer a b").unwrap_err();
        assert_eq!(err.code(), "bad_authorization_header");
    }

    #[test]
    fn test_extract_token_custom_schemes() {
        let (auth, _, _) = authenticator(|s| {
            s.auth_header_types = vec!["JWT".to_string(), "Bearer".to_string()];
        });
        assert_eq!(auth.extract_token(b"JWT tok").unwrap(), Some("tok".to_string()));
        assert_eq!(auth.extract_token(b"Bearer tok").unwrap(), Some("tok".to_string()));
        assert_eq!(auth.www_authenticate(), "JWT realm=\"api\"");
    }

    #[test]
    fn test_extract_header_uses_configured_name() {
        let (auth, _, _) = authenticator(|s| s.auth_header_name = "X-Token".to_string());

        let mut headers = HeaderMap::new();
        headers.insert("authorization", HeaderValue::from_static("Bearer a"));
        assert!(auth.extract_header(&headers).is_none());

        headers.insert("x-token", HeaderValue::from_static("Bearer b"));
        assert_eq!(auth.extract_header(&headers), Some(&b"Bearer b"[..]));
    }

    #[tokio::test]
    async fn test_validate_collects_failures() {
        let (auth, ctx, _) = authenticator(|s| {
            s.auth_token_classes = vec![TokenClass::Access, TokenClass::Untyped];
        });

        let refresh = Token::<Refresh>::new(&ctx).encode().unwrap();
        let validated = auth.validate(&refresh).await.unwrap();
        assert_eq!(validated.token_class(), TokenClass::Untyped);

        let err = auth.validate("garbage").await.unwrap_err();
        match err {
            AuthError::InvalidToken { detail, messages } => {
                assert_eq!(detail, "Given token not valid for any token type");
                assert_eq!(messages.len(), 2);
                assert_eq!(messages[0].token_class, "AccessToken");
                assert_eq!(messages[0].token_type, "access");
                assert_eq!(messages[0].message, "Token is invalid or expired");
                assert_eq!(messages[1].token_class, "UntypedToken");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_resolve_user() {
        let (auth, ctx, _) = authenticator(|_| {});

        let token = Token::<Access>::for_user(&ctx, &User::new(42, "alice")).await.unwrap();
        assert_eq!(auth.resolve_user(token.claims()).await.unwrap().username, "alice");

        let token = Token::<Access>::new(&ctx);
        let err = auth.resolve_user(token.claims()).await.unwrap_err();
        assert!(err.is_token_error());

        let token = Token::<Access>::for_user(&ctx, &User::new(99, "ghost")).await.unwrap();
        let err = auth.resolve_user(token.claims()).await.unwrap_err();
        assert_eq!(err.code(), "user_not_found");

        let token = Token::<Access>::for_user(&ctx, &User::new(7, "bob")).await.unwrap();
        let err = auth.resolve_user(token.claims()).await.unwrap_err();
        assert_eq!(err.code(), "user_inactive");
    }

    #[tokio::test]
    async fn test_authenticate() {
        let (auth, ctx, _) = authenticator(|_| {});
        let mut headers = HeaderMap::new();
        assert!(auth.authenticate(&headers).await.unwrap().is_none());

        let token = Token::<Access>::for_user(&ctx, &User::new(42, "alice")).await.unwrap();
        let value = format!("Bearer {}", token.encode().unwrap());
        headers.insert("authorization", HeaderValue::from_str(&value).unwrap());

        let authenticated = auth.authenticate(&headers).await.unwrap().unwrap();
        assert_eq!(authenticated.user.id, 42);
        assert_eq!(authenticated.token.token_class(), TokenClass::Access);
    }
}
