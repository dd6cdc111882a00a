//! # sigil-auth
//!
//! JWT authentication core: issues, validates, rotates and revokes signed
//! access and refresh tokens.
//!
//! This crate provides:
//! - A signing backend over HMAC, RSA, ECDSA and EdDSA keys, with optional
//!   JWKS key resolution
//! - Typed tokens (`Token<Access>`, `Token<Refresh>`, `Token<Untyped>`)
//! - Refresh token blacklisting backed by a pluggable revocation store
//! - Request authentication from an `Authorization` header
//! - The obtain/refresh/blacklist/rotate token workflows
//!
//! ## Modules
//!
//! - [`config`] - Token settings and validation
//! - [`backend`] - Signing and verification, JWKS client
//! - [`token`] - Token kinds, verification and the token service
//! - [`storage`] - Storage traits and in-memory implementations
//! - [`middleware`] - Authenticator and axum extractors
//! - [`http`] - Axum handlers for the token endpoints
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use sigil_auth::prelude::*;
//!
//! let ctx = TokenContext::new(AuthSettings::with_secret("secret"), Arc::new(SystemClock))?
//!     .with_revocation_store(Arc::new(InMemoryRevocationStore::new()));
//! let service = TokenService::new(SharedContext::new(ctx), Arc::new(InMemoryUserStore::new()));
//!
//! let pair = service.obtain_pair("alice", "wonderland").await?;
//! let refreshed = service.refresh(&pair.refresh).await?;
//! ```

pub mod backend;
pub mod clock;
pub mod config;
pub mod error;
pub mod http;
pub mod middleware;
pub mod password;
pub mod storage;
pub mod token;
pub mod types;

pub use backend::{SigningAlgorithm, TokenBackend};
pub use clock::{Clock, FixedClock, SystemClock};
pub use config::{AuthSettings, ConfigError, JwksSettings, Leeway};
pub use error::{AuthError, BackendError, ErrorCategory, TokenError, TokenFailure};
pub use http::token_routes;
pub use middleware::{Authenticated, JwtAuth, JwtAuthenticator, OptionalJwtAuth, ValidatedToken};
pub use storage::{InMemoryRevocationStore, InMemoryUserStore, RevocationStore, UserStore};
pub use token::{
    Access, Claims, Refresh, RefreshedTokens, Revocable, SharedContext, Token, TokenClass,
    TokenContext, TokenKind, TokenPair, TokenService, Untyped,
};
pub use types::{AuthUser, BlacklistedToken, OutstandingToken, User, UserId};

/// Type alias for authentication results.
pub type AuthResult<T> = Result<T, AuthError>;

/// Prelude module for convenient imports.
///
/// ```ignore
/// use sigil_auth::prelude::*;
/// ```
pub mod prelude {
    pub use crate::AuthResult;
    pub use crate::clock::{Clock, FixedClock, SystemClock};
    pub use crate::config::{AuthSettings, ConfigError, Leeway};
    pub use crate::error::{AuthError, TokenError};
    pub use crate::middleware::{Authenticated, JwtAuth, JwtAuthenticator, OptionalJwtAuth};
    pub use crate::storage::{
        InMemoryRevocationStore, InMemoryUserStore, RevocationStore, UserStore,
    };
    pub use crate::token::{
        Access, Refresh, SharedContext, Token, TokenClass, TokenContext, TokenService, Untyped,
    };
    pub use crate::types::{AuthUser, User, UserId};
}
