//! Token kinds and the class registry used by configuration.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize, Serializer};

use crate::config::{AuthSettings, ConfigError};
use crate::error::TokenError;

use super::context::TokenContext;
use super::revocable::Revocable;
use super::{Claims, Token};

/// Static behaviour of a token kind.
pub trait TokenKind: Send + Sync + Sized + 'static {
    /// Registry entry for this kind.
    const CLASS: TokenClass;

    /// Value of the token type claim.
    const TOKEN_TYPE: &'static str;

    /// Whether verification compares the token type claim.
    const CHECKS_TYPE: bool = true;

    /// Lifetime of freshly minted tokens.
    fn lifetime(settings: &AuthSettings) -> Duration;

    /// Revocation capability of `token`, if this kind supports it.
    fn revocable(_token: &Token<Self>) -> Option<&dyn Revocable> {
        None
    }
}

/// Short-lived token presented on API requests.
#[derive(Debug, Clone, Copy)]
pub struct Access;

/// Long-lived token exchanged for access tokens. Revocable.
#[derive(Debug, Clone, Copy)]
pub struct Refresh;

/// Token of unknown kind. Skips the type check; only for inspection.
#[derive(Debug, Clone, Copy)]
pub struct Untyped;

impl TokenKind for Access {
    const CLASS: TokenClass = TokenClass::Access;
    const TOKEN_TYPE: &'static str = "access";

    fn lifetime(settings: &AuthSettings) -> Duration {
        settings.access_token_lifetime
    }
}

impl TokenKind for Refresh {
    const CLASS: TokenClass = TokenClass::Refresh;
    const TOKEN_TYPE: &'static str = "refresh";

    fn lifetime(settings: &AuthSettings) -> Duration {
        settings.refresh_token_lifetime
    }

    fn revocable(token: &Token<Self>) -> Option<&dyn Revocable> {
        token
            .context()
            .revocation_store()
            .is_some()
            .then_some(token as &dyn Revocable)
    }
}

impl TokenKind for Untyped {
    const CLASS: TokenClass = TokenClass::Untyped;
    const TOKEN_TYPE: &'static str = "untyped";
    const CHECKS_TYPE: bool = false;

    fn lifetime(_settings: &AuthSettings) -> Duration {
        Duration::ZERO
    }
}

// ============================================================================
// Token Class Registry
// ============================================================================

/// Configurable name of a token kind.
///
/// Parsed from `"access"` / `"AccessToken"` style names at startup so an
/// unknown name fails configuration loading instead of the first request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(try_from = "String")]
pub enum TokenClass {
    Access,
    Refresh,
    Untyped,
}

impl TokenClass {
    /// Short configuration name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Access => "access",
            Self::Refresh => "refresh",
            Self::Untyped => "untyped",
        }
    }

    /// Class name reported in validation diagnostics.
    #[must_use]
    pub fn class_name(self) -> &'static str {
        match self {
            Self::Access => "AccessToken",
            Self::Refresh => "RefreshToken",
            Self::Untyped => "UntypedToken",
        }
    }

    /// Value of the token type claim for this class.
    #[must_use]
    pub fn token_type(self) -> &'static str {
        match self {
            Self::Access => Access::TOKEN_TYPE,
            Self::Refresh => Refresh::TOKEN_TYPE,
            Self::Untyped => Untyped::TOKEN_TYPE,
        }
    }

    /// Decodes and verifies `raw` as this class.
    ///
    /// # Errors
    ///
    /// Returns a [`TokenError`] if decoding or verification fails.
    pub async fn validate(self, ctx: &TokenContext, raw: &str) -> Result<Claims, TokenError> {
        match self {
            Self::Access => Token::<Access>::decode(ctx, raw).await.map(Token::into_claims),
            Self::Refresh => Token::<Refresh>::decode(ctx, raw).await.map(Token::into_claims),
            Self::Untyped => Token::<Untyped>::decode(ctx, raw).await.map(Token::into_claims),
        }
    }
}

impl fmt::Display for TokenClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.class_name())
    }
}

impl FromStr for TokenClass {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "access" | "AccessToken" => Ok(Self::Access),
            "refresh" | "RefreshToken" => Ok(Self::Refresh),
            "untyped" | "UntypedToken" => Ok(Self::Untyped),
            other => Err(ConfigError::UnknownTokenClass(other.to_string())),
        }
    }
}

impl TryFrom<String> for TokenClass {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl Serialize for TokenClass {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}
