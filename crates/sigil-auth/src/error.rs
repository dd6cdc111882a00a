//! Error types for signing, token validation and authentication.
//!
//! Errors are layered. The signing backend produces [`BackendError`], which the
//! token layer always converts into [`TokenError`]. Request-facing code
//! (authentication resolver, rotation service, HTTP handlers) converts
//! [`TokenError`] into [`AuthError`], which renders as a `401` response.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::ConfigError;

/// Machine-readable codes carried by [`AuthError`] responses.
pub mod codes {
    /// The `Authorization` header did not have exactly two parts.
    pub const BAD_AUTHORIZATION_HEADER: &str = "bad_authorization_header";
    /// The token's user identifier does not match any user.
    pub const USER_NOT_FOUND: &str = "user_not_found";
    /// The token's user exists but is disabled.
    pub const USER_INACTIVE: &str = "user_inactive";
    /// Username/password did not resolve to an active user.
    pub const NO_ACTIVE_ACCOUNT: &str = "no_active_account";
    /// No credentials were supplied to an endpoint that requires them.
    pub const NOT_AUTHENTICATED: &str = "not_authenticated";
    /// The token failed validation.
    pub const TOKEN_NOT_VALID: &str = "token_not_valid";
    /// Infrastructure failure.
    pub const SERVER_ERROR: &str = "server_error";
}

// ============================================================================
// Backend Errors
// ============================================================================

/// Coarse-grained signing/verification failure.
///
/// Bad keys, unsupported algorithms, signature mismatches, structural
/// corruption, expiry and remote key resolution failures all share this type.
/// Only the message tells them apart.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct BackendError {
    message: String,
}

impl BackendError {
    /// Message used for algorithm mismatches.
    pub const INVALID_ALGORITHM: &'static str = "Invalid algorithm specified";

    /// Message prefix used for every other decode failure.
    pub const INVALID_TOKEN: &'static str = "Token is invalid or expired";

    /// Creates a new backend error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Creates an error for a token that failed decoding.
    #[must_use]
    pub fn invalid_token(detail: impl fmt::Display) -> Self {
        Self::new(format!("{}: {detail}", Self::INVALID_TOKEN))
    }

    /// Returns the error message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

// ============================================================================
// Token Errors
// ============================================================================

/// Semantic token invalidity.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    /// The token is invalid: bad signature, wrong type, expired, blacklisted,
    /// or missing a required claim.
    #[error("{message}")]
    Invalid {
        /// Human-readable reason.
        message: String,
    },

    /// The revocation store could not be consulted.
    #[error("Storage error: {message}")]
    Storage {
        /// Description of the storage failure.
        message: String,
    },
}

impl TokenError {
    /// Creates a new `Invalid` error.
    #[must_use]
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid {
            message: message.into(),
        }
    }

    /// Creates a new `Storage` error.
    #[must_use]
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    /// Returns `true` if the token itself was rejected.
    #[must_use]
    pub fn is_invalid(&self) -> bool {
        matches!(self, Self::Invalid { .. })
    }

    /// Returns the error message without the variant prefix.
    #[must_use]
    pub fn message(&self) -> &str {
        match self {
            Self::Invalid { message } | Self::Storage { message } => message,
        }
    }
}

impl From<BackendError> for TokenError {
    fn from(err: BackendError) -> Self {
        tracing::debug!(error = %err, "Token rejected by signing backend");
        Self::invalid(BackendError::INVALID_TOKEN)
    }
}

impl From<AuthError> for TokenError {
    fn from(err: AuthError) -> Self {
        Self::storage(err.to_string())
    }
}

// ============================================================================
// Authentication Errors
// ============================================================================

/// One failed attempt to validate a raw token as a particular token class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenFailure {
    /// Token class name, e.g. `AccessToken`.
    pub token_class: String,
    /// Expected `token_type` claim value for the class.
    pub token_type: String,
    /// Why validation failed.
    pub message: String,
}

/// Errors surfaced to clients of the authentication layer.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// Credential-level rejection: bad username/password, missing or inactive
    /// user, malformed header.
    #[error("{detail}")]
    AuthenticationFailed {
        /// Human-readable reason.
        detail: String,
        /// Machine-readable code (see [`codes`]).
        code: &'static str,
    },

    /// Token-specific rejection.
    #[error("{detail}")]
    InvalidToken {
        /// Human-readable reason.
        detail: String,
        /// Per token class failures, when several classes were attempted.
        messages: Vec<TokenFailure>,
    },

    /// An error occurred while reading or writing auth records.
    #[error("Storage error: {message}")]
    Storage {
        /// Description of the storage error.
        message: String,
    },

    /// The auth configuration is invalid.
    #[error("Configuration error: {message}")]
    Configuration {
        /// Description of the configuration error.
        message: String,
    },

    /// An unexpected internal error occurred.
    #[error("Internal error: {message}")]
    Internal {
        /// Description of the internal error.
        message: String,
    },
}

impl AuthError {
    /// Creates a new `AuthenticationFailed` error.
    #[must_use]
    pub fn authentication_failed(detail: impl Into<String>, code: &'static str) -> Self {
        Self::AuthenticationFailed {
            detail: detail.into(),
            code,
        }
    }

    /// The header matched an accepted scheme but had the wrong number of parts.
    #[must_use]
    pub fn bad_authorization_header() -> Self {
        Self::authentication_failed(
            "Authorization header must contain two space-delimited values",
            codes::BAD_AUTHORIZATION_HEADER,
        )
    }

    /// The token names a user that does not exist.
    #[must_use]
    pub fn user_not_found() -> Self {
        Self::authentication_failed("User not found", codes::USER_NOT_FOUND)
    }

    /// The token names a disabled user.
    #[must_use]
    pub fn user_inactive() -> Self {
        Self::authentication_failed("User is inactive", codes::USER_INACTIVE)
    }

    /// Username/password did not resolve to an active user.
    #[must_use]
    pub fn no_active_account() -> Self {
        Self::authentication_failed(
            "No active account found with the given credentials",
            codes::NO_ACTIVE_ACCOUNT,
        )
    }

    /// No credentials were supplied.
    #[must_use]
    pub fn not_authenticated() -> Self {
        Self::authentication_failed(
            "Authentication credentials were not provided",
            codes::NOT_AUTHENTICATED,
        )
    }

    /// Creates a new `InvalidToken` error without per-class diagnostics.
    #[must_use]
    pub fn invalid_token(detail: impl Into<String>) -> Self {
        Self::InvalidToken {
            detail: detail.into(),
            messages: Vec::new(),
        }
    }

    /// Creates a new `InvalidToken` error carrying per-class diagnostics.
    #[must_use]
    pub fn invalid_token_with_messages(
        detail: impl Into<String>,
        messages: Vec<TokenFailure>,
    ) -> Self {
        Self::InvalidToken {
            detail: detail.into(),
            messages,
        }
    }

    /// Creates a new `Storage` error.
    #[must_use]
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    /// Creates a new `Configuration` error.
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Creates a new `Internal` error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns the machine-readable code for this error.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::AuthenticationFailed { code, .. } => *code,
            Self::InvalidToken { .. } => codes::TOKEN_NOT_VALID,
            Self::Storage { .. } | Self::Configuration { .. } | Self::Internal { .. } => {
                codes::SERVER_ERROR
            }
        }
    }

    /// Returns `true` if the client is at fault (renders as `401`).
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::AuthenticationFailed { .. } | Self::InvalidToken { .. }
        )
    }

    /// Returns `true` if the server is at fault (renders as `500`).
    #[must_use]
    pub fn is_server_error(&self) -> bool {
        !self.is_client_error()
    }

    /// Returns `true` if this is a token-related error.
    #[must_use]
    pub fn is_token_error(&self) -> bool {
        matches!(self, Self::InvalidToken { .. })
    }

    /// Returns the error category for logging/monitoring purposes.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::AuthenticationFailed { .. } => ErrorCategory::Authentication,
            Self::InvalidToken { .. } => ErrorCategory::Token,
            Self::Storage { .. } => ErrorCategory::Infrastructure,
            Self::Configuration { .. } => ErrorCategory::Configuration,
            Self::Internal { .. } => ErrorCategory::Internal,
        }
    }
}

impl From<TokenError> for AuthError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Invalid { message } => Self::invalid_token(message),
            TokenError::Storage { message } => Self::storage(message),
        }
    }
}

impl From<BackendError> for AuthError {
    fn from(err: BackendError) -> Self {
        Self::internal(err.to_string())
    }
}

impl From<ConfigError> for AuthError {
    fn from(err: ConfigError) -> Self {
        Self::configuration(err.to_string())
    }
}

/// Categories of authentication errors for logging and monitoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Credential or header problems.
    Authentication,
    /// Token validation problems.
    Token,
    /// Infrastructure/storage errors.
    Infrastructure,
    /// Configuration errors.
    Configuration,
    /// Internal server errors.
    Internal,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Authentication => write!(f, "authentication"),
            Self::Token => write!(f, "token"),
            Self::Infrastructure => write!(f, "infrastructure"),
            Self::Configuration => write!(f, "configuration"),
            Self::Internal => write!(f, "internal"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = AuthError::bad_authorization_header();
        assert_eq!(
            err.to_string(),
            "Authorization header must contain two space-delimited values"
        );

        let err = AuthError::storage("database down");
        assert_eq!(err.to_string(), "Storage error: database down");

        let err = TokenError::invalid("Token has wrong type");
        assert_eq!(err.to_string(), "Token has wrong type");
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(
            AuthError::bad_authorization_header().code(),
            "bad_authorization_header"
        );
        assert_eq!(AuthError::user_not_found().code(), "user_not_found");
        assert_eq!(AuthError::user_inactive().code(), "user_inactive");
        assert_eq!(AuthError::no_active_account().code(), "no_active_account");
        assert_eq!(AuthError::invalid_token("x").code(), "token_not_valid");
        assert_eq!(AuthError::internal("x").code(), "server_error");
    }

    #[test]
    fn test_backend_error_collapses_to_token_error() {
        let err: TokenError = BackendError::invalid_token("InvalidSignature").into();
        assert_eq!(err, TokenError::invalid("Token is invalid or expired"));

        let err: TokenError = BackendError::new(BackendError::INVALID_ALGORITHM).into();
        assert!(err.is_invalid());
    }

    #[test]
    fn test_token_error_conversion() {
        let err: AuthError = TokenError::invalid("Token is blacklisted").into();
        assert!(err.is_token_error());
        assert_eq!(err.to_string(), "Token is blacklisted");

        let err: AuthError = TokenError::storage("connection reset").into();
        assert!(err.is_server_error());
        assert_eq!(err.category(), ErrorCategory::Infrastructure);
    }

    #[test]
    fn test_error_predicates() {
        assert!(AuthError::user_inactive().is_client_error());
        assert!(!AuthError::user_inactive().is_token_error());
        assert!(AuthError::configuration("bad").is_server_error());
        assert_eq!(
            AuthError::no_active_account().category(),
            ErrorCategory::Authentication
        );
    }

    #[test]
    fn test_error_category_display() {
        assert_eq!(ErrorCategory::Authentication.to_string(), "authentication");
        assert_eq!(ErrorCategory::Token.to_string(), "token");
        assert_eq!(ErrorCategory::Infrastructure.to_string(), "infrastructure");
    }
}
