//! Token authentication configuration.
//!
//! [`AuthSettings`] is the immutable snapshot every component is built from.
//! It deserializes from TOML/JSON/environment sources with defaults for every
//! option, and [`AuthSettings::validate`] rejects unusable combinations before
//! anything is constructed from it.
//!
//! # Example (TOML)
//!
//! ```toml
//! [auth]
//! algorithm = "HS512"
//! signing_key = "change-me"
//! access_token_lifetime = "5m"
//! refresh_token_lifetime = "1d"
//! rotate_refresh_tokens = true
//! blacklist_after_rotation = true
//! leeway = 30
//! auth_token_classes = ["access"]
//! ```

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize, Serializer, de};
use url::Url;

use crate::backend::SigningAlgorithm;
use crate::token::TokenClass;

/// Upper bound for token lifetimes and leeway (100 years).
pub const MAX_DURATION: Duration = Duration::from_secs(100 * 365 * 86_400);

/// Errors raised while loading or validating configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// An invalid configuration value was provided.
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),

    /// A required configuration value is missing.
    #[error("Missing required configuration: {0}")]
    Missing(String),

    /// A token class name did not resolve to a known token kind.
    #[error("Unknown token class: '{0}'")]
    UnknownTokenClass(String),
}

/// Token authentication settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthSettings {
    /// Signing algorithm.
    pub algorithm: SigningAlgorithm,

    /// Shared secret (HMAC algorithms) or PEM private key (asymmetric ones).
    pub signing_key: String,

    /// PEM public key for asymmetric algorithms.
    pub verifying_key: Option<String>,

    /// Expected and injected `aud` claim.
    pub audience: Option<String>,

    /// Expected and injected `iss` claim.
    pub issuer: Option<String>,

    /// JWKS endpoint used to resolve verifying keys by `kid` when the
    /// algorithm is asymmetric and no static verifying key is configured.
    pub jwk_url: Option<Url>,

    /// Clock skew tolerance applied to expiry checks.
    pub leeway: Leeway,

    /// Access token lifetime.
    #[serde(with = "humantime_serde")]
    pub access_token_lifetime: Duration,

    /// Refresh token lifetime.
    #[serde(with = "humantime_serde")]
    pub refresh_token_lifetime: Duration,

    /// Issue a new refresh token every time one is used.
    pub rotate_refresh_tokens: bool,

    /// Blacklist the consumed refresh token when rotating.
    pub blacklist_after_rotation: bool,

    /// Record the login time when a token pair is obtained.
    pub update_last_login: bool,

    /// Accepted `Authorization` schemes. The first one is advertised in
    /// `WWW-Authenticate`.
    pub auth_header_types: Vec<String>,

    /// Header carrying the credential.
    pub auth_header_name: String,

    /// User field used as the token's identity.
    pub user_id_field: String,

    /// Claim holding the user identifier.
    pub user_id_claim: String,

    /// Claim holding the token kind.
    pub token_type_claim: String,

    /// Claim holding the unique token id.
    pub jti_claim: String,

    /// Token kinds accepted for inbound authentication, tried in order.
    pub auth_token_classes: Vec<TokenClass>,

    /// Remote key resolution settings.
    pub jwks: JwksSettings,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            algorithm: SigningAlgorithm::HS512,
            signing_key: String::new(),
            verifying_key: None,
            audience: None,
            issuer: None,
            jwk_url: None,
            leeway: Leeway::default(),
            access_token_lifetime: Duration::from_secs(5 * 60),
            refresh_token_lifetime: Duration::from_secs(24 * 3600),
            rotate_refresh_tokens: false,
            blacklist_after_rotation: false,
            update_last_login: false,
            auth_header_types: vec!["Bearer".to_string()],
            auth_header_name: "Authorization".to_string(),
            user_id_field: "id".to_string(),
            user_id_claim: "user_id".to_string(),
            token_type_claim: "token_type".to_string(),
            jti_claim: "jti".to_string(),
            auth_token_classes: vec![TokenClass::Access],
            jwks: JwksSettings::default(),
        }
    }
}

impl AuthSettings {
    /// Creates settings with defaults and the given HMAC secret.
    #[must_use]
    pub fn with_secret(signing_key: impl Into<String>) -> Self {
        Self {
            signing_key: signing_key.into(),
            ..Self::default()
        }
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - an HMAC algorithm has no signing key
    /// - an asymmetric algorithm has neither a verifying key nor a JWKS URL
    /// - a lifetime or the JWKS timeout is zero
    /// - a header, claim or field name is empty
    /// - no token class is accepted for authentication
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.algorithm.is_symmetric() && self.signing_key.is_empty() {
            return Err(ConfigError::Missing(format!(
                "signing_key is required for {}",
                self.algorithm
            )));
        }

        if !self.algorithm.is_symmetric()
            && self.verifying_key.as_deref().is_none_or(str::is_empty)
            && self.jwk_url.is_none()
        {
            return Err(ConfigError::Missing(format!(
                "verifying_key or jwk_url is required for {}",
                self.algorithm
            )));
        }

        if self.access_token_lifetime.is_zero() {
            return Err(ConfigError::InvalidValue(
                "access_token_lifetime must be > 0".to_string(),
            ));
        }

        if self.refresh_token_lifetime.is_zero() {
            return Err(ConfigError::InvalidValue(
                "refresh_token_lifetime must be > 0".to_string(),
            ));
        }

        for (name, value) in [
            ("access_token_lifetime", self.access_token_lifetime),
            ("refresh_token_lifetime", self.refresh_token_lifetime),
            ("leeway", self.leeway.as_duration()),
        ] {
            if value > MAX_DURATION {
                return Err(ConfigError::InvalidValue(format!(
                    "{name} must be at most {}s",
                    MAX_DURATION.as_secs()
                )));
            }
        }

        if self.auth_header_types.iter().all(|t| t.trim().is_empty()) {
            return Err(ConfigError::InvalidValue(
                "auth_header_types must contain at least one scheme".to_string(),
            ));
        }

        for (name, value) in [
            ("auth_header_name", &self.auth_header_name),
            ("user_id_field", &self.user_id_field),
            ("user_id_claim", &self.user_id_claim),
            ("token_type_claim", &self.token_type_claim),
            ("jti_claim", &self.jti_claim),
        ] {
            if value.trim().is_empty() {
                return Err(ConfigError::InvalidValue(format!("{name} cannot be empty")));
            }
        }

        if self.auth_token_classes.is_empty() {
            return Err(ConfigError::InvalidValue(
                "auth_token_classes cannot be empty".to_string(),
            ));
        }

        if self.jwks.timeout.is_zero() {
            return Err(ConfigError::InvalidValue(
                "jwks.timeout must be > 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Returns the scheme advertised in `WWW-Authenticate`.
    #[must_use]
    pub fn primary_header_type(&self) -> &str {
        self.auth_header_types
            .first()
            .map_or("Bearer", String::as_str)
    }
}

/// Remote key resolution settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct JwksSettings {
    /// HTTP request timeout.
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,

    /// Cache TTL when the endpoint sends no `Cache-Control: max-age`.
    #[serde(with = "humantime_serde")]
    pub cache_ttl: Duration,

    /// Allow plain `http://` endpoints. Only meant for tests.
    pub allow_http: bool,
}

impl Default for JwksSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            cache_ttl: Duration::from_secs(3600),
            allow_http: false,
        }
    }
}

// ============================================================================
// Leeway
// ============================================================================

/// Clock skew tolerance.
///
/// Accepts a number of seconds (integer or fractional) or a humantime duration
/// string such as `"30s"`. Any other value type is a configuration error.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Leeway(Duration);

impl Leeway {
    /// No tolerance.
    pub const ZERO: Self = Self(Duration::ZERO);

    /// Creates a leeway from a duration.
    #[must_use]
    pub const fn new(duration: Duration) -> Self {
        Self(duration)
    }

    /// Creates a leeway from a number of seconds.
    ///
    /// # Errors
    ///
    /// Returns an error if `seconds` is negative or not finite.
    pub fn from_secs_f64(seconds: f64) -> Result<Self, ConfigError> {
        Duration::try_from_secs_f64(seconds)
            .map(Self)
            .map_err(|_| ConfigError::InvalidValue(format!("invalid leeway: {seconds}")))
    }

    /// Normalizes an arbitrary JSON value into a leeway.
    ///
    /// # Errors
    ///
    /// Returns an error for anything other than a non-negative number or a
    /// duration string.
    pub fn from_value(value: &serde_json::Value) -> Result<Self, ConfigError> {
        serde_json::from_value(value.clone()).map_err(|e| ConfigError::InvalidValue(e.to_string()))
    }

    /// Returns the tolerance as a duration.
    #[must_use]
    pub const fn as_duration(&self) -> Duration {
        self.0
    }

    /// Returns the tolerance in whole seconds.
    #[must_use]
    pub fn as_secs(&self) -> i64 {
        i64::try_from(self.0.as_secs()).unwrap_or(i64::MAX)
    }
}

impl From<Duration> for Leeway {
    fn from(duration: Duration) -> Self {
        Self(duration)
    }
}

impl fmt::Display for Leeway {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}s", self.0.as_secs_f64())
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum LeewayRepr {
    Seconds(f64),
    Duration(#[serde(with = "humantime_serde")] Duration),
}

impl<'de> Deserialize<'de> for Leeway {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match LeewayRepr::deserialize(deserializer) {
            Ok(LeewayRepr::Seconds(seconds)) => {
                Self::from_secs_f64(seconds).map_err(de::Error::custom)
            }
            Ok(LeewayRepr::Duration(duration)) => Ok(Self(duration)),
            Err(_) => Err(de::Error::custom(
                "leeway must be a number of seconds or a duration string",
            )),
        }
    }
}

impl Serialize for Leeway {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        humantime_serde::serialize(&self.0, serializer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn valid() -> AuthSettings {
        AuthSettings::with_secret("test-secret")
    }

    #[test]
    fn test_default_settings() {
        let settings = AuthSettings::default();
        assert_eq!(settings.algorithm, SigningAlgorithm::HS512);
        assert_eq!(settings.access_token_lifetime, Duration::from_secs(300));
        assert_eq!(settings.refresh_token_lifetime, Duration::from_secs(86400));
        assert!(!settings.rotate_refresh_tokens);
        assert!(!settings.blacklist_after_rotation);
        assert!(!settings.update_last_login);
        assert_eq!(settings.auth_header_types, vec!["Bearer".to_string()]);
        assert_eq!(settings.auth_header_name, "Authorization");
        assert_eq!(settings.user_id_field, "id");
        assert_eq!(settings.user_id_claim, "user_id");
        assert_eq!(settings.token_type_claim, "token_type");
        assert_eq!(settings.jti_claim, "jti");
        assert_eq!(settings.auth_token_classes, vec![TokenClass::Access]);
        assert_eq!(settings.leeway, Leeway::ZERO);
    }

    #[test]
    fn test_valid_settings_validate() {
        assert!(valid().validate().is_ok());
    }

    #[test]
    fn test_missing_secret_fails_validation() {
        let err = AuthSettings::default().validate().unwrap_err();
        assert!(matches!(err, ConfigError::Missing(_)));
    }

    #[test]
    fn test_asymmetric_without_verifying_key_fails_validation() {
        let mut settings = valid();
        settings.algorithm = SigningAlgorithm::RS256;
        let err = settings.validate().unwrap_err();
        assert!(matches!(err, ConfigError::Missing(_)));

        settings.jwk_url = Some(Url::parse("https://idp.example.com/jwks").unwrap());
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_zero_lifetime_fails_validation() {
        let mut settings = valid();
        settings.access_token_lifetime = Duration::ZERO;
        assert!(matches!(
            settings.validate().unwrap_err(),
            ConfigError::InvalidValue(_)
        ));
    }

    #[test]
    fn test_empty_token_classes_fail_validation() {
        let mut settings = valid();
        settings.auth_token_classes.clear();
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_empty_claim_name_fails_validation() {
        let mut settings = valid();
        settings.user_id_claim = String::new();
        let err = settings.validate().unwrap_err();
        assert_eq!(
            err,
            ConfigError::InvalidValue("user_id_claim cannot be empty".to_string())
        );
    }

    #[test]
    fn test_leeway_accepts_numbers_and_durations() {
        assert_eq!(
            Leeway::from_value(&json!(30)).unwrap().as_duration(),
            Duration::from_secs(30)
        );
        assert_eq!(
            Leeway::from_value(&json!(1.5)).unwrap().as_duration(),
            Duration::from_millis(1500)
        );
        assert_eq!(
            Leeway::from_value(&json!("2m")).unwrap().as_duration(),
            Duration::from_secs(120)
        );
    }

    #[test]
    fn test_leeway_rejects_other_types() {
        assert!(Leeway::from_value(&json!(true)).is_err());
        assert!(Leeway::from_value(&json!([1, 2])).is_err());
        assert!(Leeway::from_value(&json!({"seconds": 3})).is_err());
        assert!(Leeway::from_value(&json!(-5)).is_err());
        assert!(Leeway::from_value(&json!("soon")).is_err());
    }

    #[test]
    fn test_settings_from_json() {
        let settings: AuthSettings = serde_json::from_value(json!({
            "signing_key": "secret",
            "algorithm": "HS256",
            "leeway": 10,
            "access_token_lifetime": "15m",
            "auth_token_classes": ["access", "RefreshToken"],
        }))
        .unwrap();

        assert_eq!(settings.algorithm, SigningAlgorithm::HS256);
        assert_eq!(settings.leeway.as_secs(), 10);
        assert_eq!(settings.access_token_lifetime, Duration::from_secs(900));
        assert_eq!(
            settings.auth_token_classes,
            vec![TokenClass::Access, TokenClass::Refresh]
        );
        assert_eq!(settings.refresh_token_lifetime, Duration::from_secs(86400));
    }

    #[test]
    fn test_unknown_token_class_is_rejected() {
        let result: Result<AuthSettings, _> = serde_json::from_value(json!({
            "signing_key": "secret",
            "auth_token_classes": ["access", "SlidingToken"],
        }));
        let err = result.unwrap_err().to_string();
        assert!(err.contains("SlidingToken"));
    }

    #[test]
    fn test_settings_serde_roundtrip() {
        let mut settings = valid();
        settings.leeway = Leeway::new(Duration::from_secs(5));
        settings.rotate_refresh_tokens = true;

        let json = serde_json::to_string(&settings).unwrap();
        let parsed: AuthSettings = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed.leeway, settings.leeway);
        assert!(parsed.rotate_refresh_tokens);
        assert_eq!(parsed.signing_key, "test-secret");
    }

    #[test]
    fn test_oversized_durations_are_rejected() {
        let mut settings = valid();
        settings.refresh_token_lifetime = Duration::from_secs(u64::MAX / 4);
        let err = settings.validate().unwrap_err();
        assert!(err.to_string().contains("refresh_token_lifetime"), "{err}");

        let mut settings = valid();
        settings.access_token_lifetime = MAX_DURATION + Duration::from_secs(1);
        assert!(matches!(settings.validate(), Err(ConfigError::InvalidValue(_))));

        let mut settings = valid();
        settings.leeway = Leeway::new(Duration::from_secs(u64::MAX / 4));
        let err = settings.validate().unwrap_err();
        assert!(err.to_string().contains("leeway"), "{err}");

        let mut settings = valid();
        settings.refresh_token_lifetime = MAX_DURATION;
        settings.leeway = Leeway::new(MAX_DURATION);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_primary_header_type() {
        let mut settings = valid();
        assert_eq!(settings.primary_header_type(), "Bearer");
        settings.auth_header_types = vec!["JWT".to_string(), "Bearer".to_string()];
        assert_eq!(settings.primary_header_type(), "JWT");
    }
}
