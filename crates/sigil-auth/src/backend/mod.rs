//! Signing and verification backend.
//!
//! [`TokenBackend`] turns a claim set into a compact signed string and back.
//! It knows nothing about token kinds: type, jti and blacklist checks happen
//! one layer up in [`crate::token`].
//!
//! ## Supported Algorithms
//!
//! - **HS256/HS384/HS512**: HMAC with a shared secret
//! - **RS256/RS384/RS512, PS256/PS384/PS512**: RSA, PEM encoded keys
//! - **ES256/ES384**: ECDSA, PEM encoded keys
//! - **EdDSA**: Ed25519, PEM encoded keys
//!
//! For asymmetric algorithms the verifying key is either a static PEM public
//! key or resolved per token from a JWKS endpoint using the header `kid`.

pub mod jwks;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::clock::Clock;
use crate::config::{AuthSettings, ConfigError};
use crate::error::BackendError;
use crate::token::Claims;

pub use jwks::{JwksClient, JwksConfig, JwksError};

// ============================================================================
// Signing Algorithm
// ============================================================================

/// Supported signing algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SigningAlgorithm {
    /// HMAC with SHA-256.
    HS256,
    /// HMAC with SHA-384.
    HS384,
    /// HMAC with SHA-512.
    #[default]
    HS512,
    /// RSASSA-PKCS1-v1_5 with SHA-256.
    RS256,
    /// RSASSA-PKCS1-v1_5 with SHA-384.
    RS384,
    /// RSASSA-PKCS1-v1_5 with SHA-512.
    RS512,
    /// RSASSA-PSS with SHA-256.
    PS256,
    /// RSASSA-PSS with SHA-384.
    PS384,
    /// RSASSA-PSS with SHA-512.
    PS512,
    /// ECDSA with P-256.
    ES256,
    /// ECDSA with P-384.
    ES384,
    /// Ed25519.
    EdDSA,
}

impl SigningAlgorithm {
    /// Converts to the `jsonwebtoken` Algorithm type.
    #[must_use]
    pub fn to_jwt_algorithm(self) -> Algorithm {
        match self {
            Self::HS256 => Algorithm::HS256,
            Self::HS384 => Algorithm::HS384,
            Self::HS512 => Algorithm::HS512,
            Self::RS256 => Algorithm::RS256,
            Self::RS384 => Algorithm::RS384,
            Self::RS512 => Algorithm::RS512,
            Self::PS256 => Algorithm::PS256,
            Self::PS384 => Algorithm::PS384,
            Self::PS512 => Algorithm::PS512,
            Self::ES256 => Algorithm::ES256,
            Self::ES384 => Algorithm::ES384,
            Self::EdDSA => Algorithm::EdDSA,
        }
    }

    /// Returns the algorithm name as used in JWT headers.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::HS256 => "HS256",
            Self::HS384 => "HS384",
            Self::HS512 => "HS512",
            Self::RS256 => "RS256",
            Self::RS384 => "RS384",
            Self::RS512 => "RS512",
            Self::PS256 => "PS256",
            Self::PS384 => "PS384",
            Self::PS512 => "PS512",
            Self::ES256 => "ES256",
            Self::ES384 => "ES384",
            Self::EdDSA => "EdDSA",
        }
    }

    /// Returns `true` if the same secret signs and verifies.
    #[must_use]
    pub fn is_symmetric(&self) -> bool {
        matches!(self, Self::HS256 | Self::HS384 | Self::HS512)
    }

    /// Returns `true` if this is an RSA-based algorithm.
    #[must_use]
    pub fn is_rsa(&self) -> bool {
        matches!(
            self,
            Self::RS256 | Self::RS384 | Self::RS512 | Self::PS256 | Self::PS384 | Self::PS512
        )
    }

    /// Returns `true` if this is an EC-based algorithm.
    #[must_use]
    pub fn is_ec(&self) -> bool {
        matches!(self, Self::ES256 | Self::ES384)
    }

    fn encoding_key(self, key: &str) -> Result<EncodingKey, ConfigError> {
        let bytes = key.as_bytes();
        let result = if self.is_symmetric() {
            Ok(EncodingKey::from_secret(bytes))
        } else if self.is_rsa() {
            EncodingKey::from_rsa_pem(bytes)
        } else if self.is_ec() {
            EncodingKey::from_ec_pem(bytes)
        } else {
            EncodingKey::from_ed_pem(bytes)
        };
        result.map_err(|e| ConfigError::InvalidValue(format!("signing_key for {self}: {e}")))
    }

    fn decoding_key(self, key: &str) -> Result<DecodingKey, ConfigError> {
        let bytes = key.as_bytes();
        let result = if self.is_symmetric() {
            Ok(DecodingKey::from_secret(bytes))
        } else if self.is_rsa() {
            DecodingKey::from_rsa_pem(bytes)
        } else if self.is_ec() {
            DecodingKey::from_ec_pem(bytes)
        } else {
            DecodingKey::from_ed_pem(bytes)
        };
        result.map_err(|e| ConfigError::InvalidValue(format!("verifying_key for {self}: {e}")))
    }
}

impl fmt::Display for SigningAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for SigningAlgorithm {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "HS256" => Ok(Self::HS256),
            "HS384" => Ok(Self::HS384),
            "HS512" => Ok(Self::HS512),
            "RS256" => Ok(Self::RS256),
            "RS384" => Ok(Self::RS384),
            "RS512" => Ok(Self::RS512),
            "PS256" => Ok(Self::PS256),
            "PS384" => Ok(Self::PS384),
            "PS512" => Ok(Self::PS512),
            "ES256" => Ok(Self::ES256),
            "ES384" => Ok(Self::ES384),
            "EdDSA" => Ok(Self::EdDSA),
            other => Err(ConfigError::InvalidValue(format!(
                "Unrecognized algorithm type '{other}'"
            ))),
        }
    }
}

// ============================================================================
// Token Backend
// ============================================================================

/// Encodes and decodes signed tokens.
///
/// Thread-safe; share it behind an `Arc`.
pub struct TokenBackend {
    algorithm: SigningAlgorithm,
    encoding_key: Option<EncodingKey>,
    verifying_key: Option<DecodingKey>,
    jwks: Option<JwksClient>,
    audience: Option<String>,
    issuer: Option<String>,
    leeway: Duration,
    clock: Arc<dyn Clock>,
}

impl TokenBackend {
    /// Builds a backend from settings, parsing all key material up front.
    ///
    /// # Errors
    ///
    /// Returns an error if a key cannot be parsed for the configured
    /// algorithm, or if an asymmetric algorithm has no way to obtain a
    /// verifying key.
    pub fn new(settings: &AuthSettings, clock: Arc<dyn Clock>) -> Result<Self, ConfigError> {
        let algorithm = settings.algorithm;

        let encoding_key = if settings.signing_key.is_empty() {
            None
        } else {
            Some(algorithm.encoding_key(&settings.signing_key)?)
        };

        let verifying_key = if algorithm.is_symmetric() {
            if settings.signing_key.is_empty() {
                return Err(ConfigError::Missing(format!(
                    "signing_key is required for {algorithm}"
                )));
            }
            Some(algorithm.decoding_key(&settings.signing_key)?)
        } else {
            match settings.verifying_key.as_deref() {
                Some(pem) if !pem.is_empty() => Some(algorithm.decoding_key(pem)?),
                _ => None,
            }
        };

        let jwks = match (&verifying_key, &settings.jwk_url) {
            (None, Some(url)) => {
                let config = JwksConfig::new()
                    .with_request_timeout(settings.jwks.timeout)
                    .with_default_ttl(settings.jwks.cache_ttl)
                    .with_allow_http(settings.jwks.allow_http);
                let client = JwksClient::new(url.clone(), config)
                    .map_err(|e| ConfigError::InvalidValue(format!("jwk_url: {e}")))?;
                Some(client)
            }
            (None, None) => {
                return Err(ConfigError::Missing(format!(
                    "verifying_key or jwk_url is required for {algorithm}"
                )));
            }
            (Some(_), _) => None,
        };

        Ok(Self {
            algorithm,
            encoding_key,
            verifying_key,
            jwks,
            audience: settings.audience.clone(),
            issuer: settings.issuer.clone(),
            leeway: settings.leeway.as_duration(),
            clock,
        })
    }

    /// Returns the signing algorithm.
    #[must_use]
    pub fn algorithm(&self) -> SigningAlgorithm {
        self.algorithm
    }

    /// Returns the clock skew tolerance.
    #[must_use]
    pub fn leeway(&self) -> Duration {
        self.leeway
    }

    /// Signs a claim set.
    ///
    /// `aud` and `iss` are injected into a copy of the claims when configured.
    ///
    /// # Errors
    ///
    /// Returns an error if no signing key is configured or signing fails.
    pub fn encode(&self, claims: &Claims) -> Result<String, BackendError> {
        let key = self
            .encoding_key
            .as_ref()
            .ok_or_else(|| BackendError::new("No signing key configured"))?;

        let mut payload = claims.clone();
        if let Some(audience) = &self.audience {
            payload.insert("aud".to_string(), Value::String(audience.clone()));
        }
        if let Some(issuer) = &self.issuer {
            payload.insert("iss".to_string(), Value::String(issuer.clone()));
        }

        let header = Header::new(self.algorithm.to_jwt_algorithm());
        jsonwebtoken::encode(&header, &payload, key)
            .map_err(|e| BackendError::new(format!("Failed to encode token: {e}")))
    }

    /// Decodes a signed string into its claim set.
    ///
    /// With `verify` set, the signature, `aud` (when configured), `iss` (when
    /// configured), `exp` and `nbf` are checked, with leeway applied to the
    /// time claims. Without it only the structure is decoded.
    ///
    /// # Errors
    ///
    /// Returns an error on algorithm mismatch, signature mismatch, structural
    /// corruption, expiry outside the leeway window, or key resolution
    /// failure.
    pub async fn decode(&self, token: &str, verify: bool) -> Result<Claims, BackendError> {
        if !verify {
            return decode_unverified(token);
        }

        let header = jsonwebtoken::decode_header(token).map_err(BackendError::invalid_token)?;
        if header.alg != self.algorithm.to_jwt_algorithm() {
            return Err(BackendError::new(BackendError::INVALID_ALGORITHM));
        }

        let key = self.resolve_key(&header).await?;

        let mut validation = Validation::new(self.algorithm.to_jwt_algorithm());
        validation.required_spec_claims.clear();
        // Time claims are checked against the injected clock below.
        validation.validate_exp = false;
        validation.validate_nbf = false;
        match &self.audience {
            Some(audience) => validation.set_audience(&[audience]),
            None => validation.validate_aud = false,
        }
        if let Some(issuer) = &self.issuer {
            validation.set_issuer(&[issuer]);
        }

        let data = jsonwebtoken::decode::<Claims>(token, &key, &validation)
            .map_err(BackendError::invalid_token)?;

        self.check_time_claims(&data.claims)?;
        Ok(data.claims)
    }

    async fn resolve_key(&self, header: &Header) -> Result<DecodingKey, BackendError> {
        if let Some(key) = &self.verifying_key {
            return Ok(key.clone());
        }

        let jwks = self
            .jwks
            .as_ref()
            .ok_or_else(|| BackendError::new("No verifying key configured"))?;
        let kid = header
            .kid
            .as_deref()
            .ok_or_else(|| BackendError::invalid_token("token header has no kid"))?;

        let (key, algorithm) = jwks.get_key(kid).await.map_err(|e| {
            tracing::warn!(kid, error = %e, "Failed to resolve verifying key");
            BackendError::new(format!("Failed to resolve verifying key: {e}"))
        })?;

        if algorithm.is_some_and(|alg| alg != self.algorithm.to_jwt_algorithm()) {
            return Err(BackendError::new(BackendError::INVALID_ALGORITHM));
        }

        Ok(key)
    }

    fn check_time_claims(&self, claims: &Claims) -> Result<(), BackendError> {
        let now = self.clock.now().unix_timestamp();
        let leeway = i64::try_from(self.leeway.as_secs()).unwrap_or(i64::MAX);

        if let Some(exp) = claims.get("exp") {
            let exp = numeric_date(exp)
                .ok_or_else(|| BackendError::invalid_token("exp must be a number"))?;
            if exp <= now.saturating_sub(leeway) {
                return Err(BackendError::invalid_token("signature has expired"));
            }
        }

        if let Some(nbf) = claims.get("nbf") {
            let nbf = numeric_date(nbf)
                .ok_or_else(|| BackendError::invalid_token("nbf must be a number"))?;
            if nbf > now.saturating_add(leeway) {
                return Err(BackendError::invalid_token("token is not yet valid"));
            }
        }

        Ok(())
    }
}

impl fmt::Debug for TokenBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenBackend")
            .field("algorithm", &self.algorithm)
            .field("can_sign", &self.encoding_key.is_some())
            .field("static_verifying_key", &self.verifying_key.is_some())
            .field("jwks", &self.jwks.as_ref().map(JwksClient::url))
            .field("audience", &self.audience)
            .field("issuer", &self.issuer)
            .field("leeway", &self.leeway)
            .finish_non_exhaustive()
    }
}

/// Reads an epoch-seconds claim, accepting integers and floats.
pub(crate) fn numeric_date(value: &Value) -> Option<i64> {
    value
        .as_i64()
        .or_else(|| value.as_f64().map(|f| f.floor() as i64))
}

/// Decodes the payload segment without checking the signature.
fn decode_unverified(token: &str) -> Result<Claims, BackendError> {
    jsonwebtoken::decode_header(token).map_err(BackendError::invalid_token)?;

    let mut segments = token.split('.');
    let payload = match (segments.next(), segments.next(), segments.next(), segments.next()) {
        (Some(_), Some(payload), Some(_), None) => payload,
        _ => return Err(BackendError::invalid_token("wrong number of segments")),
    };

    let bytes = URL_SAFE_NO_PAD
        .decode(payload)
        .map_err(BackendError::invalid_token)?;
    serde_json::from_slice::<Claims>(&bytes).map_err(BackendError::invalid_token)
}
