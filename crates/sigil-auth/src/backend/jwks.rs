//! Remote verifying key resolution.
//!
//! [`JwksClient`] fetches a JSON Web Key Set from a single endpoint and caches
//! it. A lookup for an unknown `kid` triggers one refetch before failing, so
//! key rotation at the provider is picked up without waiting for the TTL.
//!
//! - HTTP requests have a hard timeout; a slow endpoint fails the lookup
//!   instead of hanging the request.
//! - Responses larger than `max_response_size` are rejected.
//! - `Cache-Control: max-age` is honoured within `[min_ttl, max_ttl]`.
//! - Only HTTPS endpoints are allowed unless `allow_http` is set.

use std::time::{Duration, Instant};

use jsonwebtoken::jwk::{Jwk, JwkSet, KeyAlgorithm, PublicKeyUse};
use jsonwebtoken::{Algorithm, DecodingKey};
use tokio::sync::RwLock;
use url::Url;

/// Configuration for the JWKS client.
#[derive(Debug, Clone)]
pub struct JwksConfig {
    /// TTL when Cache-Control header is absent (default: 1 hour).
    pub default_ttl: Duration,

    /// Maximum TTL regardless of Cache-Control (default: 24 hours).
    pub max_ttl: Duration,

    /// Minimum TTL regardless of Cache-Control (default: 1 minute).
    pub min_ttl: Duration,

    /// HTTP request timeout (default: 5 seconds).
    pub request_timeout: Duration,

    /// Maximum response size in bytes (default: 1 MB).
    pub max_response_size: usize,

    /// Whether to allow HTTP (non-HTTPS) JWKS URIs.
    pub allow_http: bool,
}

impl Default for JwksConfig {
    fn default() -> Self {
        Self {
            default_ttl: Duration::from_secs(3600),
            max_ttl: Duration::from_secs(86400),
            min_ttl: Duration::from_secs(60),
            request_timeout: Duration::from_secs(5),
            max_response_size: 1024 * 1024,
            allow_http: false,
        }
    }
}

impl JwksConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the default TTL (used when Cache-Control is absent).
    #[must_use]
    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }

    /// Sets the maximum TTL.
    #[must_use]
    pub fn with_max_ttl(mut self, ttl: Duration) -> Self {
        self.max_ttl = ttl;
        self
    }

    /// Sets the minimum TTL.
    #[must_use]
    pub fn with_min_ttl(mut self, ttl: Duration) -> Self {
        self.min_ttl = ttl;
        self
    }

    /// Sets the HTTP request timeout.
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Sets the maximum response size.
    #[must_use]
    pub fn with_max_response_size(mut self, size: usize) -> Self {
        self.max_response_size = size;
        self
    }

    /// Allows HTTP (non-HTTPS) JWKS URIs. Testing only.
    #[must_use]
    pub fn with_allow_http(mut self, allow: bool) -> Self {
        self.allow_http = allow;
        self
    }
}

/// Errors that can occur during JWKS operations.
#[derive(Debug, thiserror::Error)]
pub enum JwksError {
    /// The HTTP client could not be built.
    #[error("HTTP client error: {0}")]
    Client(String),

    /// A network error occurred while fetching the JWKS.
    #[error("Network error: {0}")]
    NetworkError(String),

    /// The HTTP request returned a non-success status code.
    #[error("HTTP error: status {0}")]
    HttpError(u16),

    /// The JWKS response could not be parsed as JSON.
    #[error("Failed to parse JWKS: {0}")]
    ParseError(String),

    /// The requested key was not found in the JWKS.
    #[error("Key not found: {0}")]
    KeyNotFound(String),

    /// The key could not be converted to a decoding key.
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    /// The JWKS URI scheme is not allowed.
    #[error("Invalid URL scheme: only HTTPS is allowed")]
    InvalidScheme,

    /// The response exceeded the maximum allowed size.
    #[error("Response exceeds maximum size of {max_size} bytes")]
    ResponseTooLarge {
        /// The maximum allowed size.
        max_size: usize,
    },
}

struct CachedJwks {
    jwks: JwkSet,
    fetched_at: Instant,
    expires_at: Instant,
}

/// Fetches and caches the key set published at one JWKS endpoint.
pub struct JwksClient {
    url: Url,
    http_client: reqwest::Client,
    cache: RwLock<Option<CachedJwks>>,
    config: JwksConfig,
}

impl JwksClient {
    /// Creates a client for `url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the scheme is not allowed or the HTTP client
    /// cannot be built.
    pub fn new(url: Url, config: JwksConfig) -> Result<Self, JwksError> {
        validate_scheme(&url, config.allow_http)?;

        let http_client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| JwksError::Client(e.to_string()))?;

        Ok(Self {
            url,
            http_client,
            cache: RwLock::new(None),
            config,
        })
    }

    /// Returns the endpoint URL.
    #[must_use]
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Gets a decoding key by key ID.
    ///
    /// Checks the cache first; on a miss or an expired cache it fetches a
    /// fresh key set once. An unknown `kid` against a cache fetched less than
    /// `min_ttl` ago fails without another fetch.
    ///
    /// # Returns
    ///
    /// The `DecodingKey` and the algorithm the key is published for, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the key set cannot be fetched, the key is not
    /// present, or it cannot be converted to a decoding key.
    pub async fn get_key(&self, kid: &str) -> Result<(DecodingKey, Option<Algorithm>), JwksError> {
        if let Some(result) = self.cached_key(kid).await {
            tracing::trace!(kid, url = %self.url, "JWKS cache hit");
            return result;
        }

        if self.fetched_within(self.config.min_ttl).await {
            tracing::debug!(kid, url = %self.url, "Unknown kid, JWKS fetched recently");
            return Err(JwksError::KeyNotFound(kid.to_string()));
        }

        tracing::debug!(kid, url = %self.url, "JWKS cache miss");
        self.refresh().await?;

        self.cached_key(kid)
            .await
            .unwrap_or_else(|| Err(JwksError::KeyNotFound(kid.to_string())))
    }

    async fn fetched_within(&self, cooldown: Duration) -> bool {
        self.cache.read().await.as_ref().is_some_and(|c| {
            Instant::now() < c.expires_at && c.fetched_at.elapsed() < cooldown
        })
    }

    async fn cached_key(&self, kid: &str) -> Option<Result<(DecodingKey, Option<Algorithm>), JwksError>> {
        let cache = self.cache.read().await;
        let cached = cache.as_ref()?;
        if Instant::now() >= cached.expires_at {
            return None;
        }

        let jwk = cached
            .jwks
            .keys
            .iter()
            .filter(|k| !matches!(k.common.public_key_use, Some(PublicKeyUse::Encryption)))
            .find(|k| k.common.key_id.as_deref() == Some(kid))?;

        Some(
            DecodingKey::from_jwk(jwk)
                .map(|key| (key, jwk_algorithm(jwk)))
                .map_err(|e| JwksError::InvalidKey(e.to_string())),
        )
    }

    /// Fetches the key set and replaces the cache, regardless of cache state.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails, times out, returns a non-success
    /// status, is too large, or is not a valid JWKS document.
    pub async fn refresh(&self) -> Result<(), JwksError> {
        tracing::debug!(url = %self.url, "Fetching JWKS");

        let response = self
            .http_client
            .get(self.url.as_str())
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| {
                tracing::warn!(url = %self.url, error = %e, "Failed to fetch JWKS");
                JwksError::NetworkError(e.to_string())
            })?;

        if !response.status().is_success() {
            return Err(JwksError::HttpError(response.status().as_u16()));
        }

        let max_size = self.config.max_response_size;
        if response
            .content_length()
            .is_some_and(|len| len > max_size as u64)
        {
            return Err(JwksError::ResponseTooLarge { max_size });
        }

        let ttl = self.parse_cache_control(response.headers());

        let body = response
            .bytes()
            .await
            .map_err(|e| JwksError::NetworkError(e.to_string()))?;
        if body.len() > max_size {
            return Err(JwksError::ResponseTooLarge { max_size });
        }

        let jwks: JwkSet = serde_json::from_slice(&body).map_err(|e| {
            tracing::warn!(url = %self.url, error = %e, "Failed to parse JWKS");
            JwksError::ParseError(e.to_string())
        })?;

        tracing::debug!(url = %self.url, keys = jwks.keys.len(), ?ttl, "Cached JWKS");

        let fetched_at = Instant::now();
        *self.cache.write().await = Some(CachedJwks {
            jwks,
            fetched_at,
            expires_at: fetched_at + ttl,
        });

        Ok(())
    }

    /// Drops the cached key set.
    pub async fn invalidate(&self) {
        *self.cache.write().await = None;
    }

    /// Returns `true` if a non-expired key set is cached.
    pub async fn is_cached(&self) -> bool {
        self.cache
            .read()
            .await
            .as_ref()
            .is_some_and(|c| Instant::now() < c.expires_at)
    }

    /// Extracts `max-age` and clamps it between `min_ttl` and `max_ttl`.
    fn parse_cache_control(&self, headers: &reqwest::header::HeaderMap) -> Duration {
        let ttl = headers
            .get(reqwest::header::CACHE_CONTROL)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| {
                v.split(',').find_map(|directive| {
                    directive
                        .trim()
                        .strip_prefix("max-age=")
                        .and_then(|s| s.parse::<u64>().ok())
                })
            })
            .map(Duration::from_secs)
            .unwrap_or(self.config.default_ttl);

        ttl.min(self.config.max_ttl).max(self.config.min_ttl)
    }
}

fn validate_scheme(uri: &Url, allow_http: bool) -> Result<(), JwksError> {
    match uri.scheme() {
        "https" => Ok(()),
        "http" if allow_http => Ok(()),
        _ => Err(JwksError::InvalidScheme),
    }
}

fn jwk_algorithm(jwk: &Jwk) -> Option<Algorithm> {
    jwk.common.key_algorithm.as_ref().and_then(|alg| match alg {
        KeyAlgorithm::RS256 => Some(Algorithm::RS256),
        KeyAlgorithm::RS384 => Some(Algorithm::RS384),
        KeyAlgorithm::RS512 => Some(Algorithm::RS512),
        KeyAlgorithm::ES256 => Some(Algorithm::ES256),
        KeyAlgorithm::ES384 => Some(Algorithm::ES384),
        KeyAlgorithm::PS256 => Some(Algorithm::PS256),
        KeyAlgorithm::PS384 => Some(Algorithm::PS384),
        KeyAlgorithm::PS512 => Some(Algorithm::PS512),
        KeyAlgorithm::EdDSA => Some(Algorithm::EdDSA),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    // Public half of the RFC 7517 appendix A.1 example key.
    const EXAMPLE_N: &str = "0vx7agoebGcQSuuPiLJXZptN9nndrQmbXEps2aiAFbWhM78LhWx4cbbfAAtVT86zwu1RK7aPFFxuhDR1L6tSoc_BJECPebWKRXjBZCiFV4n3oknjhMstn64tZ_2W-5JsGY4Hc5n9yBXArwl93lqt7_RN5w6Cf0h4QyQ5v-65YGjQR0_FDW2QvzqY368QQMicAtaSqzs8KJZgnYb9c7d0zgdAZHzu6qMQvRL5hajrn1n91CbOpbISD08qNLyrdkt-bFTWhAI4vMQFh6WeZu0fM4lFd2NcRwr3XPksINHaQ-G_xBniIqbw0Ls1jF44-csFCur-kEgU8awapJzKnqDKgw";

    fn example_jwks() -> serde_json::Value {
        json!({
            "keys": [
                {"kty": "RSA", "kid": "key-1", "use": "sig", "alg": "RS256", "n": EXAMPLE_N, "e": "AQAB"},
                {"kty": "RSA", "kid": "enc-key", "use": "enc", "n": EXAMPLE_N, "e": "AQAB"}
            ]
        })
    }

    async fn client_for(server: &MockServer) -> JwksClient {
        let url = Url::parse(&format!("{}/.well-known/jwks.json", server.uri())).unwrap();
        JwksClient::new(url, JwksConfig::default().with_allow_http(true)).unwrap()
    }

    #[test]
    fn test_config_defaults() {
        let config = JwksConfig::default();
        assert_eq!(config.default_ttl, Duration::from_secs(3600));
        assert_eq!(config.max_ttl, Duration::from_secs(86400));
        assert_eq!(config.min_ttl, Duration::from_secs(60));
        assert_eq!(config.request_timeout, Duration::from_secs(5));
        assert_eq!(config.max_response_size, 1024 * 1024);
        assert!(!config.allow_http);
    }

    #[test]
    fn test_validate_scheme() {
        let https = Url::parse("https://example.com/jwks").unwrap();
        let http = Url::parse("http://example.com/jwks").unwrap();
        let file = Url::parse("file:///etc/jwks.json").unwrap();

        assert!(validate_scheme(&https, false).is_ok());
        assert!(validate_scheme(&http, false).is_err());
        assert!(validate_scheme(&http, true).is_ok());
        assert!(validate_scheme(&file, true).is_err());

        assert!(matches!(
            JwksClient::new(http, JwksConfig::default()),
            Err(JwksError::InvalidScheme)
        ));
    }

    #[test]
    fn test_parse_cache_control() {
        let url = Url::parse("https://example.com/jwks").unwrap();
        let config = JwksConfig::default()
            .with_default_ttl(Duration::from_secs(3600))
            .with_min_ttl(Duration::from_secs(60))
            .with_max_ttl(Duration::from_secs(7200));
        let client = JwksClient::new(url, config).unwrap();

        let headers = reqwest::header::HeaderMap::new();
        assert_eq!(client.parse_cache_control(&headers), Duration::from_secs(3600));

        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::CACHE_CONTROL,
            "public, max-age=1800".parse().unwrap(),
        );
        assert_eq!(client.parse_cache_control(&headers), Duration::from_secs(1800));

        headers.insert(reqwest::header::CACHE_CONTROL, "max-age=5".parse().unwrap());
        assert_eq!(client.parse_cache_control(&headers), Duration::from_secs(60));

        headers.insert(
            reqwest::header::CACHE_CONTROL,
            "max-age=100000".parse().unwrap(),
        );
        assert_eq!(client.parse_cache_control(&headers), Duration::from_secs(7200));
    }

    #[tokio::test]
    async fn test_get_key_by_kid_uses_cache() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/.well-known/jwks.json"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(example_jwks())
                    .insert_header("Cache-Control", "max-age=3600"),
            )
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let (_, alg) = client.get_key("key-1").await.unwrap();
        assert_eq!(alg, Some(Algorithm::RS256));
        assert!(client.is_cached().await);

        // Served from cache.
        client.get_key("key-1").await.unwrap();
    }

    #[tokio::test]
    async fn test_unknown_kid_refetches_after_cooldown() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/.well-known/jwks.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(example_jwks()))
            .expect(2)
            .mount(&server)
            .await;

        let url = Url::parse(&format!("{}/.well-known/jwks.json", server.uri())).unwrap();
        let config = JwksConfig::default()
            .with_allow_http(true)
            .with_min_ttl(Duration::ZERO);
        let client = JwksClient::new(url, config).unwrap();
        client.refresh().await.unwrap();

        let err = client.get_key("rotated-away").await.unwrap_err();
        assert!(matches!(err, JwksError::KeyNotFound(_)));
    }

    #[tokio::test]
    async fn test_unknown_kids_do_not_refetch_fresh_cache() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/.well-known/jwks.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"keys": []})))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        for i in 0..10 {
            let err = client.get_key(&format!("unknown-{i}")).await.unwrap_err();
            assert!(matches!(err, JwksError::KeyNotFound(_)));
        }

        let fetches = server.received_requests().await.unwrap();
        assert_eq!(fetches.len(), 1);
    }

    #[tokio::test]
    async fn test_encryption_keys_are_ignored() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(example_jwks()))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        assert!(matches!(
            client.get_key("enc-key").await,
            Err(JwksError::KeyNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_http_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        assert!(matches!(
            client.get_key("key-1").await,
            Err(JwksError::HttpError(503))
        ));
    }

    #[tokio::test]
    async fn test_slow_endpoint_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(example_jwks())
                    .set_delay(Duration::from_secs(2)),
            )
            .mount(&server)
            .await;

        let url = Url::parse(&format!("{}/jwks", server.uri())).unwrap();
        let config = JwksConfig::default()
            .with_allow_http(true)
            .with_request_timeout(Duration::from_millis(200));
        let client = JwksClient::new(url, config).unwrap();

        assert!(matches!(
            client.get_key("key-1").await,
            Err(JwksError::NetworkError(_))
        ));
    }

    #[tokio::test]
    async fn test_invalidate() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(example_jwks()))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        client.refresh().await.unwrap();
        assert!(client.is_cached().await);

        client.invalidate().await;
        assert!(!client.is_cached().await);
    }

    #[test]
    fn test_jwks_error_display() {
        assert_eq!(
            JwksError::HttpError(404).to_string(),
            "HTTP error: status 404"
        );
        assert_eq!(
            JwksError::KeyNotFound("key-1".to_string()).to_string(),
            "Key not found: key-1"
        );
        assert_eq!(
            JwksError::ResponseTooLarge { max_size: 1024 }.to_string(),
            "Response exceeds maximum size of 1024 bytes"
        );
    }
}
