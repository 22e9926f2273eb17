//! Key-set fetching and caching for the identity provider's JWKS endpoint.
//!
//! The provider publishes its token signing keys as a JSON Web Key Set. This
//! module fetches that set, caches it, and picks the keys that can verify a
//! given token.
//!
//! # Cache-Control Support
//!
//! The cache respects `Cache-Control: max-age=X` on the provider's response.
//! The resulting TTL is clamped to configurable minimum and maximum bounds.
//!
//! # Refresh
//!
//! [`KeySetCache::keys`] fetches only when nothing is cached or the entry has
//! expired. [`KeySetCache::refresh`] always fetches. When a cached key set
//! fails to verify a token the verifier goes through
//! [`KeySetCache::refresh_after_rejection`], which fetches at most once per
//! `refresh_cooldown`, so tokens with made-up key ids cannot drive traffic to
//! the provider.
//!
//! # Security Considerations
//!
//! - Only HTTPS URLs are allowed (configurable for testing)
//! - HTTP timeouts prevent hanging on slow endpoints
//! - Response size is limited
//! - TTL is bounded so a hostile Cache-Control cannot pin a key set forever

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use jsonwebtoken::jwk::{Jwk, JwkSet, KeyAlgorithm, PublicKeyUse};
use jsonwebtoken::{Algorithm, DecodingKey};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use url::Url;

/// Configuration for the key-set cache.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JwksCacheConfig {
    /// TTL when the response has no usable Cache-Control (default: 1 hour).
    #[serde(with = "humantime_serde")]
    pub default_ttl: Duration,

    /// Maximum TTL regardless of Cache-Control (default: 24 hours).
    #[serde(with = "humantime_serde")]
    pub max_ttl: Duration,

    /// Minimum TTL regardless of Cache-Control (default: 5 minutes).
    #[serde(with = "humantime_serde")]
    pub min_ttl: Duration,

    /// HTTP request timeout (default: 10 seconds).
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,

    /// Maximum response size in bytes (default: 1 MB).
    pub max_response_size: usize,

    /// Minimum time between refreshes forced by rejected tokens
    /// (default: 30 seconds).
    #[serde(with = "humantime_serde")]
    pub refresh_cooldown: Duration,

    /// Whether to allow plain HTTP JWKS URLs.
    /// This should only be enabled for testing.
    pub allow_http: bool,
}

impl Default for JwksCacheConfig {
    fn default() -> Self {
        Self {
            default_ttl: Duration::from_secs(3600),
            max_ttl: Duration::from_secs(86400),
            min_ttl: Duration::from_secs(300),
            request_timeout: Duration::from_secs(10),
            max_response_size: 1024 * 1024,
            refresh_cooldown: Duration::from_secs(30),
            allow_http: false,
        }
    }
}

impl JwksCacheConfig {
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

    /// Sets the minimum interval between forced refreshes.
    #[must_use]
    pub fn with_refresh_cooldown(mut self, cooldown: Duration) -> Self {
        self.refresh_cooldown = cooldown;
        self
    }

    /// Allows plain HTTP JWKS URLs.
    #[must_use]
    pub fn with_allow_http(mut self, allow: bool) -> Self {
        self.allow_http = allow;
        self
    }
}

/// Errors that can occur while fetching or using the key set.
#[derive(Debug, thiserror::Error)]
pub enum JwksError {
    /// A network error occurred while fetching the JWKS.
    #[error("Network error: {0}")]
    NetworkError(String),

    /// The HTTP request returned a non-success status code.
    #[error("HTTP error: status {0}")]
    HttpError(u16),

    /// The JWKS response could not be parsed.
    #[error("Failed to parse JWKS: {0}")]
    ParseError(String),

    /// No key in the set has the requested `kid`.
    #[error("Key not found: {0}")]
    KeyNotFound(String),

    /// No usable signing key was found in the set.
    #[error("No signing keys found in JWKS")]
    NoSigningKeys,

    /// The key could not be converted to a decoding key.
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    /// The JWKS URL scheme is not allowed (must be HTTPS in production).
    #[error("Invalid URL scheme: only HTTPS is allowed")]
    InvalidScheme,

    /// The response exceeded the maximum allowed size.
    #[error("Response exceeds maximum size of {max_size} bytes")]
    ResponseTooLarge {
        /// The maximum allowed size.
        max_size: usize,
    },
}

impl JwksError {
    /// Returns `true` if a freshly fetched key set might resolve this error.
    #[must_use]
    pub fn is_missing_key(&self) -> bool {
        matches!(self, Self::KeyNotFound(_) | Self::NoSigningKeys)
    }
}

/// A key set returned by [`KeySetCache::keys`].
#[derive(Debug, Clone)]
pub struct KeySetSnapshot {
    pub jwks: Arc<JwkSet>,
    /// `true` if served from the cache without a fetch.
    pub from_cache: bool,
}

/// A verification key selected from the key set.
#[derive(Clone)]
pub struct ResolvedKey {
    pub kid: Option<String>,
    pub key: DecodingKey,
    pub algorithm: Option<Algorithm>,
}

impl std::fmt::Debug for ResolvedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedKey")
            .field("kid", &self.kid)
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}

struct CachedJwks {
    jwks: Arc<JwkSet>,
    expires_at: Instant,
}

/// Process-wide cache of the provider's key set.
///
/// One instance is created at startup and shared through the application
/// state. Concurrent refreshes are allowed; the last one to finish wins.
pub struct KeySetCache {
    http_client: reqwest::Client,
    jwks_url: Url,
    entry: RwLock<Option<CachedJwks>>,
    last_forced_refresh: Mutex<Option<Instant>>,
    fetch_count: AtomicU64,
    config: JwksCacheConfig,
}

impl KeySetCache {
    /// Creates a cache for the given JWKS URL. Nothing is fetched yet.
    ///
    /// # Errors
    ///
    /// Returns `JwksError::InvalidScheme` if the URL is not HTTPS (unless
    /// `allow_http` is set), or `JwksError::NetworkError` if the HTTP client
    /// cannot be built.
    pub fn new(jwks_url: Url, config: JwksCacheConfig) -> Result<Self, JwksError> {
        validate_scheme(&jwks_url, config.allow_http)?;

        let http_client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| JwksError::NetworkError(e.to_string()))?;

        Ok(Self {
            http_client,
            jwks_url,
            entry: RwLock::new(None),
            last_forced_refresh: Mutex::new(None),
            fetch_count: AtomicU64::new(0),
            config,
        })
    }

    /// The endpoint this cache fetches from.
    #[must_use]
    pub fn jwks_url(&self) -> &Url {
        &self.jwks_url
    }

    /// Number of fetches performed so far.
    #[must_use]
    pub fn fetch_count(&self) -> u64 {
        self.fetch_count.load(Ordering::Relaxed)
    }

    /// Returns the cached key set, fetching it if absent or expired.
    ///
    /// # Errors
    ///
    /// Returns an error if a fetch was needed and failed.
    pub async fn keys(&self) -> Result<KeySetSnapshot, JwksError> {
        {
            let entry = self.entry.read().await;
            if let Some(cached) = entry.as_ref()
                && Instant::now() < cached.expires_at
            {
                tracing::trace!(url = %self.jwks_url, "JWKS cache hit");
                return Ok(KeySetSnapshot {
                    jwks: cached.jwks.clone(),
                    from_cache: true,
                });
            }
        }

        tracing::debug!(url = %self.jwks_url, "JWKS cache miss");
        let jwks = self.refresh().await?;
        Ok(KeySetSnapshot {
            jwks,
            from_cache: false,
        })
    }

    /// Fetches the key set from the endpoint and replaces the cached entry.
    ///
    /// This always fetches, regardless of cache state. On failure the
    /// previous entry is left untouched.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The HTTP request fails or times out
    /// - The provider returns a non-success status
    /// - The response is too large or cannot be parsed as a JWKS
    pub async fn refresh(&self) -> Result<Arc<JwkSet>, JwksError> {
        tracing::debug!(url = %self.jwks_url, "Fetching JWKS");
        self.fetch_count.fetch_add(1, Ordering::Relaxed);

        let response = self
            .http_client
            .get(self.jwks_url.as_str())
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| {
                tracing::warn!(url = %self.jwks_url, error = %e, "Failed to fetch JWKS");
                JwksError::NetworkError(e.to_string())
            })?;

        if !response.status().is_success() {
            return Err(JwksError::HttpError(response.status().as_u16()));
        }

        if let Some(len) = response.content_length()
            && usize::try_from(len).map_or(true, |len| len > self.config.max_response_size)
        {
            return Err(JwksError::ResponseTooLarge {
                max_size: self.config.max_response_size,
            });
        }

        let ttl = self.parse_cache_control(response.headers());

        let body = response
            .bytes()
            .await
            .map_err(|e| JwksError::NetworkError(e.to_string()))?;
        if body.len() > self.config.max_response_size {
            return Err(JwksError::ResponseTooLarge {
                max_size: self.config.max_response_size,
            });
        }

        let jwks: JwkSet = serde_json::from_slice(&body).map_err(|e| {
            tracing::warn!(url = %self.jwks_url, error = %e, "Failed to parse JWKS");
            JwksError::ParseError(e.to_string())
        })?;
        let jwks = Arc::new(jwks);

        tracing::debug!(
            url = %self.jwks_url,
            keys = jwks.keys.len(),
            ttl = ?ttl,
            "Cached JWKS"
        );

        let mut entry = self.entry.write().await;
        *entry = Some(CachedJwks {
            jwks: jwks.clone(),
            expires_at: Instant::now() + ttl,
        });

        Ok(jwks)
    }

    /// Refetches after a cached key set rejected a token.
    ///
    /// Returns `Ok(None)` without fetching if another forced refresh started
    /// less than `refresh_cooldown` ago. The cooldown starts when the fetch
    /// starts, so a failed fetch also counts.
    ///
    /// # Errors
    ///
    /// Same as [`refresh`](Self::refresh).
    pub async fn refresh_after_rejection(&self) -> Result<Option<Arc<JwkSet>>, JwksError> {
        {
            let mut last = self.last_forced_refresh.lock().await;
            if let Some(at) = *last
                && at.elapsed() < self.config.refresh_cooldown
            {
                tracing::debug!(
                    url = %self.jwks_url,
                    cooldown = ?self.config.refresh_cooldown,
                    "Skipping forced JWKS refresh"
                );
                return Ok(None);
            }
            *last = Some(Instant::now());
        }

        self.refresh().await.map(Some)
    }

    /// Drops the cached entry so the next [`keys`](Self::keys) call fetches.
    pub async fn invalidate(&self) {
        *self.entry.write().await = None;
        tracing::debug!(url = %self.jwks_url, "Invalidated JWKS cache");
    }

    /// Returns `true` if an unexpired entry is cached.
    pub async fn is_cached(&self) -> bool {
        self.entry
            .read()
            .await
            .as_ref()
            .is_some_and(|cached| Instant::now() < cached.expires_at)
    }

    /// Extracts `max-age` and clamps it between `min_ttl` and `max_ttl`.
    /// Falls back to `default_ttl` when absent or unparseable.
    fn parse_cache_control(&self, headers: &reqwest::header::HeaderMap) -> Duration {
        let ttl = headers
            .get(reqwest::header::CACHE_CONTROL)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| {
                v.split(',').find_map(|directive| {
                    directive
                        .trim()
                        .strip_prefix("max-age=")
                        .and_then(|secs| secs.parse::<u64>().ok())
                })
            })
            .map(Duration::from_secs)
            .unwrap_or(self.config.default_ttl);

        ttl.min(self.config.max_ttl).max(self.config.min_ttl)
    }

    #[cfg(test)]
    async fn seed(&self, jwks: JwkSet, ttl: Duration) {
        *self.entry.write().await = Some(CachedJwks {
            jwks: Arc::new(jwks),
            expires_at: Instant::now() + ttl,
        });
    }
}

impl std::fmt::Debug for KeySetCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeySetCache")
            .field("jwks_url", &self.jwks_url.as_str())
            .field("fetch_count", &self.fetch_count())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Selects the keys that may verify a token with the given header fields.
///
/// With a `kid`, the matching signing key is returned alone. Without one,
/// every signing key whose declared algorithm is absent or equal to `alg` is
/// returned, in key-set order. Keys with `use: "enc"` are never returned.
///
/// # Errors
///
/// Returns `JwksError::KeyNotFound` if `kid` matches nothing,
/// `JwksError::InvalidKey` if the matching key cannot be used, and
/// `JwksError::NoSigningKeys` if no candidate remains without a `kid`.
pub fn select_keys(
    jwks: &JwkSet,
    kid: Option<&str>,
    alg: Algorithm,
) -> Result<Vec<ResolvedKey>, JwksError> {
    let mut signing = jwks.keys.iter().filter(|k| {
        !matches!(&k.common.public_key_use, Some(PublicKeyUse::Encryption))
    });

    if let Some(kid) = kid {
        let jwk = signing
            .find(|k| k.common.key_id.as_deref() == Some(kid))
            .ok_or_else(|| JwksError::KeyNotFound(kid.to_string()))?;
        let algorithm = jwk_algorithm(jwk);
        if algorithm.is_some_and(|a| a != alg) {
            return Err(JwksError::InvalidKey(format!(
                "key {kid} is declared for {algorithm:?}, token uses {alg:?}"
            )));
        }
        let key = DecodingKey::from_jwk(jwk).map_err(|e| JwksError::InvalidKey(e.to_string()))?;
        return Ok(vec![ResolvedKey {
            kid: Some(kid.to_string()),
            key,
            algorithm,
        }]);
    }

    let keys: Vec<_> = signing
        .filter(|jwk| jwk_algorithm(jwk).is_none_or(|a| a == alg))
        .filter_map(|jwk| {
            DecodingKey::from_jwk(jwk).ok().map(|key| ResolvedKey {
                kid: jwk.common.key_id.clone(),
                key,
                algorithm: jwk_algorithm(jwk),
            })
        })
        .collect();

    if keys.is_empty() {
        Err(JwksError::NoSigningKeys)
    } else {
        Ok(keys)
    }
}

fn validate_scheme(url: &Url, allow_http: bool) -> Result<(), JwksError> {
    match url.scheme() {
        "https" => Ok(()),
        "http" if allow_http => Ok(()),
        _ => Err(JwksError::InvalidScheme),
    }
}

/// Extracts the signing algorithm from a JWK.
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
