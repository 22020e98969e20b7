//! Issuer key-set (JWKS) fetching and caching.
//!
//! The identity provider publishes its signing keys as a JSON Web Key Set.
//! This module fetches that document over HTTPS and holds it in a cache with
//! a freshness window so that steady-state requests verify tokens without
//! touching the network.
//!
//! # Refresh discipline
//!
//! The cache is shared across concurrent requests. Refreshes are
//! single-flight: concurrent cache misses collapse into one outstanding HTTP
//! fetch, with the losers awaiting the winner's result instead of issuing
//! redundant calls. A token naming a key id that is absent from a fresh
//! cache triggers exactly one refresh attempt within the request; if the key
//! is still absent the request fails closed.
//!
//! # Security Considerations
//!
//! - Only HTTPS endpoints are allowed (configurable for testing)
//! - The fetch has a bounded timeout and a bounded response size
//! - A fetch failure never results in an authentication bypass

use std::time::{Duration, Instant};

use jsonwebtoken::jwk::JwkSet;
use jsonwebtoken::{Algorithm, DecodingKey};
use tokio::sync::{Mutex, RwLock};
use url::Url;

/// Configuration for the key-set cache.
#[derive(Debug, Clone)]
pub struct KeySetConfig {
    /// How long a fetched key set is considered fresh (default: 10 minutes).
    pub ttl: Duration,

    /// HTTP request timeout for the JWKS fetch (default: 10 seconds).
    pub request_timeout: Duration,

    /// Maximum response size in bytes (default: 1 MB).
    pub max_response_size: usize,

    /// Whether to allow HTTP (non-HTTPS) JWKS endpoints.
    /// This should only be enabled for testing.
    pub allow_http: bool,
}

impl Default for KeySetConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(600),            // 10 minutes
            request_timeout: Duration::from_secs(10), // 10 seconds
            max_response_size: 1024 * 1024,           // 1 MB
            allow_http: false,
        }
    }
}

impl KeySetConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the freshness window.
    #[must_use]
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
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

    /// Allows HTTP (non-HTTPS) JWKS endpoints.
    ///
    /// # Warning
    ///
    /// This should only be used for testing. In production the JWKS endpoint
    /// must use HTTPS.
    #[must_use]
    pub fn with_allow_http(mut self, allow: bool) -> Self {
        self.allow_http = allow;
        self
    }
}

/// Errors that can occur during key-set operations.
#[derive(Debug, thiserror::Error)]
pub enum KeySetError {
    /// A network error occurred while fetching the key set.
    #[error("Network error: {0}")]
    Network(String),

    /// The HTTP request returned a non-success status code.
    #[error("HTTP error: status {0}")]
    Http(u16),

    /// The response could not be parsed as a JWKS document.
    #[error("Failed to parse key set: {0}")]
    Parse(String),

    /// The requested key id was not found in the key set.
    #[error("Key not found: {0}")]
    KeyNotFound(String),

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

/// Cached key set with its fetch timestamp.
struct CachedKeys {
    jwks: JwkSet,
    fetched_at: Instant,
}

/// TTL-bounded cache in front of the issuer's JWKS endpoint.
///
/// Owned by the filter state; not ambient global state. Lookups hit the
/// cache while it is fresh; misses fetch synchronously with a single-flight
/// discipline.
pub struct KeySetCache {
    http_client: reqwest::Client,
    jwks_url: Url,
    cached: RwLock<Option<CachedKeys>>,
    /// Serializes refreshes; see [`Self::refresh_if_older_than`].
    refresh_gate: Mutex<()>,
    config: KeySetConfig,
}

impl KeySetCache {
    /// Creates a new cache for the given JWKS endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`KeySetError::InvalidScheme`] if the endpoint is not HTTPS
    /// and `allow_http` is not set.
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client cannot be created (should not happen in
    /// practice).
    pub fn new(jwks_url: Url, config: KeySetConfig) -> Result<Self, KeySetError> {
        validate_scheme(&jwks_url, config.allow_http)?;

        let http_client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .expect("Failed to create HTTP client");

        Ok(Self {
            http_client,
            jwks_url,
            cached: RwLock::new(None),
            refresh_gate: Mutex::new(()),
            config,
        })
    }

    /// Resolves the decoding key for a token's key id.
    ///
    /// Consults the cache first; if the key set is stale or does not contain
    /// `kid`, performs exactly one refresh and retries the lookup.
    ///
    /// # Errors
    ///
    /// - [`KeySetError::KeyNotFound`] if `kid` is absent even after a refresh
    /// - a fetch error if the key set had to be refreshed and the fetch
    ///   failed (the request fails closed; a stale cached copy is never
    ///   silently reused)
    pub async fn decoding_key(
        &self,
        kid: &str,
    ) -> Result<(DecodingKey, Option<Algorithm>), KeySetError> {
        let started = Instant::now();

        if let Some(found) = self.lookup_fresh(kid).await {
            tracing::trace!(kid, "key set cache hit");
            return Ok(found);
        }

        tracing::debug!(kid, url = %self.jwks_url, "key set cache miss");
        self.refresh_if_older_than(started).await?;

        self.lookup_fresh(kid)
            .await
            .ok_or_else(|| KeySetError::KeyNotFound(kid.to_string()))
    }

    /// Looks up `kid` in the cache, honoring the freshness window.
    async fn lookup_fresh(&self, kid: &str) -> Option<(DecodingKey, Option<Algorithm>)> {
        let cached = self.cached.read().await;
        let entry = cached.as_ref()?;

        if entry.fetched_at.elapsed() > self.config.ttl {
            return None;
        }

        entry
            .jwks
            .keys
            .iter()
            .find(|k| k.common.key_id.as_deref() == Some(kid))
            .and_then(|jwk| {
                DecodingKey::from_jwk(jwk)
                    .ok()
                    .map(|dk| (dk, jwk_algorithm(jwk)))
            })
    }

    /// Refreshes the cache unless another caller already did while we were
    /// waiting for the gate.
    ///
    /// `observed` is the instant at which the caller decided a refresh was
    /// needed: if the cache was (re)fetched after that instant, the waiting
    /// caller reuses the winner's result instead of fetching again. This is
    /// the single-flight discipline.
    async fn refresh_if_older_than(&self, observed: Instant) -> Result<(), KeySetError> {
        let _gate = self.refresh_gate.lock().await;

        {
            let cached = self.cached.read().await;
            if let Some(entry) = cached.as_ref()
                && entry.fetched_at >= observed
            {
                tracing::trace!("key set refreshed by a concurrent request");
                return Ok(());
            }
        }

        self.fetch_and_store().await
    }

    /// Unconditionally fetches a fresh key set, replacing the cached one.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP request fails or the response cannot be
    /// parsed as a JWKS document.
    pub async fn refresh(&self) -> Result<(), KeySetError> {
        let _gate = self.refresh_gate.lock().await;
        self.fetch_and_store().await
    }

    /// Drops the cached key set, forcing the next lookup to fetch.
    pub async fn invalidate(&self) {
        let mut cached = self.cached.write().await;
        *cached = None;
        tracing::debug!(url = %self.jwks_url, "key set cache invalidated");
    }

    async fn fetch_and_store(&self) -> Result<(), KeySetError> {
        tracing::debug!(url = %self.jwks_url, "fetching key set");

        let response = self
            .http_client
            .get(self.jwks_url.as_str())
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| {
                tracing::warn!(url = %self.jwks_url, error = %e, "key set fetch failed");
                KeySetError::Network(e.to_string())
            })?;

        if !response.status().is_success() {
            return Err(KeySetError::Http(response.status().as_u16()));
        }

        if let Some(len) = response.content_length()
            && len as usize > self.config.max_response_size
        {
            return Err(KeySetError::ResponseTooLarge {
                max_size: self.config.max_response_size,
            });
        }

        let jwks: JwkSet = response.json().await.map_err(|e| {
            tracing::warn!(url = %self.jwks_url, error = %e, "key set parse failed");
            KeySetError::Parse(e.to_string())
        })?;

        tracing::debug!(
            url = %self.jwks_url,
            keys = jwks.keys.len(),
            "key set cached"
        );

        let mut cached = self.cached.write().await;
        *cached = Some(CachedKeys {
            jwks,
            fetched_at: Instant::now(),
        });

        Ok(())
    }
}

/// Validates that the JWKS URL uses an allowed scheme.
fn validate_scheme(url: &Url, allow_http: bool) -> Result<(), KeySetError> {
    match url.scheme() {
        "https" => Ok(()),
        "http" if allow_http => Ok(()),
        _ => Err(KeySetError::InvalidScheme),
    }
}

/// Extracts the algorithm hint from a JWK, if it carries one.
fn jwk_algorithm(jwk: &jsonwebtoken::jwk::Jwk) -> Option<Algorithm> {
    jwk.common.key_algorithm.as_ref().and_then(|alg| match alg {
        jsonwebtoken::jwk::KeyAlgorithm::RS256 => Some(Algorithm::RS256),
        jsonwebtoken::jwk::KeyAlgorithm::RS384 => Some(Algorithm::RS384),
        jsonwebtoken::jwk::KeyAlgorithm::RS512 => Some(Algorithm::RS512),
        jsonwebtoken::jwk::KeyAlgorithm::ES256 => Some(Algorithm::ES256),
        jsonwebtoken::jwk::KeyAlgorithm::ES384 => Some(Algorithm::ES384),
        jsonwebtoken::jwk::KeyAlgorithm::PS256 => Some(Algorithm::PS256),
        jsonwebtoken::jwk::KeyAlgorithm::PS384 => Some(Algorithm::PS384),
        jsonwebtoken::jwk::KeyAlgorithm::PS512 => Some(Algorithm::PS512),
        jsonwebtoken::jwk::KeyAlgorithm::EdDSA => Some(Algorithm::EdDSA),
        _ => None,
    })
}
