//! JWKS (JSON Web Key Set) key source for bearer-token verification.
//!
//! Keys are fetched from the configured endpoint, cached by `kid` and
//! refreshed once the TTL lapses. When a refresh fails the previous key set
//! can optionally keep serving for up to [`MAX_STALE_CACHE_SECONDS`].
//!
//! Fetches are serialized, and a new one starts at most once per refresh
//! interval ([`DEFAULT_REFRESH_INTERVAL_SECONDS`] by default) no matter how
//! many unknown `kid`s arrive. A token without a `kid` only matches when the
//! set holds exactly one key.

use std::collections::HashMap;
use std::fmt;
use std::time::{Duration, Instant};

use jsonwebtoken::DecodingKey;
use serde::Deserialize;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, warn};

use crate::context::AuthContext;

/// Default cache TTL in seconds (1 hour).
pub const DEFAULT_CACHE_TTL_SECONDS: u64 = 3600;

/// Maximum stale cache age in seconds (24 hours).
pub const MAX_STALE_CACHE_SECONDS: u64 = 86400;

/// Minimum spacing between fetch attempts in seconds.
pub const DEFAULT_REFRESH_INTERVAL_SECONDS: u64 = 30;

const FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// A single JSON Web Key.
#[derive(Debug, Clone, Deserialize)]
pub struct Jwk {
    /// Key type ("RSA" or "EC")
    pub kty: String,
    pub kid: Option<String>,
    pub alg: Option<String>,
    #[serde(rename = "use")]
    pub key_use: Option<String>,
    /// RSA modulus (base64url)
    pub n: Option<String>,
    /// RSA exponent (base64url)
    pub e: Option<String>,
    /// EC x coordinate (base64url)
    pub x: Option<String>,
    /// EC y coordinate (base64url)
    pub y: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JwksDocument {
    pub keys: Vec<Jwk>,
}

#[derive(Default)]
struct KeySet {
    keys: HashMap<String, DecodingKey>,
    fetched_at: Option<Instant>,
    last_attempt: Option<Instant>,
}

impl KeySet {
    fn select(&self, kid: Option<&str>) -> Result<DecodingKey, JwksError> {
        match kid {
            Some(k) => self
                .keys
                .get(k)
                .cloned()
                .ok_or_else(|| JwksError::KeyNotFound(k.to_string())),
            None if self.keys.len() > 1 => Err(JwksError::KidRequired),
            None => self.keys.values().next().cloned().ok_or(JwksError::NoKeysAvailable),
        }
    }
}

/// Thread-safe JWKS cache.
pub struct JwksCache {
    jwks_url: String,
    cache_ttl: Duration,
    allow_stale: bool,
    refresh_interval: Duration,
    state: RwLock<KeySet>,
    refresh_lock: Mutex<()>,
    client: reqwest::Client,
}

impl fmt::Debug for JwksCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JwksCache")
            .field("jwks_url", &self.jwks_url)
            .field("cache_ttl", &self.cache_ttl)
            .field("allow_stale", &self.allow_stale)
            .field("refresh_interval", &self.refresh_interval)
            .finish_non_exhaustive()
    }
}

impl JwksCache {
    pub fn new(
        jwks_url: impl Into<String>,
        cache_ttl_seconds: u64,
        allow_stale: bool,
    ) -> Result<Self, JwksError> {
        let client = reqwest::Client::builder()
            .timeout(FETCH_TIMEOUT)
            .build()
            .map_err(|e| JwksError::Fetch(e.to_string()))?;

        Ok(Self {
            jwks_url: jwks_url.into(),
            cache_ttl: Duration::from_secs(cache_ttl_seconds),
            allow_stale,
            refresh_interval: Duration::from_secs(DEFAULT_REFRESH_INTERVAL_SECONDS),
            state: RwLock::new(KeySet::default()),
            refresh_lock: Mutex::new(()),
            client,
        })
    }

    pub fn with_refresh_interval(mut self, interval: Duration) -> Self {
        self.refresh_interval = interval;
        self
    }

    pub fn url(&self) -> &str {
        &self.jwks_url
    }

    /// Decoding key for `kid`, or the only cached key when the token names none.
    ///
    /// Fetches when the cache is empty, expired, or does not know `kid`,
    /// unless another fetch was attempted within the refresh interval.
    pub async fn get_key(&self, ctx: &AuthContext, kid: Option<&str>) -> Result<DecodingKey, JwksError> {
        if self.is_fresh().await
            && let Ok(key) = self.lookup(kid).await
        {
            return Ok(key);
        }

        let _refreshing = tokio::select! {
            biased;
            _ = wait_done(ctx) => return Err(JwksError::Cancelled),
            guard = self.refresh_lock.lock() => guard,
        };

        // Another caller may have refreshed while this one waited.
        if self.is_fresh().await
            && let Ok(key) = self.lookup(kid).await
        {
            return Ok(key);
        }

        if !self.claim_refresh().await {
            debug!("JWKS fetched within the last {:?}, not refetching", self.refresh_interval);
            return if self.is_fresh().await || self.stale_usable().await {
                self.lookup(kid).await
            } else {
                Err(JwksError::Throttled)
            };
        }

        match self.refresh(ctx).await {
            Ok(()) => self.lookup(kid).await,
            Err(e) => {
                if self.stale_usable().await {
                    warn!("JWKS fetch from {} failed, using stale keys: {}", self.jwks_url, e);
                    if let Ok(key) = self.lookup(kid).await {
                        return Ok(key);
                    }
                }
                Err(e)
            }
        }
    }

    async fn lookup(&self, kid: Option<&str>) -> Result<DecodingKey, JwksError> {
        self.state.read().await.select(kid)
    }

    async fn is_fresh(&self) -> bool {
        self.state
            .read()
            .await
            .fetched_at
            .is_some_and(|t| t.elapsed() <= self.cache_ttl)
    }

    /// Record a fetch attempt unless one happened within the refresh interval.
    async fn claim_refresh(&self) -> bool {
        let mut state = self.state.write().await;
        if state
            .last_attempt
            .is_some_and(|t| t.elapsed() < self.refresh_interval)
        {
            return false;
        }
        state.last_attempt = Some(Instant::now());
        true
    }

    async fn stale_usable(&self) -> bool {
        self.allow_stale && self.within_stale_window().await
    }

    async fn within_stale_window(&self) -> bool {
        self.state
            .read()
            .await
            .fetched_at
            .is_some_and(|t| t.elapsed() < Duration::from_secs(MAX_STALE_CACHE_SECONDS))
    }

    /// Fetch the key set and replace the cache.
    pub async fn refresh(&self, ctx: &AuthContext) -> Result<(), JwksError> {
        debug!("Fetching JWKS from {}", self.jwks_url);

        let fetch = async {
            let response = self
                .client
                .get(&self.jwks_url)
                .send()
                .await
                .map_err(|e| JwksError::Fetch(e.to_string()))?;

            if !response.status().is_success() {
                return Err(JwksError::Fetch(format!(
                    "HTTP {} from JWKS endpoint",
                    response.status()
                )));
            }

            response
                .json::<JwksDocument>()
                .await
                .map_err(|e| JwksError::Parse(e.to_string()))
        };

        let document = tokio::select! {
            biased;
            _ = wait_done(ctx) => return Err(JwksError::Cancelled),
            doc = fetch => doc?,
        };

        let keys = Self::decode_document(document);
        if keys.is_empty() {
            return Err(JwksError::NoValidKeys);
        }

        let mut state = self.state.write().await;
        state.keys = keys;
        state.fetched_at = Some(Instant::now());
        debug!("Cached {} JWKS keys", state.keys.len());
        Ok(())
    }

    fn decode_document(document: JwksDocument) -> HashMap<String, DecodingKey> {
        let mut keys = HashMap::new();
        for jwk in document.keys {
            if jwk.key_use.as_deref() == Some("enc") {
                debug!("Skipping encryption key {:?}", jwk.kid);
                continue;
            }
            match jwk_to_decoding_key(&jwk) {
                Ok(key) => {
                    keys.insert(jwk.kid.clone().unwrap_or_else(|| "default".to_string()), key);
                }
                Err(e) => warn!("Ignoring unusable JWK {:?}: {}", jwk.kid, e),
            }
        }
        keys
    }

    pub async fn key_count(&self) -> usize {
        self.state.read().await.keys.len()
    }

    pub async fn clear(&self) {
        *self.state.write().await = KeySet::default();
    }
}

async fn wait_done(ctx: &AuthContext) {
    let _ = ctx.guard(std::future::pending::<Result<(), _>>()).await;
}

fn jwk_to_decoding_key(jwk: &Jwk) -> Result<DecodingKey, JwksError> {
    match jwk.kty.as_str() {
        "RSA" => {
            let n = jwk.n.as_deref().ok_or_else(|| JwksError::Parse("missing 'n' in RSA key".into()))?;
            let e = jwk.e.as_deref().ok_or_else(|| JwksError::Parse("missing 'e' in RSA key".into()))?;
            DecodingKey::from_rsa_components(n, e)
                .map_err(|e| JwksError::Parse(format!("invalid RSA components: {}", e)))
        }
        "EC" => {
            let x = jwk.x.as_deref().ok_or_else(|| JwksError::Parse("missing 'x' in EC key".into()))?;
            let y = jwk.y.as_deref().ok_or_else(|| JwksError::Parse("missing 'y' in EC key".into()))?;
            DecodingKey::from_ec_components(x, y)
                .map_err(|e| JwksError::Parse(format!("invalid EC components: {}", e)))
        }
        other => Err(JwksError::Parse(format!("unsupported key type {}", other))),
    }
}

/// JWKS failures. Internal to the bearer-token strategy, which reports
/// all of them as unauthorized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JwksError {
    Fetch(String),
    Parse(String),
    NoValidKeys,
    KeyNotFound(String),
    NoKeysAvailable,
    KidRequired,
    Throttled,
    Cancelled,
}

impl fmt::Display for JwksError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fetch(msg) => write!(f, "Failed to fetch JWKS: {}", msg),
            Self::Parse(msg) => write!(f, "Failed to parse JWKS: {}", msg),
            Self::NoValidKeys => write!(f, "No valid keys found in JWKS"),
            Self::KeyNotFound(kid) => write!(f, "Key not found: {}", kid),
            Self::NoKeysAvailable => write!(f, "No keys available in cache"),
            Self::KidRequired => write!(f, "Token has no kid and the key set holds several keys"),
            Self::Throttled => write!(f, "JWKS refresh throttled"),
            Self::Cancelled => write!(f, "JWKS fetch cancelled"),
        }
    }
}

impl std::error::Error for JwksError {}
