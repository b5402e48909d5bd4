//! Session storage consulted by the session strategy.
//!
//! [`CookieSessionStore`] keeps the whole session client-side in a signed
//! cookie: `base64url(json values) "." base64url(HMAC-SHA256(name "|" payload))`.
//! Values are readable by the client but cannot be altered or moved to a
//! cookie of another name without the key.

use std::fmt;

use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use cookie::{Cookie, SameSite};
use hmac::{Hmac, Mac};
use http::header::COOKIE;
use http::request::Parts;
use serde_json::Value;
use sha2::Sha256;
use tracing::debug;

type HmacSha256 = Hmac<Sha256>;

/// Minimum signing key length in bytes.
pub const MIN_KEY_LEN: usize = 32;

pub type SessionValues = serde_json::Map<String, Value>;

/// A named session and its values. Empty when the request carried none.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Session {
    name: String,
    values: SessionValues,
}

impl Session {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            values: SessionValues::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn values(&self) -> &SessionValues {
        &self.values
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Validate configuration before the store serves requests.
    fn setup(&self) -> Result<(), SessionError> {
        Ok(())
    }

    /// Load the session called `name` for this request.
    async fn load(&self, request: &Parts, name: &str) -> Result<Session, SessionError>;
}

/// Attributes for cookies written by [`CookieSessionStore::set_cookie`].
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub path: String,
    pub domain: Option<String>,
    /// Seconds; `None` makes a browser-session cookie
    pub max_age: Option<i64>,
    pub secure: bool,
    pub http_only: bool,
    pub same_site: SameSite,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            path: "/".to_string(),
            domain: None,
            max_age: None,
            secure: true,
            http_only: true,
            same_site: SameSite::Lax,
        }
    }
}

/// Session store backed by HMAC-signed cookies.
#[derive(Clone)]
pub struct CookieSessionStore {
    key: Vec<u8>,
    options: SessionOptions,
}

impl fmt::Debug for CookieSessionStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CookieSessionStore")
            .field("key_len", &self.key.len())
            .field("options", &self.options)
            .finish()
    }
}

impl CookieSessionStore {
    pub fn new(key: impl Into<Vec<u8>>) -> Self {
        Self {
            key: key.into(),
            options: SessionOptions::default(),
        }
    }

    pub fn with_options(mut self, options: SessionOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    fn mac(&self, name: &str, payload: &str) -> Result<HmacSha256, SessionError> {
        let mut mac = HmacSha256::new_from_slice(&self.key).map_err(|_| SessionError::InvalidKey)?;
        mac.update(name.as_bytes());
        mac.update(b"|");
        mac.update(payload.as_bytes());
        Ok(mac)
    }

    /// Signed cookie value for `values` under `name`.
    pub fn encode(&self, name: &str, values: &SessionValues) -> Result<String, SessionError> {
        let json = serde_json::to_vec(values).map_err(|e| SessionError::Encode(e.to_string()))?;
        let payload = URL_SAFE_NO_PAD.encode(json);
        let signature = URL_SAFE_NO_PAD.encode(self.mac(name, &payload)?.finalize().into_bytes());
        Ok(format!("{}.{}", payload, signature))
    }

    /// Verify and decode a cookie value produced by [`encode`](Self::encode).
    pub fn decode(&self, name: &str, value: &str) -> Result<SessionValues, SessionError> {
        let (payload, signature) = value.split_once('.').ok_or(SessionError::Malformed)?;
        let signature = URL_SAFE_NO_PAD
            .decode(signature)
            .map_err(|_| SessionError::Malformed)?;

        self.mac(name, payload)?
            .verify_slice(&signature)
            .map_err(|_| SessionError::InvalidSignature)?;

        let json = URL_SAFE_NO_PAD.decode(payload).map_err(|_| SessionError::Malformed)?;
        serde_json::from_slice(&json).map_err(|_| SessionError::Malformed)
    }

    /// `Set-Cookie`-ready cookie carrying `values`, with the configured attributes.
    pub fn set_cookie(&self, name: &str, values: &SessionValues) -> Result<Cookie<'static>, SessionError> {
        let mut builder = Cookie::build((name.to_string(), self.encode(name, values)?))
            .path(self.options.path.clone())
            .secure(self.options.secure)
            .http_only(self.options.http_only)
            .same_site(self.options.same_site);

        if let Some(domain) = &self.options.domain {
            builder = builder.domain(domain.clone());
        }
        if let Some(max_age) = self.options.max_age {
            builder = builder.max_age(cookie::time::Duration::seconds(max_age));
        }

        Ok(builder.build())
    }
}

#[async_trait]
impl SessionStore for CookieSessionStore {
    fn setup(&self) -> Result<(), SessionError> {
        if self.key.len() < MIN_KEY_LEN {
            return Err(SessionError::KeyTooShort(self.key.len()));
        }
        Ok(())
    }

    async fn load(&self, request: &Parts, name: &str) -> Result<Session, SessionError> {
        let cookie = request
            .headers
            .get_all(COOKIE)
            .iter()
            .filter_map(|h| h.to_str().ok())
            .flat_map(Cookie::split_parse)
            .filter_map(Result::ok)
            .find(|c| c.name() == name);

        let Some(cookie) = cookie else {
            debug!("No session cookie {}", name);
            return Ok(Session::new(name));
        };

        Ok(Session {
            name: name.to_string(),
            values: self.decode(name, cookie.value())?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    Malformed,
    InvalidSignature,
    InvalidKey,
    KeyTooShort(usize),
    Encode(String),
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Malformed => write!(f, "Malformed session cookie"),
            Self::InvalidSignature => write!(f, "Session cookie signature mismatch"),
            Self::InvalidKey => write!(f, "Invalid session signing key"),
            Self::KeyTooShort(len) => write!(
                f,
                "Session signing key is {} bytes, at least {} required",
                len, MIN_KEY_LEN
            ),
            Self::Encode(msg) => write!(f, "Failed to encode session: {}", msg),
        }
    }
}

impl std::error::Error for SessionError {}
