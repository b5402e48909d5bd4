//! Bearer-token (JWT) authentication.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use http::header::AUTHORIZATION;
use http::request::Parts;
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode, decode_header};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::context::AuthContext;
use crate::error::{AuthError, SetupError};
use crate::jwks::JwksCache;
use crate::store::UserStore;
use crate::strategies::header_str;
use crate::strategy::Strategy;
use crate::user::{Attributes, SharedUser, SimpleUser};

/// Where verification keys come from.
#[derive(Clone)]
pub enum JwtKeySource {
    /// Shared secret for the HS* family.
    Secret(Vec<u8>),
    /// Fixed public key (RSA or EC).
    Key(DecodingKey),
    /// Keys published at a JWKS endpoint, selected by the token's `kid`.
    Jwks(Arc<JwksCache>),
}

impl fmt::Debug for JwtKeySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Secret(_) => f.write_str("Secret(..)"),
            Self::Key(_) => f.write_str("Key(..)"),
            Self::Jwks(cache) => f.debug_tuple("Jwks").field(&cache.url()).finish(),
        }
    }
}

#[derive(Clone)]
pub struct JwtConfig {
    pub key: JwtKeySource,
    /// The only algorithm accepted
    pub algorithm: Algorithm,
    pub issuer: Option<String>,
    pub audience: Option<String>,
    /// When set, the identity is loaded by the token's subject; otherwise it
    /// is built from the claims.
    pub store: Option<Arc<dyn UserStore>>,
}

impl JwtConfig {
    /// HS256 with a shared secret.
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Self::with_key_source(JwtKeySource::Secret(secret.into()), Algorithm::HS256)
    }

    /// RS256 with keys from a JWKS endpoint.
    pub fn jwks(cache: Arc<JwksCache>) -> Self {
        Self::with_key_source(JwtKeySource::Jwks(cache), Algorithm::RS256)
    }

    pub fn with_key_source(key: JwtKeySource, algorithm: Algorithm) -> Self {
        Self {
            key,
            algorithm,
            issuer: None,
            audience: None,
            store: None,
        }
    }

    pub fn algorithm(mut self, algorithm: Algorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    pub fn issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = Some(issuer.into());
        self
    }

    pub fn audience(mut self, audience: impl Into<String>) -> Self {
        self.audience = Some(audience.into());
        self
    }

    pub fn store(mut self, store: Arc<dyn UserStore>) -> Self {
        self.store = Some(store);
        self
    }

    fn validation(&self) -> Validation {
        let mut validation = Validation::new(self.algorithm);
        // `exp` is optional, but checked when present.
        validation.required_spec_claims.clear();

        if let Some(issuer) = &self.issuer {
            validation.set_issuer(&[issuer]);
        }
        match &self.audience {
            Some(audience) => validation.set_audience(&[audience]),
            None => validation.validate_aud = false,
        }
        validation
    }
}

impl fmt::Debug for JwtConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JwtConfig")
            .field("key", &self.key)
            .field("algorithm", &self.algorithm)
            .field("issuer", &self.issuer)
            .field("audience", &self.audience)
            .field("store", &self.store.is_some())
            .finish()
    }
}

/// Claims read from a verified token.
#[derive(Debug, Deserialize)]
pub struct TokenClaims {
    #[serde(default)]
    pub sub: String,
    #[serde(default)]
    pub iss: Option<String>,
    #[serde(default)]
    pub aud: Option<Audience>,
    #[serde(default)]
    pub exp: Option<u64>,
    /// Everything else in the payload
    #[serde(flatten)]
    pub extra: Attributes,
}

/// `aud` may be a single string or a list.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum Audience {
    One(String),
    Many(Vec<String>),
}

impl Audience {
    pub fn into_vec(self) -> Vec<String> {
        match self {
            Self::One(aud) => vec![aud],
            Self::Many(auds) => auds,
        }
    }
}

impl TokenClaims {
    /// Identity built from the claims alone.
    ///
    /// Attributes: `issuer`, `audience` (list), `expires` (seconds since the
    /// epoch, or null) and every non-registered claim as-is.
    pub fn into_user(self) -> SimpleUser {
        let audience: Vec<Value> = self
            .aud
            .map(Audience::into_vec)
            .unwrap_or_default()
            .into_iter()
            .map(Value::String)
            .collect();

        let mut attributes = self.extra;
        attributes.insert("issuer".to_string(), Value::String(self.iss.unwrap_or_default()));
        attributes.insert("audience".to_string(), Value::Array(audience));
        attributes.insert("expires".to_string(), self.exp.map(Value::from).unwrap_or(Value::Null));

        SimpleUser::new(self.sub).with_attributes(attributes)
    }
}

/// Verifies `Authorization: Bearer <token>`.
#[derive(Debug, Clone)]
pub struct JwtStrategy {
    config: JwtConfig,
}

impl JwtStrategy {
    pub const NAME: &'static str = "jwt";

    pub fn new(config: JwtConfig) -> Self {
        Self { config }
    }

    async fn decoding_key(&self, ctx: &AuthContext, kid: Option<&str>) -> Result<DecodingKey, AuthError> {
        match &self.config.key {
            JwtKeySource::Secret(secret) => Ok(DecodingKey::from_secret(secret)),
            JwtKeySource::Key(key) => Ok(key.clone()),
            JwtKeySource::Jwks(cache) => cache.get_key(ctx, kid).await.map_err(|e| {
                debug!("No verification key for token: {}", e);
                AuthError::Unauthorized
            }),
        }
    }

    /// Verify `token` and return its claims.
    pub async fn verify(&self, ctx: &AuthContext, token: &str) -> Result<TokenClaims, AuthError> {
        let header = decode_header(token).map_err(|e| {
            debug!("Malformed bearer token: {}", e);
            AuthError::Unauthorized
        })?;

        if header.alg != self.config.algorithm {
            debug!("Token algorithm {:?} does not match {:?}", header.alg, self.config.algorithm);
            return Err(AuthError::Unauthorized);
        }

        let key = self.decoding_key(ctx, header.kid.as_deref()).await?;
        let data = decode::<TokenClaims>(token, &key, &self.config.validation()).map_err(|e| {
            debug!("Token validation failed: {}", e);
            AuthError::Unauthorized
        })?;

        Ok(data.claims)
    }
}

#[async_trait]
impl Strategy for JwtStrategy {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn setup(&self) -> Result<(), SetupError> {
        let hmac = matches!(
            self.config.algorithm,
            Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512
        );

        match &self.config.key {
            JwtKeySource::Secret(secret) if secret.is_empty() => {
                Err(SetupError::new(Self::NAME, "signing secret is empty"))
            }
            JwtKeySource::Secret(_) if !hmac => Err(SetupError::new(
                Self::NAME,
                format!("a shared secret cannot verify {:?} tokens", self.config.algorithm),
            )),
            JwtKeySource::Key(_) | JwtKeySource::Jwks(_) if hmac => Err(SetupError::new(
                Self::NAME,
                format!("{:?} needs a shared secret", self.config.algorithm),
            )),
            _ => Ok(()),
        }
    }

    async fn authenticate(&self, ctx: &AuthContext, request: &Parts) -> Result<SharedUser, AuthError> {
        let token = header_str(request, AUTHORIZATION.as_str())
            .and_then(|h| h.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or(AuthError::Unauthorized)?;

        let claims = self.verify(ctx, token).await?;
        if claims.sub.is_empty() {
            debug!("Token has no subject");
            return Err(AuthError::Unauthorized);
        }

        match &self.config.store {
            Some(store) => store
                .find_user_by_id(ctx, &claims.sub)
                .await
                .map_err(AuthError::into_unauthorized),
            None => Ok(claims.into_user().shared()),
        }
    }
}
