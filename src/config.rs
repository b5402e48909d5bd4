//! File-based configuration for building a populated [`StrategyRegistry`].
//!
//! ```json
//! {
//!   "strategies": ["apikey", "jwt", "session"],
//!   "api_key": { "header_name": "X-API-Key" },
//!   "jwt": { "secret": "${JWT_SECRET}", "issuer": "https://issuer.example" },
//!   "session": { "secret": "${SESSION_SECRET}" },
//!   "basic": { "enabled": true }
//! }
//! ```
//!
//! `${VAR}` in secrets and URLs is replaced from the environment.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::{env, fs};

use anyhow::Context;
use jsonwebtoken::Algorithm;
use serde::Deserialize;
use tracing::info;

use crate::jwks::{DEFAULT_CACHE_TTL_SECONDS, JwksCache};
use crate::registry::StrategyRegistry;
use crate::session::{CookieSessionStore, SessionOptions};
use crate::store::UserStore;
use crate::strategies::{
    ApiKeyConfig, ApiKeyStrategy, BasicAuthStrategy, JwtConfig, JwtStrategy, SessionConfig,
    SessionStrategy, apikey, session,
};

pub const CONFIG_ENV_VAR: &str = "MULTIAUTH_CONFIG";
pub const DEFAULT_CONFIG_FILE: &str = "multiauth.json";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Strategy order tried per request. Empty means every configured
    /// strategy in the order apikey, jwt, session, local.
    pub strategies: Vec<String>,
    /// Per-request authentication timeout
    pub timeout_ms: Option<u64>,
    pub api_key: Option<ApiKeySettings>,
    pub jwt: Option<JwtSettings>,
    pub session: Option<SessionSettings>,
    pub basic: BasicSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiKeySettings {
    pub header_name: String,
    pub query_param: String,
    pub credential_key: String,
}

impl Default for ApiKeySettings {
    fn default() -> Self {
        Self {
            header_name: apikey::DEFAULT_HEADER_NAME.to_string(),
            query_param: apikey::DEFAULT_QUERY_PARAM.to_string(),
            credential_key: apikey::DEFAULT_CREDENTIAL_KEY.to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct JwtSettings {
    /// HMAC secret; ignored when `jwks_url` is set
    pub secret: String,
    pub algorithm: Option<Algorithm>,
    pub issuer: Option<String>,
    pub audience: Option<String>,
    pub jwks_url: Option<String>,
    pub jwks_cache_ttl_seconds: u64,
    pub jwks_allow_stale: bool,
    /// Resolve the token subject through the user store instead of the claims
    pub lookup_user: bool,
}

impl Default for JwtSettings {
    fn default() -> Self {
        Self {
            secret: String::new(),
            algorithm: None,
            issuer: None,
            audience: None,
            jwks_url: None,
            jwks_cache_ttl_seconds: DEFAULT_CACHE_TTL_SECONDS,
            jwks_allow_stale: true,
            lookup_user: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    pub cookie_name: String,
    pub value_key: String,
    /// Signing key, at least 32 bytes
    pub secret: String,
    pub secure: bool,
    pub max_age_seconds: Option<i64>,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            cookie_name: session::DEFAULT_SESSION_NAME.to_string(),
            value_key: session::DEFAULT_VALUE_KEY.to_string(),
            secret: String::new(),
            secure: true,
            max_age_seconds: None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BasicSettings {
    pub enabled: bool,
}

/// Stores the configured strategies resolve identities through.
#[derive(Clone)]
pub struct ConfigStores {
    /// Credential lookup for API keys
    pub api_keys: Arc<dyn UserStore>,
    /// Credential lookup for username/password
    pub passwords: Arc<dyn UserStore>,
    /// ID lookup for sessions and token subjects
    pub users: Arc<dyn UserStore>,
}

impl ConfigStores {
    /// Use one store for every lookup.
    pub fn uniform(store: Arc<dyn UserStore>) -> Self {
        Self {
            api_keys: store.clone(),
            passwords: store.clone(),
            users: store,
        }
    }
}

impl AuthConfig {
    /// Load from `$MULTIAUTH_CONFIG`, else `./multiauth.json`.
    pub fn load() -> anyhow::Result<Self> {
        let path = resolve_config_path()?;
        Self::from_path(&path)
    }

    pub fn from_path(path: &Path) -> anyhow::Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::from_json_str(&raw).with_context(|| format!("Invalid config in {}", path.display()))
    }

    pub fn from_json_str(raw: &str) -> anyhow::Result<Self> {
        let cfg: AuthConfig = serde_json::from_str(raw)?;
        Ok(cfg.expanded())
    }

    fn expanded(mut self) -> Self {
        if let Some(jwt) = self.jwt.as_mut() {
            jwt.secret = expand_env_vars(&jwt.secret);
            if let Some(url) = jwt.jwks_url.as_mut() {
                *url = expand_env_vars(url);
            }
        }
        if let Some(session) = self.session.as_mut() {
            session.secret = expand_env_vars(&session.secret);
        }
        self
    }

    /// Configured strategy order.
    pub fn strategy_order(&self) -> Vec<String> {
        if !self.strategies.is_empty() {
            return self.strategies.clone();
        }

        let configured = [
            (ApiKeyStrategy::NAME, self.api_key.is_some()),
            (JwtStrategy::NAME, self.jwt.is_some()),
            (SessionStrategy::NAME, self.session.is_some()),
            (BasicAuthStrategy::NAME, self.basic.enabled),
        ];
        configured
            .into_iter()
            .filter(|(_, on)| *on)
            .map(|(name, _)| name.to_string())
            .collect()
    }

    /// Register every configured strategy. Fails on the first setup error.
    pub async fn build_registry(&self, stores: &ConfigStores) -> anyhow::Result<Arc<StrategyRegistry>> {
        let registry = Arc::new(StrategyRegistry::new());

        if let Some(settings) = &self.api_key {
            let config = ApiKeyConfig::new(stores.api_keys.clone())
                .header_name(settings.header_name.as_str())
                .query_param(settings.query_param.as_str())
                .credential_key(settings.credential_key.as_str());
            registry.register(ApiKeyStrategy::new(config)).await?;
        }

        if let Some(settings) = &self.jwt {
            registry.register(JwtStrategy::new(jwt_config(settings, stores)?)).await?;
        }

        if let Some(settings) = &self.session {
            let options = SessionOptions {
                secure: settings.secure,
                max_age: settings.max_age_seconds,
                ..SessionOptions::default()
            };
            let store = CookieSessionStore::new(settings.secret.as_bytes()).with_options(options);
            let config = SessionConfig::new(Arc::new(store), stores.users.clone())
                .session_name(settings.cookie_name.as_str())
                .value_key(settings.value_key.as_str());
            registry.register(SessionStrategy::new(config)).await?;
        }

        if self.basic.enabled {
            registry
                .register(BasicAuthStrategy::new(stores.passwords.clone()))
                .await?;
        }

        info!("Registered strategies: {:?}", registry.list().await);
        Ok(registry)
    }
}

fn jwt_config(settings: &JwtSettings, stores: &ConfigStores) -> anyhow::Result<JwtConfig> {
    let mut config = match &settings.jwks_url {
        Some(url) => {
            let cache = JwksCache::new(url.as_str(), settings.jwks_cache_ttl_seconds, settings.jwks_allow_stale)?;
            JwtConfig::jwks(Arc::new(cache))
        }
        None => JwtConfig::new(settings.secret.as_bytes()),
    };

    if let Some(algorithm) = settings.algorithm {
        config = config.algorithm(algorithm);
    }
    if let Some(issuer) = &settings.issuer {
        config = config.issuer(issuer.as_str());
    }
    if let Some(audience) = &settings.audience {
        config = config.audience(audience.as_str());
    }
    if settings.lookup_user {
        config = config.store(stores.users.clone());
    }
    Ok(config)
}

pub fn resolve_config_path() -> anyhow::Result<PathBuf> {
    if let Ok(p) = env::var(CONFIG_ENV_VAR) {
        return Ok(PathBuf::from(p));
    }

    let candidate = PathBuf::from(DEFAULT_CONFIG_FILE);
    if candidate.exists() {
        return Ok(candidate);
    }

    Err(anyhow::anyhow!(
        "Could not find {} (set {} or create ./{})",
        DEFAULT_CONFIG_FILE,
        CONFIG_ENV_VAR,
        DEFAULT_CONFIG_FILE
    ))
}

/// Replace `${NAME}` with the variable's value. Unset variables and
/// unterminated references are left as written.
fn expand_env_vars(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            out.push_str(&rest[start..]);
            return out;
        };

        match env::var(&after[..end]) {
            Ok(val) => out.push_str(&val),
            Err(_) => out.push_str(&rest[start..start + end + 3]),
        }
        rest = &after[end + 1..];
    }

    out.push_str(rest);
    out
}
