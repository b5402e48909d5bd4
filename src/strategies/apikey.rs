//! Pre-shared key authentication.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use http::request::Parts;
use tracing::debug;

use crate::context::AuthContext;
use crate::error::AuthError;
use crate::store::UserStore;
use crate::strategies::{header_str, query_param};
use crate::strategy::Strategy;
use crate::user::{Criteria, SharedUser};

pub const DEFAULT_HEADER_NAME: &str = "X-API-Key";
pub const DEFAULT_QUERY_PARAM: &str = "api_key";
pub const DEFAULT_CREDENTIAL_KEY: &str = "id";

/// API key strategy configuration.
#[derive(Clone)]
pub struct ApiKeyConfig {
    /// Header checked first
    pub header_name: String,
    /// Query parameter checked when the header is absent
    pub query_param: String,
    /// Criteria key the extracted key is passed under
    pub credential_key: String,
    pub store: Arc<dyn UserStore>,
}

impl ApiKeyConfig {
    pub fn new(store: Arc<dyn UserStore>) -> Self {
        Self {
            header_name: DEFAULT_HEADER_NAME.to_string(),
            query_param: DEFAULT_QUERY_PARAM.to_string(),
            credential_key: DEFAULT_CREDENTIAL_KEY.to_string(),
            store,
        }
    }

    pub fn header_name(mut self, name: impl Into<String>) -> Self {
        self.header_name = name.into();
        self
    }

    pub fn query_param(mut self, name: impl Into<String>) -> Self {
        self.query_param = name.into();
        self
    }

    pub fn credential_key(mut self, key: impl Into<String>) -> Self {
        self.credential_key = key.into();
        self
    }
}

impl fmt::Debug for ApiKeyConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiKeyConfig")
            .field("header_name", &self.header_name)
            .field("query_param", &self.query_param)
            .field("credential_key", &self.credential_key)
            .finish_non_exhaustive()
    }
}

/// Authenticates requests carrying a pre-shared key.
#[derive(Debug, Clone)]
pub struct ApiKeyStrategy {
    config: ApiKeyConfig,
}

impl ApiKeyStrategy {
    pub const NAME: &'static str = "apikey";

    pub fn new(config: ApiKeyConfig) -> Self {
        Self { config }
    }

    fn extract_key(&self, request: &Parts) -> Option<String> {
        header_str(request, &self.config.header_name)
            .map(str::to_string)
            .or_else(|| query_param(request, &self.config.query_param))
    }
}

#[async_trait]
impl Strategy for ApiKeyStrategy {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn authenticate(&self, ctx: &AuthContext, request: &Parts) -> Result<SharedUser, AuthError> {
        let Some(key) = self.extract_key(request) else {
            debug!("No API key in header {} or query param {}", self.config.header_name, self.config.query_param);
            return Err(AuthError::Unauthorized);
        };

        let criteria = Criteria::new().with(self.config.credential_key.clone(), key);
        self.config
            .store
            .find_user_by_credentials(ctx, &criteria)
            .await
            .map_err(AuthError::into_unauthorized)
    }
}
