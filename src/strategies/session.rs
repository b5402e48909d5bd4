//! Session cookie authentication.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use http::request::Parts;
use tracing::debug;

use crate::context::AuthContext;
use crate::error::{AuthError, SetupError};
use crate::session::SessionStore;
use crate::store::UserStore;
use crate::strategy::Strategy;
use crate::user::SharedUser;

pub const DEFAULT_SESSION_NAME: &str = "multiauth-session";
pub const DEFAULT_VALUE_KEY: &str = "user_id";

#[derive(Clone)]
pub struct SessionConfig {
    pub store: Arc<dyn SessionStore>,
    /// Session (cookie) name
    pub session_name: String,
    /// Session value holding the user ID
    pub value_key: String,
    pub user_store: Arc<dyn UserStore>,
}

impl SessionConfig {
    pub fn new(store: Arc<dyn SessionStore>, user_store: Arc<dyn UserStore>) -> Self {
        Self {
            store,
            session_name: DEFAULT_SESSION_NAME.to_string(),
            value_key: DEFAULT_VALUE_KEY.to_string(),
            user_store,
        }
    }

    pub fn session_name(mut self, name: impl Into<String>) -> Self {
        self.session_name = name.into();
        self
    }

    pub fn value_key(mut self, key: impl Into<String>) -> Self {
        self.value_key = key.into();
        self
    }
}

impl fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionConfig")
            .field("session_name", &self.session_name)
            .field("value_key", &self.value_key)
            .finish_non_exhaustive()
    }
}

/// Resolves the user ID stored in a session.
#[derive(Debug, Clone)]
pub struct SessionStrategy {
    config: SessionConfig,
}

impl SessionStrategy {
    pub const NAME: &'static str = "session";

    pub fn new(config: SessionConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Strategy for SessionStrategy {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn setup(&self) -> Result<(), SetupError> {
        if self.config.session_name.is_empty() || self.config.value_key.is_empty() {
            return Err(SetupError::new(Self::NAME, "session name and value key are required"));
        }
        self.config
            .store
            .setup()
            .map_err(|e| SetupError::new(Self::NAME, e.to_string()))
    }

    async fn authenticate(&self, ctx: &AuthContext, request: &Parts) -> Result<SharedUser, AuthError> {
        let session = self
            .config
            .store
            .load(request, &self.config.session_name)
            .await
            .map_err(|e| {
                debug!("Session {} unreadable: {}", self.config.session_name, e);
                AuthError::Unauthorized
            })?;

        let user_id = session
            .get(&self.config.value_key)
            .and_then(|v| v.as_str())
            .filter(|id| !id.is_empty())
            .ok_or(AuthError::Unauthorized)?;

        self.config
            .user_store
            .find_user_by_id(ctx, user_id)
            .await
            .map_err(AuthError::into_unauthorized)
    }
}
