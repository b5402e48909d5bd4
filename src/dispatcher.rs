//! Ordered multi-strategy dispatch.

use std::sync::Arc;

use http::request::Parts;
use tracing::{debug, warn};

use crate::context::AuthContext;
use crate::error::AuthError;
use crate::propagation::attach_user;
use crate::registry::StrategyRegistry;
use crate::user::SharedUser;

/// Tries strategies in caller order until one authenticates the request.
#[derive(Clone)]
pub struct Authenticator {
    registry: Arc<StrategyRegistry>,
}

impl Authenticator {
    pub fn new(registry: Arc<StrategyRegistry>) -> Self {
        Self { registry }
    }

    /// Get reference to the strategy registry.
    pub fn registry(&self) -> &Arc<StrategyRegistry> {
        &self.registry
    }

    /// Authenticate `request` with the named strategies, in order.
    ///
    /// Unknown names are skipped. The first success is returned and no later
    /// strategy runs. When nothing succeeds the result is a single
    /// [`AuthError::Unauthorized`]; individual failure reasons are dropped.
    pub async fn authenticate<N: AsRef<str>>(
        &self,
        names: &[N],
        ctx: &AuthContext,
        request: &Parts,
    ) -> Result<SharedUser, AuthError> {
        for name in names {
            let name = name.as_ref();

            if ctx.is_done() {
                debug!("Context finished before strategy `{}` could run", name);
                break;
            }

            let Some(strategy) = self.registry.get(name).await else {
                debug!("Strategy `{}` is not registered, skipping", name);
                continue;
            };

            match ctx.guard(strategy.authenticate(ctx, request)).await {
                Ok(user) if user.id().is_empty() => {
                    warn!("Strategy `{}` returned an identity with an empty ID, ignoring", name);
                }
                Ok(user) => {
                    debug!("Authenticated user {} via strategy `{}`", user.id(), name);
                    return Ok(user);
                }
                Err(e) => {
                    debug!("Strategy `{}` did not authenticate the request: {}", name, e);
                }
            }
        }

        Err(AuthError::Unauthorized)
    }

    /// Authenticate and, on success, attach the identity to the request's extensions.
    pub async fn authenticate_parts<N: AsRef<str>>(
        &self,
        names: &[N],
        ctx: &AuthContext,
        request: &mut Parts,
    ) -> Result<SharedUser, AuthError> {
        let user = self.authenticate(names, ctx, request).await?;
        attach_user(&mut request.extensions, user.clone());
        Ok(user)
    }
}
