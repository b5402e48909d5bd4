//! The authentication strategy contract.

use async_trait::async_trait;
use http::request::Parts;

use crate::context::AuthContext;
use crate::error::{AuthError, SetupError};
use crate::user::SharedUser;

/// One authentication mechanism.
///
/// Each attempt moves through extraction (pull the raw credential out of the
/// request), integrity checks where the mechanism has them, and identity
/// lookup. Any failure along the way is reported as
/// [`AuthError::Unauthorized`], whatever caused it.
#[async_trait]
pub trait Strategy: Send + Sync {
    /// Registry key. Must not change over the strategy's lifetime.
    fn name(&self) -> &str;

    /// One-time initialization, run when the strategy is registered.
    fn setup(&self) -> Result<(), SetupError> {
        Ok(())
    }

    /// Authenticate a single request.
    async fn authenticate(&self, ctx: &AuthContext, request: &Parts) -> Result<SharedUser, AuthError>;
}
