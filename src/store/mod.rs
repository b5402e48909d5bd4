//! Credential lookup back ends.
//!
//! A [`UserStore`] turns raw credentials into identities for the strategies.
//! Three in-memory implementations are bundled:
//!
//! - [`InMemoryUserStore`]: users keyed by ID, honors the `"id"` criteria key
//! - [`ApiKeyStore`]: pre-shared keys mapped to users, any string criteria value is a key
//! - [`PasswordUserStore`]: argon2-hashed passwords, honors `"username"` + `"password"`

mod apikey;
mod memory;
mod password;

pub use apikey::{ApiKeyStore, hash_api_key};
pub use memory::InMemoryUserStore;
pub use password::{PasswordUserStore, hash_password};

use async_trait::async_trait;

use crate::context::AuthContext;
use crate::error::AuthError;
use crate::user::{Criteria, SharedUser};

/// Read-only identity lookup shared across concurrent requests.
///
/// Implementations must be safe for concurrent reads. Unrecognized criteria
/// keys are ignored, and empty or unmatched criteria never yield an identity.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Exact lookup by primary identifier.
    ///
    /// A missing record fails with [`AuthError::UserNotFound`] and nothing else.
    async fn find_user_by_id(&self, ctx: &AuthContext, id: &str) -> Result<SharedUser, AuthError>;

    /// Structural lookup.
    ///
    /// Fails with [`AuthError::InvalidCredentials`] unless the criteria resolve
    /// to exactly one identity under the store's documented selection rule.
    async fn find_user_by_credentials(
        &self,
        ctx: &AuthContext,
        criteria: &Criteria,
    ) -> Result<SharedUser, AuthError>;
}
