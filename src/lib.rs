//! Pluggable multi-strategy request authentication.
//!
//! A [`StrategyRegistry`] maps strategy names to [`Strategy`] instances. The
//! [`Authenticator`] walks a caller-supplied list of names, asks each strategy
//! to authenticate the request, and returns the first identity it gets back.
//! Strategies resolve raw credentials into identities through a [`UserStore`].
//!
//! ## Usage
//!
//! ```ignore
//! let store = Arc::new(ApiKeyStore::new([("k1", SimpleUser::new("u1").shared())]));
//! let registry = Arc::new(StrategyRegistry::new());
//! registry.register(ApiKeyStrategy::new(ApiKeyConfig::new(store))).await?;
//!
//! let authenticator = Authenticator::new(registry);
//! let user = authenticator
//!     .authenticate(&["apikey", "session"], &AuthContext::new(), &parts)
//!     .await?;
//! ```

mod context;
mod dispatcher;
mod error;
mod propagation;
mod registry;
mod strategy;
mod user;

pub mod config;
pub mod jwks;
pub mod middleware;
pub mod session;
pub mod store;
pub mod strategies;


pub use config::{AuthConfig, ConfigStores};
pub use context::AuthContext;
pub use dispatcher::Authenticator;
pub use error::{AuthError, SetupError};
pub use propagation::{
    AuthenticatedUser, CONTEXT_USER_KEY, Unauthenticated, attach_user, unauthorized_response,
    user_from_extensions,
};
pub use registry::StrategyRegistry;
pub use store::{ApiKeyStore, InMemoryUserStore, PasswordUserStore, UserStore};
pub use strategy::Strategy;
pub use user::{Attributes, Criteria, SharedUser, SimpleUser, User};
