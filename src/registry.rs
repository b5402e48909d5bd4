//! Registry of named authentication strategies.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::error::SetupError;
use crate::strategy::Strategy;

/// Name → strategy mapping shared by the dispatcher and registration sites.
///
/// Built once at service start and handed around as `Arc<StrategyRegistry>`.
/// Registration is expected before traffic starts but is safe at run time;
/// lookups take a read lock only. There is no removal.
#[derive(Default)]
pub struct StrategyRegistry {
    strategies: RwLock<HashMap<String, Arc<dyn Strategy>>>,
}

impl StrategyRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Run the strategy's setup, then insert it under its name.
    ///
    /// A strategy with the same name is replaced. On setup failure the
    /// registry is left untouched.
    pub async fn register<S: Strategy + 'static>(&self, strategy: S) -> Result<(), SetupError> {
        self.register_shared(Arc::new(strategy)).await
    }

    /// Same as [`register`](Self::register) for an already shared strategy.
    pub async fn register_shared(&self, strategy: Arc<dyn Strategy>) -> Result<(), SetupError> {
        if let Err(e) = strategy.setup() {
            warn!("Refusing to register strategy `{}`: {}", strategy.name(), e);
            return Err(e);
        }

        let name = strategy.name().to_string();
        let replaced = self
            .strategies
            .write()
            .await
            .insert(name.clone(), strategy)
            .is_some();

        if replaced {
            debug!("Strategy `{}` re-registered, previous instance replaced", name);
        } else {
            debug!("Strategy `{}` registered", name);
        }
        Ok(())
    }

    /// Get a strategy by name.
    pub async fn get(&self, name: &str) -> Option<Arc<dyn Strategy>> {
        self.strategies.read().await.get(name).cloned()
    }

    /// List all registered strategy names, in no particular order.
    pub async fn list(&self) -> Vec<String> {
        self.strategies.read().await.keys().cloned().collect()
    }

    /// Check if a strategy with the given name is registered.
    pub async fn contains(&self, name: &str) -> bool {
        self.strategies.read().await.contains_key(name)
    }

    pub async fn len(&self) -> usize {
        self.strategies.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.strategies.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::AuthContext;
    use crate::error::AuthError;
    use crate::user::{SharedUser, SimpleUser};
    use async_trait::async_trait;
    use http::request::Parts;

    struct Fixed {
        name: &'static str,
        user: &'static str,
        fail_setup: bool,
    }

    #[async_trait]
    impl Strategy for Fixed {
        fn name(&self) -> &str {
            self.name
        }

        fn setup(&self) -> Result<(), SetupError> {
            if self.fail_setup {
                Err(SetupError::new(self.name, "broken"))
            } else {
                Ok(())
            }
        }

        async fn authenticate(&self, _ctx: &AuthContext, _request: &Parts) -> Result<SharedUser, AuthError> {
            Ok(SimpleUser::new(self.user).shared())
        }
    }

    fn fixed(name: &'static str, user: &'static str) -> Fixed {
        Fixed {
            name,
            user,
            fail_setup: false,
        }
    }

    fn parts() -> Parts {
        http::Request::new(()).into_parts().0
    }

    #[tokio::test]
    async fn test_register_and_get() {
        let registry = StrategyRegistry::new();
        assert!(registry.is_empty().await);

        registry.register(fixed("apikey", "u1")).await.unwrap();

        assert!(registry.contains("apikey").await);
        assert!(registry.get("apikey").await.is_some());
        assert!(registry.get("jwt").await.is_none());
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn test_last_registration_wins() {
        let registry = StrategyRegistry::new();
        registry.register(fixed("apikey", "first")).await.unwrap();
        registry.register(fixed("apikey", "second")).await.unwrap();

        assert_eq!(registry.len().await, 1);
        let strategy = registry.get("apikey").await.unwrap();
        let user = strategy.authenticate(&AuthContext::new(), &parts()).await.unwrap();
        assert_eq!(user.id(), "second");
    }

    #[tokio::test]
    async fn test_list_names() {
        let registry = StrategyRegistry::new();
        registry.register(fixed("apikey", "u")).await.unwrap();
        registry.register(fixed("session", "u")).await.unwrap();

        let mut names = registry.list().await;
        names.sort();
        assert_eq!(names, vec!["apikey".to_string(), "session".to_string()]);
    }

    #[tokio::test]
    async fn test_failed_setup_is_not_registered() {
        let registry = StrategyRegistry::new();
        registry.register(fixed("jwt", "ok")).await.unwrap();

        let err = registry
            .register(Fixed {
                name: "jwt",
                user: "bad",
                fail_setup: true,
            })
            .await
            .unwrap_err();

        assert_eq!(err.strategy(), "jwt");
        let user = registry
            .get("jwt")
            .await
            .unwrap()
            .authenticate(&AuthContext::new(), &parts())
            .await
            .unwrap();
        assert_eq!(user.id(), "ok");
    }

    #[tokio::test]
    async fn test_registries_are_independent() {
        let a = StrategyRegistry::new();
        let b = StrategyRegistry::new();
        a.register(fixed("apikey", "u")).await.unwrap();

        assert!(a.contains("apikey").await);
        assert!(!b.contains("apikey").await);
    }
}
