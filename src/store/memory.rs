use std::collections::HashMap;

use async_trait::async_trait;

use crate::context::AuthContext;
use crate::error::AuthError;
use crate::store::UserStore;
use crate::user::{Criteria, SharedUser};

/// Users keyed by ID.
///
/// Credential lookups honor the `"id"` key only. Adding a user whose ID is
/// already present replaces the earlier one.
#[derive(Debug, Default, Clone)]
pub struct InMemoryUserStore {
    users: HashMap<String, SharedUser>,
}

impl InMemoryUserStore {
    pub fn new(users: impl IntoIterator<Item = SharedUser>) -> Self {
        Self {
            users: users
                .into_iter()
                .map(|u| (u.id().to_string(), u))
                .collect(),
        }
    }

    pub fn with_user(mut self, user: SharedUser) -> Self {
        self.users.insert(user.id().to_string(), user);
        self
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

#[async_trait]
impl UserStore for InMemoryUserStore {
    async fn find_user_by_id(&self, _ctx: &AuthContext, id: &str) -> Result<SharedUser, AuthError> {
        self.users.get(id).cloned().ok_or(AuthError::UserNotFound)
    }

    async fn find_user_by_credentials(
        &self,
        ctx: &AuthContext,
        criteria: &Criteria,
    ) -> Result<SharedUser, AuthError> {
        let id = criteria.get_str("id").ok_or(AuthError::InvalidCredentials)?;
        self.find_user_by_id(ctx, id)
            .await
            .map_err(|_| AuthError::InvalidCredentials)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::user::SimpleUser;

    fn store() -> InMemoryUserStore {
        InMemoryUserStore::new([SimpleUser::new("u1").shared()])
    }

    #[tokio::test]
    async fn test_find_user_by_id() {
        let ctx = AuthContext::new();
        let user = store().find_user_by_id(&ctx, "u1").await.unwrap();
        assert_eq!(user.id(), "u1");
    }

    #[tokio::test]
    async fn test_find_user_by_id_missing() {
        let ctx = AuthContext::new();
        let result = store().find_user_by_id(&ctx, "nope").await;
        assert!(matches!(result, Err(AuthError::UserNotFound)));
    }

    #[tokio::test]
    async fn test_find_user_by_credentials_id_key() {
        let ctx = AuthContext::new();
        let criteria = Criteria::new().with("id", "u1");
        let user = store().find_user_by_credentials(&ctx, &criteria).await.unwrap();
        assert_eq!(user.id(), "u1");
    }

    #[tokio::test]
    async fn test_find_user_by_credentials_unmatched() {
        let ctx = AuthContext::new();
        let store = store();

        for criteria in [
            Criteria::new(),
            Criteria::new().with("foo", "bar"),
            Criteria::new().with("id", "nope"),
            Criteria::new().with("id", 17),
        ] {
            let result = store.find_user_by_credentials(&ctx, &criteria).await;
            assert!(
                matches!(result, Err(AuthError::InvalidCredentials)),
                "criteria {:?} should not resolve",
                criteria
            );
        }
    }

    #[tokio::test]
    async fn test_duplicate_id_replaces_earlier_user() {
        let ctx = AuthContext::new();
        let store = InMemoryUserStore::new([SimpleUser::new("u1").with_attribute("v", 1).shared()])
            .with_user(SimpleUser::new("u1").with_attribute("v", 2).shared());

        assert_eq!(store.len(), 1);
        let user = store.find_user_by_id(&ctx, "u1").await.unwrap();
        assert_eq!(user.attributes()["v"], 2);
    }
}
