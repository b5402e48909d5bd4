use std::collections::BTreeMap;

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use crate::context::AuthContext;
use crate::error::AuthError;
use crate::store::UserStore;
use crate::user::{Criteria, SharedUser};

/// Pre-shared API keys mapped to users.
///
/// Keys are held as SHA-256 digests, never in the clear. A credential lookup
/// walks the criteria in key order and returns the user for the first string
/// value that is a known key, whatever criteria key it sits under.
#[derive(Debug, Default, Clone)]
pub struct ApiKeyStore {
    by_key_hash: BTreeMap<String, SharedUser>,
}

impl ApiKeyStore {
    pub fn new<K: AsRef<str>>(mapping: impl IntoIterator<Item = (K, SharedUser)>) -> Self {
        Self {
            by_key_hash: mapping
                .into_iter()
                .map(|(key, user)| (hash_api_key(key.as_ref()), user))
                .collect(),
        }
    }

    pub fn with_key(mut self, key: &str, user: SharedUser) -> Self {
        self.by_key_hash.insert(hash_api_key(key), user);
        self
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.by_key_hash.contains_key(&hash_api_key(key))
    }

    pub fn len(&self) -> usize {
        self.by_key_hash.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_key_hash.is_empty()
    }
}

#[async_trait]
impl UserStore for ApiKeyStore {
    /// Several keys may map to the same user; the first entry in digest order wins.
    async fn find_user_by_id(&self, _ctx: &AuthContext, id: &str) -> Result<SharedUser, AuthError> {
        self.by_key_hash
            .values()
            .find(|u| u.id() == id)
            .cloned()
            .ok_or(AuthError::UserNotFound)
    }

    async fn find_user_by_credentials(
        &self,
        _ctx: &AuthContext,
        criteria: &Criteria,
    ) -> Result<SharedUser, AuthError> {
        criteria
            .iter()
            .filter_map(|(_, value)| value.as_str())
            .find_map(|key| self.by_key_hash.get(&hash_api_key(key)))
            .cloned()
            .ok_or(AuthError::InvalidCredentials)
    }
}

/// Hex SHA-256 digest of an API key.
pub fn hash_api_key(key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    format!("{:x}", hasher.finalize())
}
