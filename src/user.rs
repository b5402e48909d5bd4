//! Identity model and credential criteria.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Open attribute bag attached to an identity (claims, profile fields).
pub type Attributes = serde_json::Map<String, Value>;

/// An authenticated identity.
///
/// Produced by a [`UserStore`](crate::UserStore) or a
/// [`Strategy`](crate::Strategy) and immutable from then on.
pub trait User: fmt::Debug + Send + Sync {
    /// Stable, non-empty identifier.
    fn id(&self) -> &str;

    /// Read-only attribute view. Empty when the identity carries none.
    fn attributes(&self) -> &Attributes;
}

/// Identity handle shared between strategies, stores and request extensions.
pub type SharedUser = Arc<dyn User>;

/// Plain [`User`] implementation used by the bundled stores and strategies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimpleUser {
    id: String,
    #[serde(default)]
    attributes: Attributes,
}

impl SimpleUser {
    /// Create a user with no attributes.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            attributes: Attributes::new(),
        }
    }

    /// Add one attribute.
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Replace the whole attribute map.
    pub fn with_attributes(mut self, attributes: Attributes) -> Self {
        self.attributes = attributes;
        self
    }

    /// Wrap into a [`SharedUser`].
    pub fn shared(self) -> SharedUser {
        Arc::new(self)
    }
}

impl User for SimpleUser {
    fn id(&self) -> &str {
        &self.id
    }

    fn attributes(&self) -> &Attributes {
        &self.attributes
    }
}

/// Structural credential query handed to
/// [`UserStore::find_user_by_credentials`](crate::UserStore::find_user_by_credentials).
///
/// Keys iterate in ascending order, which is the order stores use when more
/// than one entry could match.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Criteria(BTreeMap<String, Value>);

impl Criteria {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// String value for `key`, or `None` when absent or not a string.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Criteria {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}
