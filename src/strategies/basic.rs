//! HTTP Basic authentication against a password-checking store.

use std::sync::Arc;

use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::STANDARD};
use http::header::AUTHORIZATION;
use http::request::Parts;

use crate::context::AuthContext;
use crate::error::AuthError;
use crate::store::UserStore;
use crate::strategies::header_str;
use crate::strategy::Strategy;
use crate::user::{Criteria, SharedUser};

/// Username/password from the `Authorization: Basic` header.
///
/// The pair is handed to the store as `{"username": .., "password": ..}`; the
/// store does the secret comparison.
#[derive(Clone)]
pub struct BasicAuthStrategy {
    store: Arc<dyn UserStore>,
}

impl BasicAuthStrategy {
    pub const NAME: &'static str = "local";

    pub fn new(store: Arc<dyn UserStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Strategy for BasicAuthStrategy {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn authenticate(&self, ctx: &AuthContext, request: &Parts) -> Result<SharedUser, AuthError> {
        let (username, password) = header_str(request, AUTHORIZATION.as_str())
            .and_then(parse_basic_credentials)
            .ok_or(AuthError::Unauthorized)?;

        let criteria = Criteria::new()
            .with("username", username)
            .with("password", password);

        self.store
            .find_user_by_credentials(ctx, &criteria)
            .await
            .map_err(AuthError::into_unauthorized)
    }
}

/// Decode `Basic <base64(user:pass)>`. The scheme is matched case-insensitively.
pub fn parse_basic_credentials(header: &str) -> Option<(String, String)> {
    let (scheme, encoded) = header.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }

    let decoded = STANDARD.decode(encoded.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (username, password) = decoded.split_once(':')?;

    Some((username.to_string(), password.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{PasswordUserStore, hash_password};
    use crate::user::SimpleUser;

    fn basic(user: &str, pass: &str) -> String {
        format!("Basic {}", STANDARD.encode(format!("{}:{}", user, pass)))
    }

    fn request(authorization: Option<&str>) -> Parts {
        let mut builder = http::Request::builder().uri("/");
        if let Some(value) = authorization {
            builder = builder.header(AUTHORIZATION, value);
        }
        builder.body(()).unwrap().into_parts().0
    }

    fn strategy() -> BasicAuthStrategy {
        let phc = hash_password("secret123").unwrap();
        let store = PasswordUserStore::new().with_user("user1", phc, SimpleUser::new("u1").shared());
        BasicAuthStrategy::new(Arc::new(store))
    }

    #[test]
    fn test_parse_basic_credentials() {
        // "alice:secret123"
        assert_eq!(
            parse_basic_credentials("Basic YWxpY2U6c2VjcmV0MTIz"),
            Some(("alice".to_string(), "secret123".to_string()))
        );
        assert_eq!(
            parse_basic_credentials(&basic("bob", "pa:ss")),
            Some(("bob".to_string(), "pa:ss".to_string()))
        );
        assert_eq!(
            parse_basic_credentials("basic YWxpY2U6c2VjcmV0MTIz").map(|(u, _)| u),
            Some("alice".to_string())
        );
    }

    #[test]
    fn test_parse_basic_credentials_malformed() {
        assert_eq!(parse_basic_credentials("Bearer abc"), None);
        assert_eq!(parse_basic_credentials("Basic !!!notbase64"), None);
        assert_eq!(parse_basic_credentials("Basic"), None);
        // "nocolon"
        assert_eq!(parse_basic_credentials("Basic bm9jb2xvbg=="), None);
    }

    #[tokio::test]
    async fn test_authenticate_success() {
        let user = strategy()
            .authenticate(&AuthContext::new(), &request(Some(&basic("user1", "secret123"))))
            .await
            .unwrap();
        assert_eq!(user.id(), "u1");
    }

    #[tokio::test]
    async fn test_authenticate_wrong_password() {
        let result = strategy()
            .authenticate(&AuthContext::new(), &request(Some(&basic("user1", "wrongpass"))))
            .await;
        assert_eq!(result.unwrap_err(), AuthError::Unauthorized);
    }

    #[tokio::test]
    async fn test_authenticate_missing_header() {
        let result = strategy().authenticate(&AuthContext::new(), &request(None)).await;
        assert_eq!(result.unwrap_err(), AuthError::Unauthorized);
    }
}
