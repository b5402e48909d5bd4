//! axum adapter: run the [`Authenticator`] in front of a router.
//!
//! ```ignore
//! let auth = AuthState::new(authenticator, ["apikey", "session"]);
//! let app = Router::new()
//!     .route("/me", get(me))
//!     .layer(axum::middleware::from_fn_with_state(auth, require_auth));
//! ```

use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;
use tracing::debug;

use crate::context::AuthContext;
use crate::dispatcher::Authenticator;
use crate::error::AuthError;
use crate::propagation::unauthorized_response;

/// Middleware state: the dispatcher plus the strategy order to try.
#[derive(Clone)]
pub struct AuthState {
    authenticator: Authenticator,
    strategies: Arc<[String]>,
    timeout: Option<Duration>,
}

impl AuthState {
    pub fn new<I, S>(authenticator: Authenticator, strategies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            authenticator,
            strategies: strategies.into_iter().map(Into::into).collect(),
            timeout: None,
        }
    }

    /// Bound each authentication attempt.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn strategies(&self) -> &[String] {
        &self.strategies
    }

    fn context(&self) -> AuthContext {
        match self.timeout {
            Some(timeout) => AuthContext::with_timeout(timeout),
            None => AuthContext::new(),
        }
    }

    async fn authenticate(&self, request: Request) -> (Request, bool) {
        let (mut parts, body) = request.into_parts();
        let ok = self
            .authenticator
            .authenticate_parts(&self.strategies[..], &self.context(), &mut parts)
            .await
            .is_ok();
        (Request::from_parts(parts, body), ok)
    }
}

/// Reject the request with 401 unless one of the strategies authenticates it.
pub async fn require_auth(State(state): State<AuthState>, request: Request, next: Next) -> Response {
    let (request, ok) = state.authenticate(request).await;
    if !ok {
        debug!("Rejecting unauthenticated {} {}", request.method(), request.uri().path());
        return unauthorized_response(AuthError::Unauthorized);
    }
    next.run(request).await
}

/// Attach an identity when one can be resolved; never rejects.
pub async fn optional_auth(State(state): State<AuthState>, request: Request, next: Next) -> Response {
    let (request, _) = state.authenticate(request).await;
    next.run(request).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::propagation::AuthenticatedUser;
    use crate::registry::StrategyRegistry;
    use crate::store::ApiKeyStore;
    use crate::strategies::{ApiKeyConfig, ApiKeyStrategy};
    use crate::user::SimpleUser;
    use axum::Router;
    use axum::body::Body;
    use axum::http::StatusCode;
    use axum::routing::get;
    use tower::ServiceExt;

    async fn me(user: AuthenticatedUser) -> String {
        user.id().to_string()
    }

    async fn maybe(user: Option<AuthenticatedUser>) -> String {
        user.map(|u| u.id().to_string()).unwrap_or_else(|| "anonymous".to_string())
    }

    async fn state() -> AuthState {
        let registry = Arc::new(StrategyRegistry::new());
        let store = ApiKeyStore::new([("key123", SimpleUser::new("u1").shared())]);
        registry
            .register(ApiKeyStrategy::new(ApiKeyConfig::new(Arc::new(store))))
            .await
            .unwrap();
        AuthState::new(Authenticator::new(registry), ["apikey"]).timeout(Duration::from_secs(5))
    }

    async fn body_string(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_require_auth_passes_identity_to_handler() {
        let app = Router::new()
            .route("/me", get(me))
            .layer(axum::middleware::from_fn_with_state(state().await, require_auth));

        let response = app
            .oneshot(
                http::Request::builder()
                    .uri("/me")
                    .header("X-API-Key", "key123")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_string(response).await, "u1");
    }

    #[tokio::test]
    async fn test_require_auth_rejects_with_401() {
        let app = Router::new()
            .route("/me", get(me))
            .layer(axum::middleware::from_fn_with_state(state().await, require_auth));

        let response = app
            .oneshot(http::Request::builder().uri("/me").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_string(response).await, r#"{"error":"unauthorized"}"#);
    }

    #[tokio::test]
    async fn test_optional_auth_lets_anonymous_through() {
        let app = Router::new()
            .route("/maybe", get(maybe))
            .layer(axum::middleware::from_fn_with_state(state().await, optional_auth));

        let anonymous = app
            .clone()
            .oneshot(http::Request::builder().uri("/maybe").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(anonymous.status(), StatusCode::OK);
        assert_eq!(body_string(anonymous).await, "anonymous");

        let known = app
            .oneshot(
                http::Request::builder()
                    .uri("/maybe?api_key=key123")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(body_string(known).await, "u1");
    }
}
