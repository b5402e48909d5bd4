//! Attaching the resolved identity to the request and reading it back.

use std::convert::Infallible;
use std::ops::Deref;

use axum::Json;
use axum::extract::{FromRequestParts, OptionalFromRequestParts};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use http::Extensions;
use http::request::Parts;
use tracing::debug;

use crate::error::AuthError;
use crate::user::SharedUser;

/// Name under which the identity travels with a request.
///
/// The extension slot itself is keyed by the [`AuthenticatedUser`] type; this
/// string identifies it in logs and error bodies.
pub const CONTEXT_USER_KEY: &str = "multiauth-user";

/// The authenticated identity as stored in request extensions.
///
/// Also an axum extractor: handlers that take it reject unauthenticated
/// requests with 401.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser(pub SharedUser);

impl AuthenticatedUser {
    pub fn into_inner(self) -> SharedUser {
        self.0
    }
}

impl Deref for AuthenticatedUser {
    type Target = SharedUser;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// Store `user` in the request extensions, replacing any earlier identity.
pub fn attach_user(extensions: &mut Extensions, user: SharedUser) {
    debug!("Attaching {} = {}", CONTEXT_USER_KEY, user.id());
    extensions.insert(AuthenticatedUser(user));
}

/// Identity attached to the request, if any. `None` means unauthenticated.
pub fn user_from_extensions(extensions: &Extensions) -> Option<SharedUser> {
    extensions.get::<AuthenticatedUser>().map(|u| u.0.clone())
}

/// 401 response with a machine-readable body.
pub fn unauthorized_response(err: AuthError) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(serde_json::json!({ "error": err.into_unauthorized().code() })),
    )
        .into_response()
}

/// Rejection used when a handler asks for [`AuthenticatedUser`] on an
/// unauthenticated request.
#[derive(Debug, Clone, Copy)]
pub struct Unauthenticated;

impl IntoResponse for Unauthenticated {
    fn into_response(self) -> Response {
        unauthorized_response(AuthError::Unauthorized)
    }
}

impl<S: Send + Sync> FromRequestParts<S> for AuthenticatedUser {
    type Rejection = Unauthenticated;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthenticatedUser>()
            .cloned()
            .ok_or(Unauthenticated)
    }
}

impl<S: Send + Sync> OptionalFromRequestParts<S> for AuthenticatedUser {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Option<Self>, Self::Rejection> {
        Ok(parts.extensions.get::<AuthenticatedUser>().cloned())
    }
}
