//! Error types for authentication and strategy setup.

use std::fmt;

/// Authentication errors.
///
/// Strategies and the dispatcher only ever return `Unauthorized`. The other two
/// kinds come from a [`UserStore`](crate::UserStore) and are collapsed into
/// `Unauthorized` by the strategy that called it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthError {
    /// No valid identity could be established for the request.
    Unauthorized,
    /// Credential criteria did not resolve to exactly one identity.
    InvalidCredentials,
    /// No identity exists with the requested ID.
    UserNotFound,
}

impl AuthError {
    /// Collapse store-level detail into the single external failure kind.
    pub fn into_unauthorized(self) -> Self {
        Self::Unauthorized
    }

    /// Short machine-readable code, used in HTTP error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Unauthorized => "unauthorized",
            Self::InvalidCredentials => "invalid_credentials",
            Self::UserNotFound => "user_not_found",
        }
    }
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unauthorized => write!(f, "unauthorized"),
            Self::InvalidCredentials => write!(f, "invalid credentials"),
            Self::UserNotFound => write!(f, "user not found"),
        }
    }
}

impl std::error::Error for AuthError {}

/// A strategy refused to initialize.
///
/// Raised at registration time, never per request. A service that sees one
/// must not start accepting traffic with that strategy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetupError {
    strategy: String,
    reason: String,
}

impl SetupError {
    pub fn new(strategy: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            strategy: strategy.into(),
            reason: reason.into(),
        }
    }

    /// Name of the strategy whose setup failed.
    pub fn strategy(&self) -> &str {
        &self.strategy
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }
}

impl fmt::Display for SetupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "setup of strategy `{}` failed: {}", self.strategy, self.reason)
    }
}

impl std::error::Error for SetupError {}
