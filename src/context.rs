//! Per-request execution context carrying cancellation and deadline.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::AuthError;

/// Cancellation and deadline for one authentication attempt.
///
/// Every strategy and store call receives one. Blocking work (store queries,
/// network round trips) should run through [`AuthContext::guard`] so that a
/// cancelled or timed-out request fails promptly.
#[derive(Debug, Clone, Default)]
pub struct AuthContext {
    cancel: CancellationToken,
    deadline: Option<Instant>,
}

impl AuthContext {
    /// Context with no deadline that is never cancelled unless asked to.
    pub fn new() -> Self {
        Self::default()
    }

    /// Context that expires `timeout` from now.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            cancel: CancellationToken::new(),
            deadline: Some(Instant::now() + timeout),
        }
    }

    /// Attach an existing cancellation token (e.g. the server's shutdown token).
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Tighten the deadline. An earlier existing deadline is kept.
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(match self.deadline {
            Some(existing) if existing < deadline => existing,
            _ => deadline,
        });
        self
    }

    /// Derive a context cancelled together with this one.
    pub fn child(&self) -> Self {
        Self {
            cancel: self.cancel.child_token(),
            deadline: self.deadline,
        }
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// True once cancelled or past the deadline.
    pub fn is_done(&self) -> bool {
        self.cancel.is_cancelled() || self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Run `fut` unless the context is cancelled or its deadline passes first.
    ///
    /// Cancellation and timeout both surface as [`AuthError::Unauthorized`].
    pub async fn guard<F, T>(&self, fut: F) -> Result<T, AuthError>
    where
        F: Future<Output = Result<T, AuthError>>,
    {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                debug!("Authentication attempt cancelled");
                Err(AuthError::Unauthorized)
            }
            _ = wait_until(self.deadline) => {
                debug!("Authentication attempt exceeded its deadline");
                Err(AuthError::Unauthorized)
            }
            result = fut => result,
        }
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_guard_passes_result_through() {
        let ctx = AuthContext::new();
        let result = ctx.guard(async { Ok::<_, AuthError>(7) }).await;
        assert_eq!(result, Ok(7));
    }

    #[tokio::test]
    async fn test_guard_cancelled_context_fails_unauthorized() {
        let ctx = AuthContext::new();
        ctx.cancel();

        let result = ctx.guard(async { Ok::<_, AuthError>(1) }).await;
        assert_eq!(result, Err(AuthError::Unauthorized));
        assert!(ctx.is_done());
    }

    #[tokio::test(start_paused = true)]
    async fn test_guard_times_out_slow_future() {
        let ctx = AuthContext::with_timeout(Duration::from_millis(50));

        let result = ctx
            .guard(async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok::<_, AuthError>(())
            })
            .await;

        assert_eq!(result, Err(AuthError::Unauthorized));
    }

    #[tokio::test]
    async fn test_child_cancelled_with_parent() {
        let parent = AuthContext::new();
        let child = parent.child();
        assert!(!child.is_done());

        parent.cancel();
        assert!(child.is_done());
    }

    #[test]
    fn test_with_deadline_keeps_earliest() {
        let now = Instant::now();
        let early = now + Duration::from_secs(1);
        let late = now + Duration::from_secs(10);

        let ctx = AuthContext::new().with_deadline(early).with_deadline(late);
        assert_eq!(ctx.deadline(), Some(early));
    }
}
