//! Per-call deadline and cancellation.

use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::{Result, SkaldError};

/// Caller-side limits for one [`Orchestrator::generate_with`] call.
///
/// Both limits are optional. When either fires while an adapter call is in
/// flight, the call is abandoned and nothing is recorded for it: no provider
/// failure, no circuit update, no cache entry.
///
/// [`Orchestrator::generate_with`]: crate::Orchestrator::generate_with
///
/// ```rust
/// # use skald::CallContext;
/// # use std::time::Duration;
/// # use tokio_util::sync::CancellationToken;
/// let token = CancellationToken::new();
/// let ctx = CallContext::new()
///     .timeout(Duration::from_secs(10))
///     .cancellation(token.child_token());
/// ```
#[derive(Debug, Clone, Default)]
pub struct CallContext {
    deadline: Option<Instant>,
    cancel: Option<CancellationToken>,
}

impl CallContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Give up at `deadline`.
    pub fn deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Give up `after` from now.
    pub fn timeout(self, after: Duration) -> Self {
        self.deadline(Instant::now() + after)
    }

    /// Give up when `token` is canceled.
    pub fn cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn deadline_at(&self) -> Option<Instant> {
        self.deadline
    }

    /// Fail fast if the call is already canceled or past its deadline.
    pub fn check(&self) -> Result<()> {
        if self.cancel.as_ref().is_some_and(|t| t.is_cancelled()) {
            return Err(SkaldError::Canceled);
        }
        if self.deadline.is_some_and(|d| Instant::now() >= d) {
            return Err(SkaldError::DeadlineExceeded);
        }
        Ok(())
    }

    /// Resolves when the token is canceled; never without one.
    pub(crate) async fn canceled(&self) {
        match &self.cancel {
            Some(token) => token.cancelled().await,
            None => std::future::pending().await,
        }
    }

    /// Resolves at the deadline; never without one.
    pub(crate) async fn expired(&self) {
        match self.deadline {
            Some(deadline) => tokio::time::sleep_until(deadline).await,
            None => std::future::pending().await,
        }
    }
}
