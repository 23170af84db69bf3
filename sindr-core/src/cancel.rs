//! Cancellation and deadlines.
//!
//! Every public operation in this crate takes a [`Cancellation`]. It is
//! threaded explicitly through every call rather than carried ambiently
//! (no thread-local, no task-local), so that propagation to `fan_out` items
//! and engine calls is visible at every call site.

use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::{Result, SindError};

/// A cancellation token paired with an absolute deadline.
#[derive(Clone)]
pub struct Cancellation {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl Cancellation {
    /// No deadline, cancellable only by the caller.
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
            deadline: None,
        }
    }

    /// A cancellation that also expires after `timeout` from now.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            token: CancellationToken::new(),
            deadline: Some(Instant::now() + timeout),
        }
    }

    /// A child token that is cancelled whenever `self` is, in addition to
    /// being independently cancellable (used by `fan_out` to stop siblings
    /// on first error without cancelling the caller's own token).
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
            deadline: self.deadline,
        }
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub(crate) fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Resolves when either the token is cancelled or the deadline passes,
    /// whichever comes first. Used by `concurrency::wait_ready`.
    pub async fn cancelled_or_deadline(&self) {
        match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    _ = self.token.cancelled() => {}
                    _ = tokio::time::sleep_until(deadline) => {}
                }
            }
            None => self.token.cancelled().await,
        }
    }

    /// Returns an error if the deadline has already passed or the token is
    /// already cancelled, otherwise `Ok(())`.
    pub fn check(&self, context: &str) -> Result<()> {
        if self.token.is_cancelled() {
            return Err(SindError::TimeoutOrCancelled(format!(
                "{context}: cancelled"
            )));
        }
        if let Some(deadline) = self.deadline {
            if Instant::now() >= deadline {
                return Err(SindError::TimeoutOrCancelled(format!(
                    "{context}: deadline elapsed"
                )));
            }
        }
        Ok(())
    }
}

impl Default for Cancellation {
    fn default() -> Self {
        Self::new()
    }
}
