//! Error taxonomy for the cluster lifecycle core.

use thiserror::Error;

/// Result alias used throughout `sindr-core`.
pub type Result<T> = std::result::Result<T, SindError>;

/// The five error kinds a caller of `sindr-core` needs to distinguish.
///
/// Every public operation returns one of these. There is no local retry
/// anywhere in this crate: readiness polling (`concurrency::wait_ready`) is a
/// bounded wait with a deadline, not a retry loop, and is not represented as
/// an error kind of its own until the deadline elapses.
#[derive(Error, Debug)]
pub enum SindError {
    /// Rejected before any side effect: empty name, managers < 1, malformed
    /// port binding, and similar validation failures.
    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// The operation cannot proceed given the current state of the host:
    /// cluster already exists, cluster not found, image missing with pull
    /// not requested.
    #[error("precondition failed: {0}")]
    Precondition(String),

    /// A failure surfaced by the capability interface, annotated with which
    /// node or phase it happened in.
    #[error("engine error during {context}: {source}")]
    Engine {
        context: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// External tampering: multiple primaries for one cluster name, a
    /// container missing its role label. Always operator-actionable.
    #[error("cluster state is inconsistent: {0}")]
    Consistency(String),

    /// The ambient deadline elapsed, or the caller cancelled.
    #[error("operation timed out or was cancelled: {0}")]
    TimeoutOrCancelled(String),
}

impl SindError {
    /// Wrap an engine-level failure with the operation context it occurred
    /// in (e.g. `"create container sind-t1-worker-2"`).
    pub fn engine(
        context: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        SindError::Engine {
            context: context.into(),
            source: Box::new(source),
        }
    }

    pub fn configuration(msg: impl Into<String>) -> Self {
        SindError::Configuration(msg.into())
    }

    pub fn precondition(msg: impl Into<String>) -> Self {
        SindError::Precondition(msg.into())
    }

    pub fn consistency(msg: impl Into<String>) -> Self {
        SindError::Consistency(msg.into())
    }
}
