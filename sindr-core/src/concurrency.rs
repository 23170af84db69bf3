//! Concurrent primitives: bounded-parallel fan-out with first-error
//! cancellation, and a fixed-cadence readiness poll.
//!
//! Every repeating pattern in this crate (create N nodes, remove N
//! containers, join N nodes, ...) goes through [`fan_out`] instead of
//! duplicating its own spawn/await/cancel logic.

use futures::future::Future;
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::debug;

use crate::cancel::Cancellation;
use crate::error::{Result, SindError};

/// Runs `operation` once per item in `items`, concurrently. On the first
/// error, the shared cancellation is cancelled so every other in-flight
/// operation observes it, and that first error is returned; later errors
/// are logged at `debug` and dropped. There is no retry at this layer.
pub async fn fan_out<T, O, F, Fut>(
    cancel: &Cancellation,
    items: impl IntoIterator<Item = T>,
    operation: F,
) -> Result<Vec<O>>
where
    T: Send + 'static,
    O: Send + 'static,
    F: Fn(T, Cancellation) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<O>> + Send,
{
    let operation = std::sync::Arc::new(operation);
    let mut set = JoinSet::new();

    let mut count = 0usize;
    for item in items {
        let item_cancel = cancel.child();
        let op = operation.clone();
        set.spawn(async move { op(item, item_cancel).await });
        count += 1;
    }

    let mut results = Vec::with_capacity(count);
    let mut first_error: Option<SindError> = None;

    while let Some(joined) = set.join_next().await {
        match joined {
            Ok(Ok(value)) => results.push(value),
            Ok(Err(err)) => {
                if first_error.is_none() {
                    cancel.cancel();
                    first_error = Some(err);
                } else {
                    debug!(error = %err, "suppressing subsequent fan-out error");
                }
            }
            Err(join_err) => {
                if join_err.is_panic() {
                    if first_error.is_none() {
                        cancel.cancel();
                        first_error = Some(SindError::Consistency(format!(
                            "fan-out task panicked: {join_err}"
                        )));
                    }
                }
            }
        }
    }

    match first_error {
        Some(err) => Err(err),
        None => Ok(results),
    }
}

/// Polls `probe` every `interval` (100ms in every caller in this crate)
/// until it returns `Ok(true)`, the deadline elapses, or the token is
/// cancelled. `probe` returning `Err` is treated as not-ready and logged at
/// `debug`; only the deadline/cancellation is terminal.
pub async fn wait_ready<F, Fut>(cancel: &Cancellation, interval: Duration, mut probe: F) -> Result<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<bool>>,
{
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        cancel.check("wait_ready")?;

        tokio::select! {
            _ = ticker.tick() => {
                match probe().await {
                    Ok(true) => return Ok(()),
                    Ok(false) => continue,
                    Err(err) => {
                        debug!(error = %err, "readiness probe not-yet-ready");
                        continue;
                    }
                }
            }
            _ = cancel.cancelled_or_deadline() => {
                return Err(SindError::TimeoutOrCancelled(
                    "deadline elapsed waiting for readiness".to_string(),
                ));
            }
        }
    }
}

/// The fixed 100ms readiness cadence used throughout the core.
pub const READINESS_POLL_INTERVAL: Duration = Duration::from_millis(100);

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn fan_out_collects_all_results() {
        let cancel = Cancellation::new();
        let results = fan_out(&cancel, 0..5, |i, _cancel| async move { Ok::<_, SindError>(i * 2) })
            .await
            .unwrap();
        let mut sorted = results;
        sorted.sort();
        assert_eq!(sorted, vec![0, 2, 4, 6, 8]);
    }

    #[tokio::test]
    async fn fan_out_cancels_siblings_on_first_error() {
        let cancel = Cancellation::new();
        let cancelled_seen = Arc::new(AtomicUsize::new(0));
        let seen = cancelled_seen.clone();

        let result = fan_out(&cancel, 0..10, move |i, item_cancel| {
            let seen = seen.clone();
            async move {
                if i == 0 {
                    return Err(SindError::configuration("boom"));
                }
                tokio::time::sleep(Duration::from_millis(50)).await;
                if item_cancel.is_cancelled() {
                    seen.fetch_add(1, Ordering::SeqCst);
                }
                Ok::<_, SindError>(())
            }
        })
        .await;

        assert!(result.is_err());
    }

    #[tokio::test]
    async fn wait_ready_succeeds_when_probe_reports_ready() {
        let cancel = Cancellation::with_timeout(Duration::from_secs(1));
        let mut attempts = 0;
        wait_ready(&cancel, Duration::from_millis(10), || {
            attempts += 1;
            let ready = attempts >= 3;
            async move { Ok(ready) }
        })
        .await
        .unwrap();
        assert!(attempts >= 3);
    }

    #[tokio::test]
    async fn wait_ready_times_out() {
        let cancel = Cancellation::with_timeout(Duration::from_millis(30));
        let result = wait_ready(&cancel, Duration::from_millis(10), || async { Ok(false) }).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn wait_ready_treats_probe_errors_as_not_ready() {
        let cancel = Cancellation::with_timeout(Duration::from_millis(200));
        let mut attempts = 0;
        let result = wait_ready(&cancel, Duration::from_millis(10), || {
            attempts += 1;
            async move {
                if attempts < 3 {
                    Err(SindError::configuration("not yet"))
                } else {
                    Ok(true)
                }
            }
        })
        .await;
        assert!(result.is_ok());
    }
}
