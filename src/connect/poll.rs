//! Bounded polling.
//!
//! Kafka Connect applies pause, resume, create, delete and config updates
//! asynchronously. The synchronous variants of those calls issue the request
//! and then poll a read endpoint here until it reflects the change.

use std::future::Future;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

/// Delay between two attempts of the predicate.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// How a bounded wait ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    Succeeded,
    TimedOut,
    Cancelled,
}

/// Repeat `exec` until it returns true or `limit` elapses.
///
/// Returns true iff the predicate succeeded within the deadline. Errors inside
/// the predicate must be folded into `false` by the predicate itself.
pub async fn try_until<F, Fut>(exec: F, limit: Duration) -> bool
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = bool> + Send + 'static,
{
    let never = CancellationToken::new();
    poll_until(exec, limit, DEFAULT_POLL_INTERVAL, &never).await == PollOutcome::Succeeded
}

/// Run `exec` on a background task every `interval` until it succeeds, `limit`
/// elapses, or `cancel` fires.
///
/// Once this returns the background task starts no further attempt; an attempt
/// already in flight runs to completion and its result is dropped.
pub async fn poll_until<F, Fut>(
    mut exec: F,
    limit: Duration,
    interval: Duration,
    cancel: &CancellationToken,
) -> PollOutcome
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = bool> + Send + 'static,
{
    let running = cancel.child_token();
    let evaluator = running.clone();
    let (success_tx, success_rx) = oneshot::channel::<()>();

    tokio::spawn(async move {
        while !evaluator.is_cancelled() {
            if exec().await {
                let _ = success_tx.send(());
                return;
            }
            tokio::select! {
                _ = evaluator.cancelled() => return,
                _ = tokio::time::sleep(interval) => {}
            }
        }
    });

    let outcome = tokio::select! {
        biased;
        res = success_rx => match res {
            Ok(()) => PollOutcome::Succeeded,
            // The evaluator only drops the sender without sending when it was
            // cancelled or when the predicate panicked.
            Err(_) if cancel.is_cancelled() => PollOutcome::Cancelled,
            Err(_) => {
                tracing::error!("Poll predicate stopped without a result");
                PollOutcome::TimedOut
            }
        },
        _ = cancel.cancelled() => PollOutcome::Cancelled,
        _ = tokio::time::sleep(limit) => PollOutcome::TimedOut,
    };

    running.cancel();
    outcome
}
