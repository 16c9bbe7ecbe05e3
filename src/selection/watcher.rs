//! Timer-driven readiness watching.
//!
//! The booking page exposes no "ready" callback for its widgets, so readiness
//! is observed by evaluating a condition once per tick until it holds.

use crate::error::SelectionError;
use anyhow::Result;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval, sleep_until};
use tracing::{debug, warn};

/// Shared cancellation flag; clones observe the same state.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    inner: Arc<CancelInner>,
}

#[derive(Debug, Default)]
struct CancelInner {
    cancelled: AtomicBool,
    notify: Notify,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Resolves once `cancel` has been called.
    pub async fn cancelled(&self) {
        loop {
            let notified = self.inner.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

/// How a watch ended
#[derive(Debug, Clone, PartialEq)]
pub enum WatchOutcome {
    Ready,
    Cancelled,
    TimedOut,
    Failed(String),
}

/// Timing of a watch
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WatchOptions {
    pub interval: Duration,
    /// `None` watches until ready or cancelled
    pub timeout: Option<Duration>,
}

impl WatchOptions {
    pub fn every(interval: Duration) -> Self {
        WatchOptions {
            interval,
            timeout: None,
        }
    }
}

/// Waits until `condition` returns `Ok(true)`.
///
/// The condition is evaluated right away and then once per interval. An
/// `Err` from the condition ends the watch with `Failed` and is never retried.
pub async fn wait_until<C, Fut>(
    mut condition: C,
    options: WatchOptions,
    cancel: &CancelToken,
) -> WatchOutcome
where
    C: FnMut() -> Fut,
    Fut: Future<Output = Result<bool>>,
{
    // interval() panics on zero
    let period = options.interval.max(Duration::from_millis(1));
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let deadline = options.timeout.map(|timeout| Instant::now() + timeout);
    let timed_out = async {
        match deadline {
            Some(deadline) => sleep_until(deadline).await,
            None => std::future::pending().await,
        }
    };
    tokio::pin!(timed_out);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return WatchOutcome::Cancelled,
            _ = &mut timed_out => return WatchOutcome::TimedOut,
            _ = ticker.tick() => {}
        }

        match condition().await {
            Ok(true) => return WatchOutcome::Ready,
            Ok(false) => {}
            Err(e) => {
                warn!("Watch condition failed, giving up: {:?}", e);
                return WatchOutcome::Failed(e.to_string());
            }
        }
    }
}

/// Same as [`wait_until`], mapped onto the selection error taxonomy.
pub async fn wait_ready<C, Fut>(
    condition: C,
    options: WatchOptions,
    cancel: &CancelToken,
) -> std::result::Result<bool, SelectionError>
where
    C: FnMut() -> Fut,
    Fut: Future<Output = Result<bool>>,
{
    match wait_until(condition, options, cancel).await {
        WatchOutcome::Ready => Ok(true),
        WatchOutcome::Cancelled | WatchOutcome::TimedOut => Ok(false),
        WatchOutcome::Failed(reason) => Err(SelectionError::WatchFailed(reason)),
    }
}

/// Handle on a background watch started with [`watch`].
///
/// Dropping the handle does not stop the watch.
pub struct WatchHandle {
    cancel: CancelToken,
    task: JoinHandle<WatchOutcome>,
}

impl WatchHandle {
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// A token that cancels this watch, for use where the handle is borrowed.
    pub fn canceller(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn is_pending(&self) -> bool {
        !self.task.is_finished()
    }

    /// Waits for the watch to end. Must not be awaited again once it returned.
    pub async fn outcome(&mut self) -> WatchOutcome {
        match (&mut self.task).await {
            Ok(outcome) => outcome,
            Err(e) => WatchOutcome::Failed(e.to_string()),
        }
    }
}

/// Spawns a watch that calls `on_ready` exactly once when `condition` holds.
///
/// `on_ready` never runs when the watch is cancelled, times out or fails.
pub fn watch<C, Fut, R>(condition: C, options: WatchOptions, on_ready: R) -> WatchHandle
where
    C: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = Result<bool>> + Send,
    R: FnOnce() + Send + 'static,
{
    let cancel = CancelToken::new();
    let token = cancel.clone();

    let task = tokio::spawn(async move {
        let outcome = wait_until(condition, options, &token).await;
        if outcome == WatchOutcome::Ready {
            on_ready();
        } else {
            debug!("Watch ended without readiness: {:?}", outcome);
        }
        outcome
    });

    WatchHandle { cancel, task }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    const TICK: Duration = Duration::from_millis(10);

    #[tokio::test(start_paused = true)]
    async fn test_ready_fires_callback_once() {
        let ready = Arc::new(AtomicBool::new(false));
        let evaluations = Arc::new(AtomicUsize::new(0));
        let fired = Arc::new(AtomicUsize::new(0));

        let mut handle = {
            let ready = ready.clone();
            let evaluations = evaluations.clone();
            let fired = fired.clone();
            watch(
                move || {
                    let ready = ready.clone();
                    let evaluations = evaluations.clone();
                    async move {
                        evaluations.fetch_add(1, Ordering::SeqCst);
                        Ok(ready.load(Ordering::SeqCst))
                    }
                },
                WatchOptions::every(TICK),
                move || {
                    fired.fetch_add(1, Ordering::SeqCst);
                },
            )
        };

        tokio::time::sleep(TICK * 3).await;
        assert!(handle.is_pending());
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        ready.store(true, Ordering::SeqCst);
        assert_eq!(handle.outcome().await, WatchOutcome::Ready);
        assert_eq!(fired.load(Ordering::SeqCst), 1);

        // the timer is gone once ready
        let seen = evaluations.load(Ordering::SeqCst);
        tokio::time::sleep(TICK * 5).await;
        assert_eq!(evaluations.load(Ordering::SeqCst), seen);
    }

    #[tokio::test(start_paused = true)]
    async fn test_never_ready_stays_pending_without_error() {
        let fired = Arc::new(AtomicBool::new(false));
        let flag = fired.clone();

        let mut handle = watch(
            || async { Ok(false) },
            WatchOptions::every(TICK),
            move || flag.store(true, Ordering::SeqCst),
        );

        tokio::time::sleep(TICK * 100).await;
        assert!(handle.is_pending());
        assert!(!fired.load(Ordering::SeqCst));

        handle.cancel();
        assert_eq!(handle.outcome().await, WatchOutcome::Cancelled);
        assert!(!fired.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn test_canceller_stops_a_borrowed_watch() {
        let mut handle = watch(|| async { Ok(false) }, WatchOptions::every(TICK), || {});
        let stop = handle.canceller();

        let outcome = tokio::select! {
            outcome = handle.outcome() => Some(outcome),
            _ = tokio::time::sleep(TICK * 3) => {
                stop.cancel();
                None
            }
        };
        assert_eq!(outcome, None);
        assert_eq!(handle.outcome().await, WatchOutcome::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failing_condition_stops_without_retry() {
        let evaluations = Arc::new(AtomicUsize::new(0));
        let counter = evaluations.clone();

        let outcome = wait_until(
            move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(anyhow::anyhow!("widget vanished"))
                }
            },
            WatchOptions::every(TICK),
            &CancelToken::new(),
        )
        .await;

        assert_eq!(outcome, WatchOutcome::Failed("widget vanished".to_string()));
        tokio::time::sleep(TICK * 10).await;
        assert_eq!(evaluations.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_ends_watch() {
        let options = WatchOptions {
            interval: TICK,
            timeout: Some(TICK * 5),
        };
        let outcome = wait_until(|| async { Ok(false) }, options, &CancelToken::new()).await;
        assert_eq!(outcome, WatchOutcome::TimedOut);
    }

    #[tokio::test(start_paused = true)]
    async fn test_already_cancelled_never_evaluates() {
        let cancel = CancelToken::new();
        cancel.cancel();

        let evaluations = Arc::new(AtomicUsize::new(0));
        let counter = evaluations.clone();

        let outcome = wait_until(
            move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(true)
                }
            },
            WatchOptions::every(TICK),
            &cancel,
        )
        .await;
        assert_eq!(outcome, WatchOutcome::Cancelled);
        assert_eq!(evaluations.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_ready_maps_failures() {
        let result = wait_ready(
            || async { Err(anyhow::anyhow!("boom")) },
            WatchOptions::every(TICK),
            &CancelToken::new(),
        )
        .await;
        assert_eq!(result, Err(SelectionError::WatchFailed("boom".to_string())));

        let result = wait_ready(|| async { Ok(true) }, WatchOptions::every(TICK), &CancelToken::new()).await;
        assert_eq!(result, Ok(true));
    }
}
