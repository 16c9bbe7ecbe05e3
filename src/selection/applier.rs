use crate::error::SelectionError;
use crate::models::candidate::{Selectable, Slot};
use crate::selection::ports::{Notifier, SlotDropdown, Submitter, Widget};
use anyhow::Result;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Identifies one selection cycle for the deferred submit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CycleToken {
    generation: u64,
}

impl CycleToken {
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

const FIRED: u64 = 1;

/// Single-shot submit guard. Starting a new cycle invalidates every token
/// handed out before it, and a token can fire at most once.
///
/// The current generation and its fired bit share one word, so claiming a
/// token is a single compare-and-swap.
#[derive(Debug, Default)]
pub struct SubmitGuard {
    state: AtomicU64,
}

impl SubmitGuard {
    pub fn begin_cycle(&self) -> CycleToken {
        let previous = match self.state.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |state| {
            Some(((state >> 1) + 1) << 1)
        }) {
            Ok(state) | Err(state) => state,
        };
        CycleToken {
            generation: (previous >> 1) + 1,
        }
    }

    pub fn is_current(&self, token: &CycleToken) -> bool {
        self.state.load(Ordering::SeqCst) >> 1 == token.generation
    }

    /// Claims the token; `false` if superseded or already used.
    pub fn try_fire(&self, token: &CycleToken) -> bool {
        let unfired = token.generation << 1;
        self.state
            .compare_exchange(unfired, unfired | FIRED, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }
}

/// Writes selections into page widgets and triggers what follows them.
#[derive(Debug, Clone)]
pub struct SelectionApplier {
    guard: Arc<SubmitGuard>,
    auto_submit: bool,
    submit_delay: Duration,
}

impl SelectionApplier {
    pub fn new(auto_submit: bool, submit_delay: Duration) -> Self {
        SelectionApplier {
            guard: Arc::new(SubmitGuard::default()),
            auto_submit,
            submit_delay,
        }
    }

    pub fn begin_cycle(&self) -> CycleToken {
        self.guard.begin_cycle()
    }

    pub async fn apply<W, C>(&self, target: &W, candidate: &C) -> Result<()>
    where
        W: Widget + ?Sized,
        C: Selectable + Sync,
    {
        target.set_value(&candidate.applied_value()).await
    }

    /// Applies `candidate`, then runs the listener that depends on it.
    pub async fn apply_and_cascade<W, C, F, Fut, T>(
        &self,
        target: &W,
        candidate: &C,
        on_applied: F,
    ) -> Result<T>
    where
        W: Widget + ?Sized,
        C: Selectable + Sync,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.apply(target, candidate).await?;
        on_applied().await
    }

    /// Loads every fetched slot into the dropdown, then selects `chosen`.
    pub async fn apply_slot<D>(&self, dropdown: &D, slots: &[Slot], chosen: &Slot) -> Result<()>
    where
        D: SlotDropdown + ?Sized,
    {
        dropdown.set_data_source(slots).await?;
        self.apply(dropdown, chosen).await
    }

    /// Defers a submit for the cycle behind `token`. Returns `None` when
    /// auto-submit is off; the task yields `Ok(false)` when a newer cycle
    /// started before the delay ran out.
    pub fn schedule_submit(
        &self,
        token: CycleToken,
        submitter: Arc<dyn Submitter>,
    ) -> Option<JoinHandle<Result<bool>>> {
        if !self.auto_submit {
            return None;
        }

        let guard = self.guard.clone();
        let delay = self.submit_delay;

        Some(tokio::spawn(async move {
            if delay.is_zero() {
                tokio::task::yield_now().await;
            } else {
                tokio::time::sleep(delay).await;
            }

            if !guard.try_fire(&token) {
                debug!(
                    "Dropping submit for superseded cycle {}",
                    token.generation()
                );
                return Ok(false);
            }

            info!("Submitting slot selection (cycle {})", token.generation());
            submitter.submit().await?;
            Ok(true)
        }))
    }
}

/// Fires the notification and swallows any failure.
pub async fn announce_quietly(notifier: &dyn Notifier, message: &str) {
    if let Err(e) = notifier.announce(message).await {
        let err = SelectionError::NotificationFailure(e.to_string());
        debug!("{}", err);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::candidate::AppointmentDate;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;
    use std::sync::atomic::AtomicUsize;

    #[derive(Default)]
    struct FakeDropdown {
        value: Mutex<Option<String>>,
        choices: Mutex<Vec<Slot>>,
    }

    #[async_trait]
    impl Widget for FakeDropdown {
        async fn is_ready(&self) -> Result<bool> {
            Ok(true)
        }

        async fn value(&self) -> Result<Option<String>> {
            Ok(self.value.lock().unwrap().clone())
        }

        async fn set_value(&self, value: &str) -> Result<()> {
            *self.value.lock().unwrap() = Some(value.to_string());
            Ok(())
        }
    }

    #[async_trait]
    impl SlotDropdown for FakeDropdown {
        async fn set_data_source(&self, slots: &[Slot]) -> Result<()> {
            *self.choices.lock().unwrap() = slots.to_vec();
            Ok(())
        }

        async fn clear(&self) -> Result<()> {
            *self.value.lock().unwrap() = None;
            self.choices.lock().unwrap().clear();
            Ok(())
        }
    }

    #[derive(Default)]
    struct CountingSubmitter {
        submits: AtomicUsize,
    }

    #[async_trait]
    impl Submitter for CountingSubmitter {
        async fn submit(&self) -> Result<()> {
            self.submits.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct BrokenNotifier;

    #[async_trait]
    impl Notifier for BrokenNotifier {
        async fn announce(&self, _message: &str) -> Result<()> {
            Err(anyhow::anyhow!("speech synthesis not available"))
        }
    }

    fn slot(id: &str, count: u32, start: &str) -> Slot {
        Slot {
            id: json!(id),
            count,
            start_time: start.to_string(),
        }
    }

    #[test]
    fn test_guard_fires_once_per_cycle() {
        let guard = SubmitGuard::default();
        let token = guard.begin_cycle();
        assert!(guard.try_fire(&token));
        assert!(!guard.try_fire(&token));
    }

    #[test]
    fn test_racing_claims_have_one_winner() {
        let guard = Arc::new(SubmitGuard::default());
        let token = guard.begin_cycle();

        let claims: Vec<_> = (0..8)
            .map(|_| {
                let guard = guard.clone();
                std::thread::spawn(move || guard.try_fire(&token))
            })
            .collect();
        let wins = claims
            .into_iter()
            .filter_map(|claim| claim.join().ok().filter(|&won| won))
            .count();

        assert_eq!(wins, 1);
    }

    #[test]
    fn test_claimed_cycle_never_revives_older_tokens() {
        let guard = SubmitGuard::default();
        let old = guard.begin_cycle();
        let current = guard.begin_cycle();
        assert!(guard.try_fire(&current));

        assert!(!guard.try_fire(&old));
        assert!(!guard.try_fire(&current));

        let next = guard.begin_cycle();
        assert!(guard.is_current(&next));
        assert!(guard.try_fire(&next));
    }

    #[test]
    fn test_guard_rejects_superseded_tokens() {
        let guard = SubmitGuard::default();
        let old = guard.begin_cycle();
        let new = guard.begin_cycle();
        assert!(!guard.is_current(&old));
        assert!(!guard.try_fire(&old));
        assert!(guard.try_fire(&new));
        assert!(new.generation() > old.generation());
    }

    #[tokio::test]
    async fn test_apply_and_cascade_runs_listener_after_apply() {
        let applier = SelectionApplier::new(false, Duration::ZERO);
        let widget = FakeDropdown::default();
        let date = AppointmentDate {
            date_text: "2024-01-20".to_string(),
            appointment_date_type: 0,
        };

        let seen = applier
            .apply_and_cascade(&widget, &date, || widget.value())
            .await
            .unwrap();

        assert_eq!(seen.as_deref(), Some("2024-01-20"));
    }

    #[tokio::test]
    async fn test_apply_slot_keeps_full_list() {
        let applier = SelectionApplier::new(false, Duration::ZERO);
        let dropdown = FakeDropdown::default();
        let slots = vec![slot("a", 0, "5:00 PM"), slot("b", 1, "4:00 PM")];

        applier.apply_slot(&dropdown, &slots, &slots[1]).await.unwrap();

        assert_eq!(dropdown.choices.lock().unwrap().len(), 2);
        assert_eq!(dropdown.value().await.unwrap().as_deref(), Some("b"));
    }

    #[tokio::test]
    async fn test_no_submit_when_disabled() {
        let applier = SelectionApplier::new(false, Duration::ZERO);
        let submitter = Arc::new(CountingSubmitter::default());
        let token = applier.begin_cycle();
        assert!(applier.schedule_submit(token, submitter.clone()).is_none());
        assert_eq!(submitter.submits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_zero_delay_submit_fires_once() {
        let applier = SelectionApplier::new(true, Duration::ZERO);
        let submitter = Arc::new(CountingSubmitter::default());
        let token = applier.begin_cycle();

        let first = applier.schedule_submit(token, submitter.clone()).unwrap();
        let second = applier.schedule_submit(token, submitter.clone()).unwrap();

        let fired = [first.await.unwrap().unwrap(), second.await.unwrap().unwrap()];
        assert_eq!(fired.iter().filter(|f| **f).count(), 1);
        assert_eq!(submitter.submits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reselection_cancels_pending_submit() {
        let applier = SelectionApplier::new(true, Duration::from_millis(100));
        let submitter = Arc::new(CountingSubmitter::default());

        let stale = applier
            .schedule_submit(applier.begin_cycle(), submitter.clone())
            .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        let fresh = applier
            .schedule_submit(applier.begin_cycle(), submitter.clone())
            .unwrap();

        assert!(!stale.await.unwrap().unwrap());
        assert!(fresh.await.unwrap().unwrap());
        assert_eq!(submitter.submits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_notification_failure_is_swallowed() {
        announce_quietly(&BrokenNotifier, "Last slot selected").await;
    }
}
