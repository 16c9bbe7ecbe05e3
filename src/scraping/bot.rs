use crate::config::BotConfig;
use crate::error::SelectionError;
use crate::models::candidate::{AppointmentDate, AvailDates, Selectable, Slot};
use crate::models::session::CycleState;
use crate::selection::applier::{CycleToken, SelectionApplier, announce_quietly};
use crate::selection::ports::{
    AvailabilitySource, Notifier, SlotDropdown, SlotSource, Submitter, Widget,
};
use crate::selection::selector::{TimeOrdering, last_date, last_slot};
use crate::selection::watcher::{CancelToken, WatchOptions, WatchOutcome, wait_ready, watch};
use anyhow::Result;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

const ANNOUNCEMENT: &str = "Last slot selected";

/// Everything one session reads from or writes to, injected up front
#[derive(Clone)]
pub struct SelectionContext {
    pub date_picker: Arc<dyn Widget>,
    pub slot_dropdown: Arc<dyn SlotDropdown>,
    pub availability: Arc<dyn AvailabilitySource>,
    pub slot_source: Arc<dyn SlotSource>,
    pub submitter: Arc<dyn Submitter>,
    pub notifier: Arc<dyn Notifier>,
}

/// Progress reported by a running session
#[derive(Debug, Clone, PartialEq)]
pub enum SelectionEvent {
    State(CycleState),
    DateApplied(AppointmentDate),
    NoDate,
    SlotApplied { date: String, slot: Slot },
    NoSlot { date: String },
    Submitted { date: String, slot_id: String },
    RemoteFailure {
        date: String,
        message: String,
        redirect_url: Option<String>,
    },
    /// A cycle broke off; the session keeps watching
    CycleAborted(String),
    /// The session cannot continue
    Failed(String),
    Stopped,
}

/// Drives selection cycles against one slot selection page: picks the last
/// bookable date, then the last free slot for it, then optionally submits.
/// Any later change of the date restarts the slot half of the cycle.
pub struct SlotSelectionBot {
    context: SelectionContext,
    applier: SelectionApplier,
    ordering: TimeOrdering,
    ready_watch: WatchOptions,
    change_watch: WatchOptions,
    cancel: CancelToken,
    pending_submits: Mutex<Vec<JoinHandle<()>>>,
}

impl SlotSelectionBot {
    pub fn new(context: SelectionContext, config: &BotConfig, cancel: CancelToken) -> Self {
        SlotSelectionBot {
            context,
            applier: SelectionApplier::new(config.auto_submit, config.submit_delay),
            ordering: config.time_ordering,
            ready_watch: WatchOptions {
                interval: config.poll_interval,
                timeout: config.watch_timeout,
            },
            change_watch: WatchOptions::every(config.poll_interval),
            cancel,
            pending_submits: Mutex::new(Vec::new()),
        }
    }

    /// Spawns the session and hands back its event stream and task. The
    /// stream ends once the session stopped and every pending submit has
    /// settled; the task has released the collaborators once it finished.
    pub fn start(self: Arc<Self>) -> (mpsc::Receiver<SelectionEvent>, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(32);
        info!("Slot selection started - selecting last date and last slot");

        let task = tokio::spawn(async move {
            if let Err(e) = self.run(&tx).await {
                error!("Slot selection stopped on error: {:?}", e);
                let _ = tx.send(SelectionEvent::Failed(e.to_string())).await;
            }
            self.settle_submits().await;
            let _ = tx.send(SelectionEvent::Stopped).await;
        });

        (rx, task)
    }

    async fn settle_submits(&self) {
        let pending = std::mem::take(&mut *self.pending_submits.lock().unwrap());
        for submit in pending {
            if let Err(e) = submit.await {
                error!("Submit forwarding task failed: {:?}", e);
            }
        }
    }

    async fn run(&self, tx: &mpsc::Sender<SelectionEvent>) -> Result<()> {
        emit(tx, SelectionEvent::State(CycleState::Watching)).await;

        let dates = match self.wait_for_dates().await {
            Ok(Some(dates)) => dates,
            Ok(None) => {
                info!("Stopped before the date picker became ready");
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };

        emit(tx, SelectionEvent::State(CycleState::Evaluating)).await;
        let mut last_seen = self.select_last_date(&dates, tx).await;

        loop {
            if tx.is_closed() {
                break;
            }
            emit(tx, SelectionEvent::State(CycleState::Watching)).await;

            match self.wait_for_date_change(last_seen.clone()).await {
                Ok(Some(changed)) => {
                    info!("Appointment date changed to {:?}", changed);
                    let token = self.applier.begin_cycle();
                    if let Err(e) = self.on_date_change(changed.clone(), token, tx).await {
                        warn!("Slot cycle aborted: {:?}", e);
                        emit(tx, SelectionEvent::CycleAborted(e.to_string())).await;
                    }
                    last_seen = changed;
                }
                Ok(None) => break,
                Err(e) => return Err(e.into()),
            }
        }

        Ok(())
    }

    /// Waits for the date picker and the page's date list; `None` if the
    /// watch was cancelled or timed out.
    async fn wait_for_dates(&self) -> Result<Option<AvailDates>, SelectionError> {
        let found: Arc<Mutex<Option<AvailDates>>> = Arc::new(Mutex::new(None));

        let ready = wait_ready(
            || {
                dates_when_ready(
                    self.context.date_picker.clone(),
                    self.context.availability.clone(),
                    found.clone(),
                )
            },
            self.ready_watch,
            &self.cancel,
        )
        .await?;

        if !ready {
            return Ok(None);
        }
        let dates = found.lock().unwrap().take();
        Ok(dates)
    }

    /// Applies the last bookable date and cascades into the slot cycle.
    /// Returns the date picker value the change watch should compare against,
    /// read right after the apply so a change made during the cycle is seen.
    async fn select_last_date(
        &self,
        dates: &AvailDates,
        tx: &mpsc::Sender<SelectionEvent>,
    ) -> Option<String> {
        let Some(date) = last_date(&dates.ad) else {
            info!("{}", SelectionError::EmptySelection("date"));
            emit(tx, SelectionEvent::NoDate).await;
            return self.current_date().await;
        };

        info!("Selecting last available date: {}", date.date_text);
        let token = self.applier.begin_cycle();
        let picker = self.context.date_picker.clone();

        let applied = self
            .applier
            .apply_and_cascade(picker.as_ref(), date, move || async move {
                emit(tx, SelectionEvent::DateApplied(date.clone())).await;
                emit(tx, SelectionEvent::State(CycleState::Applied)).await;

                // fetch with the picker's own text, like every later cycle
                let shown = self.current_date().await;
                if let Err(e) = self.on_date_change(shown.clone(), token, tx).await {
                    warn!("Slot cycle aborted: {:?}", e);
                    emit(tx, SelectionEvent::CycleAborted(e.to_string())).await;
                }
                Ok::<_, anyhow::Error>(shown)
            })
            .await;

        match applied {
            Ok(shown) => shown,
            Err(e) => {
                warn!("Date cycle aborted: {:?}", e);
                emit(tx, SelectionEvent::CycleAborted(e.to_string())).await;
                self.current_date().await
            }
        }
    }

    async fn current_date(&self) -> Option<String> {
        match self.context.date_picker.value().await {
            Ok(value) => value,
            Err(e) => {
                debug!("Could not read the date picker: {:?}", e);
                None
            }
        }
    }

    /// Waits for the date picker to hold something other than `last_seen`.
    /// `Ok(None)` means the session was cancelled.
    async fn wait_for_date_change(
        &self,
        last_seen: Option<String>,
    ) -> Result<Option<Option<String>>, SelectionError> {
        let observed: Arc<Mutex<Option<String>>> = Arc::new(Mutex::new(None));

        let changed = wait_ready(
            || {
                date_changed(
                    self.context.date_picker.clone(),
                    last_seen.clone(),
                    observed.clone(),
                )
            },
            self.change_watch,
            &self.cancel,
        )
        .await?;

        if !changed {
            return Ok(None);
        }
        let value = observed.lock().unwrap().take();
        Ok(Some(value))
    }

    /// Slot half of a cycle: fetch, select the last free slot, apply, submit.
    async fn on_date_change(
        &self,
        date: Option<String>,
        token: CycleToken,
        tx: &mpsc::Sender<SelectionEvent>,
    ) -> Result<()> {
        let Some(date) = date.filter(|d| !d.trim().is_empty()) else {
            debug!("Date cleared, emptying slot dropdown");
            return self.context.slot_dropdown.clear().await;
        };

        let response = match self.context.slot_source.fetch_slots(&date).await {
            Ok(response) if response.success => response,
            Ok(response) => {
                let failure = SelectionError::RemoteFailure {
                    message: response
                        .err
                        .unwrap_or_else(|| "slot request was rejected".to_string()),
                    redirect_url: response.ru,
                };
                self.surface(&date, failure, tx).await;
                return Ok(());
            }
            Err(e) => {
                error!("Error fetching slots: {:?}", e);
                let failure = SelectionError::RemoteFailure {
                    message: e.to_string(),
                    redirect_url: None,
                };
                self.surface(&date, failure, tx).await;
                return Ok(());
            }
        };

        emit(tx, SelectionEvent::State(CycleState::Evaluating)).await;

        let Some(slot) = last_slot(&response.data, self.ordering) else {
            info!("No available slots found for {}", date);
            emit(tx, SelectionEvent::NoSlot { date }).await;
            return Ok(());
        };

        if !self.wait_for_dropdown().await? {
            debug!("Slot dropdown never showed up, dropping cycle");
            return Ok(());
        }

        info!("Selecting last available slot: {}", slot.start_time);
        announce_quietly(self.context.notifier.as_ref(), ANNOUNCEMENT).await;

        self.applier
            .apply_slot(self.context.slot_dropdown.as_ref(), &response.data, slot)
            .await?;

        emit(
            tx,
            SelectionEvent::SlotApplied {
                date: date.clone(),
                slot: slot.clone(),
            },
        )
        .await;
        emit(tx, SelectionEvent::State(CycleState::Applied)).await;

        let slot_id = slot.applied_value();
        if let Some(pending) = self
            .applier
            .schedule_submit(token, self.context.submitter.clone())
        {
            let tx = tx.clone();
            let forward = tokio::spawn(async move {
                match pending.await {
                    Ok(Ok(true)) => {
                        emit(&tx, SelectionEvent::Submitted { date, slot_id }).await;
                        emit(&tx, SelectionEvent::State(CycleState::Submitted)).await;
                    }
                    Ok(Ok(false)) => {}
                    Ok(Err(e)) => {
                        error!("Submitting the slot selection failed: {:?}", e);
                        emit(&tx, SelectionEvent::CycleAborted(e.to_string())).await;
                    }
                    Err(e) => error!("Submit task panicked: {:?}", e),
                }
            });
            self.pending_submits.lock().unwrap().push(forward);
        }

        Ok(())
    }

    /// Waits for the slot dropdown in the background; `Ok(false)` when the
    /// session stopped or the watch timed out first.
    async fn wait_for_dropdown(&self) -> Result<bool> {
        let dropdown = self.context.slot_dropdown.clone();
        let mut handle = watch(
            move || slot_dropdown_ready(dropdown.clone()),
            self.ready_watch,
            || debug!("Slot dropdown is ready"),
        );
        let stop = handle.canceller();

        let outcome = tokio::select! {
            outcome = handle.outcome() => Some(outcome),
            _ = self.cancel.cancelled() => {
                stop.cancel();
                None
            }
        };

        match outcome {
            Some(WatchOutcome::Ready) => Ok(true),
            Some(WatchOutcome::Failed(reason)) => Err(SelectionError::WatchFailed(reason).into()),
            Some(other) => {
                debug!("Slot dropdown watch ended: {:?}", other);
                Ok(false)
            }
            None => {
                handle.outcome().await;
                Ok(false)
            }
        }
    }

    async fn surface(&self, date: &str, failure: SelectionError, tx: &mpsc::Sender<SelectionEvent>) {
        if failure.is_user_visible() {
            error!("{}", failure);
        } else {
            debug!("{}", failure);
        }
        if let SelectionError::RemoteFailure {
            message,
            redirect_url,
        } = failure
        {
            if let Some(url) = &redirect_url {
                warn!("The booking page asks to be redirected to: {}", url);
            }
            emit(
                tx,
                SelectionEvent::RemoteFailure {
                    date: date.to_string(),
                    message,
                    redirect_url,
                },
            )
            .await;
        }
    }
}

/// Readiness condition: the date picker exists and the page published its dates.
async fn dates_when_ready(
    picker: Arc<dyn Widget>,
    availability: Arc<dyn AvailabilitySource>,
    found: Arc<Mutex<Option<AvailDates>>>,
) -> Result<bool> {
    let dates = if picker.is_ready().await? {
        availability.available_dates().await?
    } else {
        None
    };
    match dates {
        Some(dates) => {
            *found.lock().unwrap() = Some(dates);
            Ok(true)
        }
        None => {
            debug!("Date picker: {}", SelectionError::NotReadyYet);
            Ok(false)
        }
    }
}

async fn slot_dropdown_ready(dropdown: Arc<dyn SlotDropdown>) -> Result<bool> {
    dropdown.is_ready().await
}

async fn date_changed(
    picker: Arc<dyn Widget>,
    last_seen: Option<String>,
    observed: Arc<Mutex<Option<String>>>,
) -> Result<bool> {
    let value = picker.value().await?;
    if value == last_seen {
        return Ok(false);
    }
    *observed.lock().unwrap() = value;
    Ok(true)
}

async fn emit(tx: &mpsc::Sender<SelectionEvent>, event: SelectionEvent) {
    if tx.send(event).await.is_err() {
        debug!("Selection event dropped, receiver closed");
    }
}
