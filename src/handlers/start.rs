use crate::cache::{ACTIVE_SESSIONS, SESSION_CACHE};
use crate::config::BotConfig;
use crate::models::candidate::{Selectable, parse_date_text};
use crate::models::session::{CycleState, SelectedSlot, SessionStatus};
use crate::scraping::bot::{SelectionContext, SelectionEvent, SlotSelectionBot};
use crate::scraping::page::KendoPage;
use crate::scraping::slots::HttpSlotSource;
use crate::selection::watcher::CancelToken;
use anyhow::{Context, Result};
use chrono::Utc;
use std::sync::Arc;
use tokio::task;
use url::Url;
use uuid::Uuid;

/// Starts a selection session for `url` in the background and returns its id.
pub async fn start(url: String, config: BotConfig) -> Result<Uuid> {
    let page_url = Url::parse(&url).context("invalid slot selection page url")?;
    // fail before spawning anything
    HttpSlotSource::for_page(&page_url, None)?;

    let id = Uuid::new_v4();
    let cancel = CancelToken::new();
    ACTIVE_SESSIONS.lock().unwrap().insert(id, cancel.clone());
    SESSION_CACHE.insert(id, SessionStatus::new(id, url)).await;

    task::spawn(async move {
        if let Err(e) = run_session(id, page_url, config, cancel).await {
            tracing::error!("Selection session {} failed: {:?}", id, e);
            update(id, |status| {
                status.state = CycleState::Failed;
                status.last_error = Some(e.to_string());
            })
            .await;
        }
        ACTIVE_SESSIONS.lock().unwrap().remove(&id);
    });

    Ok(id)
}

async fn run_session(id: Uuid, page_url: Url, config: BotConfig, cancel: CancelToken) -> Result<()> {
    let page = Arc::new(KendoPage::open(&config, page_url).await?);
    let outcome = drive(id, page.clone(), &config, cancel).await;
    close(id, page).await;
    outcome
}

/// Runs the bot against `page` until its task has finished and dropped
/// every clone of the page it was handed.
async fn drive(id: Uuid, page: Arc<KendoPage>, config: &BotConfig, cancel: CancelToken) -> Result<()> {
    let cookies = page.cookie_header().await?;
    let slot_source = HttpSlotSource::for_page(page.url(), cookies)?;

    let context = SelectionContext {
        date_picker: Arc::new(page.date_picker()),
        slot_dropdown: Arc::new(page.slot_dropdown()),
        availability: page.clone(),
        slot_source: Arc::new(slot_source),
        submitter: page.clone(),
        notifier: page,
    };

    let bot = Arc::new(SlotSelectionBot::new(context, config, cancel));
    let (mut receiver, task) = bot.start();

    while let Some(event) = receiver.recv().await {
        update(id, |status| record(status, &event)).await;
    }
    tracing::warn!("Receiver closed for session {}", id);

    task.await
        .with_context(|| format!("selection task for session {} did not finish", id))
}

async fn close(id: Uuid, page: Arc<KendoPage>) {
    match Arc::try_unwrap(page) {
        Ok(page) => {
            if let Err(e) = page.quit().await {
                tracing::error!("Failed to quit browser for session {}: {:?}", id, e);
            }
        }
        Err(_) => tracing::error!("Page for session {} is still shared, leaving browser open", id),
    }
}

async fn update<F>(id: Uuid, change: F)
where
    F: FnOnce(&mut SessionStatus),
{
    if let Some(mut status) = SESSION_CACHE.get(&id).await {
        change(&mut status);
        status.updated_at = Utc::now();
        SESSION_CACHE.insert(id, status).await;
    }
}

/// Folds one session event into the served status.
pub fn record(status: &mut SessionStatus, event: &SelectionEvent) {
    match event {
        SelectionEvent::State(state) => status.state = *state,
        SelectionEvent::DateApplied(date) => {
            status.selected_date = date.date();
            status.selected_slot = None;
            status.submitted = false;
        }
        SelectionEvent::NoDate => status.selected_date = None,
        SelectionEvent::SlotApplied { date, slot } => {
            status.selected_date = parse_date_text(date);
            status.selected_slot = Some(SelectedSlot {
                id: slot.applied_value(),
                start_time: slot.start_time.clone(),
            });
            status.submitted = false;
            status.last_error = None;
            status.redirect_url = None;
        }
        SelectionEvent::NoSlot { date } => {
            status.selected_date = parse_date_text(date);
            status.selected_slot = None;
        }
        SelectionEvent::Submitted { .. } => status.submitted = true,
        SelectionEvent::RemoteFailure {
            message,
            redirect_url,
            ..
        } => {
            status.last_error = Some(message.clone());
            status.redirect_url = redirect_url.clone();
        }
        SelectionEvent::CycleAborted(reason) => status.last_error = Some(reason.clone()),
        SelectionEvent::Failed(reason) => {
            status.state = CycleState::Failed;
            status.last_error = Some(reason.clone());
        }
        SelectionEvent::Stopped => {
            if status.state != CycleState::Failed {
                status.state = CycleState::Stopped;
            }
        }
    }
}
