//! Collaborators the selection core talks to. The browser page and the
//! booking endpoint implement these; tests use in-memory fakes.

use crate::models::candidate::{AvailDates, Slot, SlotsResponse};
use anyhow::Result;
use async_trait::async_trait;

/// A page input whose value can be read and written
#[async_trait]
pub trait Widget: Send + Sync {
    async fn is_ready(&self) -> Result<bool>;

    async fn value(&self) -> Result<Option<String>>;

    async fn set_value(&self, value: &str) -> Result<()>;
}

/// Choice widget that also owns the list of choices
#[async_trait]
pub trait SlotDropdown: Widget {
    async fn set_data_source(&self, slots: &[Slot]) -> Result<()>;

    /// Unsets the value and empties the choices
    async fn clear(&self) -> Result<()>;
}

/// Publishes the bookable dates once the page has loaded them
#[async_trait]
pub trait AvailabilitySource: Send + Sync {
    async fn available_dates(&self) -> Result<Option<AvailDates>>;
}

#[async_trait]
pub trait SlotSource: Send + Sync {
    async fn fetch_slots(&self, date: &str) -> Result<SlotsResponse>;
}

#[async_trait]
pub trait Submitter: Send + Sync {
    async fn submit(&self) -> Result<()>;
}

/// Best-effort side channel; callers swallow its failures
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn announce(&self, message: &str) -> Result<()>;
}
