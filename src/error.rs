use thiserror::Error;

/// Ways a selection cycle can end short of an applied selection
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SelectionError {
    /// The watched resource is not there yet, keep watching
    #[error("resource not ready yet")]
    NotReadyYet,

    /// Nothing survived the candidate filter
    #[error("no selectable {0} found")]
    EmptySelection(&'static str),

    /// The slot fetch failed or the page answered `success=false`
    #[error("remote failure: {message}")]
    RemoteFailure {
        message: String,
        redirect_url: Option<String>,
    },

    #[error("notification failed: {0}")]
    NotificationFailure(String),

    /// A readiness condition itself failed; watching stops
    #[error("watch failed: {0}")]
    WatchFailed(String),
}

impl SelectionError {
    /// Only remote failures are shown to the user; everything else ends the
    /// cycle quietly.
    pub fn is_user_visible(&self) -> bool {
        matches!(self, SelectionError::RemoteFailure { .. })
    }
}
