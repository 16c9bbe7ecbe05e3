use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Where a selection session currently is within its cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleState {
    Idle,
    Watching,
    Evaluating,
    Applied,
    Submitted,
    Failed,
    Stopped,
}

#[derive(Debug, Clone, Serialize)]
pub struct SelectedSlot {
    pub id: String,
    pub start_time: String,
}

/// Latest known status of one selection session, as served over HTTP
#[derive(Debug, Clone, Serialize)]
pub struct SessionStatus {
    pub id: Uuid,
    pub url: String,
    pub state: CycleState,
    pub selected_date: Option<NaiveDate>,
    pub selected_slot: Option<SelectedSlot>,
    pub submitted: bool,
    pub last_error: Option<String>,
    pub redirect_url: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl SessionStatus {
    pub fn new(id: Uuid, url: String) -> Self {
        SessionStatus {
            id,
            url,
            state: CycleState::Idle,
            selected_date: None,
            selected_slot: None,
            submitted: false,
            last_error: None,
            redirect_url: None,
            updated_at: Utc::now(),
        }
    }
}
