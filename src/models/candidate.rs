use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Date formats the page has been seen to publish in `DateText`
const DATE_FORMATS: [&str; 2] = ["%Y-%m-%d", "%m/%d/%Y"];

/// Start-time formats accepted by numeric time ordering
const TIME_FORMATS: [&str; 5] = ["%I:%M %p", "%I:%M%p", "%H:%M", "%H:%M:%S", "%I:%M:%S %p"];

/// Reads a date the way the page writes it into its date picker
pub fn parse_date_text(text: &str) -> Option<NaiveDate> {
    let text = text.trim();
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(text, fmt).ok())
}

/// Anything that can be written into a page widget once selected.
pub trait Selectable {
    /// The value handed to the widget's `value(...)` setter
    fn applied_value(&self) -> String;
}

/// One entry of the page's `availDates.ad` array
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AppointmentDate {
    pub date_text: String,
    #[serde(default)]
    pub appointment_date_type: i32,
}

impl AppointmentDate {
    /// Only dates of type 0 are bookable; the other types are holidays,
    /// off days and fully booked days.
    pub fn is_bookable(&self) -> bool {
        self.appointment_date_type == 0
    }

    pub fn date(&self) -> Option<NaiveDate> {
        parse_date_text(&self.date_text)
    }
}

impl Selectable for AppointmentDate {
    fn applied_value(&self) -> String {
        self.date_text.clone()
    }
}

/// `window.availDates` as published by the slot selection page
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AvailDates {
    #[serde(default)]
    pub ad: Vec<AppointmentDate>,
}

/// One time slot returned by `GetAvailableSlotsByDate`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Slot {
    #[serde(default)]
    pub id: Value,
    #[serde(default)]
    pub count: u32,
    pub start_time: String,
}

impl Slot {
    pub fn is_available(&self) -> bool {
        self.count > 0
    }

    /// Start time as a time of day, `None` when the text matches no known format.
    pub fn start_time_of_day(&self) -> Option<NaiveTime> {
        let text = self.start_time.trim().to_uppercase();
        TIME_FORMATS
            .iter()
            .find_map(|fmt| NaiveTime::parse_from_str(&text, fmt).ok())
    }
}

impl Selectable for Slot {
    fn applied_value(&self) -> String {
        match &self.id {
            Value::String(id) => id.clone(),
            other => other.to_string(),
        }
    }
}

/// Body of the `GetAvailableSlotsByDate` response
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SlotsResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub data: Vec<Slot>,
    #[serde(default)]
    pub err: Option<String>,
    /// redirect url the page asks the user to follow on failure
    #[serde(default)]
    pub ru: Option<String>,
}
