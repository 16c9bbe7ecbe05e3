//! Picking the "last" candidate out of a freshly observed candidate set.

use crate::models::candidate::{AppointmentDate, Slot};
use std::str::FromStr;
use tracing::warn;

/// Returns the candidate with the greatest key among those passing `predicate`.
///
/// Single pass; a later candidate only replaces the running maximum when its
/// key is strictly greater, so the first one seen wins ties.
pub fn select_max<T, K, P, F>(items: &[T], predicate: P, key_of: F) -> Option<&T>
where
    K: Ord,
    P: Fn(&T) -> bool,
    F: Fn(&T) -> K,
{
    let mut best: Option<(&T, K)> = None;

    for item in items.iter().filter(|item| predicate(*item)) {
        let key = key_of(item);
        let replace = match &best {
            Some((_, best_key)) => key > *best_key,
            None => true,
        };
        if replace {
            best = Some((item, key));
        }
    }

    best.map(|(item, _)| item)
}

/// How slot start times are compared
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimeOrdering {
    /// Case-insensitive string compare, as the booking page's own script does.
    /// "9:00 am" sorts after "10:00 am". Compares bytes after lowercasing, which
    /// matches the page's `localeCompare` for ASCII times only.
    Lexical,
    /// Compare as a time of day
    #[default]
    Numeric,
}

impl FromStr for TimeOrdering {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "lexical" => Ok(TimeOrdering::Lexical),
            "numeric" => Ok(TimeOrdering::Numeric),
            other => Err(anyhow::anyhow!("unknown time ordering '{}'", other)),
        }
    }
}

/// Latest bookable date, in calendar order.
pub fn last_date(dates: &[AppointmentDate]) -> Option<&AppointmentDate> {
    select_max(
        dates,
        |date| date.is_bookable() && date.date().is_some(),
        |date| date.date(),
    )
}

/// Latest slot with free places under the given ordering.
pub fn last_slot(slots: &[Slot], ordering: TimeOrdering) -> Option<&Slot> {
    match ordering {
        TimeOrdering::Lexical => select_max(slots, Slot::is_available, |slot| {
            slot.start_time.to_lowercase()
        }),
        TimeOrdering::Numeric => select_max(
            slots,
            |slot| {
                if !slot.is_available() {
                    return false;
                }
                let parsed = slot.start_time_of_day().is_some();
                if !parsed {
                    warn!("Skipping slot with unreadable start time {:?}", slot.start_time);
                }
                parsed
            },
            Slot::start_time_of_day,
        ),
    }
}
