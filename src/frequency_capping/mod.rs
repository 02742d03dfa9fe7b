//! Rolling-window counters over event timestamps, plus the exclusion and permission
//! rules built on them.
//!
//! An event is inside a window when its age is strictly less than the window and it is
//! not in the future. A `None` window is unbounded.

pub mod exclusion_rules;
pub mod permission_rules;

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};

pub(crate) fn to_time_delta(duration: Duration) -> TimeDelta {
    TimeDelta::from_std(duration).unwrap_or(TimeDelta::MAX)
}

fn is_within(timestamp: DateTime<Utc>, now: DateTime<Utc>, window: Option<Duration>) -> bool {
    if timestamp > now {
        return false;
    }
    match window {
        None => true,
        Some(window) => match now.checked_sub_signed(to_time_delta(window)) {
            Some(start) => timestamp > start,
            None => true,
        },
    }
}

/// Number of `history` timestamps inside `window` ending at `now`.
pub fn occurrences_within(
    history: &[DateTime<Utc>],
    now: DateTime<Utc>,
    window: Option<Duration>,
) -> usize {
    history
        .iter()
        .filter(|timestamp| is_within(**timestamp, now, window))
        .count()
}

/// `true` when fewer than `cap` timestamps fall inside `window`. A cap of zero is never
/// respected.
pub fn respects_cap(
    history: &[DateTime<Utc>],
    now: DateTime<Utc>,
    window: Option<Duration>,
    cap: u32,
) -> bool {
    if cap == 0 {
        return false;
    }
    occurrences_within(history, now, window) < cap as usize
}
