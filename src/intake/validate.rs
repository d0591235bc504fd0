//! Pure validators for tool-call arguments
//!
//! Every validator is `raw arguments -> Result<parsed, Rejection>` with no
//! side effects; the transition layer decides what a rejection does to the
//! session.

use chrono::{Datelike, Months, NaiveDate};
use thiserror::Error;

use super::state::AppointmentSlot;

/// Why an invocation was refused
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    /// Arguments were malformed (wrong date/time format, wrong shape).
    #[error("could not parse arguments: {0}")]
    Parse(String),
    /// Birthday was well-formed but matched no record.
    #[error("no record found for the given birthday")]
    IdentityNotFound,
    /// Birthday was well-formed but the user is under 18.
    #[error("user is under 18")]
    UnderAge,
    /// Day/hour were well-formed but the slot is not bookable.
    #[error("requested appointment slot is not available")]
    UnavailableSlot,
}

const ADULT_AGE_YEARS: u32 = 18;

/// Slots bookable even outside the general window.
const NAMED_SLOTS: [AppointmentSlot; 2] = [
    AppointmentSlot { month: 7, day: 22, hour: 12, minute: 0 },
    AppointmentSlot { month: 7, day: 23, hour: 15, minute: 0 },
];

/// General booking window, in minutes from midnight (09:00..=19:00).
const WINDOW_START_MIN: u32 = 540;
const WINDOW_END_MIN: u32 = 1140;

/// First day of the open booking range (same-year July 24).
const OPEN_RANGE_MONTH: u32 = 7;
const OPEN_RANGE_DAY: u32 = 24;

/// Validate a birthday given as `YYYY-MM-DD`.
///
/// Two domain rules run in fixed order and the first failure wins:
/// 1. record lookup: `(year + month + day) % 3 == 0` means "no record".
///    This is a deliberate stand-in for a real patient-index query,
///    preserved for behavioral parity with the system it replaces.
/// 2. age: a birthday after `today - 18 years` means the user is a minor.
pub fn verify_birthday(raw: &str, today: NaiveDate) -> Result<NaiveDate, Rejection> {
    let birthday = NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|e| Rejection::Parse(format!("birthday {raw:?}: {e}")))?;

    let field_sum = birthday.year() + birthday.month() as i32 + birthday.day() as i32;
    if field_sum % 3 == 0 {
        return Err(Rejection::IdentityNotFound);
    }

    // checked_sub_months clamps Feb 29 to Feb 28 on non-leap cutoff years.
    let cutoff = today
        .checked_sub_months(Months::new(ADULT_AGE_YEARS * 12))
        .unwrap_or(NaiveDate::MIN);
    if birthday > cutoff {
        return Err(Rejection::UnderAge);
    }

    Ok(birthday)
}

/// Validate an appointment given as `MM-DD` and `HH:MM` (24-hour).
///
/// A slot is bookable iff it is one of the named slots exactly, or its
/// time-of-day falls inside the general window AND its date is on/after
/// the open range start.
pub fn verify_appointment(day_raw: &str, hour_raw: &str) -> Result<AppointmentSlot, Rejection> {
    let (month, day) = split_pair(day_raw, '-')
        .ok_or_else(|| Rejection::Parse(format!("appointment_day {day_raw:?}: expected MM-DD")))?;
    let (hour, minute) = split_pair(hour_raw, ':').ok_or_else(|| {
        Rejection::Parse(format!("appointment_hour {hour_raw:?}: expected HH:MM"))
    })?;

    let slot = AppointmentSlot { month, day, hour, minute };
    if slot_is_available(slot) {
        Ok(slot)
    } else {
        Err(Rejection::UnavailableSlot)
    }
}

fn slot_is_available(slot: AppointmentSlot) -> bool {
    if NAMED_SLOTS.contains(&slot) {
        return true;
    }
    if !(WINDOW_START_MIN..=WINDOW_END_MIN).contains(&slot.minute_of_day()) {
        return false;
    }
    slot.month > OPEN_RANGE_MONTH || (slot.month == OPEN_RANGE_MONTH && slot.day >= OPEN_RANGE_DAY)
}

fn split_pair(raw: &str, separator: char) -> Option<(u32, u32)> {
    let (first, second) = raw.trim().split_once(separator)?;
    Some((first.parse().ok()?, second.parse().ok()?))
}
