//! Date triplet validation (day, month, year held in separate form fields).

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

/// Literal an extraction uses for "no value" inside a triplet component.
pub const NULL_SENTINEL: &str = "null";

const MONTH_NAMES: [&str; 12] = [
    "january", "february", "march", "april", "may", "june", "july", "august", "september",
    "october", "november", "december",
];

/// Accepted age range, inclusive on both ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgeWindow {
    pub min_age: u32,
    pub max_age: u32,
}

impl Default for AgeWindow {
    fn default() -> Self {
        Self {
            min_age: 0,
            max_age: 150,
        }
    }
}

impl AgeWindow {
    pub fn contains(&self, age: u32) -> bool {
        (self.min_age..=self.max_age).contains(&age)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DateError {
    #[error("Invalid date")]
    Unparsable,

    #[error("Future date")]
    FutureDate,

    #[error("Age {age} out of range ({min}-{max})")]
    AgeOutOfRange { age: u32, min: u32, max: u32 },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DateTripletOutcome {
    /// At least one component was the null sentinel; nothing was checked.
    Skipped,
    Valid { date: NaiveDate, age: u32 },
    /// Calendar-valid date checked without any past/age constraint.
    CalendarDate { date: NaiveDate },
}

pub fn is_null_sentinel(component: &str) -> bool {
    component.trim().eq_ignore_ascii_case(NULL_SENTINEL)
}

fn parse_number(component: &str) -> Option<u32> {
    let trimmed = component.trim();
    if trimmed.is_empty() || !trimmed.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    trimmed.parse().ok()
}

/// Month as a number (`4`, `04`) or an English name / 3+ letter prefix (`April`, `Apr`).
fn parse_month(component: &str) -> Option<u32> {
    if let Some(n) = parse_number(component) {
        return Some(n);
    }
    let lower = component.trim().trim_end_matches('.').to_lowercase();
    if lower.len() < 3 {
        return None;
    }
    MONTH_NAMES
        .iter()
        .position(|name| name.starts_with(&lower))
        .map(|idx| idx as u32 + 1)
}

/// Parse a triplet into a calendar date.
///
/// `Ok(None)` when any component is the null sentinel: the triplet is
/// intentionally absent and no partial validation is attempted.
pub fn parse_date_triplet(
    day: &str,
    month: &str,
    year: &str,
) -> Result<Option<NaiveDate>, DateError> {
    if [day, month, year].iter().any(|c| is_null_sentinel(c)) {
        return Ok(None);
    }
    let (Some(d), Some(m), Some(y)) = (parse_number(day), parse_month(month), parse_number(year))
    else {
        return Err(DateError::Unparsable);
    };
    let year = i32::try_from(y).map_err(|_| DateError::Unparsable)?;
    NaiveDate::from_ymd_opt(year, m, d)
        .map(Some)
        .ok_or(DateError::Unparsable)
}

/// Completed years between `dob` and `today`.
pub fn age_on(dob: NaiveDate, today: NaiveDate) -> u32 {
    let mut years = today.year() - dob.year();
    if (today.month(), today.day()) < (dob.month(), dob.day()) {
        years -= 1;
    }
    years.max(0) as u32
}

/// Validate a day/month/year triplet as a past date whose age lies inside `window`.
pub fn validate_date_triplet(
    day: &str,
    month: &str,
    year: &str,
    window: AgeWindow,
    today: NaiveDate,
) -> Result<DateTripletOutcome, DateError> {
    let Some(date) = parse_date_triplet(day, month, year)? else {
        return Ok(DateTripletOutcome::Skipped);
    };
    if date > today {
        return Err(DateError::FutureDate);
    }
    let age = age_on(date, today);
    if !window.contains(age) {
        return Err(DateError::AgeOutOfRange {
            age,
            min: window.min_age,
            max: window.max_age,
        });
    }
    Ok(DateTripletOutcome::Valid { date, age })
}

/// Validate a triplet as a real calendar date, future dates included.
pub fn validate_calendar_triplet(
    day: &str,
    month: &str,
    year: &str,
) -> Result<DateTripletOutcome, DateError> {
    Ok(match parse_date_triplet(day, month, year)? {
        Some(date) => DateTripletOutcome::CalendarDate { date },
        None => DateTripletOutcome::Skipped,
    })
}

/// Today's date in local time.
pub fn today() -> NaiveDate {
    chrono::Local::now().date_naive()
}
