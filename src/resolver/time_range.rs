use super::error::ResolveError;
use chrono::{DateTime, Duration, Months, NaiveDate, NaiveDateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

static RELATIVE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^now(?:\s*-\s*(\d+)\s*([smhdwMy]))?$").expect("valid relative time regex")
});

const DATETIME_FORMATS: [&str; 3] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
];

/// The pair of raw picker values (relative like `now-15m` or absolute).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatePickerValue {
    pub start: String,
    pub end: String,
}

impl DatePickerValue {
    pub fn new(start: impl Into<String>, end: impl Into<String>) -> Self {
        Self {
            start: start.into(),
            end: end.into(),
        }
    }
}

/// Picker values together with the epoch-millisecond bounds they produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TimeRange {
    pub start: i64,
    pub end: i64,
    pub picker: DatePickerValue,
}

impl TimeRange {
    pub fn from_picker(picker: DatePickerValue, now: DateTime<Utc>) -> Result<Self, ResolveError> {
        let start = to_timestamp(&picker.start, now)?;
        let end = to_timestamp(&picker.end, now)?;
        Ok(Self { start, end, picker })
    }

    /// `now-<minutes>m` .. `now`; cannot fail.
    pub fn last_minutes(minutes: i64, now: DateTime<Utc>) -> Self {
        let end = now.timestamp_millis();
        Self {
            start: end - minutes * 60_000,
            end,
            picker: DatePickerValue::new(format!("now-{minutes}m"), "now"),
        }
    }
}

/// Convert a picker value to epoch milliseconds.
///
/// Accepts `now`, `now-<n><unit>` (units `s m h d w M y`), epoch seconds (up
/// to 10 digits) or milliseconds, RFC 3339, and `YYYY-MM-DD[ HH:MM:SS]` read as
/// UTC.
pub fn to_timestamp(raw: &str, now: DateTime<Utc>) -> Result<i64, ResolveError> {
    let value = raw.trim();
    if value.is_empty() {
        return Err(ResolveError::InvalidTime(raw.to_string()));
    }

    if let Some(caps) = RELATIVE_RE.captures(value) {
        let (Some(amount), Some(unit)) = (caps.get(1), caps.get(2)) else {
            return Ok(now.timestamp_millis());
        };
        let amount: i64 = amount
            .as_str()
            .parse()
            .map_err(|_| ResolveError::TimeOutOfRange(raw.to_string()))?;
        return shift_back(now, amount, unit.as_str())
            .map(|at| at.timestamp_millis())
            .ok_or_else(|| ResolveError::TimeOutOfRange(raw.to_string()));
    }

    if value.bytes().all(|b| b.is_ascii_digit()) {
        let number: i64 = value
            .parse()
            .map_err(|_| ResolveError::TimeOutOfRange(raw.to_string()))?;
        return if value.len() <= 10 {
            number
                .checked_mul(1000)
                .ok_or_else(|| ResolveError::TimeOutOfRange(raw.to_string()))
        } else {
            Ok(number)
        };
    }

    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Ok(parsed.timestamp_millis());
    }

    for format in DATETIME_FORMATS {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(value, format) {
            return Ok(parsed.and_utc().timestamp_millis());
        }
    }

    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d")
        && let Some(midnight) = date.and_hms_opt(0, 0, 0)
    {
        return Ok(midnight.and_utc().timestamp_millis());
    }

    Err(ResolveError::InvalidTime(raw.to_string()))
}

fn shift_back(now: DateTime<Utc>, amount: i64, unit: &str) -> Option<DateTime<Utc>> {
    let duration = match unit {
        "s" => Duration::try_seconds(amount),
        "m" => Duration::try_minutes(amount),
        "h" => Duration::try_hours(amount),
        "d" => Duration::try_days(amount),
        "w" => Duration::try_weeks(amount),
        "M" | "y" => {
            let months = if unit == "y" { amount.checked_mul(12)? } else { amount };
            return now.checked_sub_months(Months::new(u32::try_from(months).ok()?));
        }
        _ => None,
    }?;
    now.checked_sub_signed(duration)
}
