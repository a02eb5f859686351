use chrono::{DateTime, Datelike, Days, Local, NaiveDate, NaiveDateTime, TimeZone, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

const DAY_KEY_FORMAT: &str = "%Y-%m-%d";

static FILENAME_DATE: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"(\d{4}-\d{2}-\d{2})").ok());

#[derive(Error, Debug, PartialEq, Eq)]
pub enum DayKeyError {
    #[error("Invalid day key '{0}' (expected YYYY-MM-DD)")]
    Malformed(String),
}

/// A local calendar day, `YYYY-MM-DD`. Lexicographic order is calendar order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DayKey(String);

impl DayKey {
    pub fn from_date(date: NaiveDate) -> Self {
        Self(format!(
            "{:04}-{:02}-{:02}",
            date.year(),
            date.month(),
            date.day()
        ))
    }

    pub fn parse(text: &str) -> Result<Self, DayKeyError> {
        let bytes = text.as_bytes();
        let shaped = bytes.len() == 10
            && bytes[4] == b'-'
            && bytes[7] == b'-'
            && bytes
                .iter()
                .enumerate()
                .all(|(i, b)| i == 4 || i == 7 || b.is_ascii_digit());
        if !shaped || NaiveDate::parse_from_str(text, DAY_KEY_FORMAT).is_err() {
            return Err(DayKeyError::Malformed(text.to_string()));
        }
        Ok(Self(text.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn to_date(&self) -> Option<NaiveDate> {
        NaiveDate::parse_from_str(&self.0, DAY_KEY_FORMAT).ok()
    }

    /// Inclusive range check on the fixed-width string form.
    pub fn is_in_range(&self, since: &DayKey, until: &DayKey) -> bool {
        self >= since && self <= until
    }
}

impl fmt::Display for DayKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for DayKey {
    type Error = DayKeyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<DayKey> for String {
    fn from(key: DayKey) -> Self {
        key.0
    }
}

/// The requested report window plus the scan window padded by a day on each
/// side, so events near midnight in another zone are not lost.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DayRange {
    pub since: DayKey,
    pub until: DayKey,
    pub scan_since: DayKey,
    pub scan_until: DayKey,
}

impl DayRange {
    pub fn new(since: NaiveDate, until: NaiveDate) -> Self {
        let scan_since = since.pred_opt().unwrap_or(since);
        let scan_until = until.succ_opt().unwrap_or(until);
        Self {
            since: DayKey::from_date(since),
            until: DayKey::from_date(until),
            scan_since: DayKey::from_date(scan_since),
            scan_until: DayKey::from_date(scan_until),
        }
    }

    pub fn contains(&self, key: &DayKey) -> bool {
        key.is_in_range(&self.since, &self.until)
    }

    pub fn scan_contains(&self, key: &DayKey) -> bool {
        key.is_in_range(&self.scan_since, &self.scan_until)
    }

    /// Every calendar day of the padded scan window, oldest first.
    pub fn scan_days(&self) -> Vec<NaiveDate> {
        let (Some(start), Some(end)) = (self.scan_since.to_date(), self.scan_until.to_date())
        else {
            return Vec::new();
        };
        start.iter_days().take_while(|d| *d <= end).collect()
    }
}

/// First day of the `days`-day window ending on `until` (`days` of 0 counts
/// as 1). None when it falls before the earliest representable date.
pub fn window_start(until: NaiveDate, days: u32) -> Option<NaiveDate> {
    until.checked_sub_days(Days::new(u64::from(days.max(1)) - 1))
}

/// Day key for a log timestamp, in the local time zone.
pub fn day_key_from_timestamp(text: &str) -> Option<DayKey> {
    let text = text.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(DayKey::from_date(dt.with_timezone(&Local).date_naive()));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            return Some(DayKey::from_date(naive.date()));
        }
    }
    text.get(..10).and_then(|prefix| DayKey::parse(prefix).ok())
}

/// Day key for an epoch-seconds timestamp, in the local time zone.
pub fn day_key_from_epoch_seconds(seconds: i64) -> Option<DayKey> {
    let utc = Utc.timestamp_opt(seconds, 0).single()?;
    Some(DayKey::from_date(utc.with_timezone(&Local).date_naive()))
}

/// The first `YYYY-MM-DD` embedded in a file name, if any.
pub fn day_key_from_filename(name: &str) -> Option<DayKey> {
    let regex = FILENAME_DATE.as_ref()?;
    let found = regex.captures(name)?.get(1)?;
    DayKey::parse(found.as_str()).ok()
}
