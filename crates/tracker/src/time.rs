//! Conversion of the feed's GMT timestamps into local civil time.
//!
//! The offset follows the US Eastern rule computed per calendar year
//! (second Sunday of March to first Sunday of November, both at 02:00 local)
//! instead of a timezone database lookup.

use std::fmt;

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, Weekday};

use crate::error::{Result, TrackerError};

/// In-memory civil timestamp layout (`MM/DD/YYYY HH:MM:SS`).
pub const CIVIL_TIME_FORMAT: &str = "%m/%d/%Y %H:%M:%S";

/// Layout of the feed's `startTime` field, e.g. `Sun, 10 Mar 2024 06:59:59 GMT`.
const REMOTE_TIME_FORMAT: &str = "%a, %d %b %Y %H:%M:%S";

const STANDARD_OFFSET_HOURS: i64 = 5;
const DAYLIGHT_OFFSET_HOURS: i64 = 4;

/// A timezone-free local timestamp with second precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CivilTime(NaiveDateTime);

impl CivilTime {
    pub fn new(inner: NaiveDateTime) -> Self {
        Self(inner)
    }

    pub fn parse(text: &str) -> Result<Self> {
        NaiveDateTime::parse_from_str(text.trim(), CIVIL_TIME_FORMAT)
            .map(Self)
            .map_err(|e| TrackerError::Timestamp(format!("'{}': {}", text, e)))
    }

    pub fn naive(&self) -> NaiveDateTime {
        self.0
    }
}

impl fmt::Display for CivilTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format(CIVIL_TIME_FORMAT))
    }
}

impl From<CivilTime> for NaiveDateTime {
    fn from(value: CivilTime) -> Self {
        value.0
    }
}

/// Parses a remote GMT timestamp and shifts it to local civil time.
pub fn normalize(remote: &str) -> Result<CivilTime> {
    let utc = parse_remote(remote)?;
    let offset = if is_dst(utc) {
        DAYLIGHT_OFFSET_HOURS
    } else {
        STANDARD_OFFSET_HOURS
    };
    Ok(CivilTime(utc - Duration::hours(offset)))
}

/// Whether a UTC instant falls inside the daylight-saving window of its year.
///
/// The window starts at 02:00 standard time (07:00 UTC) on the second Sunday
/// of March and ends at 02:00 daylight time (06:00 UTC) on the first Sunday of
/// November.
pub fn is_dst(utc: NaiveDateTime) -> bool {
    let year = utc.year();
    let (Some(march), Some(november)) = (
        nth_sunday(year, 3, 2),
        nth_sunday(year, 11, 1),
    ) else {
        return false;
    };

    let start = march.and_hms_opt(2 + STANDARD_OFFSET_HOURS as u32, 0, 0);
    let end = november.and_hms_opt(2 + DAYLIGHT_OFFSET_HOURS as u32, 0, 0);
    match (start, end) {
        (Some(start), Some(end)) => start <= utc && utc < end,
        _ => false,
    }
}

fn parse_remote(remote: &str) -> Result<NaiveDateTime> {
    let trimmed = remote.trim();
    let body = trimmed
        .strip_suffix("GMT")
        .or_else(|| trimmed.strip_suffix("UTC"))
        .ok_or_else(|| {
            TrackerError::Timestamp(format!("'{}': expected a GMT timestamp", remote))
        })?;

    NaiveDateTime::parse_from_str(body.trim_end(), REMOTE_TIME_FORMAT)
        .map_err(|e| TrackerError::Timestamp(format!("'{}': {}", remote, e)))
}

fn nth_sunday(year: i32, month: u32, n: u8) -> Option<NaiveDate> {
    NaiveDate::from_weekday_of_month_opt(year, month, Weekday::Sun, n)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_time_offset() {
        let civil = normalize("Mon, 15 Jan 2024 12:00:00 GMT").unwrap();
        assert_eq!(civil.to_string(), "01/15/2024 07:00:00");
    }

    #[test]
    fn test_daylight_time_offset() {
        let civil = normalize("Mon, 15 Jul 2024 12:00:00 GMT").unwrap();
        assert_eq!(civil.to_string(), "07/15/2024 08:00:00");
    }

    #[test]
    fn test_march_boundary() {
        // Second Sunday of March 2024 is the 10th.
        let before = normalize("Sun, 10 Mar 2024 06:59:59 GMT").unwrap();
        assert_eq!(before.to_string(), "03/10/2024 01:59:59");

        let after = normalize("Sun, 10 Mar 2024 07:00:01 GMT").unwrap();
        assert_eq!(after.to_string(), "03/10/2024 03:00:01");
    }

    #[test]
    fn test_november_boundary() {
        // First Sunday of November 2024 is the 3rd.
        let before = normalize("Sun, 03 Nov 2024 05:59:59 GMT").unwrap();
        assert_eq!(before.to_string(), "11/03/2024 01:59:59");

        let after = normalize("Sun, 03 Nov 2024 06:00:00 GMT").unwrap();
        assert_eq!(after.to_string(), "11/03/2024 01:00:00");
    }

    #[test]
    fn test_rule_is_computed_per_year() {
        // 2023: March 12 / November 5.
        let start = NaiveDate::from_ymd_opt(2023, 3, 12).unwrap();
        assert!(!is_dst(start.and_hms_opt(6, 59, 59).unwrap()));
        assert!(is_dst(start.and_hms_opt(7, 0, 0).unwrap()));

        let end = NaiveDate::from_ymd_opt(2023, 11, 5).unwrap();
        assert!(is_dst(end.and_hms_opt(5, 59, 59).unwrap()));
        assert!(!is_dst(end.and_hms_opt(6, 0, 0).unwrap()));
    }

    #[test]
    fn test_normalize_is_deterministic() {
        let text = "Fri, 01 Mar 2024 23:30:00 GMT";
        assert_eq!(normalize(text).unwrap(), normalize(text).unwrap());
    }

    #[test]
    fn test_civil_round_trip() {
        let civil = normalize("Mon, 15 Jan 2024 12:00:00 GMT").unwrap();
        assert_eq!(CivilTime::parse(&civil.to_string()).unwrap(), civil);
    }

    #[test]
    fn test_malformed_input() {
        assert!(matches!(
            normalize("2024-03-10T06:59:59Z"),
            Err(TrackerError::Timestamp(_))
        ));
        assert!(normalize("Sun, 32 Mar 2024 06:59:59 GMT").is_err());
        assert!(normalize("").is_err());
    }
}
