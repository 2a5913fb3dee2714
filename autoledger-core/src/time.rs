//! Time utilities: local wall-clock "now" and the timestamp formats we persist.
//!
//! All scheduling happens on naive local timestamps. The only place a time
//! zone matters is when a caller turns the current instant into local time.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;

use crate::error::{Error, Result};

/// Sortable text form used for `previous_occurrence` in the store.
pub const STORAGE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Compact iCalendar form used in DTSTART / UNTIL.
pub const ICAL_FORMAT: &str = "%Y%m%dT%H%M%S";

/// Current local time in an IANA time zone like "America/Chicago".
pub fn now_in(tz: &str) -> Result<NaiveDateTime> {
    let tz: Tz = tz
        .parse()
        .map_err(|_| Error::InvalidTime(format!("invalid timezone: {tz}")))?;
    Ok(tz.from_utc_datetime(&Utc::now().naive_utc()).naive_local())
}

pub fn midnight(date: NaiveDate) -> NaiveDateTime {
    date.and_time(NaiveTime::MIN)
}

/// Parse an operator-entered date or datetime.
///
/// Accepts `YYYY-MM-DD`, `YYYY-MM-DD HH:MM`, `YYYY-MM-DDTHH:MM:SS` and the
/// compact iCalendar forms `YYYYMMDD` / `YYYYMMDDTHHMMSS`. Date-only input
/// means midnight.
pub fn parse_local(raw: &str) -> Result<NaiveDateTime> {
    let raw = raw.trim();
    const DATETIME_FORMATS: [&str; 4] = [
        "%Y-%m-%d %H:%M",
        "%Y-%m-%d %H:%M:%S",
        STORAGE_FORMAT,
        ICAL_FORMAT,
    ];

    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Ok(dt);
        }
    }
    for fmt in ["%Y-%m-%d", "%Y%m%d"] {
        if let Ok(d) = NaiveDate::parse_from_str(raw, fmt) {
            return Ok(midnight(d));
        }
    }

    Err(Error::InvalidTime(format!("unrecognized date/time '{raw}'")))
}

pub fn to_storage(dt: NaiveDateTime) -> String {
    dt.format(STORAGE_FORMAT).to_string()
}

pub fn from_storage(raw: &str) -> Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(raw, STORAGE_FORMAT)
        .map_err(|e| Error::InvalidTime(format!("'{raw}': {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dt(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, min, 0)
            .unwrap()
    }

    #[test]
    fn parses_operator_formats() {
        assert_eq!(parse_local("2024-01-08").unwrap(), dt(2024, 1, 8, 0, 0));
        assert_eq!(parse_local("2024-01-08 13:45").unwrap(), dt(2024, 1, 8, 13, 45));
        assert_eq!(parse_local("20240108T134500").unwrap(), dt(2024, 1, 8, 13, 45));
        assert_eq!(parse_local("20240108").unwrap(), dt(2024, 1, 8, 0, 0));
        assert!(parse_local("Jan 8").is_err());
    }

    #[test]
    fn storage_round_trips() {
        let t = dt(2024, 3, 1, 0, 0);
        assert_eq!(to_storage(t), "2024-03-01T00:00:00");
        assert_eq!(from_storage(&to_storage(t)).unwrap(), t);
    }

    #[test]
    fn rejects_unknown_timezone() {
        assert!(now_in("Mars/Olympus").is_err());
        assert!(now_in("America/Chicago").is_ok());
    }
}
