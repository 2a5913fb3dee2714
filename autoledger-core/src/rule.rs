//! Calendar recurrence rules (iCalendar RRULE vocabulary).
//!
//! Two types:
//! - [`RuleDescription`]: what a caller handed us, loosely parsed. Any field
//!   may be missing.
//! - [`RecurrenceRule`]: the canonical, validated value the store persists and
//!   the occurrence calculator evaluates. Always has a start, a frequency, and
//!   a time-of-day pinned to midnight.
//!
//! `normalize` maps the first to the second and is a fixed point:
//! normalizing a rule's own description yields the identical rule.

use std::fmt;
use std::str::FromStr;

use chrono::{Local, NaiveDateTime, Weekday};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::time::{parse_local, ICAL_FORMAT};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

impl Frequency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Frequency::Daily => "DAILY",
            Frequency::Weekly => "WEEKLY",
            Frequency::Monthly => "MONTHLY",
            Frequency::Yearly => "YEARLY",
        }
    }
}

impl FromStr for Frequency {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "DAILY" => Ok(Frequency::Daily),
            "WEEKLY" => Ok(Frequency::Weekly),
            "MONTHLY" => Ok(Frequency::Monthly),
            "YEARLY" => Ok(Frequency::Yearly),
            "HOURLY" | "MINUTELY" | "SECONDLY" => Err(Error::invalid_rule(format!(
                "sub-daily frequency {s} is not supported; occurrences are pinned to midnight"
            ))),
            other => Err(Error::invalid_rule(format!("unknown FREQ '{other}'"))),
        }
    }
}

/// One `BYDAY` entry: a weekday, optionally with an ordinal (`1MO`, `-1FR`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WeekdaySpec {
    pub weekday: Weekday,
    pub ordinal: Option<i32>,
}

impl WeekdaySpec {
    pub fn every(weekday: Weekday) -> Self {
        Self {
            weekday,
            ordinal: None,
        }
    }

    pub fn nth(ordinal: i32, weekday: Weekday) -> Self {
        Self {
            weekday,
            ordinal: Some(ordinal),
        }
    }

    fn sort_key(&self) -> (i32, u32) {
        (self.ordinal.unwrap_or(0), self.weekday.num_days_from_monday())
    }
}

impl fmt::Display for WeekdaySpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(n) = self.ordinal {
            write!(f, "{n}")?;
        }
        f.write_str(weekday_code(self.weekday))
    }
}

impl FromStr for WeekdaySpec {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim().to_ascii_uppercase();
        if s.len() < 2 || !s.is_char_boundary(s.len() - 2) {
            return Err(Error::invalid_rule(format!("invalid BYDAY entry '{s}'")));
        }
        let (prefix, code) = s.split_at(s.len() - 2);
        let weekday = match code {
            "MO" => Weekday::Mon,
            "TU" => Weekday::Tue,
            "WE" => Weekday::Wed,
            "TH" => Weekday::Thu,
            "FR" => Weekday::Fri,
            "SA" => Weekday::Sat,
            "SU" => Weekday::Sun,
            _ => return Err(Error::invalid_rule(format!("invalid weekday in BYDAY '{s}'"))),
        };
        let ordinal = if prefix.is_empty() {
            None
        } else {
            let n: i32 = prefix
                .trim_start_matches('+')
                .parse()
                .map_err(|_| Error::invalid_rule(format!("invalid BYDAY ordinal '{s}'")))?;
            Some(n)
        };
        Ok(Self { weekday, ordinal })
    }
}

fn weekday_code(w: Weekday) -> &'static str {
    match w {
        Weekday::Mon => "MO",
        Weekday::Tue => "TU",
        Weekday::Wed => "WE",
        Weekday::Thu => "TH",
        Weekday::Fri => "FR",
        Weekday::Sat => "SA",
        Weekday::Sun => "SU",
    }
}

/// How a rule ends, if it ends at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    Count(u32),
    /// Inclusive upper bound.
    Until(NaiveDateTime),
}

/// A recurrence as supplied by a caller, before normalization.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleDescription {
    pub start: Option<NaiveDateTime>,
    pub frequency: Option<Frequency>,
    pub interval: Option<u32>,
    pub count: Option<u32>,
    pub until: Option<NaiveDateTime>,
    pub by_month: Vec<u32>,
    pub by_month_day: Vec<i32>,
    pub by_weekday: Vec<WeekdaySpec>,
    pub by_hour: Vec<u32>,
    pub by_minute: Vec<u32>,
    pub by_second: Vec<u32>,
}

impl RuleDescription {
    /// Parse `DTSTART:...` and/or `RRULE:...` lines (or a bare `FREQ=...`).
    pub fn parse(text: &str) -> Result<Self> {
        let mut desc = RuleDescription::default();
        let mut saw_rule = false;

        for token in text.split_whitespace() {
            let upper = token.to_ascii_uppercase();
            if upper.starts_with("DTSTART") {
                // DTSTART;TZID=...:20240101T000000 -> value after the last ':'
                let value = upper
                    .rsplit_once(':')
                    .map(|(_, v)| v)
                    .ok_or_else(|| Error::invalid_rule(format!("malformed DTSTART '{token}'")))?;
                desc.start = Some(parse_ical_time(value)?);
            } else if let Some(rule) = upper.strip_prefix("RRULE:") {
                desc.apply_rule_parts(rule)?;
                saw_rule = true;
            } else if upper.starts_with("FREQ=") || upper.contains(";FREQ=") {
                desc.apply_rule_parts(&upper)?;
                saw_rule = true;
            } else {
                return Err(Error::invalid_rule(format!("unrecognized recurrence token '{token}'")));
            }
        }

        if !saw_rule && desc.start.is_none() {
            return Err(Error::invalid_rule("empty recurrence description"));
        }
        Ok(desc)
    }

    /// Fixed-interval shorthand: `7d`, `2w`, `1m`, `1y` (or `daily`, `weekly`, ...).
    pub fn every(expr: &str) -> Result<Self> {
        let expr = expr.trim().to_ascii_lowercase();
        let named = match expr.as_str() {
            "daily" => Some(Frequency::Daily),
            "weekly" => Some(Frequency::Weekly),
            "monthly" => Some(Frequency::Monthly),
            "yearly" | "annually" => Some(Frequency::Yearly),
            _ => None,
        };
        if let Some(frequency) = named {
            return Ok(Self {
                frequency: Some(frequency),
                ..Default::default()
            });
        }

        let split = expr
            .find(|c: char| !c.is_ascii_digit())
            .ok_or_else(|| Error::invalid_rule(format!("interval '{expr}' has no unit (d/w/m/y)")))?;
        let (n, unit) = expr.split_at(split);
        let n: u32 = n
            .parse()
            .map_err(|_| Error::invalid_rule(format!("invalid interval '{expr}'")))?;
        let frequency = match unit {
            "d" | "day" | "days" => Frequency::Daily,
            "w" | "week" | "weeks" => Frequency::Weekly,
            "m" | "month" | "months" => Frequency::Monthly,
            "y" | "year" | "years" => Frequency::Yearly,
            other => return Err(Error::invalid_rule(format!("unknown interval unit '{other}'"))),
        };
        Ok(Self {
            frequency: Some(frequency),
            interval: Some(n),
            ..Default::default()
        })
    }

    pub fn starting(mut self, start: NaiveDateTime) -> Self {
        self.start = Some(start);
        self
    }

    pub fn until(mut self, until: NaiveDateTime) -> Self {
        self.until = Some(until);
        self
    }

    pub fn count(mut self, count: u32) -> Self {
        self.count = Some(count);
        self
    }

    fn apply_rule_parts(&mut self, rule: &str) -> Result<()> {
        for part in rule.split(';').filter(|p| !p.is_empty()) {
            let (key, value) = part
                .split_once('=')
                .ok_or_else(|| Error::invalid_rule(format!("malformed rule part '{part}'")))?;
            match key {
                "FREQ" => self.frequency = Some(value.parse()?),
                "INTERVAL" => self.interval = Some(parse_number(key, value)?),
                "COUNT" => self.count = Some(parse_number(key, value)?),
                "UNTIL" => self.until = Some(parse_ical_time(value)?),
                "BYMONTH" => self.by_month = parse_list(key, value)?,
                "BYMONTHDAY" => self.by_month_day = parse_list(key, value)?,
                "BYDAY" => {
                    self.by_weekday = value
                        .split(',')
                        .map(WeekdaySpec::from_str)
                        .collect::<Result<_>>()?
                }
                "BYHOUR" => self.by_hour = parse_list(key, value)?,
                "BYMINUTE" => self.by_minute = parse_list(key, value)?,
                "BYSECOND" => self.by_second = parse_list(key, value)?,
                // Weeks always start on Monday here.
                "WKST" => {}
                other => {
                    return Err(Error::invalid_rule(format!("unsupported rule part '{other}'")));
                }
            }
        }
        Ok(())
    }
}

impl FromStr for RuleDescription {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

fn parse_number<T: FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| Error::invalid_rule(format!("invalid {key} value '{value}'")))
}

fn parse_list<T: FromStr>(key: &str, value: &str) -> Result<Vec<T>> {
    value
        .split(',')
        .map(|v| parse_number(key, v.trim_start_matches('+')))
        .collect()
}

fn parse_ical_time(value: &str) -> Result<NaiveDateTime> {
    let value = value.trim().trim_end_matches('Z');
    parse_local(value).map_err(|_| Error::invalid_rule(format!("invalid date/time '{value}'")))
}

/// Canonical, validated recurrence. Occurrences always fall at 00:00:00.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecurrenceRule {
    start: NaiveDateTime,
    frequency: Frequency,
    interval: u32,
    termination: Option<Termination>,
    by_month: Vec<u32>,
    by_month_day: Vec<i32>,
    by_weekday: Vec<WeekdaySpec>,
}

impl RecurrenceRule {
    /// Normalize a description into a canonical rule.
    ///
    /// A missing start becomes `default_anchor`, or the current local time when
    /// no anchor is given. Time-of-day selectors are discarded and pinned to
    /// midnight. Fails with `InvalidRule` for anything that does not recur.
    pub fn normalize(desc: &RuleDescription, default_anchor: Option<NaiveDateTime>) -> Result<Self> {
        let frequency = desc.frequency.ok_or_else(|| {
            Error::invalid_rule("description has no FREQ; it does not describe a recurring event")
        })?;

        let start = desc
            .start
            .or(default_anchor)
            .unwrap_or_else(|| Local::now().naive_local());

        let interval = desc.interval.unwrap_or(1);
        if interval == 0 {
            return Err(Error::invalid_rule("INTERVAL must be at least 1"));
        }

        let termination = match (desc.count, desc.until) {
            (Some(_), Some(_)) => {
                return Err(Error::invalid_rule("COUNT and UNTIL are mutually exclusive"));
            }
            (Some(0), None) => return Err(Error::invalid_rule("COUNT must be at least 1")),
            (Some(n), None) => Some(Termination::Count(n)),
            (None, Some(until)) => Some(Termination::Until(until)),
            (None, None) => None,
        };

        let mut by_month = desc.by_month.clone();
        if let Some(m) = by_month.iter().find(|m| !(1..=12).contains(*m)) {
            return Err(Error::invalid_rule(format!("BYMONTH {m} out of range")));
        }
        by_month.sort_unstable();
        by_month.dedup();

        let mut by_month_day = desc.by_month_day.clone();
        if let Some(d) = by_month_day.iter().find(|d| **d == 0 || !(-31..=31).contains(*d)) {
            return Err(Error::invalid_rule(format!("BYMONTHDAY {d} out of range")));
        }
        by_month_day.sort_unstable();
        by_month_day.dedup();

        let mut by_weekday = desc.by_weekday.clone();
        for spec in &by_weekday {
            let Some(n) = spec.ordinal else { continue };
            let limit = match frequency {
                Frequency::Monthly => 5,
                Frequency::Yearly if !by_month.is_empty() => 5,
                Frequency::Yearly => 53,
                Frequency::Daily | Frequency::Weekly => {
                    return Err(Error::invalid_rule(format!(
                        "BYDAY ordinal '{spec}' is only valid for MONTHLY or YEARLY rules"
                    )));
                }
            };
            if n == 0 || n.abs() > limit {
                return Err(Error::invalid_rule(format!("BYDAY ordinal '{spec}' out of range")));
            }
        }
        by_weekday.sort_unstable_by_key(WeekdaySpec::sort_key);
        by_weekday.dedup();

        Ok(Self {
            start,
            frequency,
            interval,
            termination,
            by_month,
            by_month_day,
            by_weekday,
        })
    }

    /// Parse and normalize in one step.
    pub fn parse(text: &str, default_anchor: Option<NaiveDateTime>) -> Result<Self> {
        Self::normalize(&RuleDescription::parse(text)?, default_anchor)
    }

    /// The description this rule normalizes from (time pinned to midnight).
    pub fn to_description(&self) -> RuleDescription {
        let (count, until) = match self.termination {
            Some(Termination::Count(n)) => (Some(n), None),
            Some(Termination::Until(u)) => (None, Some(u)),
            None => (None, None),
        };
        RuleDescription {
            start: Some(self.start),
            frequency: Some(self.frequency),
            interval: Some(self.interval),
            count,
            until,
            by_month: self.by_month.clone(),
            by_month_day: self.by_month_day.clone(),
            by_weekday: self.by_weekday.clone(),
            by_hour: vec![0],
            by_minute: vec![0],
            by_second: vec![0],
        }
    }

    pub fn start(&self) -> NaiveDateTime {
        self.start
    }

    pub fn frequency(&self) -> Frequency {
        self.frequency
    }

    pub fn interval(&self) -> u32 {
        self.interval
    }

    pub fn termination(&self) -> Option<Termination> {
        self.termination
    }

    pub fn by_month(&self) -> &[u32] {
        &self.by_month
    }

    pub fn by_month_day(&self) -> &[i32] {
        &self.by_month_day
    }

    pub fn by_weekday(&self) -> &[WeekdaySpec] {
        &self.by_weekday
    }
}

impl fmt::Display for RecurrenceRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "DTSTART:{}", self.start.format(ICAL_FORMAT))?;
        write!(f, "RRULE:FREQ={}", self.frequency.as_str())?;
        if self.interval != 1 {
            write!(f, ";INTERVAL={}", self.interval)?;
        }
        match self.termination {
            Some(Termination::Count(n)) => write!(f, ";COUNT={n}")?,
            Some(Termination::Until(u)) => write!(f, ";UNTIL={}", u.format(ICAL_FORMAT))?,
            None => {}
        }
        if !self.by_month.is_empty() {
            write!(f, ";BYMONTH={}", join(&self.by_month))?;
        }
        if !self.by_month_day.is_empty() {
            write!(f, ";BYMONTHDAY={}", join(&self.by_month_day))?;
        }
        if !self.by_weekday.is_empty() {
            write!(f, ";BYDAY={}", join(&self.by_weekday))?;
        }
        f.write_str(";BYHOUR=0;BYMINUTE=0;BYSECOND=0")
    }
}

fn join<T: fmt::Display>(items: &[T]) -> String {
    items
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(y: i32, m: u32, d: u32, h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, 0, 0)
            .unwrap()
    }

    #[test]
    fn parses_dtstart_and_rrule_lines() {
        let desc = RuleDescription::parse(
            "DTSTART:20240101T000000\nRRULE:FREQ=MONTHLY;INTERVAL=2;BYMONTHDAY=1,-1;COUNT=6",
        )
        .unwrap();
        assert_eq!(desc.start, Some(at(2024, 1, 1, 0)));
        assert_eq!(desc.frequency, Some(Frequency::Monthly));
        assert_eq!(desc.interval, Some(2));
        assert_eq!(desc.by_month_day, vec![1, -1]);
        assert_eq!(desc.count, Some(6));
    }

    #[test]
    fn parses_bare_rule_and_ordinal_weekdays() {
        let desc = RuleDescription::parse("FREQ=MONTHLY;BYDAY=1MO,-1FR,+2TU").unwrap();
        assert_eq!(
            desc.by_weekday,
            vec![
                WeekdaySpec::nth(1, Weekday::Mon),
                WeekdaySpec::nth(-1, Weekday::Fri),
                WeekdaySpec::nth(2, Weekday::Tue),
            ]
        );
    }

    #[test]
    fn one_off_date_is_not_a_rule() {
        let desc = RuleDescription::parse("DTSTART:20240301T000000").unwrap();
        let err = RecurrenceRule::normalize(&desc, None).unwrap_err();
        assert!(matches!(err, Error::InvalidRule(_)));
    }

    #[test]
    fn rejects_malformed_parts() {
        assert!(RuleDescription::parse("RRULE:FREQ=FORTNIGHTLY").is_err());
        assert!(RuleDescription::parse("RRULE:FREQ=HOURLY").is_err());
        assert!(RuleDescription::parse("RRULE:FREQ=DAILY;BYSETPOS=1").is_err());
        assert!(RuleDescription::parse("RRULE:FREQ=DAILY;COUNT=x").is_err());
        assert!(RuleDescription::parse("tomorrow").is_err());
        assert!(RuleDescription::parse("").is_err());
    }

    #[test]
    fn validation_failures_are_invalid_rule() {
        let anchor = Some(at(2024, 1, 1, 0));
        for text in [
            "FREQ=DAILY;INTERVAL=0",
            "FREQ=DAILY;COUNT=0",
            "FREQ=DAILY;COUNT=2;UNTIL=20240301",
            "FREQ=YEARLY;BYMONTH=13",
            "FREQ=MONTHLY;BYMONTHDAY=0",
            "FREQ=MONTHLY;BYMONTHDAY=32",
            "FREQ=WEEKLY;BYDAY=1MO",
            "FREQ=MONTHLY;BYDAY=6MO",
        ] {
            let err = RecurrenceRule::parse(text, anchor).unwrap_err();
            assert!(matches!(err, Error::InvalidRule(_)), "{text} -> {err:?}");
        }
    }

    #[test]
    fn missing_start_uses_anchor() {
        let rule = RecurrenceRule::parse("FREQ=WEEKLY", Some(at(2024, 5, 6, 15))).unwrap();
        assert_eq!(rule.start(), at(2024, 5, 6, 15));
    }

    #[test]
    fn explicit_start_wins_over_anchor() {
        let rule = RecurrenceRule::parse(
            "DTSTART:20240101T000000 RRULE:FREQ=WEEKLY",
            Some(at(2030, 1, 1, 0)),
        )
        .unwrap();
        assert_eq!(rule.start(), at(2024, 1, 1, 0));
    }

    #[test]
    fn time_selectors_are_pinned_to_midnight() {
        let rule = RecurrenceRule::parse(
            "DTSTART:20240101T000000\nRRULE:FREQ=DAILY;BYHOUR=9;BYMINUTE=30",
            None,
        )
        .unwrap();
        let desc = rule.to_description();
        assert_eq!(desc.by_hour, vec![0]);
        assert_eq!(desc.by_minute, vec![0]);
        assert_eq!(desc.by_second, vec![0]);
        assert!(rule.to_string().ends_with("BYHOUR=0;BYMINUTE=0;BYSECOND=0"));
    }

    #[test]
    fn normalization_is_a_fixed_point() {
        let samples = [
            "FREQ=DAILY",
            "FREQ=WEEKLY;INTERVAL=2;BYDAY=FR,MO,MO",
            "FREQ=MONTHLY;BYMONTHDAY=-1,15,1;COUNT=12",
            "FREQ=MONTHLY;BYDAY=-1FR;UNTIL=20251231T000000Z",
            "FREQ=YEARLY;BYMONTH=12,3;BYMONTHDAY=25;BYHOUR=7",
            "DTSTART:20240229T134500\nRRULE:FREQ=YEARLY;WKST=SU",
        ];
        for text in samples {
            let once = RecurrenceRule::parse(text, Some(at(2024, 2, 10, 8))).unwrap();
            let twice = RecurrenceRule::normalize(&once.to_description(), None).unwrap();
            assert_eq!(once, twice, "{text}");

            let reparsed = RecurrenceRule::parse(&once.to_string(), None).unwrap();
            assert_eq!(once, reparsed, "{text}");
            assert_eq!(once.to_string(), reparsed.to_string());
        }
    }

    #[test]
    fn canonical_text_form() {
        let rule = RecurrenceRule::parse(
            "RRULE:FREQ=MONTHLY;BYMONTHDAY=-1,1;INTERVAL=3;COUNT=4",
            Some(at(2024, 1, 1, 0)),
        )
        .unwrap();
        assert_eq!(
            rule.to_string(),
            "DTSTART:20240101T000000\nRRULE:FREQ=MONTHLY;INTERVAL=3;COUNT=4;BYMONTHDAY=-1,1;BYHOUR=0;BYMINUTE=0;BYSECOND=0"
        );
    }

    #[test]
    fn every_shorthand() {
        let d = RuleDescription::every("7d").unwrap();
        assert_eq!(d.frequency, Some(Frequency::Daily));
        assert_eq!(d.interval, Some(7));

        let m = RuleDescription::every("3 months".replace(' ', "").as_str()).unwrap();
        assert_eq!(m.frequency, Some(Frequency::Monthly));
        assert_eq!(m.interval, Some(3));

        assert_eq!(RuleDescription::every("weekly").unwrap().frequency, Some(Frequency::Weekly));
        assert!(RuleDescription::every("7").is_err());
        assert!(RuleDescription::every("7q").is_err());
        assert!(RuleDescription::every("d").is_err());
    }
}
