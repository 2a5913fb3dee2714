//! Occurrence calculation: pure functions over a [`RecurrenceRule`].
//!
//! Evaluation walks the rule's periods (day, Monday-start week, month or year)
//! from the period containing DTSTART, stepping by INTERVAL, and keeps the days
//! each period's BY-filters select. Every occurrence is at 00:00:00 and none
//! precedes DTSTART. Nothing here reads the clock.

use chrono::{Datelike, Days, NaiveDate, NaiveDateTime};

use crate::rule::{Frequency, RecurrenceRule, Termination, WeekdaySpec};
use crate::time::midnight;

/// Any satisfiable pattern recurs within one Gregorian cycle.
const SEARCH_HORIZON_YEARS: i32 = 400;

/// Earliest occurrence strictly after `after`, or `None` once the rule is
/// exhausted (or can never match again).
///
/// Feeding the result back in as `after` always yields a strictly later
/// occurrence or `None`.
pub fn next_occurrence(rule: &RecurrenceRule, after: NaiveDateTime) -> Option<NaiveDateTime> {
    Occurrences::near(rule, after).find(|occ| *occ > after)
}

/// Occurrences in the half-open window `(after, until]`, oldest first.
pub fn occurrences_between(
    rule: &RecurrenceRule,
    after: NaiveDateTime,
    until: NaiveDateTime,
) -> Vec<NaiveDateTime> {
    Occurrences::near(rule, after)
        .skip_while(|occ| *occ <= after)
        .take_while(|occ| *occ <= until)
        .collect()
}

/// The next `limit` occurrences strictly after `after`.
pub fn upcoming(rule: &RecurrenceRule, after: NaiveDateTime, limit: usize) -> Vec<NaiveDateTime> {
    Occurrences::near(rule, after)
        .skip_while(|occ| *occ <= after)
        .take(limit)
        .collect()
}

/// `true` when the rule can never produce anything after `cursor`.
pub fn is_exhausted(rule: &RecurrenceRule, cursor: NaiveDateTime) -> bool {
    next_occurrence(rule, cursor).is_none()
}

/// Day filters after applying the frequency's implied defaults.
#[derive(Debug, Clone)]
struct Filters {
    months: Vec<u32>,
    month_days: Vec<i32>,
    weekdays: Vec<WeekdaySpec>,
    /// Ordinal BYDAY counts within the month rather than the year.
    ordinals_by_month: bool,
}

impl Filters {
    fn for_rule(rule: &RecurrenceRule) -> Self {
        let start = rule.start().date();
        let mut months = rule.by_month().to_vec();
        let mut month_days = rule.by_month_day().to_vec();
        let mut weekdays = rule.by_weekday().to_vec();

        if month_days.is_empty() && weekdays.is_empty() {
            match rule.frequency() {
                Frequency::Daily => {}
                Frequency::Weekly => weekdays.push(WeekdaySpec::every(start.weekday())),
                Frequency::Monthly => month_days.push(start.day() as i32),
                Frequency::Yearly => {
                    if months.is_empty() {
                        months.push(start.month());
                    }
                    month_days.push(start.day() as i32);
                }
            }
        }

        let ordinals_by_month = match rule.frequency() {
            Frequency::Yearly => !months.is_empty(),
            _ => true,
        };

        Self {
            months,
            month_days,
            weekdays,
            ordinals_by_month,
        }
    }

    fn matches(&self, day: NaiveDate) -> bool {
        if !self.months.is_empty() && !self.months.contains(&day.month()) {
            return false;
        }

        if !self.month_days.is_empty() {
            let len = days_in_month(day.year(), day.month()) as i32;
            let dom = day.day() as i32;
            let hit = self
                .month_days
                .iter()
                .any(|&md| if md > 0 { md == dom } else { len + md + 1 == dom });
            if !hit {
                return false;
            }
        }

        if !self.weekdays.is_empty() {
            return self.weekdays.iter().any(|spec| self.weekday_matches(spec, day));
        }

        true
    }

    fn weekday_matches(&self, spec: &WeekdaySpec, day: NaiveDate) -> bool {
        if spec.weekday != day.weekday() {
            return false;
        }
        let Some(n) = spec.ordinal else { return true };

        let (index0, len) = if self.ordinals_by_month {
            (day.day0(), days_in_month(day.year(), day.month()))
        } else {
            (day.ordinal0(), days_in_year(day.year()))
        };
        let from_start = (index0 / 7) as i32 + 1;
        let from_end = -(((len - 1 - index0) / 7) as i32 + 1);
        n == from_start || n == from_end
    }
}

/// Ordered occurrence stream for one rule.
struct Occurrences<'a> {
    rule: &'a RecurrenceRule,
    filters: Filters,
    period: u64,
    emitted: u32,
    pending: std::vec::IntoIter<NaiveDate>,
    horizon: NaiveDate,
    done: bool,
}

impl<'a> Occurrences<'a> {
    /// Stream positioned shortly before `after`.
    ///
    /// Counted rules must be replayed from DTSTART to know how many occurrences
    /// are spent, so only uncounted rules skip ahead.
    fn near(rule: &'a RecurrenceRule, after: NaiveDateTime) -> Self {
        let search_from = after.date().max(rule.start().date());
        let horizon = search_from
            .with_year(search_from.year() + SEARCH_HORIZON_YEARS)
            .or_else(|| NaiveDate::from_ymd_opt(search_from.year() + SEARCH_HORIZON_YEARS, 3, 1))
            .unwrap_or(NaiveDate::MAX);

        let period = match rule.termination() {
            Some(Termination::Count(_)) => 0,
            _ => periods_before(rule, after.date()).saturating_sub(1),
        };

        Self {
            rule,
            filters: Filters::for_rule(rule),
            period,
            emitted: 0,
            pending: Vec::new().into_iter(),
            horizon,
            done: false,
        }
    }

    fn fill_next_period(&mut self) {
        loop {
            let Some(first) = period_start(self.rule, self.period) else {
                self.done = true;
                return;
            };
            if first > self.horizon {
                self.done = true;
                return;
            }
            if let Some(Termination::Until(until)) = self.rule.termination() {
                if first > until.date() {
                    self.done = true;
                    return;
                }
            }

            self.period += 1;
            let days: Vec<NaiveDate> = period_days(self.rule.frequency(), first)
                .filter(|d| self.filters.matches(*d))
                .collect();
            if !days.is_empty() {
                self.pending = days.into_iter();
                return;
            }
        }
    }
}

impl Iterator for Occurrences<'_> {
    type Item = NaiveDateTime;

    fn next(&mut self) -> Option<NaiveDateTime> {
        loop {
            if self.done {
                return None;
            }
            if let Some(Termination::Count(n)) = self.rule.termination() {
                if self.emitted >= n {
                    self.done = true;
                    return None;
                }
            }

            let Some(day) = self.pending.next() else {
                self.fill_next_period();
                continue;
            };

            let occ = midnight(day);
            if occ < self.rule.start() {
                continue;
            }
            if let Some(Termination::Until(until)) = self.rule.termination() {
                if occ > until {
                    self.done = true;
                    return None;
                }
            }

            self.emitted += 1;
            return Some(occ);
        }
    }
}

/// Number of whole periods between DTSTART's period and the one holding `date`.
fn periods_before(rule: &RecurrenceRule, date: NaiveDate) -> u64 {
    let start = rule.start().date();
    if date <= start {
        return 0;
    }
    let interval = u64::from(rule.interval());
    let elapsed = match rule.frequency() {
        Frequency::Daily => (date - start).num_days() as u64,
        Frequency::Weekly => ((week_start(date) - week_start(start)).num_days() / 7) as u64,
        Frequency::Monthly => (month_index(date) - month_index(start)) as u64,
        Frequency::Yearly => (date.year() - start.year()) as u64,
    };
    elapsed / interval
}

/// First day of the `k`-th period of the rule.
fn period_start(rule: &RecurrenceRule, k: u64) -> Option<NaiveDate> {
    let start = rule.start().date();
    let step = k.checked_mul(u64::from(rule.interval()))?;
    match rule.frequency() {
        Frequency::Daily => start.checked_add_days(Days::new(step)),
        Frequency::Weekly => week_start(start).checked_add_days(Days::new(step.checked_mul(7)?)),
        Frequency::Monthly => {
            let idx = month_index(start).checked_add(i64::try_from(step).ok()?)?;
            let year = i32::try_from(idx.div_euclid(12)).ok()?;
            NaiveDate::from_ymd_opt(year, idx.rem_euclid(12) as u32 + 1, 1)
        }
        Frequency::Yearly => {
            let year = start.year().checked_add(i32::try_from(step).ok()?)?;
            NaiveDate::from_ymd_opt(year, 1, 1)
        }
    }
}

fn period_days(frequency: Frequency, first: NaiveDate) -> impl Iterator<Item = NaiveDate> {
    let len = match frequency {
        Frequency::Daily => 1,
        Frequency::Weekly => 7,
        Frequency::Monthly => days_in_month(first.year(), first.month()),
        Frequency::Yearly => days_in_year(first.year()),
    };
    first.iter_days().take(len as usize)
}

fn week_start(date: NaiveDate) -> NaiveDate {
    date - chrono::Duration::days(i64::from(date.weekday().num_days_from_monday()))
}

fn month_index(date: NaiveDate) -> i64 {
    i64::from(date.year()) * 12 + i64::from(date.month0())
}

fn days_in_month(year: i32, month: u32) -> u32 {
    let (ny, nm) = if month == 12 { (year + 1, 1) } else { (year, month + 1) };
    match (
        NaiveDate::from_ymd_opt(year, month, 1),
        NaiveDate::from_ymd_opt(ny, nm, 1),
    ) {
        (Some(a), Some(b)) => (b - a).num_days() as u32,
        _ => 31,
    }
}

fn days_in_year(year: i32) -> u32 {
    if NaiveDate::from_ymd_opt(year, 2, 29).is_some() {
        366
    } else {
        365
    }
}
