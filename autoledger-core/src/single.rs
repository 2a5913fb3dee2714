//! One-shot schedules expressed as a rule that fires exactly once.
//!
//! A one-shot for date D is `FREQ=YEARLY;COUNT=1;BYMONTH=<D.month>;BYMONTHDAY=<D.day>`
//! anchored at a start that cannot itself match, so the single counted
//! occurrence is D. It then flows through the normal store, catch-up and
//! expiry machinery.

use chrono::{Datelike, NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::rule::{Frequency, RuleDescription};
use crate::store::{NewRecurringTransaction, RecurringTransaction, RecurringTransactionStore};
use crate::time::midnight;

#[derive(Debug, Clone)]
pub struct OneShot {
    pub description: String,
    pub amount: Decimal,
    pub category: String,
    /// Only the date matters; the transaction is realized at its midnight.
    pub date: NaiveDateTime,
    /// Caller-chosen idempotency string, stored as the record's seed.
    pub dedupe: String,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scheduled {
    Created(RecurringTransaction),
    /// A record with this dedupe string already exists; nothing was written.
    AlreadyScheduled(RecurringTransaction),
}

impl Scheduled {
    pub fn record(&self) -> &RecurringTransaction {
        match self {
            Self::Created(r) | Self::AlreadyScheduled(r) => r,
        }
    }
}

pub struct SingleOccurrenceScheduler<'a> {
    store: &'a RecurringTransactionStore,
}

impl<'a> SingleOccurrenceScheduler<'a> {
    pub fn new(store: &'a RecurringTransactionStore) -> Self {
        Self { store }
    }

    /// Schedule `shot` to be realized once on its date.
    ///
    /// Fails with `InvalidSchedule` unless the date's midnight is after `now`.
    pub fn schedule_once(&self, shot: &OneShot, now: NaiveDateTime) -> Result<Scheduled> {
        let target = shot.date.date();
        if midnight(target) <= now {
            warn!(date = %target, dedupe = %shot.dedupe, "rejected one-shot schedule in the past");
            return Err(Error::InvalidSchedule(format!(
                "{target} is not in the future (now {now})"
            )));
        }

        if let Some(existing) = self.store.find_by_seed(&shot.dedupe)? {
            info!(id = existing.id, dedupe = %shot.dedupe, "one-shot already scheduled");
            return Ok(Scheduled::AlreadyScheduled(existing));
        }

        let rule = RuleDescription {
            frequency: Some(Frequency::Yearly),
            by_month: vec![target.month()],
            by_month_day: vec![target.day() as i32],
            ..Default::default()
        }
        .count(1)
        .starting(anchor_for(target, now));

        let mut new = NewRecurringTransaction::new(&shot.description, shot.amount, &shot.category, rule)
            .with_dedupe_seed(&shot.dedupe);
        new.notes = shot.notes.clone();

        let record = self.store.create(&new, now)?;
        info!(id = record.id, date = %target, dedupe = %shot.dedupe, "scheduled one-shot transaction");
        Ok(Scheduled::Created(record))
    }
}

/// A start before `target` in the target's year (or the eve of it) that does
/// not itself match `target`'s month and day.
fn anchor_for(target: NaiveDate, now: NaiveDateTime) -> NaiveDateTime {
    if target.year() == now.year() {
        return midnight(now.date());
    }
    let jan_first = NaiveDate::from_ymd_opt(target.year(), 1, 1).unwrap_or(target);
    if jan_first == target {
        midnight(jan_first.pred_opt().unwrap_or(jan_first))
    } else {
        midnight(jan_first)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::occurrence::upcoming;

    fn at(y: i32, m: u32, d: u32, h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d).unwrap().and_hms_opt(h, 0, 0).unwrap()
    }

    fn shot(date: NaiveDateTime, dedupe: &str) -> OneShot {
        OneShot {
            description: "Tax refund".to_string(),
            amount: Decimal::new(120_000, 2),
            category: "Income".to_string(),
            date,
            dedupe: dedupe.to_string(),
            notes: Some("federal".to_string()),
        }
    }

    #[test]
    fn fires_exactly_once_on_target_date() {
        let store = RecurringTransactionStore::open_in_memory().unwrap();
        let sched = SingleOccurrenceScheduler::new(&store);
        let now = at(2024, 3, 10, 9);

        let created = sched.schedule_once(&shot(at(2024, 4, 15, 0), "refund-2024"), now).unwrap();
        let rec = created.record();
        assert!(matches!(created, Scheduled::Created(_)));
        assert_eq!(rec.dedupe_seed, "refund-2024");
        assert!(rec.previous_occurrence <= now);
        assert_eq!(upcoming(&rec.recurrence_rule, rec.previous_occurrence, 5), vec![at(2024, 4, 15, 0)]);
    }

    #[test]
    fn target_in_later_year_does_not_fire_this_year() {
        let store = RecurringTransactionStore::open_in_memory().unwrap();
        let sched = SingleOccurrenceScheduler::new(&store);

        let rec = sched
            .schedule_once(&shot(at(2025, 6, 1, 0), "a"), at(2024, 3, 1, 0))
            .unwrap();
        let rec = rec.record();
        assert_eq!(upcoming(&rec.recurrence_rule, rec.previous_occurrence, 5), vec![at(2025, 6, 1, 0)]);
    }

    #[test]
    fn new_years_day_target() {
        let store = RecurringTransactionStore::open_in_memory().unwrap();
        let sched = SingleOccurrenceScheduler::new(&store);

        let rec = sched
            .schedule_once(&shot(at(2025, 1, 1, 0), "ny"), at(2024, 12, 30, 0))
            .unwrap();
        let rec = rec.record();
        assert_eq!(rec.recurrence_rule.start(), at(2024, 12, 31, 0));
        assert_eq!(upcoming(&rec.recurrence_rule, rec.previous_occurrence, 5), vec![at(2025, 1, 1, 0)]);
    }

    #[test]
    fn rejects_today_and_past() {
        let store = RecurringTransactionStore::open_in_memory().unwrap();
        let sched = SingleOccurrenceScheduler::new(&store);
        let now = at(2024, 3, 10, 9);

        for date in [at(2024, 3, 10, 23), at(2024, 3, 1, 0)] {
            assert!(matches!(
                sched.schedule_once(&shot(date, "x"), now),
                Err(Error::InvalidSchedule(_))
            ));
        }
        assert!(store.list().unwrap().is_empty());
    }
}
