//! The catch-up loop: realize every due occurrence, one confirmed write at a time.
//!
//! Per run, each record moves PENDING → DUE → REALIZED (cursor advanced, back
//! to PENDING for further catch-up) or SKIPPED (left alone until the next run).
//! The loop re-queries the store after every pass and stops when nothing
//! outside the skip-set is due.

use std::collections::HashSet;

use chrono::NaiveDateTime;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::sink::{LedgerSink, LedgerTransaction};
use crate::store::{RecurringTransaction, RecurringTransactionStore};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Realized {
    pub id: i64,
    pub occurrence: NaiveDateTime,
    pub dedupe_key: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "message", rename_all = "snake_case")]
pub enum SkipReason {
    /// The sink returned `false`.
    Declined,
    /// The sink or the cursor update failed.
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Skipped {
    pub id: i64,
    pub occurrence: NaiveDateTime,
    pub reason: SkipReason,
}

/// What one run did.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    pub realized: Vec<Realized>,
    pub skipped: Vec<Skipped>,
    /// Ids removed by expiry during the run.
    pub expired: Vec<i64>,
    /// Due-queries that returned at least one record.
    pub passes: usize,
}

impl RunReport {
    pub fn is_clean(&self) -> bool {
        self.skipped.is_empty()
    }
}

pub struct CatchUpProcessor<'a, S> {
    store: &'a RecurringTransactionStore,
    sink: S,
}

impl<'a, S: LedgerSink> CatchUpProcessor<'a, S> {
    pub fn new(store: &'a RecurringTransactionStore, sink: S) -> Self {
        Self { store, sink }
    }

    pub fn into_sink(self) -> S {
        self.sink
    }

    /// Run until nothing outside the skip-set is due at `now`.
    ///
    /// Only `StoreUnavailable` aborts the run; sink failures and cursor
    /// conflicts skip the record for the rest of this run.
    pub fn run(&mut self, now: NaiveDateTime) -> Result<RunReport> {
        let mut report = RunReport::default();
        let mut skip = HashSet::new();

        loop {
            let batch = self.store.due(now, &skip)?;
            report.expired.extend(batch.expired.iter().map(|r| r.id));
            if batch.due.is_empty() {
                break;
            }
            report.passes += 1;
            debug!(pass = report.passes, due = batch.due.len(), "catch-up pass");

            for record in &batch.due {
                // Earlier records in this pass never touch this one's cursor.
                let Some(occurrence) = record.next_occurrence() else { continue };
                match self.realize(record, occurrence) {
                    Ok(realized) => report.realized.push(realized),
                    Err(Outcome::Skip(reason)) => {
                        skip.insert(record.id);
                        report.skipped.push(Skipped {
                            id: record.id,
                            occurrence,
                            reason,
                        });
                    }
                    Err(Outcome::Fatal(e)) => return Err(e),
                }
            }
        }

        info!(
            realized = report.realized.len(),
            skipped = report.skipped.len(),
            expired = report.expired.len(),
            passes = report.passes,
            "catch-up run complete"
        );
        Ok(report)
    }

    fn realize(
        &mut self,
        record: &RecurringTransaction,
        occurrence: NaiveDateTime,
    ) -> std::result::Result<Realized, Outcome> {
        let dedupe_key = record.dedupe_key(occurrence);

        if record.amount.is_zero() {
            debug!(id = record.id, %dedupe_key, "zero amount, nothing to write");
        } else {
            let txn = LedgerTransaction {
                description: record.description.clone(),
                amount: record.amount,
                category: record.category.clone(),
                date: occurrence.date(),
                dedupe_key: dedupe_key.clone(),
                notes: record.notes.clone(),
            };
            match self.sink.add_transaction(&txn) {
                Ok(true) => {}
                Ok(false) => {
                    warn!(
                        id = record.id,
                        category = %record.category,
                        %dedupe_key,
                        "ledger declined transaction; skipping for this run"
                    );
                    return Err(Outcome::Skip(SkipReason::Declined));
                }
                Err(e) => {
                    warn!(id = record.id, %dedupe_key, error = %e, "ledger sink failed; skipping for this run");
                    return Err(Outcome::Skip(SkipReason::Failed(e.to_string())));
                }
            }
        }

        match self.store.advance_cursor(record.id, occurrence) {
            Ok(()) => Ok(Realized {
                id: record.id,
                occurrence,
                dedupe_key,
            }),
            Err(e @ (Error::StaleCursor { .. } | Error::NotFound(_))) => {
                warn!(id = record.id, error = %e, "cursor not advanced; skipping for this run");
                Err(Outcome::Skip(SkipReason::Failed(e.to_string())))
            }
            Err(e) => Err(Outcome::Fatal(e)),
        }
    }
}

enum Outcome {
    Skip(SkipReason),
    Fatal(Error),
}
