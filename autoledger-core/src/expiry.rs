//! Removal of records whose rule has nothing left to produce.

use tracing::info;

use crate::error::Result;
use crate::store::{RecurringTransaction, RecurringTransactionStore};

/// Deletes exhausted records. Deletion is permanent; every removal is logged.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExpiryPolicy;

impl ExpiryPolicy {
    pub fn is_expired(&self, record: &RecurringTransaction) -> bool {
        record.next_occurrence().is_none()
    }

    /// Delete every exhausted record, one row at a time, returning what went.
    pub fn purge(&self, store: &RecurringTransactionStore) -> Result<Vec<RecurringTransaction>> {
        let mut removed = Vec::new();
        for record in store.list_valid()? {
            if !self.is_expired(&record) {
                continue;
            }
            store.remove(record.id)?;
            info!(
                id = record.id,
                description = %record.description,
                rule = %record.recurrence_rule.to_string().replace('\n', " "),
                previous_occurrence = %record.previous_occurrence,
                "expired recurring transaction"
            );
            removed.push(record);
        }
        Ok(removed)
    }
}
