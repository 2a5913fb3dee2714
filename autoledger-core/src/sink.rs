//! The ledger boundary: where realized transactions go.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::SinkError;

/// A fully resolved transaction handed to a [`LedgerSink`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerTransaction {
    pub description: String,
    /// Negative = charge, positive = credit.
    pub amount: Decimal,
    pub category: String,
    pub date: NaiveDate,
    /// Idempotency key; the sink must never create two transactions for one key.
    pub dedupe_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// Create-or-confirm access to an external ledger.
///
/// Contract:
/// - `Ok(true)`: a transaction with this dedupe key now exists (newly created
///   or already present).
/// - `Ok(false)`: declined for a recoverable reason, e.g. unknown category.
/// - `Err(_)`: transport failure; callers treat it like a decline.
/// - A zero amount is a no-op success.
pub trait LedgerSink {
    fn add_transaction(&mut self, txn: &LedgerTransaction) -> Result<bool, SinkError>;
}

impl<S: LedgerSink + ?Sized> LedgerSink for &mut S {
    fn add_transaction(&mut self, txn: &LedgerTransaction) -> Result<bool, SinkError> {
        (**self).add_transaction(txn)
    }
}

/// Substring search over a ledger; used by reconciliation, not by scheduling.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransactionFilter {
    pub search: Option<String>,
    pub category: Option<String>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

impl TransactionFilter {
    pub fn search(text: impl Into<String>) -> Self {
        Self {
            search: Some(text.into()),
            ..Default::default()
        }
    }

    pub fn matches(&self, txn: &LedgerTransaction) -> bool {
        if let Some(needle) = &self.search {
            let needle = needle.to_lowercase();
            let hit = [&txn.description, &txn.category, &txn.dedupe_key]
                .iter()
                .any(|field| field.to_lowercase().contains(&needle));
            if !hit {
                return false;
            }
        }
        if let Some(category) = &self.category {
            if &txn.category != category {
                return false;
            }
        }
        if self.from.is_some_and(|from| txn.date < from) {
            return false;
        }
        if self.to.is_some_and(|to| txn.date > to) {
            return false;
        }
        true
    }
}

pub trait LedgerSearch {
    fn search_transactions(&self, filter: &TransactionFilter) -> Result<Vec<LedgerTransaction>, SinkError>;
}
