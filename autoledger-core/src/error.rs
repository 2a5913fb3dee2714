//! Error taxonomy for the scheduling core.

use thiserror::Error;

/// Errors surfaced by the recurring-transaction core.
///
/// Validation errors (`InvalidRule`, `InvalidSchedule`) are returned to the
/// immediate caller and never stored. `StoreUnavailable` is fatal for a run.
#[derive(Debug, Error)]
pub enum Error {
    /// The recurrence description is malformed, not recurring, or already
    /// exhausted before its first occurrence.
    #[error("invalid recurrence rule: {0}")]
    InvalidRule(String),

    /// A one-shot schedule target is not in the future.
    #[error("invalid schedule: {0}")]
    InvalidSchedule(String),

    #[error("invalid date/time: {0}")]
    InvalidTime(String),

    #[error("store unavailable: {0}")]
    StoreUnavailable(#[from] rusqlite::Error),

    #[error("recurring transaction {0} not found")]
    NotFound(i64),

    /// A persisted row could not be decoded back into a record.
    #[error("corrupt record {id}: {reason}")]
    CorruptRecord { id: i64, reason: String },

    /// A cursor advance that would not move the cursor forward.
    #[error("cursor for record {id} is already at or past {occurrence}")]
    StaleCursor { id: i64, occurrence: String },
}

impl Error {
    pub(crate) fn invalid_rule(msg: impl Into<String>) -> Self {
        Self::InvalidRule(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Transport-level failure reported by a ledger sink.
///
/// Distinct from a sink *declining* a transaction (`Ok(false)`): both cause a
/// per-run skip, but this one carries the underlying cause for the logs.
#[derive(Debug, Error)]
#[error("ledger sink failure: {message}")]
pub struct SinkError {
    pub message: String,
}

impl SinkError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}
