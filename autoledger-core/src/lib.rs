//! autoledger-core: recurring-transaction scheduling for personal bookkeeping

pub mod catch_up;
pub mod error;
pub mod expiry;
pub mod money;
pub mod occurrence;
pub mod rule;
pub mod single;
pub mod sink;
pub mod store;
pub mod time;

pub use catch_up::{CatchUpProcessor, Realized, RunReport, SkipReason, Skipped};
pub use error::{Error, Result, SinkError};
pub use expiry::ExpiryPolicy;
pub use occurrence::{is_exhausted, next_occurrence, occurrences_between, upcoming};
pub use rule::{Frequency, RecurrenceRule, RuleDescription, Termination, WeekdaySpec};
pub use single::{OneShot, Scheduled, SingleOccurrenceScheduler};
pub use sink::{LedgerSearch, LedgerSink, LedgerTransaction, TransactionFilter};
pub use store::{DueRecords, NewRecurringTransaction, RecurringTransaction, RecurringTransactionStore};
