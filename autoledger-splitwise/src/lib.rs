//! autoledger-splitwise: reconcile shared Splitwise expenses into the ledger

pub mod client;
pub mod error;
pub mod model;
pub mod reconcile;
pub mod shorthand;

pub use client::SplitwiseClient;
pub use error::{Result, SplitwiseError};
pub use model::{Expense, ExpenseUser, Repayment, User};
pub use reconcile::{Directory, IgnoreReason, Planned, ReconcileReport, Reconciler};
pub use shorthand::{FlagParser, ShorthandTable};
