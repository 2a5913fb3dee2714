//! Exact decimal money helpers.
//!
//! Amounts are signed: negative = charge, positive = credit. Nothing in this
//! crate touches binary floating point for money.

use std::str::FromStr;

use rust_decimal::Decimal;

/// Parse a human-entered money string like `-$1,200.50` or `12.3`.
pub fn parse_amount(raw: &str) -> Result<Decimal, rust_decimal::Error> {
    let cleaned: String = raw
        .trim()
        .chars()
        .filter(|c| !matches!(c, '$' | ',' | ' '))
        .collect();
    Decimal::from_str(&cleaned)
}

/// Render an amount the way the ledger stores it, keeping the entered scale.
pub fn to_storage(amount: Decimal) -> String {
    amount.to_string()
}
