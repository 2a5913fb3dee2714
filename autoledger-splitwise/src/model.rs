//! Wire model for the Splitwise v3.0 API (only the fields reconciliation reads).

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
}

impl User {
    pub fn display_name(&self) -> String {
        format!(
            "{} {}",
            self.first_name.as_deref().unwrap_or_default(),
            self.last_name.as_deref().unwrap_or_default()
        )
        .trim()
        .to_string()
    }
}

/// One participant's share of an expense.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpenseUser {
    pub user_id: i64,
    pub paid_share: Decimal,
    pub owed_share: Decimal,
}

/// A debt settled by the expense: `from` owes `to` `amount`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repayment {
    pub from: i64,
    pub to: i64,
    pub amount: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Expense {
    pub id: i64,
    pub description: String,
    pub cost: Decimal,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub deleted_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub users: Vec<ExpenseUser>,
    #[serde(default)]
    pub repayments: Vec<Repayment>,
}

impl Expense {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    pub fn share_of(&self, user_id: i64) -> Option<&ExpenseUser> {
        self.users.iter().find(|u| u.user_id == user_id)
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct CurrentUserEnvelope {
    pub user: User,
}

#[derive(Debug, Deserialize)]
pub(crate) struct FriendsEnvelope {
    pub friends: Vec<User>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ExpensesEnvelope {
    pub expenses: Vec<Expense>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_string_amounts_and_null_deletion() {
        let raw = r#"{
            "id": 3012,
            "description": "Groceries MC:GROC",
            "cost": "84.20",
            "created_at": "2024-05-02T18:04:11Z",
            "deleted_at": null,
            "users": [
                {"user_id": 1, "paid_share": "84.20", "owed_share": "42.10", "user": {"id": 1}},
                {"user_id": 2, "paid_share": "0.0", "owed_share": "42.10"}
            ],
            "repayments": [{"from": 2, "to": 1, "amount": "42.1"}]
        }"#;
        let e: Expense = serde_json::from_str(raw).unwrap();
        assert!(!e.is_deleted());
        assert_eq!(e.share_of(1).unwrap().owed_share, Decimal::new(4210, 2));
        assert_eq!(e.repayments[0].amount, Decimal::new(421, 1));
    }

    #[test]
    fn display_name_trims_missing_parts() {
        let u = User {
            id: 7,
            first_name: Some("Ana".to_string()),
            last_name: None,
        };
        assert_eq!(u.display_name(), "Ana");
    }
}
