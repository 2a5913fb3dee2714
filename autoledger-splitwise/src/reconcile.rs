//! Turn shared expenses into ledger transactions for the current user.
//!
//! Per expense:
//! 1. Resolve the category: global shorthand (via the table), else a
//!    trailing JSON object. No category means the expense is ignored.
//! 2. A `C` modifier (global, or this user's flag) adds a charge for the
//!    full paid share under `SPLIT:CHARGE<id>`.
//! 3. The net `paid_share - owed_share` becomes the main transaction under
//!    `SPLIT:<id>`, with repayments involving the user listed in the notes.

use std::collections::HashMap;
use std::path::Path;

use autoledger_core::{LedgerSink, LedgerTransaction};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::error::{Result, SplitwiseError};
use crate::model::{Expense, User};
use crate::shorthand::{json_category, FlagParser, ShorthandTable};

pub const DESCRIPTION_PREFIX: &str = "Splitwise: ";

/// Who is who: the current user, their friends and display-name overrides.
#[derive(Debug, Clone)]
pub struct Directory {
    me: User,
    friends: Vec<User>,
    overrides: HashMap<i64, String>,
}

impl Directory {
    pub fn new(me: User, friends: Vec<User>) -> Self {
        Self {
            me,
            friends,
            overrides: HashMap::new(),
        }
    }

    pub fn with_overrides(mut self, overrides: HashMap<i64, String>) -> Self {
        self.overrides = overrides;
        self
    }

    /// Read a `{"<user id>": "<name>"}` override file.
    pub fn load_overrides(path: &Path) -> Result<HashMap<i64, String>> {
        let raw = std::fs::read_to_string(path).map_err(|source| SplitwiseError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(serde_json::from_str(&raw)?)
    }

    pub fn my_id(&self) -> i64 {
        self.me.id
    }

    pub fn name_of(&self, user_id: i64) -> String {
        if let Some(name) = self.overrides.get(&user_id) {
            return name.clone();
        }
        if user_id == self.me.id {
            return self.me.display_name();
        }
        self.friends
            .iter()
            .find(|f| f.id == user_id)
            .map(User::display_name)
            .unwrap_or_else(|| format!("User {user_id}"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IgnoreReason {
    Deleted,
    /// The current user has no share in the expense.
    NotParticipant,
    /// More than one global shorthand; refusing to guess.
    AmbiguousShorthand(Vec<String>),
    NoCategory,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Planned {
    Transactions(Vec<LedgerTransaction>),
    Ignored(IgnoreReason),
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ReconcileReport {
    /// Dedupe keys now present in the ledger.
    pub written: Vec<String>,
    pub declined: Vec<String>,
    pub failed: Vec<(String, String)>,
    pub ignored: Vec<(i64, IgnoreReason)>,
}

pub struct Reconciler {
    directory: Directory,
    shorthands: ShorthandTable,
    flags: FlagParser,
}

impl Reconciler {
    pub fn new(directory: Directory, shorthands: ShorthandTable, user_identifier: Option<&str>) -> Result<Self> {
        Ok(Self {
            directory,
            shorthands,
            flags: FlagParser::new(user_identifier)?,
        })
    }

    pub fn plan(&self, expense: &Expense) -> Planned {
        if expense.is_deleted() {
            return Planned::Ignored(IgnoreReason::Deleted);
        }
        let Some(share) = expense.share_of(self.directory.my_id()) else {
            return Planned::Ignored(IgnoreReason::NotParticipant);
        };

        let shorthands = self.flags.global_shorthands(&expense.description);
        if shorthands.len() > 1 {
            let found: Vec<String> = shorthands.iter().map(|s| format!("M{}:{}", s.modifiers, s.code)).collect();
            error!(
                expense = expense.id,
                description = %expense.description,
                matches = ?found,
                "more than one shorthand in expense; skipping"
            );
            return Planned::Ignored(IgnoreReason::AmbiguousShorthand(found));
        }

        let mut description = self.flags.strip(&expense.description);
        let mut charge = false;
        let known = shorthands
            .first()
            .and_then(|s| self.shorthands.category(&s.code).map(|c| (s, c.to_string())));
        let category = match known {
            Some((shorthand, category)) => {
                charge = shorthand.charges_paid_share();
                category
            }
            None => match json_category(&description) {
                Some((category, rest)) => {
                    description = rest;
                    category
                }
                None => {
                    debug!(expense = expense.id, "no category flag; ignoring");
                    return Planned::Ignored(IgnoreReason::NoCategory);
                }
            },
        };
        if let Some(mods) = self.flags.user_modifiers(&expense.description) {
            charge |= mods.contains('C');
        }

        let label = format!("{DESCRIPTION_PREFIX}{description}");
        let date = expense.created_at.date_naive();
        let mut out = Vec::new();

        if charge && !share.paid_share.is_zero() {
            out.push(LedgerTransaction {
                description: label.clone(),
                amount: -share.paid_share,
                category: category.clone(),
                date,
                dedupe_key: format!("SPLIT:CHARGE{}", expense.id),
                notes: None,
            });
        }

        let net: Decimal = share.paid_share - share.owed_share;
        if !net.is_zero() {
            let notes = self.repayment_notes(expense);
            out.push(LedgerTransaction {
                description: label,
                amount: net,
                category,
                date,
                dedupe_key: format!("SPLIT:{}", expense.id),
                notes: (!notes.is_empty()).then(|| notes.join("\n")),
            });
        }

        Planned::Transactions(out)
    }

    fn repayment_notes(&self, expense: &Expense) -> Vec<String> {
        let me = self.directory.my_id();
        expense
            .repayments
            .iter()
            .filter_map(|r| {
                if r.to == me {
                    Some(format!("{} -> Me: {}", self.directory.name_of(r.from), r.amount))
                } else if r.from == me {
                    Some(format!("Me -> {}: {}", self.directory.name_of(r.to), r.amount))
                } else {
                    None
                }
            })
            .collect()
    }

    /// Plan every expense and hand the results to `sink`.
    pub fn reconcile<S: LedgerSink + ?Sized>(&self, expenses: &[Expense], sink: &mut S) -> ReconcileReport {
        let mut report = ReconcileReport::default();
        for expense in expenses {
            let txns = match self.plan(expense) {
                Planned::Transactions(txns) => txns,
                Planned::Ignored(reason) => {
                    report.ignored.push((expense.id, reason));
                    continue;
                }
            };
            for txn in txns {
                info!(
                    expense = expense.id,
                    description = %txn.description,
                    category = %txn.category,
                    amount = %txn.amount,
                    key = %txn.dedupe_key,
                    "reconciling split expense"
                );
                match sink.add_transaction(&txn) {
                    Ok(true) => report.written.push(txn.dedupe_key),
                    Ok(false) => {
                        warn!(key = %txn.dedupe_key, category = %txn.category, "ledger declined split transaction");
                        report.declined.push(txn.dedupe_key);
                    }
                    Err(e) => {
                        warn!(key = %txn.dedupe_key, error = %e, "ledger failed on split transaction");
                        report.failed.push((txn.dedupe_key, e.to_string()));
                    }
                }
            }
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ExpenseUser, Repayment};
    use chrono::{TimeZone, Utc};

    fn user(id: i64, first: &str, last: &str) -> User {
        User {
            id,
            first_name: Some(first.to_string()),
            last_name: Some(last.to_string()),
        }
    }

    fn reconciler(identifier: Option<&str>) -> Reconciler {
        let dir = Directory::new(user(1, "Sam", "Lee"), vec![user(2, "Ana", "Ruiz")])
            .with_overrides(HashMap::from([(3, "Landlord".to_string())]));
        let table: ShorthandTable = [("GROC".to_string(), "Groceries".to_string())].into_iter().collect();
        Reconciler::new(dir, table, identifier).unwrap()
    }

    fn expense(description: &str, paid: i64, owed: i64) -> Expense {
        Expense {
            id: 55,
            description: description.to_string(),
            cost: Decimal::new(paid, 2),
            created_at: Utc.with_ymd_and_hms(2024, 5, 2, 18, 4, 11).unwrap(),
            deleted_at: None,
            users: vec![
                ExpenseUser {
                    user_id: 1,
                    paid_share: Decimal::new(paid, 2),
                    owed_share: Decimal::new(owed, 2),
                },
                ExpenseUser {
                    user_id: 2,
                    paid_share: Decimal::ZERO,
                    owed_share: Decimal::new(paid - owed, 2),
                },
            ],
            repayments: vec![Repayment {
                from: 2,
                to: 1,
                amount: Decimal::new(paid - owed, 2),
            }],
        }
    }

    fn txns(planned: Planned) -> Vec<LedgerTransaction> {
        match planned {
            Planned::Transactions(t) => t,
            Planned::Ignored(r) => panic!("ignored: {r:?}"),
        }
    }

    #[test]
    fn shorthand_main_transaction_is_net_share() {
        let out = txns(reconciler(None).plan(&expense("Costco M:GROC", 8420, 4210)));
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].description, "Splitwise: Costco");
        assert_eq!(out[0].amount, Decimal::new(4210, 2));
        assert_eq!(out[0].category, "Groceries");
        assert_eq!(out[0].dedupe_key, "SPLIT:55");
        assert_eq!(out[0].notes.as_deref(), Some("Ana Ruiz -> Me: 42.10"));
        assert_eq!(out[0].date.to_string(), "2024-05-02");
    }

    #[test]
    fn charge_modifier_adds_paid_share_charge_once() {
        let r = reconciler(Some("SL"));
        let out = txns(r.plan(&expense("Costco MC:GROC USL:C", 8420, 4210)));
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].dedupe_key, "SPLIT:CHARGE55");
        assert_eq!(out[0].amount, Decimal::new(-8420, 2));
    }

    #[test]
    fn user_flag_alone_triggers_charge() {
        let out = txns(reconciler(Some("SL")).plan(&expense("Costco M:GROC USL:C", 8420, 4210)));
        assert_eq!(out[0].dedupe_key, "SPLIT:CHARGE55");
        let out = txns(reconciler(Some("XX")).plan(&expense("Costco M:GROC USL:C", 8420, 4210)));
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn json_category_when_no_known_shorthand() {
        let out = txns(reconciler(None).plan(&expense(r#"Rent M:RENT {"category": "Mortgage & Rent"}"#, 0, 60000)));
        assert_eq!(out[0].category, "Mortgage & Rent");
        assert_eq!(out[0].description, "Splitwise: Rent");
        assert_eq!(out[0].amount, Decimal::new(-60000, 2));
    }

    #[test]
    fn zero_net_share_emits_nothing() {
        assert!(txns(reconciler(None).plan(&expense("Even M:GROC", 5000, 5000))).is_empty());
    }

    #[test]
    fn ignored_expenses() {
        let r = reconciler(None);
        assert_eq!(r.plan(&expense("Dinner", 100, 50)), Planned::Ignored(IgnoreReason::NoCategory));
        assert!(matches!(
            r.plan(&expense("M:GROC and M:GROC", 100, 50)),
            Planned::Ignored(IgnoreReason::AmbiguousShorthand(_))
        ));
        let mut deleted = expense("M:GROC", 100, 50);
        deleted.deleted_at = Some(deleted.created_at);
        assert_eq!(r.plan(&deleted), Planned::Ignored(IgnoreReason::Deleted));
        let mut foreign = expense("M:GROC", 100, 50);
        foreign.users.retain(|u| u.user_id != 1);
        assert_eq!(r.plan(&foreign), Planned::Ignored(IgnoreReason::NotParticipant));
    }

    #[test]
    fn names_resolve_through_overrides_me_friends_then_id() {
        let r = reconciler(None);
        assert_eq!(r.directory.name_of(3), "Landlord");
        assert_eq!(r.directory.name_of(1), "Sam Lee");
        assert_eq!(r.directory.name_of(2), "Ana Ruiz");
        assert_eq!(r.directory.name_of(9), "User 9");
    }
}
