//! SQLite-backed store of recurring transactions.
//!
//! One row per record. Amounts are stored as exact decimal text, rules in
//! their canonical RRULE form, cursors in the sortable storage timestamp
//! format. Every mutation touches a single row (or a single transaction for
//! paired records), so a failed run never leaves a cursor half-written.

use std::collections::HashSet;
use std::path::Path;
use std::str::FromStr;

use chrono::NaiveDateTime;
use rusqlite::{params, Connection, OptionalExtension, Row};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{debug, error, info};

use crate::error::{Error, Result};
use crate::expiry::ExpiryPolicy;
use crate::money;
use crate::occurrence::{is_exhausted, next_occurrence};
use crate::rule::{RecurrenceRule, RuleDescription};
use crate::time;

const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS recurring_transaction (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    description TEXT NOT NULL,
    amount TEXT NOT NULL,
    category TEXT NOT NULL,
    dedupe_seed TEXT NOT NULL,
    recurrence_rule TEXT NOT NULL,
    previous_occurrence TEXT NOT NULL,
    notes TEXT
);
CREATE INDEX IF NOT EXISTS idx_recurring_transaction_seed
    ON recurring_transaction(dedupe_seed);
";

const COLUMNS: &str =
    "id, description, amount, category, dedupe_seed, recurrence_rule, previous_occurrence, notes";

/// A stored recurring transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecurringTransaction {
    pub id: i64,
    pub description: String,
    pub amount: Decimal,
    pub category: String,
    pub dedupe_seed: String,
    #[serde(serialize_with = "serialize_rule")]
    pub recurrence_rule: RecurrenceRule,
    /// Last realized occurrence, or the rule's start before the first one.
    pub previous_occurrence: NaiveDateTime,
    pub notes: Option<String>,
}

fn serialize_rule<S: serde::Serializer>(rule: &RecurrenceRule, s: S) -> std::result::Result<S::Ok, S::Error> {
    s.collect_str(rule)
}

impl RecurringTransaction {
    /// The next occurrence after the cursor, if the rule has one left.
    pub fn next_occurrence(&self) -> Option<NaiveDateTime> {
        next_occurrence(&self.recurrence_rule, self.previous_occurrence)
    }

    /// Idempotency key for one realized occurrence of this record.
    pub fn dedupe_key(&self, occurrence: NaiveDateTime) -> String {
        format!("RECUR:{}:{}", self.dedupe_seed, time::to_storage(occurrence))
    }

    fn from_row(row: &Row<'_>) -> Result<Self> {
        let id: i64 = row.get(0)?;
        let amount_text: String = row.get(2)?;
        let rule_text: String = row.get(5)?;
        let cursor_text: String = row.get(6)?;

        let corrupt = |reason: String| Error::CorruptRecord { id, reason };
        let amount = Decimal::from_str(&amount_text)
            .map_err(|e| corrupt(format!("amount '{amount_text}': {e}")))?;
        let recurrence_rule = RecurrenceRule::parse(&rule_text, None)
            .map_err(|e| corrupt(format!("recurrence rule: {e}")))?;
        let previous_occurrence = time::from_storage(&cursor_text)
            .map_err(|e| corrupt(format!("previous occurrence: {e}")))?;

        Ok(Self {
            id,
            description: row.get(1)?,
            amount,
            category: row.get(3)?,
            dedupe_seed: row.get(4)?,
            recurrence_rule,
            previous_occurrence,
            notes: row.get(7)?,
        })
    }
}

/// Input for [`RecurringTransactionStore::create`].
#[derive(Debug, Clone)]
pub struct NewRecurringTransaction {
    pub description: String,
    pub amount: Decimal,
    pub category: String,
    pub rule: RuleDescription,
    /// Caller-chosen seed; a random one is generated when absent.
    pub dedupe_seed: Option<String>,
    pub notes: Option<String>,
}

impl NewRecurringTransaction {
    pub fn new(
        description: impl Into<String>,
        amount: Decimal,
        category: impl Into<String>,
        rule: RuleDescription,
    ) -> Self {
        Self {
            description: description.into(),
            amount,
            category: category.into(),
            rule,
            dedupe_seed: None,
            notes: None,
        }
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    pub fn with_dedupe_seed(mut self, seed: impl Into<String>) -> Self {
        self.dedupe_seed = Some(seed.into());
        self
    }

    /// The paired record that moves the same money out of `move_from`.
    pub fn offsetting(&self, move_from: &str) -> Self {
        Self {
            description: format!("{} (moved to {})", self.description, self.category),
            amount: -self.amount,
            category: move_from.to_string(),
            rule: self.rule.clone(),
            dedupe_seed: None,
            notes: self.notes.clone(),
        }
    }
}

/// Records selected by a due-query, plus whatever expiry removed first.
#[derive(Debug, Default)]
pub struct DueRecords {
    pub due: Vec<RecurringTransaction>,
    pub expired: Vec<RecurringTransaction>,
}

pub struct RecurringTransactionStore {
    conn: Connection,
}

impl RecurringTransactionStore {
    /// Open (or create) a store file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path)?;
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get::<_, String>(0))?;
        debug!(path = %path.display(), "opened recurring transaction store");
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    /// Validate and persist a new record.
    ///
    /// The rule is normalized with `now` as the default start, and the cursor
    /// starts at that start. Rules with nothing left to produce are rejected.
    pub fn create(&self, new: &NewRecurringTransaction, now: NaiveDateTime) -> Result<RecurringTransaction> {
        let rule = RecurrenceRule::normalize(&new.rule, Some(now))?;
        self.insert(new, rule)
    }

    /// Create a record and its offsetting twin in `move_from` atomically.
    pub fn create_moved(
        &self,
        new: &NewRecurringTransaction,
        move_from: &str,
        now: NaiveDateTime,
    ) -> Result<(RecurringTransaction, RecurringTransaction)> {
        let rule = RecurrenceRule::normalize(&new.rule, Some(now))?;
        let tx = self.conn.unchecked_transaction()?;
        let primary = self.insert(new, rule.clone())?;
        let offset = self.insert(&new.offsetting(move_from), rule)?;
        tx.commit()?;
        Ok((primary, offset))
    }

    fn insert(&self, new: &NewRecurringTransaction, rule: RecurrenceRule) -> Result<RecurringTransaction> {
        let cursor = rule.start();
        if is_exhausted(&rule, cursor) {
            return Err(Error::invalid_rule(format!(
                "rule produces no occurrences after its start: {}",
                rule.to_string().replace('\n', " ")
            )));
        }

        let dedupe_seed = new.dedupe_seed.clone().unwrap_or_else(generate_seed);
        self.conn.execute(
            "INSERT INTO recurring_transaction
                (description, amount, category, dedupe_seed, recurrence_rule, previous_occurrence, notes)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                new.description,
                money::to_storage(new.amount),
                new.category,
                dedupe_seed,
                rule.to_string(),
                time::to_storage(cursor),
                new.notes,
            ],
        )?;

        let record = RecurringTransaction {
            id: self.conn.last_insert_rowid(),
            description: new.description.clone(),
            amount: new.amount,
            category: new.category.clone(),
            dedupe_seed,
            recurrence_rule: rule,
            previous_occurrence: cursor,
            notes: new.notes.clone(),
        };
        info!(
            id = record.id,
            description = %record.description,
            amount = %record.amount,
            category = %record.category,
            "created recurring transaction"
        );
        Ok(record)
    }

    /// All records, oldest id first. Fails on the first undecodable row.
    pub fn list(&self) -> Result<Vec<RecurringTransaction>> {
        self.load_all()?.into_iter().collect()
    }

    pub fn get(&self, id: i64) -> Result<RecurringTransaction> {
        self.query_one(&format!("SELECT {COLUMNS} FROM recurring_transaction WHERE id = ?1"), id)?
            .ok_or(Error::NotFound(id))
    }

    pub fn find_by_seed(&self, seed: &str) -> Result<Option<RecurringTransaction>> {
        self.query_one(
            &format!("SELECT {COLUMNS} FROM recurring_transaction WHERE dedupe_seed = ?1 ORDER BY id LIMIT 1"),
            seed,
        )
    }

    fn query_one(&self, sql: &str, param: impl rusqlite::ToSql) -> Result<Option<RecurringTransaction>> {
        let mut stmt = self.conn.prepare(sql)?;
        let found = stmt
            .query_row([param], |row| Ok(RecurringTransaction::from_row(row)))
            .optional()?;
        found.transpose()
    }

    /// Every row, decoded independently so one bad row does not hide the rest.
    fn load_all(&self) -> Result<Vec<Result<RecurringTransaction>>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {COLUMNS} FROM recurring_transaction ORDER BY id"))?;
        let rows = stmt
            .query_map([], |row| Ok(RecurringTransaction::from_row(row)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Valid records only; corrupt rows are logged and left in place.
    pub fn list_valid(&self) -> Result<Vec<RecurringTransaction>> {
        let mut out = Vec::new();
        for row in self.load_all()? {
            match row {
                Ok(record) => out.push(record),
                Err(Error::CorruptRecord { id, reason }) => {
                    error!(id, %reason, "skipping corrupt recurring transaction");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(out)
    }

    /// Permanently delete a record.
    pub fn remove(&self, id: i64) -> Result<()> {
        let deleted = self
            .conn
            .execute("DELETE FROM recurring_transaction WHERE id = ?1", [id])?;
        if deleted == 0 {
            return Err(Error::NotFound(id));
        }
        info!(id, "removed recurring transaction");
        Ok(())
    }

    /// Move a record's cursor forward to `occurrence`.
    ///
    /// Refuses to move it backwards or leave it in place (`StaleCursor`), so
    /// replaying an already-committed advance is detectable.
    pub fn advance_cursor(&self, id: i64, occurrence: NaiveDateTime) -> Result<()> {
        let stamp = time::to_storage(occurrence);
        let updated = self.conn.execute(
            "UPDATE recurring_transaction SET previous_occurrence = ?2
             WHERE id = ?1 AND previous_occurrence < ?2",
            params![id, stamp],
        )?;
        if updated == 1 {
            info!(id, occurrence = %stamp, "advanced cursor");
            return Ok(());
        }

        let exists = self
            .conn
            .query_row("SELECT 1 FROM recurring_transaction WHERE id = ?1", [id], |_| Ok(()))
            .optional()?
            .is_some();
        if exists {
            Err(Error::StaleCursor { id, occurrence: stamp })
        } else {
            Err(Error::NotFound(id))
        }
    }

    /// Records whose next occurrence is at or before `now`, excluding `skip`.
    ///
    /// Exhausted records are purged first and never reported as due.
    pub fn due(&self, now: NaiveDateTime, skip: &HashSet<i64>) -> Result<DueRecords> {
        let expired = ExpiryPolicy.purge(self)?;
        let due: Vec<_> = self
            .list_valid()?
            .into_iter()
            .filter(|r| !skip.contains(&r.id))
            .filter(|r| r.next_occurrence().is_some_and(|occ| occ <= now))
            .collect();
        debug!(due = due.len(), expired = expired.len(), skipped = skip.len(), "due query");
        Ok(DueRecords { due, expired })
    }

    /// Overwrite a cursor without the forward-only guard.
    #[cfg(test)]
    pub(crate) fn force_cursor(&self, id: i64, cursor: NaiveDateTime) -> Result<()> {
        self.conn.execute(
            "UPDATE recurring_transaction SET previous_occurrence = ?2 WHERE id = ?1",
            params![id, time::to_storage(cursor)],
        )?;
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn raw_execute(&self, sql: &str) -> Result<()> {
        self.conn.execute_batch(sql)?;
        Ok(())
    }
}

/// 8 random bytes as 16 lowercase hex characters.
fn generate_seed() -> String {
    let bytes: [u8; 8] = rand::random();
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(y: i32, m: u32, d: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d).unwrap().and_hms_opt(0, 0, 0).unwrap()
    }

    fn rent() -> NewRecurringTransaction {
        NewRecurringTransaction::new(
            "Rent",
            Decimal::new(-150_000, 2),
            "Mortgage & Rent",
            RuleDescription::parse("DTSTART:20240101T000000\nRRULE:FREQ=MONTHLY").unwrap(),
        )
    }

    #[test]
    fn create_assigns_seed_and_cursor() {
        let store = RecurringTransactionStore::open_in_memory().unwrap();
        let rec = store.create(&rent(), at(2024, 1, 1)).unwrap();
        assert_eq!(rec.dedupe_seed.len(), 16);
        assert!(rec.dedupe_seed.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(rec.previous_occurrence, at(2024, 1, 1));
        assert_eq!(store.get(rec.id).unwrap(), rec);
    }

    #[test]
    fn create_rejects_one_off_and_exhausted_rules() {
        let store = RecurringTransactionStore::open_in_memory().unwrap();
        let mut one_off = rent();
        one_off.rule = RuleDescription::parse("DTSTART:20240101T000000").unwrap();
        assert!(matches!(store.create(&one_off, at(2024, 1, 1)), Err(Error::InvalidRule(_))));

        let mut impossible = rent();
        impossible.rule = RuleDescription::parse("FREQ=YEARLY;BYMONTH=2;BYMONTHDAY=30").unwrap();
        assert!(matches!(store.create(&impossible, at(2024, 1, 1)), Err(Error::InvalidRule(_))));
        assert!(store.list().unwrap().is_empty());
    }

    #[test]
    fn missing_start_defaults_to_now() {
        let store = RecurringTransactionStore::open_in_memory().unwrap();
        let mut new = rent();
        new.rule = RuleDescription::every("1w").unwrap();
        let rec = store.create(&new, at(2024, 5, 6)).unwrap();
        assert_eq!(rec.recurrence_rule.start(), at(2024, 5, 6));
        assert_eq!(rec.next_occurrence(), Some(at(2024, 5, 13)));
    }

    #[test]
    fn ids_are_never_reused() {
        let store = RecurringTransactionStore::open_in_memory().unwrap();
        let first = store.create(&rent(), at(2024, 1, 1)).unwrap();
        store.remove(first.id).unwrap();
        let second = store.create(&rent(), at(2024, 1, 1)).unwrap();
        assert!(second.id > first.id);
        assert!(matches!(store.remove(first.id), Err(Error::NotFound(_))));
    }

    #[test]
    fn move_from_creates_offsetting_pair() {
        let store = RecurringTransactionStore::open_in_memory().unwrap();
        let (primary, offset) = store.create_moved(&rent(), "Savings", at(2024, 1, 1)).unwrap();
        assert_eq!(offset.amount, -primary.amount);
        assert_eq!(offset.category, "Savings");
        assert_eq!(offset.description, "Rent (moved to Mortgage & Rent)");
        assert_ne!(offset.dedupe_seed, primary.dedupe_seed);
        assert_eq!(offset.recurrence_rule, primary.recurrence_rule);
        assert_eq!(store.list().unwrap().len(), 2);
    }

    #[test]
    fn cursor_only_moves_forward() {
        let store = RecurringTransactionStore::open_in_memory().unwrap();
        let rec = store.create(&rent(), at(2024, 1, 1)).unwrap();
        store.advance_cursor(rec.id, at(2024, 2, 1)).unwrap();
        assert!(matches!(
            store.advance_cursor(rec.id, at(2024, 2, 1)),
            Err(Error::StaleCursor { .. })
        ));
        assert!(matches!(
            store.advance_cursor(rec.id, at(2024, 1, 1)),
            Err(Error::StaleCursor { .. })
        ));
        assert!(matches!(store.advance_cursor(999, at(2024, 3, 1)), Err(Error::NotFound(999))));
        assert_eq!(store.get(rec.id).unwrap().previous_occurrence, at(2024, 2, 1));
    }

    #[test]
    fn due_respects_now_and_skip_set() {
        let store = RecurringTransactionStore::open_in_memory().unwrap();
        let rec = store.create(&rent(), at(2024, 1, 1)).unwrap();

        assert!(store.due(at(2024, 1, 31), &HashSet::new()).unwrap().due.is_empty());
        assert_eq!(store.due(at(2024, 2, 1), &HashSet::new()).unwrap().due.len(), 1);

        let skip = HashSet::from([rec.id]);
        assert!(store.due(at(2024, 2, 1), &skip).unwrap().due.is_empty());
    }

    #[test]
    fn find_by_seed_uses_caller_seed() {
        let store = RecurringTransactionStore::open_in_memory().unwrap();
        store.create(&rent().with_dedupe_seed("rent-2024"), at(2024, 1, 1)).unwrap();
        assert!(store.find_by_seed("rent-2024").unwrap().is_some());
        assert!(store.find_by_seed("other").unwrap().is_none());
    }

    #[test]
    fn corrupt_rows_are_reported_by_list_but_not_due() {
        let store = RecurringTransactionStore::open_in_memory().unwrap();
        store.create(&rent(), at(2024, 1, 1)).unwrap();
        store
            .raw_execute(
                "INSERT INTO recurring_transaction
                    (description, amount, category, dedupe_seed, recurrence_rule, previous_occurrence)
                 VALUES ('Bad', 'twelve', 'X', 'abc', 'FREQ=DAILY', '2024-01-01T00:00:00')",
            )
            .unwrap();

        assert!(matches!(store.list(), Err(Error::CorruptRecord { .. })));
        assert_eq!(store.list_valid().unwrap().len(), 1);
        assert_eq!(store.due(at(2024, 2, 1), &HashSet::new()).unwrap().due.len(), 1);
    }

    #[test]
    fn amount_reloads_with_its_entered_scale() {
        let store = RecurringTransactionStore::open_in_memory().unwrap();
        let rec = store.create(&rent(), at(2024, 1, 1)).unwrap();
        assert_eq!(store.get(rec.id).unwrap().amount.to_string(), "-1500.00");
    }

    #[test]
    fn record_serializes_rule_as_text() {
        let store = RecurringTransactionStore::open_in_memory().unwrap();
        let rec = store.create(&rent(), at(2024, 1, 1)).unwrap();
        let json = serde_json::to_value(&rec).unwrap();
        assert!(json["recurrence_rule"].as_str().unwrap().starts_with("DTSTART:20240101T000000"));
        assert_eq!(json["amount"], "-1500.00");
    }
}
