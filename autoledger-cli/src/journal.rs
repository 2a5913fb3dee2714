//! Local ledger: an append-only JSON-lines journal implementing the sink contract.

use anyhow::{Context, Result};
use autoledger_core::{LedgerSearch, LedgerSink, LedgerTransaction, SinkError, TransactionFilter};
use std::collections::HashSet;
use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use tracing::{error, info};

pub struct JournalSink {
    path: PathBuf,
    categories: HashSet<String>,
    keys: HashSet<String>,
}

impl JournalSink {
    /// Open (without creating) the journal at `path`. An empty `categories`
    /// list accepts any category.
    pub fn open(path: &Path, categories: &[String]) -> Result<Self> {
        let keys = read_entries(path)?
            .into_iter()
            .map(|t| t.dedupe_key)
            .collect();
        Ok(Self {
            path: path.to_path_buf(),
            categories: categories.iter().cloned().collect(),
            keys,
        })
    }

    fn append(&self, txn: &LedgerTransaction) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
        }
        let mut f = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("open {}", self.path.display()))?;
        writeln!(f, "{}", serde_json::to_string(txn)?)?;
        f.sync_data()?;
        Ok(())
    }
}

impl LedgerSink for JournalSink {
    fn add_transaction(&mut self, txn: &LedgerTransaction) -> Result<bool, SinkError> {
        if txn.amount.is_zero() {
            return Ok(true);
        }
        if self.keys.contains(&txn.dedupe_key) {
            info!(key = %txn.dedupe_key, description = %txn.description, "duplicate found; skipping");
            return Ok(true);
        }
        if !self.categories.is_empty() && !self.categories.contains(&txn.category) {
            error!(category = %txn.category, "category does not exist in the ledger; skipping");
            return Ok(false);
        }

        self.append(txn).map_err(|e| SinkError::new(format!("{e:#}")))?;
        self.keys.insert(txn.dedupe_key.clone());
        info!(
            description = %txn.description,
            amount = %txn.amount,
            category = %txn.category,
            date = %txn.date,
            "added transaction"
        );
        Ok(true)
    }
}

impl LedgerSearch for JournalSink {
    fn search_transactions(&self, filter: &TransactionFilter) -> Result<Vec<LedgerTransaction>, SinkError> {
        let all = read_entries(&self.path).map_err(|e| SinkError::new(format!("{e:#}")))?;
        Ok(all.into_iter().filter(|t| filter.matches(t)).collect())
    }
}

fn read_entries(path: &Path) -> Result<Vec<LedgerTransaction>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let f = fs::File::open(path).with_context(|| format!("open {}", path.display()))?;
    let mut rows = Vec::new();
    for (n, line) in BufReader::new(f).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let txn = serde_json::from_str(&line)
            .with_context(|| format!("{}:{}: invalid journal entry", path.display(), n + 1))?;
        rows.push(txn);
    }
    Ok(rows)
}

/// Logs what would be written and reports success without touching anything.
#[derive(Debug, Default)]
pub struct DryRunSink {
    pub seen: Vec<LedgerTransaction>,
}

impl LedgerSink for DryRunSink {
    fn add_transaction(&mut self, txn: &LedgerTransaction) -> Result<bool, SinkError> {
        info!(
            description = %txn.description,
            amount = %txn.amount,
            category = %txn.category,
            date = %txn.date,
            key = %txn.dedupe_key,
            "dry run: would add transaction"
        );
        self.seen.push(txn.clone());
        Ok(true)
    }
}
