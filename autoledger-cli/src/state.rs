use anyhow::{Context, Result};
use std::fs;
use std::path::PathBuf;

pub fn autoledger_home() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME is not set")?;
    Ok(PathBuf::from(home).join(".autoledger"))
}

pub fn ensure_autoledger_home() -> Result<PathBuf> {
    let dir = autoledger_home()?;
    fs::create_dir_all(&dir).with_context(|| format!("create {}", dir.display()))?;
    Ok(dir)
}

pub fn default_db_path() -> Result<PathBuf> {
    Ok(ensure_autoledger_home()?.join("autoledger.db"))
}

pub fn default_journal_path() -> Result<PathBuf> {
    Ok(ensure_autoledger_home()?.join("ledger.jsonl"))
}
