use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::state::{default_journal_path, ensure_autoledger_home};

pub const SPLITWISE_API_KEY_ENV: &str = "SPLITWISE_API_KEY";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub schedule: ScheduleSection,
    #[serde(default)]
    pub ledger: LedgerSection,
    #[serde(default)]
    pub splitwise: SplitwiseSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleSection {
    /// IANA zone used to decide what "now" is for due-ness.
    #[serde(default = "default_timezone")]
    pub timezone: String,
}

impl Default for ScheduleSection {
    fn default() -> Self {
        Self {
            timezone: default_timezone(),
        }
    }
}

fn default_timezone() -> String {
    "America/Chicago".to_string()
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LedgerSection {
    /// Defaults to ~/.autoledger/ledger.jsonl
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub journal_path: Option<PathBuf>,
    /// Categories the ledger accepts. Empty accepts everything.
    #[serde(default)]
    pub categories: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SplitwiseSection {
    /// Overridden by SPLITWISE_API_KEY.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// JSON object of shorthand code -> category.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shorthands_path: Option<PathBuf>,
    /// JSON object of user id -> display name overrides.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub names_path: Option<PathBuf>,
    /// Enables `U<identifier>:<modifiers>` flags.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_user_identifier: Option<String>,
    #[serde(default = "default_lookback_days")]
    pub lookback_days: i64,
    #[serde(default = "default_expense_limit")]
    pub expense_limit: u32,
}

impl Default for SplitwiseSection {
    fn default() -> Self {
        Self {
            api_key: None,
            shorthands_path: None,
            names_path: None,
            custom_user_identifier: None,
            lookback_days: default_lookback_days(),
            expense_limit: default_expense_limit(),
        }
    }
}

fn default_lookback_days() -> i64 {
    7
}

fn default_expense_limit() -> u32 {
    200
}

impl Config {
    pub fn journal_path(&self) -> Result<PathBuf> {
        match &self.ledger.journal_path {
            Some(p) => Ok(p.clone()),
            None => default_journal_path(),
        }
    }

    pub fn splitwise_api_key(&self) -> Option<String> {
        std::env::var(SPLITWISE_API_KEY_ENV)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .or_else(|| self.splitwise.api_key.clone())
    }
}

pub fn config_path() -> Result<PathBuf> {
    Ok(ensure_autoledger_home()?.join("config.toml"))
}

pub fn load_config() -> Result<Config> {
    load_config_from(&config_path()?)
}

pub fn load_config_from(p: &Path) -> Result<Config> {
    if !p.exists() {
        return Ok(Config::default());
    }
    let s = fs::read_to_string(p).with_context(|| format!("read {}", p.display()))?;
    toml::from_str(&s).with_context(|| format!("parse {}", p.display()))
}

pub fn save_config(cfg: &Config, p: &Path) -> Result<()> {
    let s = toml::to_string_pretty(cfg).context("serialize config")?;
    fs::write(p, s).with_context(|| format!("write {}", p.display()))?;
    Ok(())
}

pub fn init_config() -> Result<()> {
    let p = config_path()?;
    if p.exists() {
        println!("Config already exists: {}", p.display());
        return Ok(());
    }
    save_config(&Config::default(), &p)?;
    println!("Wrote {}", p.display());
    Ok(())
}

pub fn show_config() -> Result<()> {
    let p = config_path()?;
    let mut cfg = load_config_from(&p)?;
    if cfg.splitwise.api_key.is_some() {
        cfg.splitwise.api_key = Some("<redacted>".to_string());
    }
    println!("# {}", p.display());
    print!("{}", toml::to_string_pretty(&cfg).context("serialize config")?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_sections_fall_back_to_defaults() {
        let cfg: Config = toml::from_str("[ledger]\ncategories = [\"Groceries\"]\n").unwrap();
        assert_eq!(cfg.schedule.timezone, "America/Chicago");
        assert_eq!(cfg.ledger.categories, vec!["Groceries"]);
        assert_eq!(cfg.splitwise.lookback_days, 7);
        assert_eq!(cfg.splitwise.expense_limit, 200);
    }

    #[test]
    fn round_trips_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("config.toml");
        assert!(load_config_from(&p).unwrap().splitwise.api_key.is_none());

        let mut cfg = Config::default();
        cfg.schedule.timezone = "Europe/Berlin".to_string();
        cfg.splitwise.custom_user_identifier = Some("JD".to_string());
        save_config(&cfg, &p).unwrap();

        let back = load_config_from(&p).unwrap();
        assert_eq!(back.schedule.timezone, "Europe/Berlin");
        assert_eq!(back.splitwise.custom_user_identifier.as_deref(), Some("JD"));
    }
}
