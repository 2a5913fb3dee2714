use anyhow::{Context, Result};
use autoledger_core::{time, LedgerSearch, RecurringTransactionStore, TransactionFilter};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

mod config;
mod journal;
mod recurring_cmd;
mod run_cmd;
mod state;

use recurring_cmd::{RecurringCommand, ScheduleOnceArgs};

#[derive(Parser, Debug)]
#[command(name = "autoledger", version, about = "Recurring transactions and shared-expense reconciliation")]
struct Cli {
    /// Path to the sqlite database (default: ~/.autoledger/autoledger.db)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Log level when RUST_LOG is unset
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Configure recurring ledger transactions
    Recurring {
        #[command(subcommand)]
        command: RecurringCommand,
    },

    /// Schedule a single future transaction
    ScheduleOnce(ScheduleOnceArgs),

    /// Realize due recurring transactions and reconcile Splitwise expenses
    Run {
        /// Show what would be written without changing anything
        #[arg(long, default_value_t = false)]
        dry_run: bool,

        #[arg(long, default_value_t = false)]
        skip_splitwise: bool,
    },

    /// Inspect the local ledger journal
    Ledger {
        #[command(subcommand)]
        command: LedgerCommand,
    },

    /// Manage ~/.autoledger/config.toml
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[derive(Subcommand, Debug)]
enum LedgerCommand {
    /// Find journal entries whose description, category or dedupe key contains QUERY
    Search { query: String },
}

#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Write a default config if none exists
    Init,
    /// Print the effective config
    Show,
}

fn init_tracing(log_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    match cli.command {
        Command::Config { command } => match command {
            ConfigCommand::Init => config::init_config()?,
            ConfigCommand::Show => config::show_config()?,
        },

        Command::Ledger { command } => match command {
            LedgerCommand::Search { query } => {
                let cfg = config::load_config()?;
                let sink = journal::JournalSink::open(&cfg.journal_path()?, &cfg.ledger.categories)?;
                let hits = sink.search_transactions(&TransactionFilter::search(query))?;
                for t in &hits {
                    println!("{} {} | {} | {} [{}]", t.date, t.description, t.amount, t.category, t.dedupe_key);
                }
                println!("{} match(es)", hits.len());
            }
        },

        Command::Recurring { command } => {
            let (cfg, store) = open(cli.db)?;
            let now = time::now_in(&cfg.schedule.timezone)?;
            recurring_cmd::run(command, &store, now)?;
        }

        Command::ScheduleOnce(args) => {
            let (cfg, store) = open(cli.db)?;
            let now = time::now_in(&cfg.schedule.timezone)?;
            recurring_cmd::schedule_once(args, &store, now)?;
        }

        Command::Run { dry_run, skip_splitwise } => {
            let (cfg, store) = open(cli.db)?;
            let now = time::now_in(&cfg.schedule.timezone)?;
            run_cmd::run(&cfg, &store, now, run_cmd::RunOptions { dry_run, skip_splitwise }).await?;
        }
    }

    Ok(())
}

fn open(db: Option<PathBuf>) -> Result<(config::Config, RecurringTransactionStore)> {
    let cfg = config::load_config()?;
    let path = match db {
        Some(p) => p,
        None => state::default_db_path()?,
    };
    let store = RecurringTransactionStore::open(&path).with_context(|| format!("open {}", path.display()))?;
    Ok((cfg, store))
}
