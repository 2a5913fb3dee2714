use anyhow::{Context, Result};
use autoledger_core::{
    occurrence, CatchUpProcessor, LedgerSink, RecurringTransaction, RecurringTransactionStore, RunReport,
    SkipReason,
};
use autoledger_splitwise::reconcile::Directory;
use autoledger_splitwise::{ReconcileReport, Reconciler, ShorthandTable, SplitwiseClient};
use chrono::{Duration, NaiveDateTime, Utc};
use tracing::{info, warn};

use crate::config::Config;
use crate::journal::{DryRunSink, JournalSink};

pub struct RunOptions {
    pub dry_run: bool,
    pub skip_splitwise: bool,
}

pub async fn run(cfg: &Config, store: &RecurringTransactionStore, now: NaiveDateTime, opts: RunOptions) -> Result<()> {
    info!(%now, dry_run = opts.dry_run, "starting auto-processor run");

    if opts.dry_run {
        preview_due(store, now)?;
        if !opts.skip_splitwise {
            let mut sink = DryRunSink::default();
            reconcile_splitwise(cfg, &mut sink).await?;
            println!("Splitwise: {} transaction(s) would be added", sink.seen.len());
        }
        return Ok(());
    }

    let journal_path = cfg.journal_path()?;
    let mut sink = JournalSink::open(&journal_path, &cfg.ledger.categories)?;

    let report = CatchUpProcessor::new(store, &mut sink).run(now)?;
    print_run_report(&report);

    if !opts.skip_splitwise {
        if let Some(report) = reconcile_splitwise(cfg, &mut sink).await? {
            print_reconcile_report(&report);
        }
    }

    info!("auto-processing complete");
    Ok(())
}

/// What a real run would realize, without touching cursors.
fn preview_due(store: &RecurringTransactionStore, now: NaiveDateTime) -> Result<()> {
    let due = due_occurrences(store, now)?;
    for (record, occ) in &due {
        println!(
            "would add: {} {} | {} | {} [{}]",
            occ.date(),
            record.description,
            record.amount,
            record.category,
            record.dedupe_key(*occ)
        );
    }
    println!("{} recurring occurrence(s) due", due.len());
    Ok(())
}

/// Every occurrence at or before `now`, skipping corrupt rows like a real run does.
fn due_occurrences(
    store: &RecurringTransactionStore,
    now: NaiveDateTime,
) -> Result<Vec<(RecurringTransaction, NaiveDateTime)>> {
    let mut out = Vec::new();
    for record in store.list_valid()? {
        let occs = occurrence::occurrences_between(&record.recurrence_rule, record.previous_occurrence, now);
        out.extend(occs.into_iter().map(|occ| (record.clone(), occ)));
    }
    Ok(out)
}

fn print_run_report(report: &RunReport) {
    println!(
        "Recurring: {} realized, {} skipped, {} expired",
        report.realized.len(),
        report.skipped.len(),
        report.expired.len()
    );
    for s in &report.skipped {
        let why = match &s.reason {
            SkipReason::Declined => "declined by ledger".to_string(),
            SkipReason::Failed(msg) => msg.clone(),
        };
        println!("  skipped #{} ({}): {}", s.id, s.occurrence.date(), why);
    }
}

fn print_reconcile_report(report: &ReconcileReport) {
    println!(
        "Splitwise: {} written, {} declined, {} failed, {} ignored",
        report.written.len(),
        report.declined.len(),
        report.failed.len(),
        report.ignored.len()
    );
    for (key, err) in &report.failed {
        println!("  failed {key}: {err}");
    }
}

async fn reconcile_splitwise<S: LedgerSink>(cfg: &Config, sink: &mut S) -> Result<Option<ReconcileReport>> {
    let Some(api_key) = cfg.splitwise_api_key() else {
        info!("no splitwise api key configured; skipping reconciliation");
        return Ok(None);
    };
    let sw = &cfg.splitwise;

    let shorthands = match &sw.shorthands_path {
        Some(p) => ShorthandTable::load(p)?,
        None => {
            warn!("no shorthands_path configured; only JSON categories will be recognized");
            ShorthandTable::default()
        }
    };

    let client = SplitwiseClient::new(&api_key)?;
    let me = client.current_user().await.context("fetch current splitwise user")?;
    let friends = client.friends().await.context("fetch splitwise friends")?;

    let mut directory = Directory::new(me, friends);
    if let Some(p) = &sw.names_path {
        directory = directory.with_overrides(Directory::load_overrides(p)?);
    }
    let reconciler = Reconciler::new(directory, shorthands, sw.custom_user_identifier.as_deref())?;

    let expenses = client
        .recent_expenses(Utc::now(), Duration::days(sw.lookback_days), sw.expense_limit)
        .await
        .context("fetch splitwise expenses")?;
    info!(count = expenses.len(), "processing splitwise expenses");

    Ok(Some(reconciler.reconcile(&expenses, sink)))
}
