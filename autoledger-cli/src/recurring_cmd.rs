use anyhow::{bail, Context, Result};
use autoledger_core::{
    money, occurrence, time, NewRecurringTransaction, OneShot, RecurringTransaction,
    RecurringTransactionStore, RuleDescription, Scheduled, SingleOccurrenceScheduler,
};
use chrono::NaiveDateTime;
use clap::{Args, Subcommand};
use rust_decimal::Decimal;

#[derive(Subcommand, Debug)]
pub enum RecurringCommand {
    /// List the configured recurring transactions
    List,

    /// Add a new recurring transaction
    Add(AddArgs),

    /// Remove a recurring transaction
    Remove {
        #[arg(long)]
        id: i64,
    },

    /// Show the next occurrences of a recurring transaction
    Preview {
        #[arg(long)]
        id: i64,

        #[arg(long, default_value_t = 5)]
        limit: usize,
    },
}

#[derive(Args, Debug)]
pub struct AddArgs {
    /// Description of the transaction
    #[arg(short, long)]
    pub description: String,

    /// Amount; negative is a charge, positive a credit (e.g. -$1,200.00)
    #[arg(short, long, allow_hyphen_values = true)]
    pub amount: String,

    /// Ledger category for the transaction
    #[arg(short, long)]
    pub category: String,

    /// iCalendar recurrence, e.g. "FREQ=MONTHLY;BYMONTHDAY=1"
    #[arg(long, conflicts_with = "every", required_unless_present = "every")]
    pub rule: Option<String>,

    /// Fixed interval shorthand: 7d, 2w, 1m, 1y
    #[arg(long)]
    pub every: Option<String>,

    /// First date the rule is anchored to (YYYY-MM-DD [HH:MM]); defaults to now
    #[arg(long)]
    pub start: Option<String>,

    /// Last date an occurrence may fall on (inclusive)
    #[arg(long, conflicts_with = "count")]
    pub until: Option<String>,

    /// Stop after this many occurrences
    #[arg(long)]
    pub count: Option<u32>,

    #[arg(long)]
    pub notes: Option<String>,

    /// Also add the offsetting transaction that moves the money out of this category
    #[arg(long)]
    pub move_from: Option<String>,
}

#[derive(Args, Debug)]
pub struct ScheduleOnceArgs {
    #[arg(short, long)]
    pub description: String,

    #[arg(short, long, allow_hyphen_values = true)]
    pub amount: String,

    #[arg(short, long)]
    pub category: String,

    /// Date of the transaction (YYYY-MM-DD); must be in the future
    #[arg(long)]
    pub date: String,

    /// Idempotency string; scheduling the same string twice is a no-op
    #[arg(long)]
    pub dedupe: String,

    #[arg(long)]
    pub notes: Option<String>,
}

pub fn run(cmd: RecurringCommand, store: &RecurringTransactionStore, now: NaiveDateTime) -> Result<()> {
    match cmd {
        RecurringCommand::List => list(store),
        RecurringCommand::Add(args) => add(args, store, now),
        RecurringCommand::Remove { id } => {
            store.remove(id)?;
            println!("Removed recurring transaction {id}");
            Ok(())
        }
        RecurringCommand::Preview { id, limit } => preview(store, id, limit),
    }
}

fn parse_amount(raw: &str) -> Result<Decimal> {
    money::parse_amount(raw).with_context(|| format!("invalid amount '{raw}'"))
}

fn list(store: &RecurringTransactionStore) -> Result<()> {
    let records = store.list()?;
    if records.is_empty() {
        println!("No recurring transactions.");
        return Ok(());
    }
    for r in &records {
        print_record(r);
    }
    Ok(())
}

fn print_record(r: &RecurringTransaction) {
    let next = r
        .next_occurrence()
        .map(|o| o.date().to_string())
        .unwrap_or_else(|| "none".to_string());
    println!(
        "#{} {} | {} | {} | {} | last={} next={}",
        r.id,
        r.description,
        r.amount,
        r.category,
        r.recurrence_rule.to_string().replace('\n', " "),
        r.previous_occurrence.date(),
        next
    );
    if let Some(notes) = &r.notes {
        println!("    notes: {notes}");
    }
}

fn add(args: AddArgs, store: &RecurringTransactionStore, now: NaiveDateTime) -> Result<()> {
    let amount = parse_amount(&args.amount)?;
    let mut rule = match (&args.rule, &args.every) {
        (Some(text), _) => RuleDescription::parse(text)?,
        (None, Some(every)) => RuleDescription::every(every)?,
        (None, None) => bail!("pass --rule or --every"),
    };
    if let Some(start) = &args.start {
        rule.start = Some(time::parse_local(start)?);
    }
    if let Some(until) = &args.until {
        rule.until = Some(time::parse_local(until)?);
    }
    if let Some(count) = args.count {
        rule.count = Some(count);
    }

    let mut new = NewRecurringTransaction::new(args.description, amount, args.category, rule);
    new.notes = args.notes;

    match &args.move_from {
        Some(from) => {
            let (primary, offset) = store.create_moved(&new, from, now)?;
            println!("Added:");
            print_record(&primary);
            print_record(&offset);
        }
        None => {
            let record = store.create(&new, now)?;
            println!("Added:");
            print_record(&record);
        }
    }
    Ok(())
}

fn preview(store: &RecurringTransactionStore, id: i64, limit: usize) -> Result<()> {
    let record = store.get(id)?;
    print_record(&record);
    let upcoming = occurrence::upcoming(&record.recurrence_rule, record.previous_occurrence, limit);
    if upcoming.is_empty() {
        println!("  (no further occurrences)");
    }
    for occ in upcoming {
        println!("  {}  {}", occ.date(), record.dedupe_key(occ));
    }
    Ok(())
}

pub fn schedule_once(args: ScheduleOnceArgs, store: &RecurringTransactionStore, now: NaiveDateTime) -> Result<()> {
    let shot = OneShot {
        description: args.description,
        amount: parse_amount(&args.amount)?,
        category: args.category,
        date: time::parse_local(&args.date)?,
        dedupe: args.dedupe,
        notes: args.notes,
    };
    match SingleOccurrenceScheduler::new(store).schedule_once(&shot, now)? {
        Scheduled::Created(r) => {
            println!("Scheduled:");
            print_record(&r);
        }
        Scheduled::AlreadyScheduled(r) => {
            println!("Already scheduled as #{}", r.id);
        }
    }
    Ok(())
}
