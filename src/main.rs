use accounts::Classifier;
use aggregate::{aggregate, AggregateOptions};
use anyhow::Context;
use clap::Parser;
use exclude::ExclusionIndex;
use read::read_records;
use render::write_entries;
use std::collections::BTreeSet;
use std::io::Read;
use std::path::PathBuf;
use tracing::{info, warn};

mod accounts;
mod aggregate;
mod data;
mod exclude;
mod read;
mod render;

/// Convert an expense-tracker CSV export into double-entry ledger journal
/// entries on stdout. Re-runs are idempotent when fed the previous output
/// through --excludes.
#[derive(Parser)]
#[command(name = "expenses2ledger", version)]
struct Cli {
    /// CSV export to convert
    export: PathBuf,

    /// Existing journal to deduplicate against ("-" reads stdin)
    #[arg(long, value_name = "FILE")]
    excludes: Option<String>,

    /// JSON table mapping export account names to ledger account paths
    #[arg(long, value_name = "FILE")]
    account_map: Option<PathBuf>,

    /// JSON table mapping export categories to counter-party account paths
    #[arg(long, value_name = "FILE")]
    category_map: Option<PathBuf>,

    /// Only merge same-second records that also share a counter-party
    #[arg(long)]
    group_by_category: bool,

    /// List the classified account paths seen in the export, then exit
    #[arg(long, conflicts_with = "list_payees")]
    list_accounts: bool,

    /// List the payees seen in the export, then exit
    #[arg(long)]
    list_payees: bool,

    /// Produce more verbose information (repeatable)
    #[arg(short, long, action = clap::ArgAction::Count, conflicts_with = "quiet")]
    verbose: u8,

    /// Inhibit any warnings
    #[arg(short, long)]
    quiet: bool,
}

fn main() -> Result<(), anyhow::Error> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    let classifier = Classifier::from_files(cli.account_map.as_deref(), cli.category_map.as_deref())
        .context("loading mapping tables")?;
    let export = std::fs::File::open(&cli.export)
        .with_context(|| format!("opening export {}", cli.export.display()))?;
    let records = read_records(export)?;
    info!(count = records.len(), "loaded export records");

    if cli.list_accounts {
        let mut paths = BTreeSet::new();
        for record in &records {
            paths.insert(classifier.account(&record.account));
            if record.is_split() {
                paths.extend(record.splits.iter().map(|s| classifier.category(&s.category)));
            } else {
                paths.insert(classifier.counterparty(record));
            }
        }
        for path in paths {
            println!("{path}");
        }
        return Ok(());
    }
    if cli.list_payees {
        let payees: BTreeSet<&str> = records.iter().filter_map(|r| r.payee.as_deref()).collect();
        for payee in payees {
            println!("{payee}");
        }
        return Ok(());
    }

    let excludes = load_excludes(cli.excludes.as_deref());
    info!(count = excludes.len(), "known reference ids");
    let options = AggregateOptions {
        group_by_category: cli.group_by_category,
    };
    let entries = aggregate(records, &classifier, &excludes, &options)?;
    info!(count = entries.len(), "emitting entries");
    write_entries(std::io::stdout().lock(), &entries)?;
    Ok(())
}

/// Missing or unreadable exclusion input means "exclude nothing", never a
/// fatal error; that keeps piped and first-run invocations uniform.
fn load_excludes(arg: Option<&str>) -> ExclusionIndex {
    let Some(arg) = arg else {
        return ExclusionIndex::default();
    };
    let mut text = String::new();
    let result = if arg == "-" {
        std::io::stdin().lock().read_to_string(&mut text)
    } else {
        std::fs::File::open(arg).and_then(|mut f| f.read_to_string(&mut text))
    };
    if let Err(e) = result {
        warn!("ignoring unreadable excludes input {arg}: {e}");
        return ExclusionIndex::default();
    }
    ExclusionIndex::parse(&text)
}

fn init_logging(verbose: u8, quiet: bool) {
    let default = match (quiet, verbose) {
        (true, _) => "error",
        (_, 0) => "warn",
        (_, 1) => "info",
        _ => "debug",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
