//! `oxbow restore` — load one archived batch back into its table

use anyhow::{Context, Result};
use clap::Args;

use oxbow::window::{ArchiveKey, MonthWindow};
use oxbow::{Database, RunConfig, build_object_store, run_restore};

#[derive(Args)]
pub struct RestoreArgs {
    /// Table to load into
    #[arg(short, long)]
    table: String,

    /// Month of the archive (YYYY-MM)
    #[arg(short, long)]
    month: String,

    /// Batch number within the month
    #[arg(short, long)]
    batch: i64,
}

pub async fn run(config: &RunConfig, args: &RestoreArgs) -> Result<()> {
    let window = MonthWindow::from_label(&args.month)
        .with_context(|| format!("parsing month {}", args.month))?;
    let key = ArchiveKey::new(args.table.clone(), window, args.batch);

    let store = build_object_store(&config.storage).context("building object store")?;
    let mut db = Database::connect(&config.database.url)
        .await
        .context("connecting to database")?;

    let outcome = run_restore(&mut db, &store, &key, &args.table)
        .await
        .with_context(|| format!("restoring {}", key))?;

    println!(
        "restored {} rows from {} into {}",
        outcome.rows_loaded, key, args.table
    );
    if outcome.records_skipped > 0 {
        println!(
            "  warning: {} malformed record(s) were skipped",
            outcome.records_skipped
        );
    }
    Ok(())
}
