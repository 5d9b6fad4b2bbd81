//! `oxbow backup` — archive and purge a date range

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::Args;

use oxbow::{BackupParams, Database, RunConfig, build_object_store, run_backup};

#[derive(Args)]
pub struct BackupArgs {
    /// Table to archive
    #[arg(short, long)]
    table: String,

    /// Maximum rows per archive file
    #[arg(short, long, default_value_t = 10_000)]
    batch_size: i64,

    /// First day of the range (YYYY-MM-DD)
    #[arg(long)]
    start: NaiveDate,

    /// Last day of the range, inclusive (YYYY-MM-DD)
    #[arg(long)]
    end: NaiveDate,

    /// Timestamp column that partitions the table into months
    #[arg(long, default_value = "created_at")]
    timestamp_column: String,
}

pub async fn run(config: &RunConfig, args: &BackupArgs) -> Result<()> {
    let store = build_object_store(&config.storage).context("building object store")?;

    let mut db = Database::connect(&config.database.url)
        .await
        .context("connecting to database")?;
    db.ensure_control_table()
        .await
        .context("preparing batch-sequence control table")?;

    let params = BackupParams {
        table: args.table.clone(),
        timestamp_column: args.timestamp_column.clone(),
        batch_size: args.batch_size,
        start: args.start,
        end: args.end,
    };

    let summary = run_backup(&mut db, &store, &params)
        .await
        .with_context(|| format!("backing up table {}", args.table))?;

    println!(
        "archived {} rows from {} in {} batches",
        summary.rows, args.table, summary.batches
    );
    for key in &summary.archives {
        println!("  {}", key);
    }
    Ok(())
}
