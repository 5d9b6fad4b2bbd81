//! Oxbow command-line entry point

use std::env;
use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};

mod commands;

/// Oxbow archives cold rows from a PostgreSQL table into compressed CSV
/// files in object storage, deleting each batch as it is archived, and
/// loads a named archive file back on demand.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(name = "oxbow")]
struct Cli {
    /// YAML run configuration (defaults to $OXBOW_CONFIG)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Archive and purge one table, month by month, over a date range
    Backup(commands::backup::BackupArgs),

    /// Load one archived batch file back into its table
    Restore(commands::restore::RestoreArgs),
}

fn find_config(cli: &Cli) -> Result<PathBuf> {
    if let Some(path) = &cli.config {
        return Ok(path.clone());
    }
    match env::var("OXBOW_CONFIG") {
        Ok(val) => Ok(PathBuf::from(val)),
        Err(_) => Err(anyhow!(
            "no configuration: pass --config or set OXBOW_CONFIG"
        )),
    }
}

#[tokio::main]
async fn main() {
    diagnostics::init();

    if let Err(err) = main_result().await {
        eprintln!("{:?}", err);
        std::process::exit(1);
    }
}

async fn main_result() -> Result<()> {
    let cli = Cli::parse();

    let config_path = find_config(&cli)?;
    let config = oxbow::load_config(&config_path)
        .with_context(|| format!("loading config {}", config_path.display()))?;

    match &cli.command {
        Commands::Backup(args) => commands::backup::run(&config, args).await,
        Commands::Restore(args) => commands::restore::run(&config, args).await,
    }
}
