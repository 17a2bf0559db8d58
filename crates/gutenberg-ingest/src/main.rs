//! Gutenberg Ingest - catalog ingestion tool

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use gutenberg_common::logging::{init_logging, LogConfig, LogLevel};
use gutenberg_ingest::catalog::{postgres, Catalog, MemoryCatalog, PgCatalog};
use gutenberg_ingest::{DbConfig, IngestConfig, IngestionRun, RunReport};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "gutenberg-ingest")]
#[command(author, version, about = "Project Gutenberg catalog ingestion tool")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Download, parse and load the catalog
    Load {
        /// Number of descriptor directories to process
        #[arg(short, long)]
        limit: Option<usize>,

        /// Maximum concurrent content fetches
        #[arg(short, long)]
        concurrency: Option<usize>,

        /// Folder for the archive and its expansion
        #[arg(short, long)]
        data_dir: Option<PathBuf>,

        /// Reconcile into an in-memory catalog instead of PostgreSQL
        #[arg(long)]
        dry_run: bool,

        /// Print the run report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show catalog row counts
    Stats {
        #[arg(long)]
        json: bool,
    },

    /// Delete one item and its links
    DeleteItem {
        /// Gutenberg ebook number
        id: i64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };

    // environment variables take precedence over flags
    let log_config = LogConfig::builder()
        .level(log_level)
        .log_file_prefix("gutenberg-ingest")
        .build()
        .merge_env()?;

    let _log_guard = init_logging(&log_config)?;

    match cli.command {
        Command::Load {
            limit,
            concurrency,
            data_dir,
            dry_run,
            json,
        } => {
            let mut config = IngestConfig::from_env()?;
            if let Some(limit) = limit {
                config.descriptor_limit = limit;
            }
            if let Some(concurrency) = concurrency {
                config.concurrency = concurrency;
            }
            if let Some(data_dir) = data_dir {
                config.data_dir = data_dir;
            }

            let report = load(config, dry_run).await?;
            print_report(&report, json)?;
        }
        Command::Stats { json } => {
            let mut catalog = open_catalog().await?;
            let mut tx = catalog.begin().await?;
            let counts = tx.counts().await?;
            tx.rollback().await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&counts)?);
            } else {
                println!("Authors:    {}", counts.authors);
                println!("Categories: {}", counts.categories);
                println!("Items:      {}", counts.items);
            }
        }
        Command::DeleteItem { id } => {
            let mut catalog = open_catalog().await?;
            let mut tx = catalog.begin().await?;
            let deleted = tx.delete_item(id).await?;
            tx.commit().await?;

            if deleted {
                info!(item_id = id, "Item deleted");
                println!("Deleted item {}", id);
            } else {
                println!("Item {} not found", id);
            }
        }
    }

    Ok(())
}

async fn load(config: IngestConfig, dry_run: bool) -> Result<RunReport> {
    let run = IngestionRun::from_config(config)?;
    let cancel = cancel_on_ctrl_c();

    let report = if dry_run {
        info!("Dry run: reconciling into an in-memory catalog");
        let mut catalog = MemoryCatalog::new();
        run.execute(&mut catalog, &cancel).await?
    } else {
        let mut catalog = open_catalog().await?;
        run.execute(&mut catalog, &cancel).await?
    };

    Ok(report)
}

async fn open_catalog() -> Result<PgCatalog> {
    let db_config = DbConfig::from_env()?;
    let pool = postgres::connect(&db_config)
        .await
        .context("Failed to connect to catalog database")?;
    Ok(PgCatalog::acquire(&pool).await?)
}

fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling run");
            token.cancel();
        }
    });
    cancel
}

fn print_report(report: &RunReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }

    println!("Processed: {}", report.processed);
    println!("Created:   {}", report.created);
    println!("Updated:   {}", report.updated);
    println!("Unchanged: {}", report.unchanged);
    println!("Failed:    {}", report.failed);
    for failure in &report.failures {
        println!("  - {}: {}", failure.unit, failure.reason);
    }
    println!("Elapsed:   {:.2}s", report.elapsed.as_secs_f64());
    Ok(())
}
