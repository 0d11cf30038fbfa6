//! signal-etl CLI: run market data jobs against a SQLite database.
//!
//! Commands:
//! - `run <source>`: fetch, validate and upsert one source
//! - `run-all`: every source in sequence, each independent of the others
//! - `init-db`: create all destination tables
//! - `sources`: list sources with their table and natural key

mod logging;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

use signal_etl_core::store::Store;
use signal_etl_core::{EtlConfig, FetchRequest, HttpFetcher, Pipeline, Source, SourceKind};

#[derive(Parser)]
#[command(
    name = "signal-etl",
    version,
    about = "Batch ETL for crypto, gold, news sentiment, S&P 500 and treasury yield data"
)]
struct Cli {
    /// Path to a TOML config file. Defaults to ./signal-etl.toml if present.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log level used when RUST_LOG is unset.
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one job: crypto, gold, news_sentiment, sp500 or treasury_yield.
    Run {
        source: SourceKind,

        /// Fetch, transform and validate only; do not write to the database.
        #[arg(long, default_value_t = false)]
        dry_run: bool,
    },
    /// Run every job in sequence.
    RunAll {
        #[arg(long, default_value_t = false)]
        dry_run: bool,
    },
    /// Create all destination tables (safe to re-run).
    InitDb,
    /// List the available sources.
    Sources,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(&cli.log_level);

    match cli.command {
        Commands::Run { source, dry_run } => {
            let config = load_config(cli.config.as_deref())?;
            run_jobs(&config, &[source], dry_run)
        }
        Commands::RunAll { dry_run } => {
            let config = load_config(cli.config.as_deref())?;
            run_jobs(&config, &SourceKind::ALL, dry_run)
        }
        Commands::InitDb => {
            let config = load_config(cli.config.as_deref())?;
            cmd_init_db(&config)
        }
        Commands::Sources => {
            cmd_sources();
            Ok(())
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<EtlConfig> {
    EtlConfig::load(path).context("failed to load configuration")
}

/// Resolve every request first so a missing key fails before any job runs.
fn run_jobs(config: &EtlConfig, kinds: &[SourceKind], dry_run: bool) -> Result<()> {
    let jobs = kinds
        .iter()
        .map(|&kind| -> Result<(Box<dyn Source>, FetchRequest)> {
            let source = kind.source();
            let request = config.request_for(source.as_ref())?;
            Ok((source, request))
        })
        .collect::<Result<Vec<_>>>()?;

    let fetcher = HttpFetcher::new()?;
    for (source, request) in jobs {
        let report = Pipeline::new(source.as_ref(), &fetcher, request, &config.database.path)
            .dry_run(dry_run)
            .run();
        println!("[{}] {}", report.source, report.outcome);
    }
    Ok(())
}

fn cmd_init_db(config: &EtlConfig) -> Result<()> {
    let path = &config.database.path;
    let store = Store::open(path)
        .with_context(|| format!("failed to open database {}", path.display()))?;
    for kind in SourceKind::ALL {
        store
            .create_table(kind.schema())
            .with_context(|| format!("failed to create table for {kind}"))?;
        println!("Table ready: {}", kind.schema().table);
    }
    println!("Database: {}", path.display());
    Ok(())
}

fn cmd_sources() {
    println!("{:<16} {:<22} {}", "Source", "Table", "Natural key");
    println!("{}", "-".repeat(60));
    for kind in SourceKind::ALL {
        let schema = kind.schema();
        println!(
            "{:<16} {:<22} {}",
            kind.name(),
            schema.table,
            schema.natural_key.join(", ")
        );
    }
}
