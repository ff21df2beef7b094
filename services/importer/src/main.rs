//! Importer Service - loads the cleaned sales CSV into the analytics database
//!
//! Usage:
//!   cargo run --bin importer -- --source database/cleaned-data/cleaned_data.csv
//!
//!   # Credentials instead of trusted auth:
//!   DB_USER=etl DB_PASSWORD=... cargo run --bin importer
//!
//!   # Validate a file without touching the database:
//!   cargo run --bin importer -- --dry-run --json

use anyhow::{Context, Result};
use clap::Parser;
use importer::{Args, ImportConfig, LoadReport, MemoryStore, PgStore, Pipeline};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = ImportConfig::try_from(args).context("Invalid configuration")?;

    println!("=== Sales Importer ===");
    println!("Source: {}", config.source_path.display());
    println!("Mode: {}", if config.dry_run { "dry-run" } else { "live" });

    let options = config.pipeline_options();
    let report: LoadReport = if config.dry_run {
        let (_, result) = Pipeline::new(MemoryStore::new(), options).run().await;
        result?
    } else {
        println!("Target: {}", config.target());
        let store = PgStore::connect(config.connect_options()?)
            .await
            .context("Failed to connect to database")?;
        let (_, result) = Pipeline::new(store, options).run().await;
        result?
    };

    if config.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("\n{report}");
        println!("\n=== Import Complete ===");
    }

    Ok(())
}
