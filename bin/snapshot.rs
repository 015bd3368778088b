//! # Snapshot Runner
//!
//! One-shot batch job: reads the block list, runs every configured adapter for
//! every block and writes the combined CSV.
//!
//! ## Usage
//!
//! ```bash
//! cargo run --release --bin snapshot -- --blocks hourly_blocks.csv --output outputData.csv
//! cargo run --release --bin snapshot -- --adapter zerolend-foxy --adapter zerolend-omni
//! ```
//!
//! Settings come from `Config.toml` (override with `--config`). A missing or
//! unreadable block file aborts the run with a non-zero exit code; individual
//! adapter failures are logged and skipped.

use anyhow::{Context, Result};
use balance_snapshot_sdk::{
    adapters::build_sub_fetchers,
    block_input::read_blocks_csv,
    orchestrator::{Orchestrator, OrchestratorConfig},
    output::write_rows_csv,
    rate_gate::RateGateRegistry,
    reporter::{LogReporter, SharedReporter},
    retry::RetryPolicy,
    settings::Settings,
};
use clap::Parser;
use log::info;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug, Parser)]
#[command(name = "snapshot", about = "Per-block DeFi balance snapshots to CSV")]
struct Args {
    /// Block list CSV (`number,timestamp`); defaults to `run.blocks_csv`
    #[arg(long)]
    blocks: Option<PathBuf>,

    /// Output CSV; defaults to `run.output_csv`
    #[arg(long)]
    output: Option<PathBuf>,

    /// Settings file
    #[arg(long, default_value = "Config.toml")]
    config: PathBuf,

    /// Only run the named adapter (repeatable)
    #[arg(long = "adapter")]
    adapters: Vec<String>,
}

#[cfg(feature = "observability")]
fn init_observability() -> Result<()> {
    tracing_subscriber::fmt()
        .json()
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to install tracing subscriber: {}", e))?;
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .install()
        .context("Failed to install Prometheus exporter")?;
    balance_snapshot_sdk::metrics::describe_metrics();
    Ok(())
}

#[cfg(not(feature = "observability"))]
fn init_observability() -> Result<()> {
    env_logger::init();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    init_observability()?;

    let args = Args::parse();
    let started = Instant::now();

    // 1. Load settings
    let settings = Settings::from_file(&args.config)
        .with_context(|| format!("Failed to load settings from {}", args.config.display()))?;
    let blocks_path = args.blocks.unwrap_or_else(|| PathBuf::from(&settings.run.blocks_csv));
    let output_path = args.output.unwrap_or_else(|| PathBuf::from(&settings.run.output_csv));

    // 2. Read blocks (fatal on failure)
    let blocks = read_blocks_csv(&blocks_path)
        .with_context(|| format!("Failed to read blocks from {}", blocks_path.display()))?;

    // 3. Build sub-fetchers behind shared rate gates
    let registry = RateGateRegistry::new(
        settings.rate_limit.max_requests,
        Duration::from_millis(settings.rate_limit.window_ms),
    )?;
    let reporter: SharedReporter = Arc::new(LogReporter);
    let fetchers = build_sub_fetchers(&settings, &args.adapters, &registry, Arc::clone(&reporter))?;

    // 4. Run
    let config = OrchestratorConfig {
        retry: RetryPolicy::new(
            settings.retry.max_attempts,
            Duration::from_millis(settings.retry.delay_ms),
        ),
        max_concurrent_blocks: settings.run.max_concurrent_blocks,
        consolidate_duplicates: settings.run.consolidate_duplicates,
    };
    let orchestrator = Orchestrator::new(fetchers, config, reporter);
    info!("Adapters: {}", orchestrator.fetcher_names().join(", "));
    let rows = orchestrator.run(&blocks).await;

    // 5. Write output
    write_rows_csv(&output_path, &rows)
        .with_context(|| format!("Failed to write {}", output_path.display()))?;
    info!(
        "Wrote {} rows to {} in {:.1}s",
        rows.len(),
        output_path.display(),
        started.elapsed().as_secs_f64()
    );
    Ok(())
}
