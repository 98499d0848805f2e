use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tracing::{info, warn};

use activity_ledger::config::{AppConfig, CONFIG_PATH};
use activity_ledger::connection::{ConnectionManager, WsConnector};
use activity_ledger::engine::ActivityEngine;
use activity_ledger::ledger::LedgerStore;
use activity_ledger::rates::{Rate, RateTable};
use activity_ledger::reporter;

#[derive(Parser)]
#[command(
    name = "activity-ledger",
    about = "Keep a points/earnings ledger from StreamElements channel activities"
)]
struct Args {
    /// Path to the TOML config file (optional; env vars override it)
    #[arg(long, default_value = CONFIG_PATH)]
    config: PathBuf,

    /// Directory holding the ledger files
    #[arg(long, default_value = ".")]
    data_dir: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    dotenvy::dotenv().ok();

    let mut config = AppConfig::load_or_default(&args.config)?;
    config.apply_env(|key| std::env::var(key).ok());
    let token = config.token()?.to_string();

    info!("INIT: always resync ledger files = {}", config.ledger.always_resync);
    info!("INIT: use points = {}", config.ledger.use_points);
    info!(
        "INIT: use earnings = {} | currency symbol = {}",
        config.ledger.use_earnings, config.ledger.currency_symbol
    );

    let rates = Arc::new(RateTable::new(&config.points, &config.earnings));
    log_rates("Points", &rates, |r| r.points);
    if config.ledger.use_earnings {
        log_rates("Earnings", &rates, |r| r.earnings);
    }

    let ledger = LedgerStore::open(&config.ledger, &args.data_dir);
    for entry in ledger.points().into_iter().chain(ledger.earnings()) {
        info!(
            "INIT: current {}: {} ({})",
            entry.name(),
            entry.display(),
            entry.path().display()
        );
    }

    let engine = ActivityEngine::new(rates, ledger, &config.ledger.currency_symbol);
    let connector = WsConnector::new(&config.connection.url)?;
    info!("INIT: feed endpoint: {}", connector.url());
    let delay = Duration::from_millis(config.connection.reconnect_delay_ms);
    let mut manager = ConnectionManager::new(connector, engine, &token, delay);

    info!("Listening for channel activities. Press Ctrl+C to stop.");
    manager.run_until(shutdown_signal()).await;

    reporter::report_exit_summary(&manager.exit_summary());
    Ok(())
}

/// Resolves on Ctrl+C. If the handler cannot be installed, never resolves.
async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received"),
        Err(e) => {
            warn!("Failed to listen for Ctrl+C: {e}");
            std::future::pending::<()>().await;
        }
    }
}

fn log_rates(label: &str, rates: &RateTable, pick: impl Fn(&Rate) -> rust_decimal::Decimal) {
    info!("INIT: {label} configuration:");
    info!("  per follow:             {}", pick(&rates.follow));
    info!("  per tier 1 sub:         {}", pick(&rates.tier_one_sub));
    info!("  per tier 2 sub:         {}", pick(&rates.tier_two_sub));
    info!("  per tier 3 sub:         {}", pick(&rates.tier_three_sub));
    info!("  per $1 donation:        {}", pick(&rates.tip_usd));
    info!("  per 100 bits donation:  {}", pick(&rates.hundred_bits));
}
