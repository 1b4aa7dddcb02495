//! Payout engine runner binary
//!
//! Opens the ledger, then either fires one ad-hoc run per configured
//! currency (`--once`) or starts the scheduler loop.

use anyhow::Context;
use ledger_core::Ledger;
use payout_engine::{Config, PayoutGenerator, PayoutRunRequest, PayoutScheduler};
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let config = match std::env::var("PAYOUT_CONFIG") {
        Ok(path) => Config::from_file(&path).context("Failed to load config file")?,
        Err(_) => Config::from_env().context("Failed to load config from environment")?,
    };

    tracing::info!(
        service = %config.service_name,
        version = %config.service_version,
        "Starting payout engine"
    );

    let mut ledger_config = ledger_core::Config::default();
    ledger_config.data_dir = config.ledger_data_dir.clone();
    let ledger = Arc::new(Ledger::open(ledger_config).context("Failed to open ledger")?);

    let stats = ledger.storage().get_stats()?;
    tracing::info!(
        events = stats.total_events,
        postings = stats.total_postings,
        payouts = stats.total_payouts,
        "Ledger opened"
    );

    let generator = Arc::new(PayoutGenerator::new(ledger, config.min_payout_cents));

    let once = std::env::args().any(|arg| arg == "--once");
    if once {
        for currency in &config.currencies {
            let summary = generator
                .run_payouts(PayoutRunRequest::today(*currency))
                .await?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        return Ok(());
    }

    let scheduler = Arc::new(PayoutScheduler::new(
        generator,
        config.schedule.clone(),
        config.currencies.clone(),
    ));
    let handle = tokio::spawn(scheduler.start());

    tokio::signal::ctrl_c().await?;
    handle.abort();

    tracing::info!("Shutting down payout engine");
    Ok(())
}
