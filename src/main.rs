use anyhow::Result;
use powermap::clock::SystemClock;
use powermap::fetcher::HttpFetcher;
use powermap::{Config, Scheduler};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load().map_err(|e| {
        eprintln!("Failed to load configuration: {}", e);
        e
    })?;
    config.validate()?;

    powermap::logging::init_logging(&config.logging)?;
    info!(
        "PowerMap {} starting with {} sources",
        env!("APP_VERSION"),
        config.sources.len()
    );

    let fetcher = Arc::new(HttpFetcher::new(&config.fetch)?);
    let clock = Arc::new(SystemClock::new(config.tz()?));
    let mut scheduler = Scheduler::new(&config, fetcher, clock);

    // Initial refresh: every source once, concurrently
    for (id, outcome) in scheduler.refresh_all().await {
        info!("Initial refresh {}: {}", id, outcome);
    }
    for handle in scheduler.handles() {
        match serde_json::to_string(handle.latest().as_ref()) {
            Ok(json) => info!("{}", json),
            Err(e) => warn!("Failed to serialize snapshot: {}", e),
        }
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut loops = scheduler.spawn(shutdown_rx);

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
    }
    info!("Shutdown signal received");
    shutdown_tx.send_replace(true);

    while let Some(joined) = loops.join_next().await {
        if let Err(e) = joined {
            error!("Polling loop ended abnormally: {}", e);
        }
    }
    info!("Shutdown complete");
    Ok(())
}
