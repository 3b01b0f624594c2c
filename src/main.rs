use std::sync::Arc;

use tracing::{info, warn};

use spotbook::clock::SystemClock;
use spotbook::config::{self, Config};
use spotbook::engine::Engine;
use spotbook::notify::NotifyHub;
use spotbook::reaper;
use spotbook::store::Store;

async fn shutdown_signal() -> std::io::Result<()> {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
        tokio::select! {
            result = ctrl_c => result?,
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await?;
    }
    Ok(())
}

async fn seed_spots(store: &Store, config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let Some(path) = &config.spots_file else {
        return Ok(());
    };
    let contents = std::fs::read_to_string(path)?;
    for name in config::parse_spot_names(&contents) {
        if let Err(e) = store.ensure_spot(&name).await {
            warn!("skipping spot {name:?}: {e}");
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let config = Config::from_env();
    spotbook::observability::init(config.metrics_port)?;

    // Ensure data directory exists
    std::fs::create_dir_all(&config.data_dir)?;

    let store = Arc::new(Store::open(&config.wal_path())?);
    seed_spots(&store, &config).await?;

    let notify = Arc::new(NotifyHub::new());
    let engine = Engine::new(store.clone(), store.clone(), notify);
    let spots = engine.spots(None).await?;

    info!("spotbookd running");
    info!("  data_dir: {}", config.data_dir.display());
    info!("  spots: {}", spots.len());
    info!("  reservations: {}", store.reservation_count());
    info!(
        "  metrics: {}",
        config
            .metrics_port
            .map_or("disabled".to_string(), |p| format!("http://0.0.0.0:{p}/metrics"))
    );

    let reaper_task = tokio::spawn(reaper::run_reaper(
        store.clone(),
        Arc::new(SystemClock),
        config.retention_ms,
    ));
    let compactor_task = tokio::spawn(reaper::run_compactor(
        store.clone(),
        config.compact_threshold,
    ));

    shutdown_signal().await?;
    info!("shutdown signal received");
    reaper_task.abort();
    compactor_task.abort();

    if let Err(e) = store.compact().await {
        warn!("final compaction failed: {e}");
    }
    info!("spotbookd stopped");
    Ok(())
}
