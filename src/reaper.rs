use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::model::Ms;
use crate::store::Store;

const REAP_INTERVAL: Duration = Duration::from_secs(60);
const COMPACT_CHECK_INTERVAL: Duration = Duration::from_secs(30);

/// Drop reservations that ended more than `retention_ms` before now.
pub async fn reap_once(store: &Store, clock: &dyn Clock, retention_ms: Ms) -> usize {
    let cutoff = clock.now() - retention_ms;
    match store.prune_ended(cutoff).await {
        Ok(0) => 0,
        Ok(n) => {
            info!("reaped {n} ended reservation(s)");
            n
        }
        Err(e) => {
            warn!("reaper failed: {e}");
            0
        }
    }
}

/// Compact the WAL once enough appends have piled up. Returns whether it ran.
pub async fn compact_if_due(store: &Store, threshold: u64) -> bool {
    let appends = store.wal_appends_since_compact().await;
    if appends < threshold {
        return false;
    }
    match store.compact().await {
        Ok(()) => {
            debug!("compacted after {appends} appends");
            true
        }
        Err(e) => {
            warn!("compaction failed: {e}");
            false
        }
    }
}

/// Background task that periodically prunes ended reservations.
pub async fn run_reaper(store: Arc<Store>, clock: Arc<dyn Clock>, retention_ms: Ms) {
    let mut interval = tokio::time::interval(REAP_INTERVAL);
    loop {
        interval.tick().await;
        reap_once(&store, clock.as_ref(), retention_ms).await;
    }
}

/// Background task that compacts the WAL when it has grown past `threshold`.
pub async fn run_compactor(store: Arc<Store>, threshold: u64) {
    let mut interval = tokio::time::interval(COMPACT_CHECK_INTERVAL);
    loop {
        interval.tick().await;
        compact_if_due(&store, threshold).await;
    }
}
