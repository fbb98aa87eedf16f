use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::repository::ScheduleStore;

/// Background task that compacts the journal once enough appends pile up.
pub async fn run_compactor(store: Arc<ScheduleStore>, threshold: u64, every: Duration) {
    let mut interval = tokio::time::interval(every);
    loop {
        interval.tick().await;
        compact_if_needed(&store, threshold).await;
    }
}

/// Returns whether a compaction ran.
pub async fn compact_if_needed(store: &ScheduleStore, threshold: u64) -> bool {
    if !store.is_durable() {
        return false;
    }
    let appends = store.appends_since_compact().await;
    if appends < threshold {
        return false;
    }
    match store.compact().await {
        Ok(()) => {
            metrics::counter!(crate::observability::COMPACTIONS_TOTAL, "status" => "ok").increment(1);
            info!("compacted journal after {appends} appends");
            true
        }
        Err(e) => {
            metrics::counter!(crate::observability::COMPACTIONS_TOTAL, "status" => "error").increment(1);
            warn!("journal compaction failed: {e}");
            false
        }
    }
}
