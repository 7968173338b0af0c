use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::engine::Engine;

/// How often the compactor checks the WAL append counter.
const COMPACT_CHECK_INTERVAL: Duration = Duration::from_secs(60);

/// Background task that force-settles every started open rent once per `period`.
pub async fn run_settlement_job(engine: Arc<Engine>, period: Duration) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // The first tick completes immediately; wait a full period before the first run.
    interval.tick().await;
    loop {
        interval.tick().await;
        let now = engine.now_ms();
        let report = engine.run_batch_settlement(now).await;
        if !report.failures.is_empty() {
            warn!(
                failed = report.failures.len(),
                settled = report.settled_count(),
                "settlement run finished with failures"
            );
        }
    }
}

/// Background task that rewrites the WAL once `threshold` events accumulated since the last compaction.
pub async fn run_compactor(engine: Arc<Engine>, threshold: u64) {
    let mut interval = tokio::time::interval(COMPACT_CHECK_INTERVAL);
    loop {
        interval.tick().await;
        compact_if_due(&engine, threshold).await;
    }
}

/// One compactor step. Returns whether the WAL was compacted.
pub async fn compact_if_due(engine: &Engine, threshold: u64) -> bool {
    let appends = engine.wal_appends_since_compact().await;
    if appends < threshold {
        debug!(appends, threshold, "compaction not due");
        return false;
    }
    match engine.compact_wal().await {
        Ok(()) => {
            info!(appends, "WAL compacted");
            true
        }
        Err(e) => {
            warn!(error = %e, "WAL compaction failed");
            false
        }
    }
}
