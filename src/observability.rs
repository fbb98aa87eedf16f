use std::net::SocketAddr;

// ── Board activity ──────────────────────────────────────────────

/// Counter: cache reloads. Labels: status.
pub const RELOADS_TOTAL: &str = "schedboard_reloads_total";

/// Histogram: reload latency in seconds.
pub const RELOAD_DURATION_SECONDS: &str = "schedboard_reload_duration_seconds";

/// Counter: settled commits. Labels: outcome (confirmed, rolled_back).
pub const COMMITS_TOTAL: &str = "schedboard_commits_total";

/// Counter: moves and resizes rejected at release for overlapping work.
pub const CONFLICTS_REJECTED_TOTAL: &str = "schedboard_conflicts_rejected_total";

/// Gauge: machines at or above the bottleneck threshold in the current window.
pub const BOTTLENECK_MACHINES: &str = "schedboard_bottleneck_machines";

// ── Journal ─────────────────────────────────────────────────────

/// Histogram: journal group-commit flush duration in seconds.
pub const JOURNAL_FLUSH_DURATION_SECONDS: &str = "schedboard_journal_flush_duration_seconds";

/// Histogram: journal group-commit batch size (events per flush).
pub const JOURNAL_FLUSH_BATCH_SIZE: &str = "schedboard_journal_flush_batch_size";

/// Counter: journal compactions. Labels: status.
pub const COMPACTIONS_TOTAL: &str = "schedboard_compactions_total";

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) -> Result<(), metrics_exporter_prometheus::BuildError> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}
