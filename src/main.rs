use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use schedboard::config::Config;
use schedboard::engine::{Activity, Board, Notice};
use schedboard::model::{Ms, now_ms};
use schedboard::repository::ScheduleStore;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let config = Config::from_env();
    schedboard::observability::init(config.metrics_port)?;

    // Ensure data directory exists
    std::fs::create_dir_all(&config.data_dir)?;
    let journal_path = config.journal_path();
    let store = Arc::new(ScheduleStore::open(&journal_path)?);

    let compactor_store = store.clone();
    let threshold = config.compact_threshold;
    tokio::spawn(async move {
        schedboard::compactor::run_compactor(compactor_store, threshold, Duration::from_secs(30)).await;
    });

    info!("schedboard monitoring {}", journal_path.display());
    info!("  zoom: {:?}", config.zoom);
    info!("  utc offset: {} min", config.utc_offset_minutes);
    info!("  bottleneck threshold: {}%", config.bottleneck_threshold);
    info!(
        "  metrics: {}",
        config
            .metrics_port
            .map_or("disabled".to_string(), |p| format!("http://0.0.0.0:{p}/metrics"))
    );

    let mut board = Board::new(store.clone(), config.board_settings(), now_ms());
    if board.reload().await.is_ok() {
        report(&mut board, now_ms());
    }

    loop {
        tokio::select! {
            activity = board.next_activity() => {
                match activity {
                    Some(Activity::Reloaded) => {
                        // The monitor follows the clock: today's window, every time.
                        let now = now_ms();
                        board.jump_to_now(now);
                        report(&mut board, now);
                    }
                    Some(Activity::ReloadFailed(e)) => tracing::warn!("reload failed: {e}"),
                    Some(Activity::Committed(_)) => {}
                    None => {
                        info!("change feed closed");
                        break;
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("shutdown signal received");
                break;
            }
        }
    }

    board.close();
    info!("schedboard stopped");
    Ok(())
}

/// Log the headline figures for the current window and any pending notices.
fn report(board: &mut Board, now: Ms) {
    let summary = board.summary(now);
    info!(
        "today: {} jobs, {} units running, next completion {}",
        summary.jobs_today,
        summary.running_quantity,
        summary
            .next_completion
            .map_or("none".to_string(), |t| format!("in {} min", (t - now) / 60_000))
    );
    for u in board.utilization() {
        if !u.bottleneck {
            continue;
        }
        let code = board
            .snapshot()
            .machine(&u.machine_id)
            .map_or("?", |m| m.code.as_str());
        tracing::warn!("bottleneck: {code} at {:.0}% ({})", u.percent, u.band.label());
    }
    for notice in board.drain_notices() {
        match notice {
            Notice::LoadFailed { error } => tracing::warn!("load failed: {error}"),
            other => info!("{other:?}"),
        }
    }
}
