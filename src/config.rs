use std::path::PathBuf;

use crate::engine::{BoardSettings, DEFAULT_BOTTLENECK_THRESHOLD, ZoomLevel};

/// Process settings, read from `SCHEDBOARD_*` environment variables.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub data_dir: PathBuf,
    pub metrics_port: Option<u16>,
    /// Journal appends since the last compaction before the compactor rewrites it.
    pub compact_threshold: u64,
    pub bottleneck_threshold: f64,
    /// Minutes ahead of UTC for calendar-day boundaries.
    pub utc_offset_minutes: i32,
    pub zoom: ZoomLevel,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            metrics_port: None,
            compact_threshold: 1000,
            bottleneck_threshold: DEFAULT_BOTTLENECK_THRESHOLD,
            utc_offset_minutes: 0,
            zoom: ZoomLevel::Fine,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Unset or unparsable values fall back to the default.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            data_dir: lookup("SCHEDBOARD_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            metrics_port: lookup("SCHEDBOARD_METRICS_PORT").and_then(|s| s.trim().parse().ok()),
            compact_threshold: lookup("SCHEDBOARD_COMPACT_THRESHOLD")
                .and_then(|s| s.trim().parse().ok())
                .unwrap_or(defaults.compact_threshold),
            bottleneck_threshold: lookup("SCHEDBOARD_BOTTLENECK_THRESHOLD")
                .and_then(|s| s.trim().parse::<f64>().ok())
                .filter(|t| (0.0..=100.0).contains(t))
                .unwrap_or(defaults.bottleneck_threshold),
            utc_offset_minutes: lookup("SCHEDBOARD_UTC_OFFSET_MINUTES")
                .and_then(|s| s.trim().parse::<i32>().ok())
                .filter(|m| m.abs() <= 14 * 60)
                .unwrap_or(defaults.utc_offset_minutes),
            zoom: lookup("SCHEDBOARD_ZOOM")
                .and_then(|s| ZoomLevel::parse(&s))
                .unwrap_or(defaults.zoom),
        }
    }

    pub fn journal_path(&self) -> PathBuf {
        self.data_dir.join("schedule.journal")
    }

    pub fn board_settings(&self) -> BoardSettings {
        BoardSettings {
            zoom: self.zoom,
            utc_offset_minutes: self.utc_offset_minutes,
            bottleneck_threshold: self.bottleneck_threshold,
        }
    }
}
