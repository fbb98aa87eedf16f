use serde::{Deserialize, Serialize};

use crate::limits::{DAY_MS, MINUTE_MS};
use crate::model::{Ms, Span};

/// How much time the board shows at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ZoomLevel {
    /// One day, high resolution.
    Fine,
    /// One week.
    Medium,
    /// Four weeks, low resolution.
    Coarse,
}

impl ZoomLevel {
    pub fn window_ms(self) -> Ms {
        match self {
            ZoomLevel::Fine => DAY_MS,
            ZoomLevel::Medium => 7 * DAY_MS,
            ZoomLevel::Coarse => 28 * DAY_MS,
        }
    }

    /// Forward/backward navigation moves by one full window.
    pub fn step_ms(self) -> Ms {
        self.window_ms()
    }

    /// Coordinate units per minute.
    pub fn scale(self) -> f64 {
        match self {
            ZoomLevel::Fine => 1.0,
            ZoomLevel::Medium => 0.2,
            ZoomLevel::Coarse => 0.05,
        }
    }

    pub fn finer(self) -> ZoomLevel {
        match self {
            ZoomLevel::Coarse => ZoomLevel::Medium,
            ZoomLevel::Medium | ZoomLevel::Fine => ZoomLevel::Fine,
        }
    }

    pub fn coarser(self) -> ZoomLevel {
        match self {
            ZoomLevel::Fine => ZoomLevel::Medium,
            ZoomLevel::Medium | ZoomLevel::Coarse => ZoomLevel::Coarse,
        }
    }

    pub fn parse(s: &str) -> Option<ZoomLevel> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fine" | "day" => Some(ZoomLevel::Fine),
            "medium" | "week" => Some(ZoomLevel::Medium),
            "coarse" | "month" => Some(ZoomLevel::Coarse),
            _ => None,
        }
    }
}

/// Start of the calendar day containing `t`, for a clock `utc_offset_ms` ahead of UTC.
pub fn start_of_day(t: Ms, utc_offset_ms: Ms) -> Ms {
    t - (t + utc_offset_ms).rem_euclid(DAY_MS)
}

/// The visible time range and its time→coordinate mapping.
///
/// The window always starts at the beginning of a calendar day. Coordinates
/// are measured from the window start, in units of `scale()` per minute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    anchor: Ms,
    zoom: ZoomLevel,
    utc_offset_ms: Ms,
}

impl TimeWindow {
    pub fn new(anchor: Ms, zoom: ZoomLevel) -> Self {
        Self::with_utc_offset(anchor, zoom, 0)
    }

    pub fn with_utc_offset(anchor: Ms, zoom: ZoomLevel, utc_offset_minutes: i32) -> Self {
        let utc_offset_ms = utc_offset_minutes as Ms * MINUTE_MS;
        Self {
            anchor: start_of_day(anchor, utc_offset_ms),
            zoom,
            utc_offset_ms,
        }
    }

    pub fn zoom(&self) -> ZoomLevel {
        self.zoom
    }

    pub fn start(&self) -> Ms {
        self.anchor
    }

    pub fn end(&self) -> Ms {
        self.anchor + self.zoom.window_ms()
    }

    pub fn span(&self) -> Span {
        Span::new(self.start(), self.end())
    }

    pub fn scale(&self) -> f64 {
        self.zoom.scale()
    }

    pub fn length_minutes(&self) -> f64 {
        (self.zoom.window_ms() / MINUTE_MS) as f64
    }

    pub fn set_zoom(&mut self, zoom: ZoomLevel) {
        self.zoom = zoom;
    }

    pub fn forward(&mut self) {
        self.anchor += self.zoom.step_ms();
    }

    pub fn backward(&mut self) {
        self.anchor -= self.zoom.step_ms();
    }

    /// Reset the anchor to the start of the day containing `now`.
    pub fn jump_to(&mut self, now: Ms) {
        self.anchor = start_of_day(now, self.utc_offset_ms);
    }

    /// The calendar day containing `t`, on this window's clock.
    pub fn day_containing(&self, t: Ms) -> Span {
        let start = start_of_day(t, self.utc_offset_ms);
        Span::new(start, start + DAY_MS)
    }

    // ── Coordinate mapping ───────────────────────────────────

    pub fn x_for(&self, t: Ms) -> f64 {
        self.length_for(t - self.start())
    }

    pub fn length_for(&self, duration: Ms) -> f64 {
        duration as f64 / MINUTE_MS as f64 * self.scale()
    }

    /// Duration covered by a coordinate distance, rounded to the millisecond.
    pub fn duration_for(&self, dx: f64) -> Ms {
        (dx / self.scale() * MINUTE_MS as f64).round() as Ms
    }

    pub fn time_at(&self, x: f64) -> Ms {
        self.start() + self.duration_for(x)
    }
}
