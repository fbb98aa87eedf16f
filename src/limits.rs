use crate::model::{Ms, Span};

pub const MINUTE_MS: Ms = 60_000;
pub const HOUR_MS: Ms = 60 * MINUTE_MS;
pub const DAY_MS: Ms = 24 * HOUR_MS;

/// Shortest schedulable assignment.
pub const MIN_DURATION_MS: Ms = 15 * MINUTE_MS;
/// Grid that edited edges snap to.
pub const SNAP_MS: Ms = 15 * MINUTE_MS;

/// 2000-01-01T00:00:00Z
pub const MIN_VALID_TIMESTAMP_MS: Ms = 946_684_800_000;
/// 2200-01-01T00:00:00Z
pub const MAX_VALID_TIMESTAMP_MS: Ms = 7_258_118_400_000;
/// One assignment may not run longer than a year.
pub const MAX_SPAN_DURATION_MS: Ms = 366 * DAY_MS;

pub const MAX_MACHINES: usize = 10_000;
pub const MAX_ASSIGNMENTS: usize = 1_000_000;
pub const MAX_CODE_LEN: usize = 64;
pub const MAX_NAME_LEN: usize = 256;
pub const MAX_FILTER_TEXT_LEN: usize = 256;

/// Structural checks every stored interval must pass.
pub fn check_span(span: &Span) -> Result<(), &'static str> {
    if span.start >= span.end {
        return Err("start must be before end");
    }
    if span.duration_ms() < MIN_DURATION_MS {
        return Err("shorter than 15 minutes");
    }
    if span.start < MIN_VALID_TIMESTAMP_MS || span.end > MAX_VALID_TIMESTAMP_MS {
        return Err("timestamp out of range");
    }
    if span.duration_ms() > MAX_SPAN_DURATION_MS {
        return Err("span too wide");
    }
    Ok(())
}
