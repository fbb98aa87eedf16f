use ulid::Ulid;

use crate::limits::MINUTE_MS;
use crate::model::*;

pub const DEFAULT_BOTTLENECK_THRESHOLD: f64 = 90.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UtilizationBand {
    /// ≥ 90%
    Critical,
    /// 70–89%
    Elevated,
    /// 50–69%
    Healthy,
    /// < 50%
    UnderUtilized,
}

impl UtilizationBand {
    pub fn for_percent(percent: f64) -> Self {
        if percent >= 90.0 {
            UtilizationBand::Critical
        } else if percent >= 70.0 {
            UtilizationBand::Elevated
        } else if percent >= 50.0 {
            UtilizationBand::Healthy
        } else {
            UtilizationBand::UnderUtilized
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            UtilizationBand::Critical => "critical",
            UtilizationBand::Elevated => "elevated",
            UtilizationBand::Healthy => "healthy",
            UtilizationBand::UnderUtilized => "under_utilized",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MachineUtilization {
    pub machine_id: Ulid,
    /// Always within `[0, 100]`.
    pub percent: f64,
    pub band: UtilizationBand,
    pub bottleneck: bool,
}

/// Share of `window` that `machine_id` is loaded, in percent.
///
/// Sums the window-clipped duration of every non-cancelled assignment on the
/// machine. Overlapping source data is not merged, so the raw sum can exceed
/// the window; the result is clamped to 100.
pub fn utilization_percent<'a>(
    assignments: impl IntoIterator<Item = &'a Assignment>,
    machine_id: Ulid,
    window: &Span,
) -> f64 {
    let window_minutes = (window.duration_ms() / MINUTE_MS) as f64;
    if window_minutes <= 0.0 {
        return 0.0;
    }
    let loaded_ms: Ms = assignments
        .into_iter()
        .filter(|a| a.machine_id == machine_id && a.status.counts_toward_load())
        .filter_map(|a| a.span.clip(window))
        .map(|s| s.duration_ms())
        .sum();
    let loaded_minutes = loaded_ms as f64 / MINUTE_MS as f64;
    (100.0 * loaded_minutes / window_minutes).clamp(0.0, 100.0)
}

pub fn machine_utilization<'a>(
    assignments: impl IntoIterator<Item = &'a Assignment>,
    machine_id: Ulid,
    window: &Span,
    bottleneck_threshold: f64,
) -> MachineUtilization {
    let percent = utilization_percent(assignments, machine_id, window);
    MachineUtilization {
        machine_id,
        percent,
        band: UtilizationBand::for_percent(percent),
        bottleneck: percent >= bottleneck_threshold,
    }
}

/// One entry per machine, in the order given.
pub fn utilization(
    machines: &[&Machine],
    assignments: &[&Assignment],
    window: &Span,
    bottleneck_threshold: f64,
) -> Vec<MachineUtilization> {
    machines
        .iter()
        .map(|m| {
            machine_utilization(
                assignments.iter().copied(),
                m.id,
                window,
                bottleneck_threshold,
            )
        })
        .collect()
}
