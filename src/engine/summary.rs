use std::collections::HashMap;

use ulid::Ulid;

use crate::model::*;

use super::utilization::MachineUtilization;

/// Headline figures for the visible set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Summary {
    /// Assignments whose start falls on the current calendar day.
    pub jobs_today: usize,
    /// Total allocated quantity of running assignments.
    pub running_quantity: u64,
    pub bottlenecks: Vec<Ulid>,
    /// Soonest end among running assignments.
    pub next_completion: Option<Ms>,
    pub by_status: HashMap<AssignmentStatus, usize>,
}

impl Summary {
    pub fn count(&self, status: AssignmentStatus) -> usize {
        self.by_status.get(&status).copied().unwrap_or(0)
    }
}

pub fn summarize(assignments: &[&Assignment], utilization: &[MachineUtilization], today: &Span) -> Summary {
    let mut summary = Summary {
        bottlenecks: utilization
            .iter()
            .filter(|u| u.bottleneck)
            .map(|u| u.machine_id)
            .collect(),
        ..Summary::default()
    };

    for a in assignments {
        *summary.by_status.entry(a.status).or_default() += 1;
        if today.contains_instant(a.span.start) {
            summary.jobs_today += 1;
        }
        if a.status == AssignmentStatus::Running {
            summary.running_quantity += u64::from(a.quantity_allocated);
            summary.next_completion = Some(match summary.next_completion {
                Some(t) => t.min(a.span.end),
                None => a.span.end,
            });
        }
    }
    summary
}
