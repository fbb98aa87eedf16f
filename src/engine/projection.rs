//! Pure projections of the visible set.
//!
//! [`visible`] applies the filter and the window once; timeline, resource
//! board and flat list all read the same [`VisibleSet`], so they can never
//! disagree about which assignments exist.

use std::collections::HashSet;

use ulid::Ulid;

use crate::filter::AssignmentFilter;
use crate::model::*;

use super::snapshot::Snapshot;
use super::window::TimeWindow;

/// Machines and assignments that pass the filter and touch the window.
#[derive(Debug, Clone, Default)]
pub struct VisibleSet<'a> {
    /// Insertion order.
    pub machines: Vec<&'a Machine>,
    /// Insertion order.
    pub assignments: Vec<&'a Assignment>,
}

pub fn visible<'a>(snapshot: &'a Snapshot, filter: &AssignmentFilter, window: &Span) -> VisibleSet<'a> {
    let machines: Vec<&Machine> = snapshot
        .machines()
        .iter()
        .filter(|m| filter.matches_machine(m))
        .collect();
    let shown: HashSet<Ulid> = machines.iter().map(|m| m.id).collect();
    let assignments = snapshot
        .assignments()
        .iter()
        .filter(|a| shown.contains(&a.machine_id))
        .filter(|a| a.span.overlaps(window))
        .filter(|a| filter.matches(a, snapshot.machine(&a.machine_id)))
        .collect();
    VisibleSet {
        machines,
        assignments,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TimelineBar<'a> {
    pub assignment: &'a Assignment,
    pub x: f64,
    pub width: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TimelineLane<'a> {
    pub machine: &'a Machine,
    pub collapsed: bool,
    /// Assignments in this lane, whether or not bars are rendered.
    pub bar_count: usize,
    /// Empty when collapsed.
    pub bars: Vec<TimelineBar<'a>>,
}

pub fn timeline<'a>(
    set: &VisibleSet<'a>,
    window: &TimeWindow,
    collapsed: &HashSet<Ulid>,
) -> Vec<TimelineLane<'a>> {
    set.machines
        .iter()
        .map(|&machine| {
            let is_collapsed = collapsed.contains(&machine.id);
            let on_lane = set.assignments.iter().filter(|a| a.machine_id == machine.id);
            let bar_count = on_lane.clone().count();
            let bars = if is_collapsed {
                Vec::new()
            } else {
                on_lane
                    .map(|&a| TimelineBar {
                        assignment: a,
                        x: window.x_for(a.span.start),
                        width: window.length_for(a.span.duration_ms()),
                    })
                    .collect()
            };
            TimelineLane {
                machine,
                collapsed: is_collapsed,
                bar_count,
                bars,
            }
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
pub struct BoardColumn<'a> {
    pub machine: &'a Machine,
    pub assignments: Vec<&'a Assignment>,
}

pub fn resource_board<'a>(set: &VisibleSet<'a>) -> Vec<BoardColumn<'a>> {
    set.machines
        .iter()
        .map(|&machine| BoardColumn {
            machine,
            assignments: set
                .assignments
                .iter()
                .copied()
                .filter(|a| a.machine_id == machine.id)
                .collect(),
        })
        .collect()
}

/// Every visible assignment, earliest start first. Ties keep insertion order.
pub fn flat_list<'a>(set: &VisibleSet<'a>) -> Vec<&'a Assignment> {
    let mut list = set.assignments.clone();
    list.sort_by_key(|a| a.span.start);
    list
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::window::ZoomLevel;
    use crate::limits::{DAY_MS, HOUR_MS, MINUTE_MS};

    const DAY0: Ms = 1_767_571_200_000;

    fn at(h: Ms, m: Ms) -> Ms {
        DAY0 + h * HOUR_MS + m * MINUTE_MS
    }

    fn machine(code: &str, group: &str) -> Machine {
        Machine {
            id: Ulid::new(),
            code: code.into(),
            name: code.into(),
            group: Some(group.into()),
        }
    }

    fn assignment(machine_id: Ulid, span: Span, customer: &str) -> Assignment {
        Assignment {
            id: Ulid::new(),
            machine_id,
            job: JobRef {
                work_order_id: Ulid::new(),
                code: "WO-4".into(),
                item_code: "FLANGE".into(),
                customer: customer.into(),
                quantity_requested: 12,
            },
            span,
            status: AssignmentStatus::Scheduled,
            quantity_allocated: 12,
        }
    }

    struct Fixture {
        snapshot: Snapshot,
        m1: Machine,
        m2: Machine,
        window: TimeWindow,
    }

    fn fixture() -> Fixture {
        let m1 = machine("M1", "Hall A");
        let m2 = machine("M2", "Hall B");
        let assignments = vec![
            assignment(m1.id, Span::new(at(13, 0), at(14, 0)), "Acme"),
            assignment(m1.id, Span::new(at(9, 0), at(10, 30)), "Globex"),
            assignment(m2.id, Span::new(at(9, 0), at(11, 0)), "Acme"),
            // Next day: outside a fine window.
            assignment(m2.id, Span::new(at(9, 0) + DAY_MS, at(10, 0) + DAY_MS), "Acme"),
        ];
        Fixture {
            snapshot: Snapshot::new(vec![m1.clone(), m2.clone()], assignments),
            m1,
            m2,
            window: TimeWindow::new(DAY0, ZoomLevel::Fine),
        }
    }

    #[test]
    fn window_excludes_out_of_range() {
        let f = fixture();
        let set = visible(&f.snapshot, &AssignmentFilter::all(), &f.window.span());
        assert_eq!(set.machines.len(), 2);
        assert_eq!(set.assignments.len(), 3);
    }

    #[test]
    fn timeline_bar_geometry() {
        let f = fixture();
        let set = visible(&f.snapshot, &AssignmentFilter::all(), &f.window.span());
        let lanes = timeline(&set, &f.window, &HashSet::new());
        assert_eq!(lanes[0].machine.id, f.m1.id);
        assert_eq!(lanes[0].bars.len(), 2);
        assert_eq!(lanes[0].bars[1].x, 540.0);
        assert_eq!(lanes[0].bars[1].width, 90.0);
    }

    #[test]
    fn collapsed_lane_keeps_count_without_bars() {
        let f = fixture();
        let set = visible(&f.snapshot, &AssignmentFilter::all(), &f.window.span());
        let collapsed: HashSet<Ulid> = [f.m1.id].into_iter().collect();
        let lanes = timeline(&set, &f.window, &collapsed);
        assert!(lanes[0].collapsed);
        assert_eq!(lanes[0].bar_count, 2);
        assert!(lanes[0].bars.is_empty());
        assert_eq!(lanes[1].bars.len(), 1);
    }

    #[test]
    fn board_columns_keep_insertion_order() {
        let f = fixture();
        let set = visible(&f.snapshot, &AssignmentFilter::all(), &f.window.span());
        let columns = resource_board(&set);
        let starts: Vec<Ms> = columns[0].assignments.iter().map(|a| a.span.start).collect();
        assert_eq!(starts, vec![at(13, 0), at(9, 0)]);
        assert_eq!(columns[1].machine.id, f.m2.id);
    }

    #[test]
    fn flat_list_is_stable_by_start() {
        let f = fixture();
        let set = visible(&f.snapshot, &AssignmentFilter::all(), &f.window.span());
        let list = flat_list(&set);
        let machines: Vec<Ulid> = list.iter().map(|a| a.machine_id).collect();
        // Two 09:00 starts keep insertion order: M1's before M2's.
        assert_eq!(machines, vec![f.m1.id, f.m2.id, f.m1.id]);
    }

    #[test]
    fn all_projections_share_the_filter() {
        let f = fixture();
        let filter = AssignmentFilter::all().with_text("ACME");
        let set = visible(&f.snapshot, &filter, &f.window.span());
        let timeline_total: usize = timeline(&set, &f.window, &HashSet::new())
            .iter()
            .map(|l| l.bar_count)
            .sum();
        let board_total: usize = resource_board(&set).iter().map(|c| c.assignments.len()).sum();
        assert_eq!(timeline_total, 2);
        assert_eq!(board_total, 2);
        assert_eq!(flat_list(&set).len(), 2);
    }

    #[test]
    fn group_filter_hides_machines() {
        let f = fixture();
        let filter = AssignmentFilter::all().with_group("Hall B");
        let set = visible(&f.snapshot, &filter, &f.window.span());
        assert_eq!(set.machines.len(), 1);
        assert_eq!(set.machines[0].id, f.m2.id);
        assert!(set.assignments.iter().all(|a| a.machine_id == f.m2.id));
    }
}
