use ulid::Ulid;

use crate::model::*;

/// Does `span` on `machine_id` overlap any other active assignment?
///
/// Completed and cancelled assignments never conflict. `exclude` skips the
/// assignment being edited. Stops at the first hit.
pub fn conflicts<'a>(
    assignments: impl IntoIterator<Item = &'a Assignment>,
    machine_id: Ulid,
    span: &Span,
    exclude: Option<Ulid>,
) -> bool {
    assignments.into_iter().any(|a| {
        a.machine_id == machine_id
            && a.is_active()
            && Some(a.id) != exclude
            && a.span.overlaps(span)
    })
}

/// Indexed variant over one machine's lane. Lanes only hold active assignments.
pub fn lane_conflicts(lane: &Lane, span: &Span, exclude: Option<Ulid>) -> bool {
    lane.overlapping(span).any(|e| Some(e.id) != exclude)
}

/// Every entry in `lane` that `span` would collide with, earliest first.
pub fn find_conflicts(lane: &Lane, span: &Span, exclude: Option<Ulid>) -> Vec<LaneEntry> {
    lane.overlapping(span)
        .filter(|e| Some(e.id) != exclude)
        .copied()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::limits::{HOUR_MS, MINUTE_MS};

    const DAY0: Ms = 1_767_571_200_000;

    fn at(h: Ms, m: Ms) -> Ms {
        DAY0 + h * HOUR_MS + m * MINUTE_MS
    }

    fn assignment(machine_id: Ulid, span: Span, status: AssignmentStatus) -> Assignment {
        Assignment {
            id: Ulid::new(),
            machine_id,
            job: JobRef {
                work_order_id: Ulid::new(),
                code: "WO-1".into(),
                item_code: "GEAR".into(),
                customer: "Acme".into(),
                quantity_requested: 10,
            },
            span,
            status,
            quantity_allocated: 10,
        }
    }

    fn lane_of(assignments: &[Assignment], machine_id: Ulid) -> Lane {
        let mut lane = Lane::default();
        for a in assignments {
            if a.machine_id == machine_id && a.is_active() {
                lane.insert(LaneEntry { id: a.id, span: a.span });
            }
        }
        lane
    }

    #[test]
    fn overlapping_move_is_rejected() {
        let m = Ulid::new();
        let a = assignment(m, Span::new(at(9, 0), at(11, 0)), AssignmentStatus::Scheduled);
        let b = assignment(Ulid::new(), Span::new(at(13, 0), at(14, 30)), AssignmentStatus::Scheduled);
        let all = vec![a.clone(), b.clone()];
        let candidate = Span::new(at(10, 30), at(12, 0));

        assert!(conflicts(&all, m, &candidate, Some(b.id)));
        let lane = lane_of(&all, m);
        assert!(lane_conflicts(&lane, &candidate, Some(b.id)));
        assert_eq!(find_conflicts(&lane, &candidate, Some(b.id))[0].id, a.id);
    }

    #[test]
    fn completed_work_does_not_block() {
        let m = Ulid::new();
        let done = assignment(m, Span::new(at(8, 0), at(10, 0)), AssignmentStatus::Completed);
        let all = vec![done];
        let candidate = Span::new(at(9, 0), at(9, 30));
        assert!(!conflicts(&all, m, &candidate, None));
        assert!(!lane_conflicts(&lane_of(&all, m), &candidate, None));
    }

    #[test]
    fn cancelled_work_does_not_block() {
        let m = Ulid::new();
        let void = assignment(m, Span::new(at(8, 0), at(10, 0)), AssignmentStatus::Cancelled);
        assert!(!conflicts(&[void], m, &Span::new(at(8, 0), at(10, 0)), None));
    }

    #[test]
    fn paused_and_running_block() {
        let m = Ulid::new();
        for status in [AssignmentStatus::Paused, AssignmentStatus::Running] {
            let a = assignment(m, Span::new(at(8, 0), at(10, 0)), status);
            assert!(conflicts(&[a], m, &Span::new(at(9, 45), at(11, 0)), None));
        }
    }

    #[test]
    fn touching_edges_do_not_conflict() {
        let m = Ulid::new();
        let a = assignment(m, Span::new(at(9, 0), at(11, 0)), AssignmentStatus::Scheduled);
        let all = vec![a];
        assert!(!conflicts(&all, m, &Span::new(at(11, 0), at(12, 0)), None));
        assert!(!conflicts(&all, m, &Span::new(at(8, 0), at(9, 0)), None));
    }

    #[test]
    fn other_machines_and_self_are_ignored() {
        let m = Ulid::new();
        let other = Ulid::new();
        let a = assignment(m, Span::new(at(9, 0), at(11, 0)), AssignmentStatus::Scheduled);
        let all = vec![a.clone()];
        assert!(!conflicts(&all, other, &a.span, None));
        assert!(!conflicts(&all, m, &Span::new(at(9, 30), at(10, 0)), Some(a.id)));
    }

    #[test]
    fn diagnostic_lists_every_conflict() {
        let m = Ulid::new();
        let all: Vec<Assignment> = (0..4)
            .map(|i| {
                assignment(
                    m,
                    Span::new(at(8 + i, 0), at(8 + i, 45)),
                    AssignmentStatus::Scheduled,
                )
            })
            .collect();
        let lane = lane_of(&all, m);
        let hits = find_conflicts(&lane, &Span::new(at(8, 30), at(10, 30)), None);
        let ids: Vec<Ulid> = hits.iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![all[0].id, all[1].id, all[2].id]);
    }
}
