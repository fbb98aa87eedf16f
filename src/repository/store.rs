use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use ulid::Ulid;

use crate::filter::AssignmentFilter;
use crate::limits::*;
use crate::model::*;

use super::RepositoryError;

struct Stored<T> {
    seq: u64,
    value: T,
}

/// Machines and assignments keyed by id, remembering insertion order.
pub struct InMemoryStore {
    machines: DashMap<Ulid, Stored<Machine>>,
    assignments: DashMap<Ulid, Stored<Assignment>>,
    next_seq: AtomicU64,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn check_job(job: &JobRef) -> Result<(), RepositoryError> {
    if job.code.len() > MAX_CODE_LEN || job.item_code.len() > MAX_CODE_LEN {
        return Err(RepositoryError::Invalid("job code too long"));
    }
    if job.customer.len() > MAX_NAME_LEN {
        return Err(RepositoryError::Invalid("customer name too long"));
    }
    Ok(())
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            machines: DashMap::new(),
            assignments: DashMap::new(),
            next_seq: AtomicU64::new(0),
        }
    }

    fn seq(&self) -> u64 {
        self.next_seq.fetch_add(1, Ordering::Relaxed)
    }

    // ── Reads ────────────────────────────────────────────────

    pub fn machine_count(&self) -> usize {
        self.machines.len()
    }

    pub fn assignment_count(&self) -> usize {
        self.assignments.len()
    }

    pub fn get_machine(&self, id: &Ulid) -> Option<Machine> {
        self.machines.get(id).map(|e| e.value.clone())
    }

    pub fn get_assignment(&self, id: &Ulid) -> Option<Assignment> {
        self.assignments.get(id).map(|e| e.value.clone())
    }

    pub fn machines(&self) -> Vec<Machine> {
        let mut rows: Vec<(u64, Machine)> = self
            .machines
            .iter()
            .map(|e| (e.seq, e.value.clone()))
            .collect();
        rows.sort_by_key(|(seq, _)| *seq);
        rows.into_iter().map(|(_, m)| m).collect()
    }

    pub fn assignments(&self, filter: &AssignmentFilter) -> Vec<Assignment> {
        let mut rows: Vec<(u64, Assignment)> = self
            .assignments
            .iter()
            .filter(|e| {
                let machine = self.machines.get(&e.value.machine_id);
                filter.matches(&e.value, machine.as_ref().map(|m| &m.value))
            })
            .map(|e| (e.seq, e.value.clone()))
            .collect();
        rows.sort_by_key(|(seq, _)| *seq);
        rows.into_iter().map(|(_, a)| a).collect()
    }

    // ── Event validation ─────────────────────────────────────

    /// Reject events that would break referential or structural rules.
    /// Time conflicts are not checked here; that is the board's job.
    pub fn check_event(&self, event: &Event) -> Result<(), RepositoryError> {
        match event {
            Event::MachineRegistered(machine) => {
                if self.machines.contains_key(&machine.id) {
                    return Err(RepositoryError::AlreadyExists(machine.id));
                }
                if self.machines.len() >= MAX_MACHINES {
                    return Err(RepositoryError::Invalid("too many machines"));
                }
                if machine.code.len() > MAX_CODE_LEN {
                    return Err(RepositoryError::Invalid("machine code too long"));
                }
                if machine.name.len() > MAX_NAME_LEN
                    || machine.group.as_ref().is_some_and(|g| g.len() > MAX_NAME_LEN)
                {
                    return Err(RepositoryError::Invalid("machine name too long"));
                }
            }
            Event::AssignmentCreated(assignment) => {
                if self.assignments.contains_key(&assignment.id) {
                    return Err(RepositoryError::AlreadyExists(assignment.id));
                }
                if self.assignments.len() >= MAX_ASSIGNMENTS {
                    return Err(RepositoryError::Invalid("too many assignments"));
                }
                if !self.machines.contains_key(&assignment.machine_id) {
                    return Err(RepositoryError::NotFound(assignment.machine_id));
                }
                check_span(&assignment.span).map_err(RepositoryError::Invalid)?;
                check_job(&assignment.job)?;
            }
            Event::AssignmentUpdated {
                id,
                machine_id,
                span,
            } => {
                if !self.assignments.contains_key(id) {
                    return Err(RepositoryError::NotFound(*id));
                }
                if !self.machines.contains_key(machine_id) {
                    return Err(RepositoryError::NotFound(*machine_id));
                }
                check_span(span).map_err(RepositoryError::Invalid)?;
            }
            Event::StatusChanged { id, .. } | Event::AssignmentDeleted { id } => {
                if !self.assignments.contains_key(id) {
                    return Err(RepositoryError::NotFound(*id));
                }
            }
        }
        Ok(())
    }

    // ── Event application ────────────────────────────────────

    pub fn apply_event(&self, event: &Event) {
        match event {
            Event::MachineRegistered(machine) => {
                let seq = self.seq();
                self.machines.insert(
                    machine.id,
                    Stored {
                        seq,
                        value: machine.clone(),
                    },
                );
            }
            Event::AssignmentCreated(assignment) => {
                let seq = self.seq();
                self.assignments.insert(
                    assignment.id,
                    Stored {
                        seq,
                        value: assignment.clone(),
                    },
                );
            }
            Event::AssignmentUpdated {
                id,
                machine_id,
                span,
            } => {
                if let Some(mut entry) = self.assignments.get_mut(id) {
                    entry.value.machine_id = *machine_id;
                    entry.value.span = *span;
                }
            }
            Event::StatusChanged { id, status } => {
                if let Some(mut entry) = self.assignments.get_mut(id) {
                    entry.value.status = *status;
                }
            }
            Event::AssignmentDeleted { id } => {
                self.assignments.remove(id);
            }
        }
    }

    /// Minimal event list that recreates the current state, in insertion order.
    pub fn snapshot_events(&self) -> Vec<Event> {
        let mut events: Vec<Event> = self
            .machines()
            .into_iter()
            .map(Event::MachineRegistered)
            .collect();
        events.extend(
            self.assignments(&AssignmentFilter::all())
                .into_iter()
                .map(Event::AssignmentCreated),
        );
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const T0: Ms = 1_767_225_600_000;

    fn machine(code: &str, group: Option<&str>) -> Machine {
        Machine {
            id: Ulid::new(),
            code: code.into(),
            name: format!("Machine {code}"),
            group: group.map(Into::into),
        }
    }

    fn assignment(machine_id: Ulid, start: Ms, end: Ms) -> Assignment {
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
            span: Span::new(start, end),
            status: AssignmentStatus::Scheduled,
            quantity_allocated: 10,
        }
    }

    fn commit(store: &InMemoryStore, event: Event) -> Result<(), RepositoryError> {
        store.check_event(&event)?;
        store.apply_event(&event);
        Ok(())
    }

    #[test]
    fn insertion_order_is_preserved() {
        let store = InMemoryStore::new();
        let m = machine("M1", None);
        commit(&store, Event::MachineRegistered(m.clone())).unwrap();
        let ids: Vec<Ulid> = (0..10)
            .map(|i| {
                let a = assignment(m.id, T0 + i * HOUR_MS, T0 + (i + 1) * HOUR_MS);
                let id = a.id;
                commit(&store, Event::AssignmentCreated(a)).unwrap();
                id
            })
            .collect();
        let listed: Vec<Ulid> = store
            .assignments(&AssignmentFilter::all())
            .iter()
            .map(|a| a.id)
            .collect();
        assert_eq!(listed, ids);
    }

    #[test]
    fn unknown_machine_rejected() {
        let store = InMemoryStore::new();
        let a = assignment(Ulid::new(), T0, T0 + HOUR_MS);
        assert!(matches!(
            store.check_event(&Event::AssignmentCreated(a)),
            Err(RepositoryError::NotFound(_))
        ));
    }

    #[test]
    fn duplicate_machine_rejected() {
        let store = InMemoryStore::new();
        let m = machine("M1", None);
        commit(&store, Event::MachineRegistered(m.clone())).unwrap();
        assert_eq!(
            commit(&store, Event::MachineRegistered(m.clone())),
            Err(RepositoryError::AlreadyExists(m.id))
        );
    }

    #[test]
    fn short_span_rejected() {
        let store = InMemoryStore::new();
        let m = machine("M1", None);
        commit(&store, Event::MachineRegistered(m.clone())).unwrap();
        let a = assignment(m.id, T0, T0 + 10 * MINUTE_MS);
        assert_eq!(
            commit(&store, Event::AssignmentCreated(a)),
            Err(RepositoryError::Invalid("shorter than 15 minutes"))
        );
    }

    #[test]
    fn update_moves_between_machines() {
        let store = InMemoryStore::new();
        let m1 = machine("M1", None);
        let m2 = machine("M2", None);
        commit(&store, Event::MachineRegistered(m1.clone())).unwrap();
        commit(&store, Event::MachineRegistered(m2.clone())).unwrap();
        let a = assignment(m1.id, T0, T0 + HOUR_MS);
        commit(&store, Event::AssignmentCreated(a.clone())).unwrap();

        let span = Span::new(T0 + HOUR_MS, T0 + 2 * HOUR_MS);
        commit(
            &store,
            Event::AssignmentUpdated {
                id: a.id,
                machine_id: m2.id,
                span,
            },
        )
        .unwrap();
        let stored = store.get_assignment(&a.id).unwrap();
        assert_eq!(stored.machine_id, m2.id);
        assert_eq!(stored.span, span);
        assert_eq!(store.assignment_count(), 1);
    }

    #[test]
    fn group_filter_uses_machine_tag() {
        let store = InMemoryStore::new();
        let hall_a = machine("A1", Some("Hall A"));
        let hall_b = machine("B1", Some("Hall B"));
        commit(&store, Event::MachineRegistered(hall_a.clone())).unwrap();
        commit(&store, Event::MachineRegistered(hall_b.clone())).unwrap();
        commit(&store, Event::AssignmentCreated(assignment(hall_a.id, T0, T0 + HOUR_MS))).unwrap();
        commit(&store, Event::AssignmentCreated(assignment(hall_b.id, T0, T0 + HOUR_MS))).unwrap();

        let listed = store.assignments(&AssignmentFilter::all().with_group("Hall B"));
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].machine_id, hall_b.id);
    }

    #[test]
    fn snapshot_replays_to_same_state() {
        let store = InMemoryStore::new();
        let m = machine("M1", None);
        commit(&store, Event::MachineRegistered(m.clone())).unwrap();
        let a = assignment(m.id, T0, T0 + HOUR_MS);
        commit(&store, Event::AssignmentCreated(a.clone())).unwrap();
        commit(
            &store,
            Event::StatusChanged {
                id: a.id,
                status: AssignmentStatus::Running,
            },
        )
        .unwrap();

        let rebuilt = InMemoryStore::new();
        for event in store.snapshot_events() {
            rebuilt.apply_event(&event);
        }
        assert_eq!(rebuilt.machines(), store.machines());
        assert_eq!(
            rebuilt.assignments(&AssignmentFilter::all()),
            store.assignments(&AssignmentFilter::all())
        );
    }
}
