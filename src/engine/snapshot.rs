use std::collections::HashMap;

use ulid::Ulid;

use crate::model::*;

use super::conflict::find_conflicts;

/// The board's cached copy of the store, unfiltered.
///
/// Keeps insertion order for the projections and a per-machine [`Lane`] of
/// active assignments for conflict checks.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    machines: Vec<Machine>,
    machine_index: HashMap<Ulid, usize>,
    assignments: Vec<Assignment>,
    positions: HashMap<Ulid, usize>,
    lanes: HashMap<Ulid, Lane>,
}

impl Snapshot {
    pub fn new(machines: Vec<Machine>, assignments: Vec<Assignment>) -> Self {
        let machine_index = machines.iter().enumerate().map(|(i, m)| (m.id, i)).collect();
        let positions = assignments.iter().enumerate().map(|(i, a)| (a.id, i)).collect();
        let mut lanes: HashMap<Ulid, Lane> = HashMap::new();
        for a in assignments.iter().filter(|a| a.is_active()) {
            lanes.entry(a.machine_id).or_default().insert(LaneEntry {
                id: a.id,
                span: a.span,
            });
        }
        Self {
            machines,
            machine_index,
            assignments,
            positions,
            lanes,
        }
    }

    pub fn machines(&self) -> &[Machine] {
        &self.machines
    }

    pub fn assignments(&self) -> &[Assignment] {
        &self.assignments
    }

    pub fn machine(&self, id: &Ulid) -> Option<&Machine> {
        self.machine_index.get(id).map(|&i| &self.machines[i])
    }

    pub fn get(&self, id: &Ulid) -> Option<&Assignment> {
        self.positions.get(id).map(|&i| &self.assignments[i])
    }

    pub fn lane(&self, machine_id: &Ulid) -> Option<&Lane> {
        self.lanes.get(machine_id)
    }

    /// Active assignments on `machine_id` that `span` would collide with.
    pub fn conflicts_with(&self, machine_id: &Ulid, span: &Span, exclude: Option<Ulid>) -> Vec<LaneEntry> {
        match self.lanes.get(machine_id) {
            Some(lane) => find_conflicts(lane, span, exclude),
            None => Vec::new(),
        }
    }

    /// Swap in a new version of an existing assignment, keeping its position.
    /// Returns the previous version, or `None` if the id is not cached.
    pub fn replace(&mut self, assignment: Assignment) -> Option<Assignment> {
        let &pos = self.positions.get(&assignment.id)?;
        let previous = std::mem::replace(&mut self.assignments[pos], assignment);
        if previous.is_active()
            && let Some(lane) = self.lanes.get_mut(&previous.machine_id)
        {
            lane.remove(previous.id);
        }
        let current = &self.assignments[pos];
        if current.is_active() {
            self.lanes.entry(current.machine_id).or_default().insert(LaneEntry {
                id: current.id,
                span: current.span,
            });
        }
        Some(previous)
    }
}
