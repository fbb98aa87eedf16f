use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Unix milliseconds, the only time type.
pub type Ms = i64;

pub fn now_ms() -> Ms {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as Ms)
        .unwrap_or(0)
}

/// Half-open interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Span {
    pub start: Ms,
    pub end: Ms,
}

impl Span {
    pub fn new(start: Ms, end: Ms) -> Self {
        debug_assert!(start < end, "Span start must be before end");
        Self { start, end }
    }

    pub fn duration_ms(&self) -> Ms {
        self.end - self.start
    }

    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn contains_instant(&self, t: Ms) -> bool {
        self.start <= t && t < self.end
    }

    /// Portion of `self` inside `window`, if any.
    pub fn clip(&self, window: &Span) -> Option<Span> {
        let start = self.start.max(window.start);
        let end = self.end.min(window.end);
        (start < end).then(|| Span::new(start, end))
    }

    /// Same duration, starting at `start`.
    pub fn moved_to(&self, start: Ms) -> Span {
        Span::new(start, start + self.duration_ms())
    }
}

/// Read-only reference data: a machine that assignments are placed on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Machine {
    pub id: Ulid,
    /// Short display code, e.g. `CNC-04`.
    pub code: String,
    pub name: String,
    /// Location or line the machine belongs to.
    pub group: Option<String>,
}

/// The work order an assignment draws its quantity from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRef {
    pub work_order_id: Ulid,
    pub code: String,
    pub item_code: String,
    pub customer: String,
    pub quantity_requested: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AssignmentStatus {
    Scheduled,
    Running,
    Paused,
    Completed,
    Cancelled,
}

impl AssignmentStatus {
    pub const ALL: [AssignmentStatus; 5] = [
        AssignmentStatus::Scheduled,
        AssignmentStatus::Running,
        AssignmentStatus::Paused,
        AssignmentStatus::Completed,
        AssignmentStatus::Cancelled,
    ];

    /// Active assignments occupy their machine and take part in conflict checks.
    pub fn is_active(self) -> bool {
        matches!(
            self,
            AssignmentStatus::Scheduled | AssignmentStatus::Running | AssignmentStatus::Paused
        )
    }

    /// Everything except cancelled work counts toward machine load.
    pub fn counts_toward_load(self) -> bool {
        self != AssignmentStatus::Cancelled
    }

    pub fn label(self) -> &'static str {
        match self {
            AssignmentStatus::Scheduled => "scheduled",
            AssignmentStatus::Running => "running",
            AssignmentStatus::Paused => "paused",
            AssignmentStatus::Completed => "completed",
            AssignmentStatus::Cancelled => "cancelled",
        }
    }
}

/// A job's quantity placed on a machine for `[span.start, span.end)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment {
    pub id: Ulid,
    pub machine_id: Ulid,
    pub job: JobRef,
    /// `span.start` is the scheduled start, `span.end` the scheduled end.
    pub span: Span,
    pub status: AssignmentStatus,
    pub quantity_allocated: u32,
}

impl Assignment {
    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }
}

/// Fields the relocation controller is allowed to change.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignmentPatch {
    pub machine_id: Option<Ulid>,
    pub span: Option<Span>,
}

impl AssignmentPatch {
    pub fn is_empty(&self) -> bool {
        self.machine_id.is_none() && self.span.is_none()
    }

    pub fn apply(&self, assignment: &mut Assignment) {
        if let Some(machine_id) = self.machine_id {
            assignment.machine_id = machine_id;
        }
        if let Some(span) = self.span {
            assignment.span = span;
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LaneEntry {
    pub id: Ulid,
    pub span: Span,
}

/// Active assignments of one machine, sorted by `span.start`.
#[derive(Debug, Clone, Default)]
pub struct Lane {
    pub entries: Vec<LaneEntry>,
}

impl Lane {
    /// Insert entry maintaining sort order by span.start.
    pub fn insert(&mut self, entry: LaneEntry) {
        let pos = self
            .entries
            .binary_search_by_key(&entry.span.start, |e| e.span.start)
            .unwrap_or_else(|e| e);
        self.entries.insert(pos, entry);
    }

    pub fn remove(&mut self, id: Ulid) -> Option<LaneEntry> {
        let pos = self.entries.iter().position(|e| e.id == id)?;
        Some(self.entries.remove(pos))
    }

    /// Return only entries whose span overlaps the query window.
    /// Uses binary search to skip entries starting at or after `query.end`.
    pub fn overlapping(&self, query: &Span) -> impl Iterator<Item = &LaneEntry> {
        // Everything at index >= right_bound starts at or after query.end → can't overlap.
        let right_bound = self.entries.partition_point(|e| e.span.start < query.end);
        self.entries[..right_bound]
            .iter()
            .filter(move |e| e.span.end > query.start)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// The journal record format, and the payload of change notifications.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    MachineRegistered(Machine),
    AssignmentCreated(Assignment),
    AssignmentUpdated {
        id: Ulid,
        machine_id: Ulid,
        span: Span,
    },
    StatusChanged {
        id: Ulid,
        status: AssignmentStatus,
    },
    AssignmentDeleted {
        id: Ulid,
    },
}

impl Event {
    pub fn label(&self) -> &'static str {
        match self {
            Event::MachineRegistered(_) => "machine_registered",
            Event::AssignmentCreated(_) => "assignment_created",
            Event::AssignmentUpdated { .. } => "assignment_updated",
            Event::StatusChanged { .. } => "status_changed",
            Event::AssignmentDeleted { .. } => "assignment_deleted",
        }
    }
}
