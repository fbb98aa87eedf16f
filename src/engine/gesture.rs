//! Tentative state for an in-progress move or resize.
//!
//! A [`Gesture`] owns a copy of the assignment taken when the pointer went
//! down. Pointer movement only ever changes the gesture's tentative machine
//! and span; the board's cache is untouched until release.

use ulid::Ulid;

use crate::limits::{MAX_SPAN_DURATION_MS, MIN_DURATION_MS, SNAP_MS};
use crate::model::*;

use super::window::TimeWindow;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GestureKind {
    /// Body drag: change machine and/or shift in time, duration preserved.
    Move,
    /// Left edge handle.
    ResizeStart,
    /// Right edge handle.
    ResizeEnd,
}

/// Pointer position in projection coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointerPos {
    /// Distance from the window start along the time axis.
    pub x: f64,
    /// Machine lane (or board column) under the pointer, if any.
    pub lane: Option<Ulid>,
}

impl PointerPos {
    pub fn new(x: f64, lane: Option<Ulid>) -> Self {
        Self { x, lane }
    }
}

/// Round to the nearest 15-minute boundary; exact halves round up.
pub fn snap(t: Ms) -> Ms {
    (t + SNAP_MS / 2).div_euclid(SNAP_MS) * SNAP_MS
}

#[derive(Debug, Clone)]
pub struct Gesture {
    kind: GestureKind,
    original: Assignment,
    origin: PointerPos,
    machine_id: Ulid,
    span: Span,
}

impl Gesture {
    pub fn begin(kind: GestureKind, original: Assignment, origin: PointerPos) -> Self {
        Self {
            kind,
            machine_id: original.machine_id,
            span: original.span,
            original,
            origin,
        }
    }

    pub fn kind(&self) -> GestureKind {
        self.kind
    }

    pub fn assignment_id(&self) -> Ulid {
        self.original.id
    }

    pub fn original(&self) -> &Assignment {
        &self.original
    }

    pub fn tentative_machine(&self) -> Ulid {
        self.machine_id
    }

    pub fn tentative_span(&self) -> Span {
        self.span
    }

    /// Recompute the tentative placement from the pointer's displacement.
    /// A non-finite pointer is ignored; displacement is capped at the longest valid span.
    pub fn drag_to(&mut self, pos: PointerPos, window: &TimeWindow) {
        if !pos.x.is_finite() {
            return;
        }
        let delta = window
            .duration_for(pos.x - self.origin.x)
            .clamp(-MAX_SPAN_DURATION_MS, MAX_SPAN_DURATION_MS);
        let original = self.original.span;
        match self.kind {
            GestureKind::Move => {
                if let Some(lane) = pos.lane {
                    self.machine_id = lane;
                }
                // No time displacement: an off-grid start stays where it is.
                self.span = if delta == 0 {
                    original
                } else {
                    original.moved_to(snap(original.start + delta))
                };
            }
            GestureKind::ResizeStart => {
                let start = snap(original.start + delta);
                // Past the fixed end or under the minimum: keep the last valid start.
                if start <= original.end - MIN_DURATION_MS {
                    self.span = Span::new(start, original.end);
                }
            }
            GestureKind::ResizeEnd => {
                let end = snap(original.end + delta);
                if end >= original.start + MIN_DURATION_MS {
                    self.span = Span::new(original.start, end);
                }
            }
        }
    }

    /// Fields that differ from the captured original.
    pub fn patch(&self) -> AssignmentPatch {
        AssignmentPatch {
            machine_id: (self.machine_id != self.original.machine_id).then_some(self.machine_id),
            span: (self.span != self.original.span).then_some(self.span),
        }
    }
}
