use ulid::Ulid;

use crate::model::{AssignmentStatus, Span};
use crate::repository::RepositoryError;

#[derive(Debug, Clone, PartialEq)]
pub enum EngineError {
    NotFound(Ulid),
    /// Completed and cancelled assignments are historical.
    NotEditable {
        id: Ulid,
        status: AssignmentStatus,
    },
    /// Rejected locally before any repository call.
    Invalid(&'static str),
    /// `with` already occupies `span` on the target machine.
    Conflict {
        assignment: Ulid,
        with: Ulid,
        span: Span,
    },
    NoGesture,
    GestureInProgress,
    Persistence(RepositoryError),
    Load(RepositoryError),
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::NotFound(id) => write!(f, "not found: {id}"),
            EngineError::NotEditable { id, status } => {
                write!(f, "assignment {id} is {} and cannot be edited", status.label())
            }
            EngineError::Invalid(msg) => write!(f, "invalid: {msg}"),
            EngineError::Conflict {
                assignment,
                with,
                span,
            } => write!(
                f,
                "assignment {assignment} conflicts with {with} at [{}, {})",
                span.start, span.end
            ),
            EngineError::NoGesture => write!(f, "no gesture in progress"),
            EngineError::GestureInProgress => write!(f, "another gesture is in progress"),
            EngineError::Persistence(e) => write!(f, "save failed: {e}"),
            EngineError::Load(e) => write!(f, "load failed: {e}"),
        }
    }
}

impl std::error::Error for EngineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            EngineError::Persistence(e) | EngineError::Load(e) => Some(e),
            _ => None,
        }
    }
}
