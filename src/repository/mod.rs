//! The assignment store the board reads from and writes through.
//!
//! [`AssignmentRepository`] is the seam: the board only ever talks to a
//! `dyn AssignmentRepository`. [`ScheduleStore`] is the in-crate
//! implementation, either purely in memory or backed by a journal file.

mod schedule_store;
mod store;

pub use schedule_store::ScheduleStore;
pub use store::InMemoryStore;

use async_trait::async_trait;
use ulid::Ulid;

use crate::filter::AssignmentFilter;
use crate::model::{Assignment, AssignmentPatch, Machine};
use crate::notify::Subscription;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepositoryError {
    NotFound(Ulid),
    AlreadyExists(Ulid),
    Invalid(&'static str),
    Journal(String),
    Unavailable(String),
}

impl std::fmt::Display for RepositoryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RepositoryError::NotFound(id) => write!(f, "not found: {id}"),
            RepositoryError::AlreadyExists(id) => write!(f, "already exists: {id}"),
            RepositoryError::Invalid(msg) => write!(f, "invalid: {msg}"),
            RepositoryError::Journal(e) => write!(f, "journal error: {e}"),
            RepositoryError::Unavailable(e) => write!(f, "store unavailable: {e}"),
        }
    }
}

impl std::error::Error for RepositoryError {}

/// Read/write access to machines and assignments, plus change notifications.
#[async_trait]
pub trait AssignmentRepository: Send + Sync {
    async fn list_machines(&self) -> Result<Vec<Machine>, RepositoryError>;

    /// Assignments in insertion order.
    async fn list_assignments(
        &self,
        filter: &AssignmentFilter,
    ) -> Result<Vec<Assignment>, RepositoryError>;

    /// Apply a relocation/resize. Returns the stored assignment after the change.
    async fn update_assignment(
        &self,
        id: Ulid,
        patch: AssignmentPatch,
    ) -> Result<Assignment, RepositoryError>;

    /// Fires on every create, update and delete. Drop the subscription to unsubscribe.
    fn subscribe(&self) -> Subscription;
}
