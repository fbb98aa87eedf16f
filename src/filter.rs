use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::limits::MAX_FILTER_TEXT_LEN;
use crate::model::{Assignment, AssignmentStatus, Machine};

/// Which assignments are visible. Applied once, upstream of every projection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignmentFilter {
    /// `None` admits every status.
    pub statuses: Option<HashSet<AssignmentStatus>>,
    /// Case-insensitive substring over job code, item code and customer.
    /// Stored lowercased.
    pub text: Option<String>,
    /// Only machines carrying this group tag.
    pub group: Option<String>,
}

impl AssignmentFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn with_statuses(mut self, statuses: impl IntoIterator<Item = AssignmentStatus>) -> Self {
        self.statuses = Some(statuses.into_iter().collect());
        self
    }

    pub fn with_text(mut self, text: &str) -> Self {
        let text = text.trim();
        self.text = (!text.is_empty()).then(|| text.to_lowercase());
        self
    }

    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    pub fn validate(&self) -> Result<(), &'static str> {
        if self.text.as_ref().is_some_and(|t| t.len() > MAX_FILTER_TEXT_LEN) {
            return Err("filter text too long");
        }
        Ok(())
    }

    pub fn is_unrestricted(&self) -> bool {
        self.statuses.is_none() && self.text.is_none() && self.group.is_none()
    }

    pub fn matches_machine(&self, machine: &Machine) -> bool {
        match &self.group {
            Some(group) => machine.group.as_deref() == Some(group.as_str()),
            None => true,
        }
    }

    pub fn matches_assignment(&self, assignment: &Assignment) -> bool {
        if let Some(statuses) = &self.statuses
            && !statuses.contains(&assignment.status)
        {
            return false;
        }
        if let Some(text) = &self.text {
            let job = &assignment.job;
            let hit = [&job.code, &job.item_code, &job.customer]
                .iter()
                .any(|field| field.to_lowercase().contains(text.as_str()));
            if !hit {
                return false;
            }
        }
        true
    }

    /// Full check. An assignment whose machine is unknown fails a group filter.
    pub fn matches(&self, assignment: &Assignment, machine: Option<&Machine>) -> bool {
        if !self.matches_assignment(assignment) {
            return false;
        }
        match (&self.group, machine) {
            (None, _) => true,
            (Some(_), Some(m)) => self.matches_machine(m),
            (Some(_), None) => false,
        }
    }
}
