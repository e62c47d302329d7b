use super::detect::DuplicateReport;
use crate::error::{Error, Result};
use crate::storage::models::IssueStatus;
use std::fmt;

/// Where a file stands with respect to its intra-file duplicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateState {
    /// No duplicates; ingestion goes straight to the upserter.
    None,
    /// Duplicates found, waiting on a resolution.
    Pending,
    Resolving,
    Resolved,
    Error,
}

impl GateState {
    pub fn after_detection(report: &DuplicateReport) -> Self {
        if report.is_empty() {
            GateState::None
        } else {
            GateState::Pending
        }
    }

    pub fn from_issue_status(status: IssueStatus) -> Self {
        match status {
            IssueStatus::Pending => GateState::Pending,
            IssueStatus::Resolved => GateState::Resolved,
            IssueStatus::Error => GateState::Error,
        }
    }

    pub fn can_transition_to(self, next: GateState) -> bool {
        matches!(
            (self, next),
            (GateState::Pending, GateState::Resolving)
                | (GateState::Pending, GateState::Error)
                | (GateState::Resolving, GateState::Resolved)
                | (GateState::Resolving, GateState::Error)
        )
    }

    pub fn transition(self, next: GateState) -> Result<GateState> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(Error::InvalidTransition {
                from: self.to_string(),
                to: next.to_string(),
            })
        }
    }
}

impl fmt::Display for GateState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            GateState::None => "none",
            GateState::Pending => "pending",
            GateState::Resolving => "resolving",
            GateState::Resolved => "resolved",
            GateState::Error => "error",
        };
        f.write_str(s)
    }
}
