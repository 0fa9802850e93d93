//! Plan execution aggregate
//!
//! Aggregates the status of all node executions under one run of a plan. The
//! record becomes terminal only when no node execution remains non-terminal.

use crate::status::Status;
use crate::{EngineError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Plan execution identifier - Value Object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PlanExecutionId(pub Uuid);

impl PlanExecutionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for PlanExecutionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for PlanExecutionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One runtime execution of a plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanExecution {
    pub uuid: PlanExecutionId,
    pub plan_id: Uuid,
    pub status: Status,
    pub start_ts: DateTime<Utc>,
    pub end_ts: Option<DateTime<Utc>>,
    pub version: u64,
}

impl PlanExecution {
    pub fn new(plan_id: Uuid) -> Self {
        Self {
            uuid: PlanExecutionId::new(),
            plan_id,
            status: Status::Running,
            start_ts: Utc::now(),
            end_ts: None,
            version: 0,
        }
    }

    pub fn transition_to(&mut self, to: Status) -> Result<()> {
        if self.status.is_terminal() {
            return Err(EngineError::invalid_status_transition(
                self.status.as_str(),
                to.as_str(),
            ));
        }
        Status::validate_transition(self.status, to)?;
        self.status = to;
        if to.is_terminal() {
            self.end_ts = Some(Utc::now());
        }
        Ok(())
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Derive the aggregate plan status from the statuses of its node
    /// executions. Returns `None` while anything is still flowing.
    pub fn calculate_status(node_statuses: &[Status]) -> Option<Status> {
        if node_statuses.iter().any(|s| !s.is_terminal()) {
            return None;
        }
        if node_statuses.iter().any(|s| *s == Status::Aborted) {
            return Some(Status::Aborted);
        }
        if node_statuses.iter().any(|s| *s == Status::Expired) {
            return Some(Status::Expired);
        }
        if node_statuses.iter().any(|s| *s == Status::Errored) {
            return Some(Status::Errored);
        }
        if node_statuses
            .iter()
            .any(|s| matches!(s, Status::Failed | Status::Suspended))
        {
            return Some(Status::Failed);
        }
        Some(Status::Succeeded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_execution_starts_running() {
        let exec = PlanExecution::new(Uuid::new_v4());
        assert_eq!(exec.status, Status::Running);
        assert!(exec.end_ts.is_none());
    }

    #[test]
    fn test_calculate_status_none_while_flowing() {
        assert_eq!(
            PlanExecution::calculate_status(&[Status::Succeeded, Status::Running]),
            None
        );
    }

    #[test]
    fn test_calculate_status_all_positive() {
        assert_eq!(
            PlanExecution::calculate_status(&[Status::Succeeded, Status::Skipped]),
            Some(Status::Succeeded)
        );
    }

    #[test]
    fn test_calculate_status_abort_dominates() {
        assert_eq!(
            PlanExecution::calculate_status(&[Status::Succeeded, Status::Failed, Status::Aborted]),
            Some(Status::Aborted)
        );
    }

    #[test]
    fn test_calculate_status_failure() {
        assert_eq!(
            PlanExecution::calculate_status(&[Status::Succeeded, Status::Failed]),
            Some(Status::Failed)
        );
    }

    #[test]
    fn test_terminal_plan_rejects_further_transitions() {
        let mut exec = PlanExecution::new(Uuid::new_v4());
        exec.transition_to(Status::Succeeded).unwrap();
        assert!(exec.transition_to(Status::Failed).is_err());
    }
}
