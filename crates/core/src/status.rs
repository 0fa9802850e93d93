//! Execution status vocabulary and the transition table
//!
//! Every runtime status change in the engine is validated against the fixed
//! adjacency table in this module. Terminal statuses have no outgoing edges;
//! a retry never mutates a terminal record, it creates a fresh execution.

use crate::{EngineError, Result};
use serde::{Deserialize, Serialize};

/// Closed status enumeration for node and plan executions.
///
/// Three classes: terminal positive (`Succeeded`), terminal negative
/// (`Failed` through `Suspended`), and flowing/paused (the rest).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    // Terminal positive
    Succeeded,
    // Terminal negative
    Failed,
    Errored,
    Expired,
    Aborted,
    Skipped,
    Suspended,
    // Flowing / paused
    Queued,
    Running,
    AsyncWaiting,
    TaskWaiting,
    ResourceWaiting,
    ApprovalWaiting,
    InterventionWaiting,
    Paused,
    Discontinuing,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Succeeded => "SUCCEEDED",
            Self::Failed => "FAILED",
            Self::Errored => "ERRORED",
            Self::Expired => "EXPIRED",
            Self::Aborted => "ABORTED",
            Self::Skipped => "SKIPPED",
            Self::Suspended => "SUSPENDED",
            Self::Queued => "QUEUED",
            Self::Running => "RUNNING",
            Self::AsyncWaiting => "ASYNC_WAITING",
            Self::TaskWaiting => "TASK_WAITING",
            Self::ResourceWaiting => "RESOURCE_WAITING",
            Self::ApprovalWaiting => "APPROVAL_WAITING",
            Self::InterventionWaiting => "INTERVENTION_WAITING",
            Self::Paused => "PAUSED",
            Self::Discontinuing => "DISCONTINUING",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Succeeded
                | Self::Failed
                | Self::Errored
                | Self::Expired
                | Self::Aborted
                | Self::Skipped
                | Self::Suspended
        )
    }

    /// Terminal statuses a success adviser reacts to.
    pub fn is_positive(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Skipped)
    }

    /// Terminal negative statuses, the failure-strategy partition.
    pub fn is_broken(&self) -> bool {
        matches!(
            self,
            Self::Failed | Self::Errored | Self::Expired | Self::Aborted | Self::Suspended
        )
    }

    pub fn is_flowing(&self) -> bool {
        !self.is_terminal()
    }

    /// Statuses where the node waits on an external completion signal.
    pub fn is_waiting(&self) -> bool {
        matches!(
            self,
            Self::AsyncWaiting
                | Self::TaskWaiting
                | Self::ResourceWaiting
                | Self::ApprovalWaiting
                | Self::InterventionWaiting
        )
    }

    /// Statuses during which an ACTIVE-dimension timeout keeps ticking.
    /// Human-gated and paused statuses stop the clock.
    pub fn is_timer_ticking(&self) -> bool {
        matches!(
            self,
            Self::Queued
                | Self::Running
                | Self::AsyncWaiting
                | Self::TaskWaiting
                | Self::ResourceWaiting
                | Self::Discontinuing
        )
    }

    /// Terminal statuses a RETRY interrupt may resurrect (via a fresh execution).
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Failed | Self::Errored | Self::Expired | Self::Aborted)
    }

    /// Statuses a PAUSE_ALL interrupt applies to. An inline-running node is
    /// left to finish its current step; pausing stops new work from starting
    /// and parks everything sitting at a discrete wait point.
    pub fn is_pausable(&self) -> bool {
        matches!(self, Self::Queued) || self.is_waiting()
    }

    /// Fixed adjacency table. Terminal statuses have no outgoing edges.
    pub fn can_transition(from: Status, to: Status) -> bool {
        use Status::*;
        if from == to {
            return false;
        }
        match from {
            Queued => matches!(to, Running | Skipped | Paused | Discontinuing | Errored | Expired),
            Running => matches!(
                to,
                Succeeded
                    | Failed
                    | Errored
                    | Expired
                    | Suspended
                    | AsyncWaiting
                    | TaskWaiting
                    | ResourceWaiting
                    | ApprovalWaiting
                    | InterventionWaiting
                    | Paused
                    | Discontinuing
            ),
            AsyncWaiting | TaskWaiting => matches!(
                to,
                Running
                    | Succeeded
                    | Failed
                    | Errored
                    | Expired
                    | Suspended
                    | InterventionWaiting
                    | Paused
                    | Discontinuing
            ),
            ResourceWaiting => matches!(
                to,
                Running | Succeeded | Failed | Errored | Expired | Paused | Discontinuing
            ),
            ApprovalWaiting => matches!(
                to,
                Running
                    | Succeeded
                    | Failed
                    | Errored
                    | Expired
                    | InterventionWaiting
                    | Paused
                    | Discontinuing
            ),
            InterventionWaiting => {
                matches!(to, Succeeded | Failed | Errored | Expired | Discontinuing)
            }
            Paused => matches!(
                to,
                Queued
                    | Running
                    | AsyncWaiting
                    | TaskWaiting
                    | ResourceWaiting
                    | ApprovalWaiting
                    | InterventionWaiting
                    | Errored
                    | Expired
                    | Discontinuing
            ),
            Discontinuing => matches!(to, Aborted | Expired | Errored | Failed),
            // Terminal
            Succeeded | Failed | Errored | Expired | Aborted | Skipped | Suspended => false,
        }
    }

    /// Validate a transition against the table; the caller leaves the record
    /// unchanged on rejection.
    pub fn validate_transition(from: Status, to: Status) -> Result<()> {
        if Self::can_transition(from, to) {
            Ok(())
        } else {
            Err(EngineError::invalid_status_transition(from.as_str(), to.as_str()))
        }
    }

    pub fn flowing_statuses() -> &'static [Status] {
        use Status::*;
        &[
            Queued,
            Running,
            AsyncWaiting,
            TaskWaiting,
            ResourceWaiting,
            ApprovalWaiting,
            InterventionWaiting,
            Paused,
            Discontinuing,
        ]
    }

    pub fn terminal_statuses() -> &'static [Status] {
        use Status::*;
        &[Succeeded, Failed, Errored, Expired, Aborted, Skipped, Suspended]
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_statuses() -> Vec<Status> {
        let mut all = Status::flowing_statuses().to_vec();
        all.extend_from_slice(Status::terminal_statuses());
        all
    }

    #[test]
    fn test_terminal_statuses_have_no_outgoing_edges() {
        for from in Status::terminal_statuses() {
            for to in all_statuses() {
                assert!(
                    !Status::can_transition(*from, to),
                    "terminal {} must not transition to {}",
                    from,
                    to
                );
            }
        }
    }

    #[test]
    fn test_class_partition_is_total() {
        for status in all_statuses() {
            assert!(
                status.is_terminal() != status.is_flowing(),
                "{} must be exactly one of terminal/flowing",
                status
            );
        }
        assert_eq!(
            all_statuses().len(),
            Status::flowing_statuses().len() + Status::terminal_statuses().len()
        );
    }

    #[test]
    fn test_positive_and_broken_are_disjoint_terminal_subsets() {
        for status in all_statuses() {
            if status.is_positive() || status.is_broken() {
                assert!(status.is_terminal());
            }
            assert!(!(status.is_positive() && status.is_broken()));
        }
    }

    #[test]
    fn test_self_transition_rejected() {
        for status in all_statuses() {
            assert!(!Status::can_transition(status, status));
        }
    }

    #[test]
    fn test_happy_path_transitions() {
        assert!(Status::can_transition(Status::Queued, Status::Running));
        assert!(Status::can_transition(Status::Running, Status::Succeeded));
        assert!(Status::can_transition(Status::Running, Status::AsyncWaiting));
        assert!(Status::can_transition(Status::AsyncWaiting, Status::Succeeded));
        assert!(Status::can_transition(Status::ResourceWaiting, Status::Running));
        assert!(Status::can_transition(Status::Discontinuing, Status::Aborted));
    }

    #[test]
    fn test_abort_goes_through_discontinuing() {
        assert!(!Status::can_transition(Status::Running, Status::Aborted));
        assert!(Status::can_transition(Status::Running, Status::Discontinuing));
        assert!(Status::can_transition(Status::Discontinuing, Status::Aborted));
    }

    #[test]
    fn test_validate_transition_rejects_with_error() {
        let err = Status::validate_transition(Status::Succeeded, Status::Running).unwrap_err();
        assert!(matches!(err, EngineError::InvalidStatusTransition { .. }));
    }

    #[test]
    fn test_pause_resume_edges() {
        assert!(Status::can_transition(Status::Running, Status::Paused));
        assert!(Status::can_transition(Status::Queued, Status::Paused));
        assert!(Status::can_transition(Status::Paused, Status::Running));
        assert!(Status::can_transition(Status::Paused, Status::Queued));
    }

    #[test]
    fn test_timer_ticking_excludes_human_gated_statuses() {
        assert!(Status::Running.is_timer_ticking());
        assert!(Status::TaskWaiting.is_timer_ticking());
        assert!(!Status::Paused.is_timer_ticking());
        assert!(!Status::InterventionWaiting.is_timer_ticking());
        assert!(!Status::ApprovalWaiting.is_timer_ticking());
    }

    #[test]
    fn test_serde_screaming_snake_case() {
        let json = serde_json::to_string(&Status::AsyncWaiting).unwrap();
        assert_eq!(json, "\"ASYNC_WAITING\"");
        let back: Status = serde_json::from_str("\"RESOURCE_WAITING\"").unwrap();
        assert_eq!(back, Status::ResourceWaiting);
    }
}
