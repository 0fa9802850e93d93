//! Advising data contracts
//!
//! An adviser decides what the engine does after a node produced a terminal
//! status. These are the data contracts exposed to collaborators; the adviser
//! implementations live in the engine crate.

use crate::node_execution::NodeExecution;
use crate::plan::NodeId;
use crate::status::Status;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Closed discriminator for adviser handlers, the registry key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AdviserType {
    OnSuccess,
    OnFail,
    OnAbort,
    Retry,
    ManualIntervention,
    Ignore,
}

impl AdviserType {
    /// Whether this adviser kind reacts to the broken-status partition.
    pub fn handles_broken(&self) -> bool {
        !matches!(self, Self::OnSuccess)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OnSuccess => "ON_SUCCESS",
            Self::OnFail => "ON_FAIL",
            Self::OnAbort => "ON_ABORT",
            Self::Retry => "RETRY",
            Self::ManualIntervention => "MANUAL_INTERVENTION",
            Self::Ignore => "IGNORE",
        }
    }
}

impl std::fmt::Display for AdviserType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Repair action applied when a failure strategy fires (configured on
/// on-fail advisers and as the post-retry fallback).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RepairAction {
    Ignore,
    ManualIntervention,
    EndPlan,
    MarkFailed,
}

impl Default for RepairAction {
    fn default() -> Self {
        Self::EndPlan
    }
}

/// Event handed to advisers when a node is about to reach a status.
///
/// `to_status` is the proposed status; the engine applies it (or the status
/// the winning advice substitutes) after advising, so a terminal record is
/// never mutated again.
#[derive(Debug, Clone)]
pub struct AdvisingEvent {
    pub node_execution: NodeExecution,
    pub from_status: Status,
    pub to_status: Status,
}

/// Decision produced by the first matching adviser.
#[derive(Debug, Clone, PartialEq)]
pub enum Advice {
    /// Proceed to a statically configured next node.
    NextStep { next_node_id: NodeId },
    /// Re-queue a fresh execution of the same node after a wait.
    Retry { wait: Duration },
    /// Stop driving this branch; the plan concludes when nothing is left
    /// flowing.
    EndPlan,
    /// Park the node for an operator decision instead of finalizing it.
    InterventionWait {
        timeout: Duration,
        timeout_action: RepairAction,
    },
    /// Apply the broken status but keep walking the happy path.
    IgnoreFailure { next_node_id: Option<NodeId> },
}
