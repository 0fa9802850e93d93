//! Interrupt records
//!
//! An interrupt is an external control signal against a plan execution or a
//! single node. Records are never deleted; each one keeps a seized flag for
//! at-most-once application and the effects it produced as an audit trail.

use crate::node_execution::NodeExecutionId;
use crate::plan_execution::PlanExecutionId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Interrupt identifier - Value Object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InterruptId(pub Uuid);

impl InterruptId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for InterruptId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for InterruptId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Closed discriminator for interrupt handlers, the registry key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InterruptType {
    Abort,
    AbortAll,
    PauseAll,
    ResumeAll,
    Retry,
    MarkExpired,
    MarkSuccess,
    MarkFailed,
    Ignore,
    CustomFailure,
    Resume,
}

impl InterruptType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Abort => "ABORT",
            Self::AbortAll => "ABORT_ALL",
            Self::PauseAll => "PAUSE_ALL",
            Self::ResumeAll => "RESUME_ALL",
            Self::Retry => "RETRY",
            Self::MarkExpired => "MARK_EXPIRED",
            Self::MarkSuccess => "MARK_SUCCESS",
            Self::MarkFailed => "MARK_FAILED",
            Self::Ignore => "IGNORE",
            Self::CustomFailure => "CUSTOM_FAILURE",
            Self::Resume => "RESUME",
        }
    }

    /// Whether the interrupt requires a node-level target.
    pub fn requires_node_target(&self) -> bool {
        matches!(
            self,
            Self::Abort
                | Self::Retry
                | Self::MarkExpired
                | Self::MarkSuccess
                | Self::MarkFailed
                | Self::Ignore
                | Self::CustomFailure
                | Self::Resume
        )
    }
}

impl std::fmt::Display for InterruptType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// External control signal record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Interrupt {
    pub uuid: InterruptId,
    pub interrupt_type: InterruptType,
    pub plan_execution_id: PlanExecutionId,
    pub node_execution_id: Option<NodeExecutionId>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    /// Set true exactly once by the processor that wins the seize race.
    pub seized: bool,
    /// Type-specific payload (custom failure detail, retry overrides).
    #[serde(default)]
    pub parameters: serde_json::Value,
    pub version: u64,
}

impl Interrupt {
    pub fn new(
        interrupt_type: InterruptType,
        plan_execution_id: PlanExecutionId,
        node_execution_id: Option<NodeExecutionId>,
        created_by: impl Into<String>,
    ) -> Self {
        Self {
            uuid: InterruptId::new(),
            interrupt_type,
            plan_execution_id,
            node_execution_id,
            created_by: created_by.into(),
            created_at: Utc::now(),
            seized: false,
            parameters: serde_json::Value::Null,
            version: 0,
        }
    }

    pub fn with_parameters(mut self, parameters: serde_json::Value) -> Self {
        self.parameters = parameters;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_interrupt_is_unseized() {
        let interrupt = Interrupt::new(
            InterruptType::Abort,
            PlanExecutionId::new(),
            Some(NodeExecutionId::new()),
            "operator",
        );
        assert!(!interrupt.seized);
        assert_eq!(interrupt.version, 0);
    }

    #[test]
    fn test_node_target_requirements() {
        assert!(InterruptType::Abort.requires_node_target());
        assert!(InterruptType::Retry.requires_node_target());
        assert!(!InterruptType::PauseAll.requires_node_target());
        assert!(!InterruptType::AbortAll.requires_node_target());
    }
}
