//! Node execution runtime record
//!
//! One `NodeExecution` per runtime attempt at a `PlanNode`. Status is the
//! only mutation path and every change goes through the transition table;
//! once terminal the record is immutable.

use crate::ambiance::Ambiance;
use crate::interrupt::InterruptId;
use crate::plan::NodeId;
use crate::plan_execution::PlanExecutionId;
use crate::status::Status;
use crate::step::{FailureInfo, StepResponse};
use crate::{EngineError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Node execution identifier - Value Object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeExecutionId(pub Uuid);

impl NodeExecutionId {
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

impl Default for NodeExecutionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for NodeExecutionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Callback identifier handed to asynchronous executions - Value Object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CallbackId(pub Uuid);

impl CallbackId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for CallbackId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for CallbackId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier returned by the remote task-dispatch layer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskId(pub String);

impl TaskId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Append-only log entry recording how the step chose to execute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutableResponse {
    Sync,
    Async {
        callback_id: CallbackId,
    },
    Task {
        task_id: TaskId,
        callback_id: CallbackId,
    },
    TaskChain {
        task_id: TaskId,
        callback_id: CallbackId,
        chain_index: usize,
        chain_total: usize,
    },
    Child {
        child_node_id: NodeId,
        child_execution_id: NodeExecutionId,
    },
    Children {
        child_execution_ids: Vec<NodeExecutionId>,
    },
}

/// Audit entry recording that an interrupt touched this node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterruptEffect {
    pub interrupt_id: InterruptId,
    pub interrupt_type: String,
    pub took_effect_at: DateTime<Utc>,
}

impl InterruptEffect {
    pub fn new(interrupt_id: InterruptId, interrupt_type: impl Into<String>) -> Self {
        Self {
            interrupt_id,
            interrupt_type: interrupt_type.into(),
            took_effect_at: Utc::now(),
        }
    }
}

/// Mutable runtime record for one execution of a plan node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeExecution {
    pub uuid: NodeExecutionId,
    pub plan_execution_id: PlanExecutionId,
    pub node_id: NodeId,
    pub ambiance: Ambiance,
    pub status: Status,
    pub parent_id: Option<NodeExecutionId>,
    /// Sibling chain within a group: the execution that ran before this one.
    pub previous_id: Option<NodeExecutionId>,
    /// History of exhausted attempts this execution supersedes.
    pub retry_ids: Vec<NodeExecutionId>,
    pub executable_responses: Vec<ExecutableResponse>,
    pub interrupt_histories: Vec<InterruptEffect>,
    pub timeout_instance_ids: Vec<Uuid>,
    /// Guards adviser evaluation: advisers run at most once per execution.
    pub advised: bool,
    /// Set when an ignore policy or operator decision kept the broken
    /// status but asked aggregation to treat the node as positive.
    pub failure_ignored: bool,
    /// Status the node held before a PAUSE_ALL, restored on resume.
    pub paused_from: Option<Status>,
    pub failure_info: Option<FailureInfo>,
    pub outputs: HashMap<String, serde_json::Value>,
    pub start_ts: DateTime<Utc>,
    pub end_ts: Option<DateTime<Utc>>,
    /// Optimistic-concurrency version, bumped by the store on every update.
    pub version: u64,
}

impl NodeExecution {
    pub fn new(plan_execution_id: PlanExecutionId, node_id: NodeId, ambiance: Ambiance) -> Self {
        Self {
            uuid: NodeExecutionId::new(),
            plan_execution_id,
            node_id,
            ambiance,
            status: Status::Queued,
            parent_id: None,
            previous_id: None,
            retry_ids: Vec::new(),
            executable_responses: Vec::new(),
            interrupt_histories: Vec::new(),
            timeout_instance_ids: Vec::new(),
            advised: false,
            failure_ignored: false,
            paused_from: None,
            failure_info: None,
            outputs: HashMap::new(),
            start_ts: Utc::now(),
            end_ts: None,
            version: 0,
        }
    }

    pub fn with_parent(mut self, parent_id: NodeExecutionId) -> Self {
        self.parent_id = Some(parent_id);
        self
    }

    pub fn with_previous(mut self, previous_id: NodeExecutionId) -> Self {
        self.previous_id = Some(previous_id);
        self
    }

    /// Successor execution for a retry of `exhausted`. The old record stays
    /// terminal; the new one starts QUEUED with a fresh runtime id and the
    /// attempt history extended.
    pub fn retry_of(exhausted: &NodeExecution) -> Self {
        let mut retry_ids = exhausted.retry_ids.clone();
        retry_ids.push(exhausted.uuid);
        Self {
            uuid: NodeExecutionId::new(),
            plan_execution_id: exhausted.plan_execution_id,
            node_id: exhausted.node_id.clone(),
            ambiance: exhausted.ambiance.clone_for_retry(),
            status: Status::Queued,
            parent_id: exhausted.parent_id,
            previous_id: exhausted.previous_id,
            retry_ids,
            executable_responses: Vec::new(),
            interrupt_histories: Vec::new(),
            timeout_instance_ids: Vec::new(),
            advised: false,
            failure_ignored: false,
            paused_from: None,
            failure_info: None,
            outputs: HashMap::new(),
            start_ts: Utc::now(),
            end_ts: None,
            version: 0,
        }
    }

    /// The only mutation path for status. Rejects anything outside the
    /// transition table and leaves the record unchanged on rejection.
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

    pub fn record_executable_response(&mut self, response: ExecutableResponse) {
        self.executable_responses.push(response);
    }

    pub fn record_interrupt_effect(&mut self, effect: InterruptEffect) {
        self.interrupt_histories.push(effect);
    }

    pub fn apply_step_outcome(&mut self, response: &StepResponse) {
        self.failure_info = response.failure_info.clone();
        self.outputs = response.outputs.clone();
    }

    pub fn latest_executable_response(&self) -> Option<&ExecutableResponse> {
        self.executable_responses.last()
    }

    pub fn retry_attempts(&self) -> usize {
        self.retry_ids.len()
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ambiance::Ambiance;

    fn execution() -> NodeExecution {
        let ambiance = Ambiance::new(PlanExecutionId::new(), Uuid::new_v4(), HashMap::new());
        NodeExecution::new(PlanExecutionId::new(), NodeId::from("a"), ambiance)
    }

    #[test]
    fn test_new_execution_starts_queued() {
        let exec = execution();
        assert_eq!(exec.status, Status::Queued);
        assert_eq!(exec.version, 0);
        assert!(!exec.advised);
        assert!(exec.end_ts.is_none());
    }

    #[test]
    fn test_transition_sets_end_ts_on_terminal() {
        let mut exec = execution();
        exec.transition_to(Status::Running).unwrap();
        exec.transition_to(Status::Succeeded).unwrap();
        assert!(exec.end_ts.is_some());
    }

    #[test]
    fn test_terminal_record_is_immutable() {
        let mut exec = execution();
        exec.transition_to(Status::Running).unwrap();
        exec.transition_to(Status::Failed).unwrap();
        let err = exec.transition_to(Status::Running).unwrap_err();
        assert!(matches!(err, EngineError::InvalidStatusTransition { .. }));
        assert_eq!(exec.status, Status::Failed);
    }

    #[test]
    fn test_rejected_transition_leaves_record_unchanged() {
        let mut exec = execution();
        let err = exec.transition_to(Status::Succeeded).unwrap_err();
        assert!(matches!(err, EngineError::InvalidStatusTransition { .. }));
        assert_eq!(exec.status, Status::Queued);
        assert!(exec.end_ts.is_none());
    }

    #[test]
    fn test_retry_of_links_attempt_history() {
        let mut exhausted = execution();
        exhausted.transition_to(Status::Running).unwrap();
        exhausted.transition_to(Status::Failed).unwrap();

        let retry = NodeExecution::retry_of(&exhausted);
        assert_eq!(retry.status, Status::Queued);
        assert_eq!(retry.retry_ids, vec![exhausted.uuid]);
        assert_eq!(retry.node_id, exhausted.node_id);
        assert_ne!(retry.uuid, exhausted.uuid);
        assert!(!retry.advised);

        let second = NodeExecution::retry_of(&retry);
        assert_eq!(second.retry_ids, vec![exhausted.uuid, retry.uuid]);
    }

    #[test]
    fn test_executable_responses_are_append_only() {
        let mut exec = execution();
        let callback_id = CallbackId::new();
        exec.record_executable_response(ExecutableResponse::Async { callback_id });
        exec.record_executable_response(ExecutableResponse::Sync);
        assert_eq!(exec.executable_responses.len(), 2);
        assert_eq!(
            exec.latest_executable_response(),
            Some(&ExecutableResponse::Sync)
        );
    }
}
