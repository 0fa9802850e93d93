//! Step Handler Port
//!
//! Concrete step implementations live outside the engine. The engine calls
//! them through this port in the mode its facilitator settled on; handlers
//! implement the modes they support and leave the rest unimplemented.

use async_trait::async_trait;
use ibai_core::{Ambiance, CallbackId, NodeId, StepResponse};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StepError {
    #[error("step does not support {mode} execution")]
    UnsupportedMode { mode: &'static str },

    #[error("step execution failed: {0}")]
    Execution(String),
}

pub type StepResult<T> = std::result::Result<T, StepError>;

/// Opaque unit of remote work handed to the task-dispatch layer. The engine
/// assigns the callback id at submission time.
#[derive(Debug, Clone)]
pub struct TaskRequest {
    pub task_type: String,
    pub payload: serde_json::Value,
}

#[async_trait]
pub trait StepHandler: Send + Sync {
    /// Run inline and return the outcome. SYNC mode.
    async fn execute_sync(
        &self,
        _ambiance: &Ambiance,
        _parameters: &serde_json::Value,
    ) -> StepResult<StepResponse> {
        Err(StepError::UnsupportedMode { mode: "SYNC" })
    }

    /// Acknowledge and complete later through the engine's callback ingress.
    /// ASYNC mode.
    async fn execute_async(
        &self,
        _ambiance: &Ambiance,
        _parameters: &serde_json::Value,
        _callback_id: CallbackId,
    ) -> StepResult<()> {
        Err(StepError::UnsupportedMode { mode: "ASYNC" })
    }

    /// Build the remote work for TASK (one request) or TASK_CHAIN (several,
    /// submitted one at a time).
    fn build_task_requests(
        &self,
        _ambiance: &Ambiance,
        _parameters: &serde_json::Value,
    ) -> StepResult<Vec<TaskRequest>> {
        Err(StepError::UnsupportedMode { mode: "TASK" })
    }

    /// Plan node ids to spawn for CHILD/CHILDREN modes.
    fn child_node_ids(&self, _parameters: &serde_json::Value) -> StepResult<Vec<NodeId>> {
        Err(StepError::UnsupportedMode { mode: "CHILD" })
    }
}
