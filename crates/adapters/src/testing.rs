//! Step and dispatcher fakes for engine tests
//!
//! Deterministic collaborators: steps that succeed, fail a scripted number
//! of times, park, or complete through the async callback path, plus a
//! recording task dispatcher.

use async_trait::async_trait;
use ibai_core::{Ambiance, CallbackId, FailureInfo, NodeId, Status, StepResponse, TaskId};
use ibai_ports::{DispatchError, StepError, StepHandler, StepResult, TaskDispatcher, TaskRequest};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

/// Step that succeeds immediately.
#[derive(Default)]
pub struct SucceedingStepHandler;

#[async_trait]
impl StepHandler for SucceedingStepHandler {
    async fn execute_sync(
        &self,
        _ambiance: &Ambiance,
        parameters: &serde_json::Value,
    ) -> StepResult<StepResponse> {
        let mut response = StepResponse::succeeded();
        if let Some(output) = parameters.get("output") {
            response = response.with_output("result", output.clone());
        }
        Ok(response)
    }
}

/// Step that fails a scripted number of times, then succeeds. Drives the
/// retry-policy tests.
pub struct FlakyStepHandler {
    failures_remaining: AtomicU32,
    pub executions: AtomicU32,
}

impl FlakyStepHandler {
    pub fn failing_times(failures: u32) -> Self {
        Self {
            failures_remaining: AtomicU32::new(failures),
            executions: AtomicU32::new(0),
        }
    }
}

#[async_trait]
impl StepHandler for FlakyStepHandler {
    async fn execute_sync(
        &self,
        _ambiance: &Ambiance,
        _parameters: &serde_json::Value,
    ) -> StepResult<StepResponse> {
        self.executions.fetch_add(1, Ordering::SeqCst);
        let remaining = self.failures_remaining.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures_remaining.store(remaining - 1, Ordering::SeqCst);
            Ok(StepResponse::failed(FailureInfo::new("scripted failure")))
        } else {
            Ok(StepResponse::succeeded())
        }
    }
}

/// Step that always fails.
#[derive(Default)]
pub struct FailingStepHandler;

#[async_trait]
impl StepHandler for FailingStepHandler {
    async fn execute_sync(
        &self,
        _ambiance: &Ambiance,
        _parameters: &serde_json::Value,
    ) -> StepResult<StepResponse> {
        Ok(StepResponse::failed(FailureInfo::new("always fails")))
    }
}

/// Step that parks the node in a waiting status chosen by parameters
/// (approval gates in tests).
pub struct WaitingStepHandler {
    status: Status,
}

impl WaitingStepHandler {
    pub fn new(status: Status) -> Self {
        Self { status }
    }
}

#[async_trait]
impl StepHandler for WaitingStepHandler {
    async fn execute_sync(
        &self,
        _ambiance: &Ambiance,
        _parameters: &serde_json::Value,
    ) -> StepResult<StepResponse> {
        Ok(StepResponse {
            status: self.status,
            failure_info: None,
            outputs: Default::default(),
        })
    }
}

/// Step that acknowledges asynchronously and records the callback id for
/// the test to complete later.
#[derive(Default)]
pub struct AsyncStepHandler {
    pub callbacks: Mutex<Vec<CallbackId>>,
}

impl AsyncStepHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_callback(&self) -> Option<CallbackId> {
        self.callbacks.lock().last().copied()
    }
}

#[async_trait]
impl StepHandler for AsyncStepHandler {
    async fn execute_async(
        &self,
        _ambiance: &Ambiance,
        _parameters: &serde_json::Value,
        callback_id: CallbackId,
    ) -> StepResult<()> {
        self.callbacks.lock().push(callback_id);
        Ok(())
    }
}

/// Step that builds task requests from its parameters, for TASK and
/// TASK_CHAIN tests.
#[derive(Default)]
pub struct TaskStepHandler;

#[async_trait]
impl StepHandler for TaskStepHandler {
    fn build_task_requests(
        &self,
        _ambiance: &Ambiance,
        parameters: &serde_json::Value,
    ) -> StepResult<Vec<TaskRequest>> {
        let task_types: Vec<String> = parameters
            .get("tasks")
            .and_then(|v| serde_json::from_value(v.clone()).ok())
            .ok_or_else(|| StepError::Execution("missing tasks parameter".to_string()))?;
        Ok(task_types
            .into_iter()
            .map(|task_type| TaskRequest {
                task_type,
                payload: parameters.clone(),
            })
            .collect())
    }
}

/// Step that spawns children named by its parameters.
#[derive(Default)]
pub struct ChildrenStepHandler;

#[async_trait]
impl StepHandler for ChildrenStepHandler {
    fn child_node_ids(&self, parameters: &serde_json::Value) -> StepResult<Vec<NodeId>> {
        let ids: Vec<String> = parameters
            .get("child_node_ids")
            .and_then(|v| serde_json::from_value(v.clone()).ok())
            .ok_or_else(|| StepError::Execution("missing child_node_ids parameter".to_string()))?;
        Ok(ids.into_iter().map(NodeId::from).collect())
    }
}

/// Dispatcher that records submissions and hands back sequential task ids;
/// tests complete the work through the engine's callback ingress.
#[derive(Default)]
pub struct RecordingTaskDispatcher {
    pub submissions: Mutex<Vec<(TaskRequest, CallbackId)>>,
    counter: AtomicU64,
}

impl RecordingTaskDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_callback(&self) -> Option<CallbackId> {
        self.submissions.lock().last().map(|(_, cb)| *cb)
    }

    pub fn submission_count(&self) -> usize {
        self.submissions.lock().len()
    }
}

#[async_trait]
impl TaskDispatcher for RecordingTaskDispatcher {
    async fn submit(
        &self,
        request: TaskRequest,
        callback_id: CallbackId,
    ) -> Result<TaskId, DispatchError> {
        let seq = self.counter.fetch_add(1, Ordering::SeqCst);
        self.submissions.lock().push((request, callback_id));
        Ok(TaskId::new(format!("task-{}", seq)))
    }
}
