//! Node driver seam
//!
//! Barrier releases, restraint activations, timeout expiries and interrupt
//! handlers all need to re-enter the run loop. They do it through this
//! narrow trait instead of holding the engine directly, which keeps the
//! composition acyclic: services are built first against a `DriverHandle`,
//! the engine is attached once at the end of wiring.

use async_trait::async_trait;
use ibai_core::{
    EngineError, FailureInfo, Interrupt, NodeExecutionId, NodeId, PlanExecutionId, Result, Status,
    StepResponse,
};
use std::sync::{Arc, OnceLock, Weak};
use tracing::warn;

use crate::executor::OrchestrationEngine;

/// Re-entry points into the run loop.
#[async_trait]
pub trait NodeDriver: Send + Sync {
    /// Start (or restart) driving a QUEUED node execution.
    async fn drive(&self, node_execution_id: NodeExecutionId) -> Result<()>;

    /// Deliver a step outcome to a waiting node execution.
    async fn resume_with(
        &self,
        node_execution_id: NodeExecutionId,
        response: StepResponse,
    ) -> Result<()>;

    /// Run the advising path with a proposed status and apply the decision.
    async fn finalize(
        &self,
        node_execution_id: NodeExecutionId,
        proposed: Status,
        failure_info: Option<FailureInfo>,
    ) -> Result<()>;

    /// Create the successor execution for `after` and start driving it.
    async fn spawn_next(
        &self,
        after: NodeExecutionId,
        next: NodeId,
    ) -> Result<NodeExecutionId>;

    /// Conclude the plan execution when nothing is left flowing.
    async fn conclude_if_done(&self, plan_execution_id: PlanExecutionId) -> Result<()>;

    /// Re-check child aggregation for a waiting parent (a child was
    /// finalized outside the run loop, e.g. by an interrupt).
    async fn notify_children_concluded(&self, parent_id: NodeExecutionId) -> Result<()>;

    /// Register and process an engine-raised interrupt (timeout expiry).
    async fn register_interrupt(&self, interrupt: Interrupt) -> Result<Interrupt>;

    /// Apply an operator IGNORE decision: mark the node failed without
    /// consulting advisers, then continue on the happy path.
    async fn ignore_and_proceed(
        &self,
        node_execution_id: NodeExecutionId,
        effect: ibai_core::InterruptEffect,
    ) -> Result<()>;
}

/// Late-bound handle to the engine, set once at the end of wiring.
#[derive(Default)]
pub struct DriverHandle {
    engine: OnceLock<Weak<OrchestrationEngine>>,
}

impl DriverHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn attach(&self, engine: &Arc<OrchestrationEngine>) {
        if self.engine.set(Arc::downgrade(engine)).is_err() {
            warn!("driver handle attached twice; keeping the first engine");
        }
    }

    pub(crate) fn engine_arc(&self) -> Result<Arc<OrchestrationEngine>> {
        self.engine
            .get()
            .and_then(Weak::upgrade)
            .ok_or_else(|| EngineError::Validation("engine not attached to driver handle".into()))
    }
}

#[async_trait]
impl NodeDriver for DriverHandle {
    async fn drive(&self, node_execution_id: NodeExecutionId) -> Result<()> {
        self.engine_arc()?.drive(node_execution_id).await
    }

    async fn resume_with(
        &self,
        node_execution_id: NodeExecutionId,
        response: StepResponse,
    ) -> Result<()> {
        self.engine_arc()?.resume_with(node_execution_id, response).await
    }

    async fn finalize(
        &self,
        node_execution_id: NodeExecutionId,
        proposed: Status,
        failure_info: Option<FailureInfo>,
    ) -> Result<()> {
        self.engine_arc()?
            .finalize(node_execution_id, proposed, failure_info)
            .await
    }

    async fn spawn_next(
        &self,
        after: NodeExecutionId,
        next: NodeId,
    ) -> Result<NodeExecutionId> {
        self.engine_arc()?.spawn_next(after, next).await
    }

    async fn conclude_if_done(&self, plan_execution_id: PlanExecutionId) -> Result<()> {
        self.engine_arc()?.conclude_if_done(plan_execution_id).await
    }

    async fn notify_children_concluded(&self, parent_id: NodeExecutionId) -> Result<()> {
        self.engine_arc()?.check_parent_aggregation(parent_id).await
    }

    async fn register_interrupt(&self, interrupt: Interrupt) -> Result<Interrupt> {
        self.engine_arc()?.register_interrupt_record(interrupt).await
    }

    async fn ignore_and_proceed(
        &self,
        node_execution_id: NodeExecutionId,
        effect: ibai_core::InterruptEffect,
    ) -> Result<()> {
        self.engine_arc()?
            .ignore_and_proceed(node_execution_id, effect)
            .await
    }
}
