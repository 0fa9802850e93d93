//! Node Execution Repository Port
//!
//! Durable, versioned storage for node executions. `update` is the only
//! mutation path and enforces optimistic concurrency: the stored version
//! must equal the version carried by the record being written.

use crate::error::PersistenceResult;
use async_trait::async_trait;
use ibai_core::{CallbackId, NodeExecution, NodeExecutionId, PlanExecutionId, Status};

#[async_trait]
pub trait NodeExecutionRepository: Send + Sync {
    /// Insert a fresh execution (version 0). Fails on duplicate id.
    async fn insert(&self, execution: &NodeExecution) -> PersistenceResult<()>;

    async fn find(&self, id: &NodeExecutionId) -> PersistenceResult<Option<NodeExecution>>;

    async fn fetch(&self, id: &NodeExecutionId) -> PersistenceResult<NodeExecution>;

    /// Compare-and-swap update: fails with `StaleVersion` when the stored
    /// version differs from `execution.version`. Returns the stored record
    /// with its version bumped.
    async fn update(&self, execution: &NodeExecution) -> PersistenceResult<NodeExecution>;

    async fn find_by_plan_execution(
        &self,
        plan_execution_id: &PlanExecutionId,
    ) -> PersistenceResult<Vec<NodeExecution>>;

    async fn find_children(
        &self,
        parent_id: &NodeExecutionId,
    ) -> PersistenceResult<Vec<NodeExecution>>;

    /// Find executions under a plan execution currently in one of `statuses`.
    async fn find_with_statuses(
        &self,
        plan_execution_id: &PlanExecutionId,
        statuses: &[Status],
    ) -> PersistenceResult<Vec<NodeExecution>>;

    /// Resolve an asynchronous completion callback to its waiting execution.
    async fn find_by_callback_id(
        &self,
        callback_id: &CallbackId,
    ) -> PersistenceResult<Option<NodeExecution>>;
}
