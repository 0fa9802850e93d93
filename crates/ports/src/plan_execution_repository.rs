//! Plan Execution Repository Port

use crate::error::PersistenceResult;
use async_trait::async_trait;
use ibai_core::{PlanExecution, PlanExecutionId};

#[async_trait]
pub trait PlanExecutionRepository: Send + Sync {
    async fn insert(&self, execution: &PlanExecution) -> PersistenceResult<()>;

    async fn find(&self, id: &PlanExecutionId) -> PersistenceResult<Option<PlanExecution>>;

    async fn fetch(&self, id: &PlanExecutionId) -> PersistenceResult<PlanExecution>;

    /// Compare-and-swap update on the carried version.
    async fn update(&self, execution: &PlanExecution) -> PersistenceResult<PlanExecution>;
}
