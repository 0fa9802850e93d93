//! Barrier Repository Port

use crate::error::PersistenceResult;
use async_trait::async_trait;
use ibai_core::{BarrierExecutionInstance, PlanExecutionId};
use uuid::Uuid;

#[async_trait]
pub trait BarrierRepository: Send + Sync {
    async fn insert(&self, instance: &BarrierExecutionInstance) -> PersistenceResult<()>;

    async fn find(&self, uuid: &Uuid) -> PersistenceResult<Option<BarrierExecutionInstance>>;

    async fn find_by_identifier_and_plan_execution_id(
        &self,
        identifier: &str,
        plan_execution_id: &PlanExecutionId,
    ) -> PersistenceResult<Vec<BarrierExecutionInstance>>;

    /// Compare-and-swap update guarded by the carried version; arrival
    /// counting and the STANDING→DOWN flip are linearized through this.
    async fn update(
        &self,
        instance: &BarrierExecutionInstance,
    ) -> PersistenceResult<BarrierExecutionInstance>;
}
