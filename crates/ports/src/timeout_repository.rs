//! Timeout Instance Repository Port

use crate::error::PersistenceResult;
use async_trait::async_trait;
use ibai_core::{NodeExecutionId, TimeoutInstance};
use uuid::Uuid;

#[async_trait]
pub trait TimeoutInstanceRepository: Send + Sync {
    async fn insert(&self, instance: &TimeoutInstance) -> PersistenceResult<()>;

    async fn find(&self, uuid: &Uuid) -> PersistenceResult<Option<TimeoutInstance>>;

    /// Compare-and-swap update guarded by the carried version.
    async fn update(&self, instance: &TimeoutInstance) -> PersistenceResult<TimeoutInstance>;

    async fn find_by_node_execution(
        &self,
        node_execution_id: &NodeExecutionId,
    ) -> PersistenceResult<Vec<TimeoutInstance>>;

    /// All instances whose tracker has not fired yet.
    async fn find_live(&self) -> PersistenceResult<Vec<TimeoutInstance>>;

    /// Remove an instance once the owning node terminates or the timeout
    /// fired.
    async fn delete(&self, uuid: &Uuid) -> PersistenceResult<()>;
}
