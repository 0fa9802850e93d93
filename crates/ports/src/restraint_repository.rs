//! Resource Restraint Repository Port

use crate::error::PersistenceResult;
use async_trait::async_trait;
use ibai_core::{ResourceRestraint, ResourceRestraintInstance, RestraintState};
use uuid::Uuid;

#[async_trait]
pub trait RestraintRepository: Send + Sync {
    async fn save_definition(&self, restraint: &ResourceRestraint) -> PersistenceResult<()>;

    async fn find_definition(&self, uuid: &Uuid) -> PersistenceResult<Option<ResourceRestraint>>;

    async fn find_definition_by_name(
        &self,
        name: &str,
    ) -> PersistenceResult<Option<ResourceRestraint>>;

    async fn insert_instance(&self, instance: &ResourceRestraintInstance)
    -> PersistenceResult<()>;

    async fn find_instance(
        &self,
        uuid: &Uuid,
    ) -> PersistenceResult<Option<ResourceRestraintInstance>>;

    /// Compare-and-swap update guarded by the carried version.
    async fn update_instance(
        &self,
        instance: &ResourceRestraintInstance,
    ) -> PersistenceResult<ResourceRestraintInstance>;

    /// Instances on a resource unit in any of `states`, ordered by the
    /// monotonic FIFO key.
    async fn find_instances_ordered(
        &self,
        resource_unit: &str,
        states: &[RestraintState],
    ) -> PersistenceResult<Vec<ResourceRestraintInstance>>;

    async fn find_by_release_entity(
        &self,
        resource_unit: &str,
        release_entity_id: &str,
    ) -> PersistenceResult<Option<ResourceRestraintInstance>>;

    /// Allocate the next FIFO order key for a resource unit.
    async fn next_order(&self, resource_unit: &str) -> PersistenceResult<u64>;
}
