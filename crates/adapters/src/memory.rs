//! In-Memory Repository Implementations
//!
//! Versioned document stores over `DashMap`, honoring the same
//! optimistic-concurrency contract a real store would: updates carry the
//! version they read and fail with `StaleVersion` when the stored record
//! moved on. Used by unit and integration tests, and as the reference
//! semantics for real persistence adapters.

use async_trait::async_trait;
use dashmap::DashMap;
use ibai_core::{
    BarrierExecutionInstance, CallbackId, ExecutableResponse, Interrupt, InterruptId,
    NodeExecution, NodeExecutionId, PlanExecution, PlanExecutionId, ResourceRestraint,
    ResourceRestraintInstance, RestraintState, Status, TimeoutInstance,
};
use ibai_ports::{
    BarrierRepository, InterruptRepository, NodeExecutionRepository, PersistenceError,
    PersistenceResult, PlanExecutionRepository, RestraintRepository, TimeoutInstanceRepository,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use uuid::Uuid;

fn stale(entity: &'static str, id: impl ToString, expected: u64) -> PersistenceError {
    PersistenceError::StaleVersion {
        entity,
        id: id.to_string(),
        expected,
    }
}

fn not_found(entity: &'static str, id: impl ToString) -> PersistenceError {
    PersistenceError::NotFound {
        entity,
        id: id.to_string(),
    }
}

/// In-memory node execution repository.
#[derive(Default)]
pub struct InMemoryNodeExecutionRepository {
    executions: DashMap<NodeExecutionId, NodeExecution>,
}

impl InMemoryNodeExecutionRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl NodeExecutionRepository for InMemoryNodeExecutionRepository {
    async fn insert(&self, execution: &NodeExecution) -> PersistenceResult<()> {
        if self.executions.contains_key(&execution.uuid) {
            return Err(PersistenceError::Duplicate {
                entity: "node_execution",
                id: execution.uuid.to_string(),
            });
        }
        self.executions.insert(execution.uuid, execution.clone());
        Ok(())
    }

    async fn find(&self, id: &NodeExecutionId) -> PersistenceResult<Option<NodeExecution>> {
        Ok(self.executions.get(id).map(|e| e.clone()))
    }

    async fn fetch(&self, id: &NodeExecutionId) -> PersistenceResult<NodeExecution> {
        self.find(id)
            .await?
            .ok_or_else(|| not_found("node_execution", id))
    }

    async fn update(&self, execution: &NodeExecution) -> PersistenceResult<NodeExecution> {
        let mut stored = self
            .executions
            .get_mut(&execution.uuid)
            .ok_or_else(|| not_found("node_execution", execution.uuid))?;
        if stored.version != execution.version {
            return Err(stale("node_execution", execution.uuid, execution.version));
        }
        let mut next = execution.clone();
        next.version += 1;
        *stored = next.clone();
        Ok(next)
    }

    async fn find_by_plan_execution(
        &self,
        plan_execution_id: &PlanExecutionId,
    ) -> PersistenceResult<Vec<NodeExecution>> {
        Ok(self
            .executions
            .iter()
            .filter(|e| &e.plan_execution_id == plan_execution_id)
            .map(|e| e.clone())
            .collect())
    }

    async fn find_children(
        &self,
        parent_id: &NodeExecutionId,
    ) -> PersistenceResult<Vec<NodeExecution>> {
        Ok(self
            .executions
            .iter()
            .filter(|e| e.parent_id.as_ref() == Some(parent_id))
            .map(|e| e.clone())
            .collect())
    }

    async fn find_with_statuses(
        &self,
        plan_execution_id: &PlanExecutionId,
        statuses: &[Status],
    ) -> PersistenceResult<Vec<NodeExecution>> {
        Ok(self
            .executions
            .iter()
            .filter(|e| {
                &e.plan_execution_id == plan_execution_id && statuses.contains(&e.status)
            })
            .map(|e| e.clone())
            .collect())
    }

    async fn find_by_callback_id(
        &self,
        callback_id: &CallbackId,
    ) -> PersistenceResult<Option<NodeExecution>> {
        Ok(self
            .executions
            .iter()
            .find(|e| {
                e.executable_responses.iter().any(|r| match r {
                    ExecutableResponse::Async { callback_id: cb } => cb == callback_id,
                    ExecutableResponse::Task { callback_id: cb, .. } => cb == callback_id,
                    ExecutableResponse::TaskChain { callback_id: cb, .. } => cb == callback_id,
                    _ => false,
                })
            })
            .map(|e| e.clone()))
    }
}

/// In-memory plan execution repository.
#[derive(Default)]
pub struct InMemoryPlanExecutionRepository {
    executions: DashMap<PlanExecutionId, PlanExecution>,
}

impl InMemoryPlanExecutionRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PlanExecutionRepository for InMemoryPlanExecutionRepository {
    async fn insert(&self, execution: &PlanExecution) -> PersistenceResult<()> {
        if self.executions.contains_key(&execution.uuid) {
            return Err(PersistenceError::Duplicate {
                entity: "plan_execution",
                id: execution.uuid.to_string(),
            });
        }
        self.executions.insert(execution.uuid, execution.clone());
        Ok(())
    }

    async fn find(&self, id: &PlanExecutionId) -> PersistenceResult<Option<PlanExecution>> {
        Ok(self.executions.get(id).map(|e| e.clone()))
    }

    async fn fetch(&self, id: &PlanExecutionId) -> PersistenceResult<PlanExecution> {
        self.find(id)
            .await?
            .ok_or_else(|| not_found("plan_execution", id))
    }

    async fn update(&self, execution: &PlanExecution) -> PersistenceResult<PlanExecution> {
        let mut stored = self
            .executions
            .get_mut(&execution.uuid)
            .ok_or_else(|| not_found("plan_execution", execution.uuid))?;
        if stored.version != execution.version {
            return Err(stale("plan_execution", execution.uuid, execution.version));
        }
        let mut next = execution.clone();
        next.version += 1;
        *stored = next.clone();
        Ok(next)
    }
}

/// In-memory interrupt repository with the seize compare-and-set.
#[derive(Default)]
pub struct InMemoryInterruptRepository {
    interrupts: DashMap<InterruptId, Interrupt>,
}

impl InMemoryInterruptRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl InterruptRepository for InMemoryInterruptRepository {
    async fn insert(&self, interrupt: &Interrupt) -> PersistenceResult<()> {
        if self.interrupts.contains_key(&interrupt.uuid) {
            return Err(PersistenceError::Duplicate {
                entity: "interrupt",
                id: interrupt.uuid.to_string(),
            });
        }
        self.interrupts.insert(interrupt.uuid, interrupt.clone());
        Ok(())
    }

    async fn find(&self, id: &InterruptId) -> PersistenceResult<Option<Interrupt>> {
        Ok(self.interrupts.get(id).map(|i| i.clone()))
    }

    async fn fetch(&self, id: &InterruptId) -> PersistenceResult<Interrupt> {
        self.find(id).await?.ok_or_else(|| not_found("interrupt", id))
    }

    async fn seize(&self, id: &InterruptId) -> PersistenceResult<bool> {
        let mut stored = self
            .interrupts
            .get_mut(id)
            .ok_or_else(|| not_found("interrupt", id))?;
        if stored.seized {
            return Ok(false);
        }
        stored.seized = true;
        stored.version += 1;
        Ok(true)
    }

    async fn update(&self, interrupt: &Interrupt) -> PersistenceResult<Interrupt> {
        let mut stored = self
            .interrupts
            .get_mut(&interrupt.uuid)
            .ok_or_else(|| not_found("interrupt", interrupt.uuid))?;
        if stored.version != interrupt.version {
            return Err(stale("interrupt", interrupt.uuid, interrupt.version));
        }
        let mut next = interrupt.clone();
        next.version += 1;
        *stored = next.clone();
        Ok(next)
    }

    async fn find_by_plan_execution(
        &self,
        plan_execution_id: &PlanExecutionId,
    ) -> PersistenceResult<Vec<Interrupt>> {
        Ok(self
            .interrupts
            .iter()
            .filter(|i| &i.plan_execution_id == plan_execution_id)
            .map(|i| i.clone())
            .collect())
    }
}

/// In-memory barrier repository. Enforces instance uniqueness per
/// (identifier, plan execution) the way a unique index would.
#[derive(Default)]
pub struct InMemoryBarrierRepository {
    barriers: DashMap<Uuid, BarrierExecutionInstance>,
    index: Mutex<HashMap<(String, PlanExecutionId), Uuid>>,
}

impl InMemoryBarrierRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BarrierRepository for InMemoryBarrierRepository {
    async fn insert(&self, instance: &BarrierExecutionInstance) -> PersistenceResult<()> {
        let key = (instance.identifier.clone(), instance.plan_execution_id);
        let mut index = self.index.lock();
        if index.contains_key(&key) {
            return Err(PersistenceError::Duplicate {
                entity: "barrier",
                id: instance.identifier.clone(),
            });
        }
        index.insert(key, instance.uuid);
        self.barriers.insert(instance.uuid, instance.clone());
        Ok(())
    }

    async fn find(&self, uuid: &Uuid) -> PersistenceResult<Option<BarrierExecutionInstance>> {
        Ok(self.barriers.get(uuid).map(|b| b.clone()))
    }

    async fn find_by_identifier_and_plan_execution_id(
        &self,
        identifier: &str,
        plan_execution_id: &PlanExecutionId,
    ) -> PersistenceResult<Vec<BarrierExecutionInstance>> {
        Ok(self
            .barriers
            .iter()
            .filter(|b| {
                b.identifier == identifier && &b.plan_execution_id == plan_execution_id
            })
            .map(|b| b.clone())
            .collect())
    }

    async fn update(
        &self,
        instance: &BarrierExecutionInstance,
    ) -> PersistenceResult<BarrierExecutionInstance> {
        let mut stored = self
            .barriers
            .get_mut(&instance.uuid)
            .ok_or_else(|| not_found("barrier", instance.uuid))?;
        if stored.version != instance.version {
            return Err(stale("barrier", instance.uuid, instance.version));
        }
        let mut next = instance.clone();
        next.version += 1;
        *stored = next.clone();
        Ok(next)
    }
}

/// In-memory restraint repository with a monotonic FIFO order allocator
/// per resource unit.
#[derive(Default)]
pub struct InMemoryRestraintRepository {
    definitions: DashMap<Uuid, ResourceRestraint>,
    instances: DashMap<Uuid, ResourceRestraintInstance>,
    orders: Mutex<HashMap<String, u64>>,
}

impl InMemoryRestraintRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RestraintRepository for InMemoryRestraintRepository {
    async fn save_definition(&self, restraint: &ResourceRestraint) -> PersistenceResult<()> {
        self.definitions.insert(restraint.uuid, restraint.clone());
        Ok(())
    }

    async fn find_definition(&self, uuid: &Uuid) -> PersistenceResult<Option<ResourceRestraint>> {
        Ok(self.definitions.get(uuid).map(|d| d.clone()))
    }

    async fn find_definition_by_name(
        &self,
        name: &str,
    ) -> PersistenceResult<Option<ResourceRestraint>> {
        Ok(self
            .definitions
            .iter()
            .find(|d| d.name == name)
            .map(|d| d.clone()))
    }

    async fn insert_instance(
        &self,
        instance: &ResourceRestraintInstance,
    ) -> PersistenceResult<()> {
        if self.instances.contains_key(&instance.uuid) {
            return Err(PersistenceError::Duplicate {
                entity: "restraint_instance",
                id: instance.uuid.to_string(),
            });
        }
        self.instances.insert(instance.uuid, instance.clone());
        Ok(())
    }

    async fn find_instance(
        &self,
        uuid: &Uuid,
    ) -> PersistenceResult<Option<ResourceRestraintInstance>> {
        Ok(self.instances.get(uuid).map(|i| i.clone()))
    }

    async fn update_instance(
        &self,
        instance: &ResourceRestraintInstance,
    ) -> PersistenceResult<ResourceRestraintInstance> {
        let mut stored = self
            .instances
            .get_mut(&instance.uuid)
            .ok_or_else(|| not_found("restraint_instance", instance.uuid))?;
        if stored.version != instance.version {
            return Err(stale("restraint_instance", instance.uuid, instance.version));
        }
        let mut next = instance.clone();
        next.version += 1;
        *stored = next.clone();
        Ok(next)
    }

    async fn find_instances_ordered(
        &self,
        resource_unit: &str,
        states: &[RestraintState],
    ) -> PersistenceResult<Vec<ResourceRestraintInstance>> {
        let mut instances: Vec<_> = self
            .instances
            .iter()
            .filter(|i| i.resource_unit == resource_unit && states.contains(&i.state))
            .map(|i| i.clone())
            .collect();
        instances.sort_by_key(|i| i.order);
        Ok(instances)
    }

    async fn find_by_release_entity(
        &self,
        resource_unit: &str,
        release_entity_id: &str,
    ) -> PersistenceResult<Option<ResourceRestraintInstance>> {
        Ok(self
            .instances
            .iter()
            .find(|i| {
                i.resource_unit == resource_unit
                    && i.release_entity_id == release_entity_id
                    && i.state == RestraintState::Active
            })
            .map(|i| i.clone()))
    }

    async fn next_order(&self, resource_unit: &str) -> PersistenceResult<u64> {
        let mut orders = self.orders.lock();
        let counter = orders.entry(resource_unit.to_string()).or_insert(0);
        let order = *counter;
        *counter += 1;
        Ok(order)
    }
}

/// In-memory timeout instance repository.
#[derive(Default)]
pub struct InMemoryTimeoutInstanceRepository {
    instances: DashMap<Uuid, TimeoutInstance>,
}

impl InMemoryTimeoutInstanceRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TimeoutInstanceRepository for InMemoryTimeoutInstanceRepository {
    async fn insert(&self, instance: &TimeoutInstance) -> PersistenceResult<()> {
        if self.instances.contains_key(&instance.uuid) {
            return Err(PersistenceError::Duplicate {
                entity: "timeout_instance",
                id: instance.uuid.to_string(),
            });
        }
        self.instances.insert(instance.uuid, instance.clone());
        Ok(())
    }

    async fn find(&self, uuid: &Uuid) -> PersistenceResult<Option<TimeoutInstance>> {
        Ok(self.instances.get(uuid).map(|i| i.clone()))
    }

    async fn update(&self, instance: &TimeoutInstance) -> PersistenceResult<TimeoutInstance> {
        let mut stored = self
            .instances
            .get_mut(&instance.uuid)
            .ok_or_else(|| not_found("timeout_instance", instance.uuid))?;
        if stored.version != instance.version {
            return Err(stale("timeout_instance", instance.uuid, instance.version));
        }
        let mut next = instance.clone();
        next.version += 1;
        *stored = next.clone();
        Ok(next)
    }

    async fn find_by_node_execution(
        &self,
        node_execution_id: &NodeExecutionId,
    ) -> PersistenceResult<Vec<TimeoutInstance>> {
        Ok(self
            .instances
            .iter()
            .filter(|i| &i.node_execution_id == node_execution_id)
            .map(|i| i.clone())
            .collect())
    }

    async fn find_live(&self) -> PersistenceResult<Vec<TimeoutInstance>> {
        Ok(self
            .instances
            .iter()
            .filter(|i| !i.tracker.fired)
            .map(|i| i.clone())
            .collect())
    }

    async fn delete(&self, uuid: &Uuid) -> PersistenceResult<()> {
        self.instances.remove(uuid);
        Ok(())
    }
}
