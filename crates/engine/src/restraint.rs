//! Resource Restraint Service
//!
//! Capacity-limited admission control: a weighted semaphore with strict
//! FIFO fairness per resource unit. Instances queue BLOCKED in arrival
//! order; the admission scan activates them while their permits fit under
//! the definition's capacity and never skips ahead, even when a later,
//! smaller request would fit.

use crate::cas::backoff;
use crate::config::CasConfig;
use crate::driver::NodeDriver;
use ibai_core::{
    EngineError, NodeExecutionId, ResourceRestraint, ResourceRestraintInstance, RestraintState,
    Result, StepResponse,
};
use ibai_ports::{EngineEvent, EventPublisher, RestraintRepository};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub struct ResourceRestraintService {
    restraints: Arc<dyn RestraintRepository>,
    driver: Arc<dyn NodeDriver>,
    publisher: Arc<dyn EventPublisher>,
    cas: CasConfig,
}

impl ResourceRestraintService {
    pub fn new(
        restraints: Arc<dyn RestraintRepository>,
        driver: Arc<dyn NodeDriver>,
        publisher: Arc<dyn EventPublisher>,
        cas: CasConfig,
    ) -> Self {
        Self {
            restraints,
            driver,
            publisher,
            cas,
        }
    }

    /// Register a restraint definition.
    pub async fn register_restraint(
        &self,
        name: impl Into<String>,
        capacity: u32,
    ) -> Result<ResourceRestraint> {
        let restraint = ResourceRestraint::new(name, capacity);
        self.restraints.save_definition(&restraint).await?;
        Ok(restraint)
    }

    /// Queue a permit request on a resource unit. The returned instance is
    /// ACTIVE when it was admitted immediately, BLOCKED when it has to wait
    /// its turn. `holder` is the node execution to resume on admission.
    pub async fn acquire(
        &self,
        restraint_name: &str,
        resource_unit: &str,
        permits: u32,
        release_entity_id: &str,
        holder: Option<NodeExecutionId>,
    ) -> Result<ResourceRestraintInstance> {
        let definition = self
            .restraints
            .find_definition_by_name(restraint_name)
            .await?
            .ok_or_else(|| {
                EngineError::NotFound(format!("resource restraint {}", restraint_name))
            })?;
        if permits > definition.capacity {
            return Err(EngineError::Validation(format!(
                "request of {} permits exceeds capacity {} of restraint {}",
                permits, definition.capacity, restraint_name
            )));
        }

        let order = self.restraints.next_order(resource_unit).await?;
        let mut instance = ResourceRestraintInstance::new(
            resource_unit,
            definition.uuid,
            permits,
            order,
            release_entity_id,
        );
        if let Some(holder) = holder {
            instance = instance.with_holder(holder);
        }
        self.restraints.insert_instance(&instance).await?;
        debug!(resource_unit, permits, order, "restraint acquisition queued");

        let activated = self.run_admission(resource_unit).await?;
        // Parked peers admitted by this scan are resumed; the caller learns
        // its own admission from the returned state.
        for peer in activated.iter().filter(|a| a.uuid != instance.uuid) {
            self.resume_holder(peer).await;
        }

        self.restraints
            .find_instance(&instance.uuid)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("restraint instance {}", instance.uuid)))
    }

    /// Release a permit and re-run the admission scan, resuming whatever
    /// the freed capacity lets through.
    pub async fn finish(&self, resource_unit: &str, release_entity_id: &str) -> Result<()> {
        let instance = self
            .restraints
            .find_by_release_entity(resource_unit, release_entity_id)
            .await?
            .ok_or_else(|| {
                EngineError::NotFound(format!(
                    "active restraint instance for {} on {}",
                    release_entity_id, resource_unit
                ))
            })?;

        self.transition_instance(instance.uuid, RestraintState::Active, RestraintState::Finished)
            .await?;
        info!(resource_unit, release_entity_id, "restraint permit released");

        let activated = self.run_admission(resource_unit).await?;
        for peer in &activated {
            self.resume_holder(peer).await;
        }
        Ok(())
    }

    /// Admission scan over one resource unit: sum ACTIVE permits, walk the
    /// BLOCKED queue in FIFO order, admit while capacity allows, stop at the
    /// first request that does not fit.
    async fn run_admission(&self, resource_unit: &str) -> Result<Vec<ResourceRestraintInstance>> {
        let mut activated = Vec::new();
        'scan: loop {
            let instances = self
                .restraints
                .find_instances_ordered(
                    resource_unit,
                    &[RestraintState::Blocked, RestraintState::Active],
                )
                .await?;
            let Some(head) = instances.first() else {
                return Ok(activated);
            };
            let capacity = self
                .restraints
                .find_definition(&head.resource_restraint_id)
                .await?
                .map(|d| d.capacity)
                .ok_or_else(|| {
                    EngineError::NotFound(format!(
                        "restraint definition {}",
                        head.resource_restraint_id
                    ))
                })?;

            let active_permits: u32 = instances
                .iter()
                .filter(|i| i.is_active())
                .map(|i| i.permits)
                .sum();
            let mut budget = capacity.saturating_sub(active_permits);

            for instance in instances.iter().filter(|i| i.is_blocked()) {
                if instance.permits > budget {
                    // Strict FIFO: nothing behind this request may jump it.
                    break;
                }
                if activated.iter().any(|a: &ResourceRestraintInstance| a.uuid == instance.uuid) {
                    continue;
                }
                match self
                    .transition_instance(
                        instance.uuid,
                        RestraintState::Blocked,
                        RestraintState::Active,
                    )
                    .await
                {
                    Ok(stored) => {
                        budget -= stored.permits;
                        if let Err(err) = self
                            .publisher
                            .publish(EngineEvent::RestraintActivated {
                                resource_unit: resource_unit.to_string(),
                                release_entity_id: stored.release_entity_id.clone(),
                            })
                            .await
                        {
                            warn!(error = %err, "restraint event publish failed");
                        }
                        activated.push(stored);
                    }
                    // Someone else moved this instance; rescan from scratch.
                    Err(EngineError::StaleVersionConflict { .. }) => continue 'scan,
                    Err(err) => return Err(err),
                }
            }
            return Ok(activated);
        }
    }

    async fn transition_instance(
        &self,
        uuid: Uuid,
        expected: RestraintState,
        to: RestraintState,
    ) -> Result<ResourceRestraintInstance> {
        let mut attempts = 0;
        loop {
            attempts += 1;
            let mut instance = self
                .restraints
                .find_instance(&uuid)
                .await?
                .ok_or_else(|| EngineError::NotFound(format!("restraint instance {}", uuid)))?;
            if instance.state != expected {
                return Err(EngineError::Validation(format!(
                    "restraint instance {} is not {:?}",
                    uuid, expected
                )));
            }
            instance.state = to;
            match self.restraints.update_instance(&instance).await {
                Ok(stored) => return Ok(stored),
                Err(err) if err.is_stale_version() && attempts < self.cas.max_attempts => {
                    backoff(&self.cas, attempts).await;
                }
                Err(err) if err.is_stale_version() => {
                    return Err(EngineError::StaleVersionConflict {
                        entity: "restraint_instance",
                        id: uuid.to_string(),
                        attempts,
                    });
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    /// Wake the node execution parked behind an admitted instance.
    async fn resume_holder(&self, instance: &ResourceRestraintInstance) {
        let Some(node_execution_id) = instance.holder_node_execution_id else {
            debug!(
                release_entity_id = %instance.release_entity_id,
                "no holder recorded; skipping resume"
            );
            return;
        };
        if let Err(err) = self
            .driver
            .resume_with(node_execution_id, StepResponse::succeeded())
            .await
        {
            warn!(node_execution_id = %node_execution_id, error = %err, "restraint resume failed");
        }
    }
}
