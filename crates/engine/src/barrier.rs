//! Barrier Service
//!
//! Rendezvous across parallel branches. One instance exists per
//! (identifier, plan execution), created lazily the first time a branch
//! references the identifier; the participant set is computed from the plan
//! at that moment. Arrival counting and the STANDING→DOWN flip are
//! linearized through versioned updates, so concurrent arrivals never
//! double count and a barrier never stands back up.

use crate::cas::backoff;
use crate::config::CasConfig;
use crate::driver::NodeDriver;
use crate::plan_store::PlanStore;
use crate::steps::BARRIER_STEP_TYPE;
use ibai_core::{
    BarrierExecutionInstance, BarrierPosition, BarrierState, EngineError, NodeExecutionId, NodeId,
    PlanExecutionId, Result, StepResponse,
};
use ibai_ports::{BarrierRepository, EngineEvent, EventPublisher, PersistenceError};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub struct BarrierService {
    barriers: Arc<dyn BarrierRepository>,
    plans: Arc<PlanStore>,
    driver: Arc<dyn NodeDriver>,
    publisher: Arc<dyn EventPublisher>,
    cas: CasConfig,
}

impl BarrierService {
    pub fn new(
        barriers: Arc<dyn BarrierRepository>,
        plans: Arc<PlanStore>,
        driver: Arc<dyn NodeDriver>,
        publisher: Arc<dyn EventPublisher>,
        cas: CasConfig,
    ) -> Self {
        Self {
            barriers,
            plans,
            driver,
            publisher,
            cas,
        }
    }

    pub async fn find_by_identifier_and_plan_execution_id(
        &self,
        identifier: &str,
        plan_execution_id: &PlanExecutionId,
    ) -> Result<Vec<BarrierExecutionInstance>> {
        Ok(self
            .barriers
            .find_by_identifier_and_plan_execution_id(identifier, plan_execution_id)
            .await?)
    }

    /// Instance for an identifier, created lazily on first reference with
    /// the participant positions the plan declares.
    pub async fn ensure_instance(
        &self,
        plan_execution_id: PlanExecutionId,
        identifier: &str,
    ) -> Result<BarrierExecutionInstance> {
        let existing = self
            .barriers
            .find_by_identifier_and_plan_execution_id(identifier, &plan_execution_id)
            .await?;
        if let Some(instance) = existing.into_iter().next() {
            return Ok(instance);
        }

        let positions = self.participant_positions(&plan_execution_id, identifier)?;
        if positions.is_empty() {
            return Err(EngineError::Validation(format!(
                "no plan node references barrier {}",
                identifier
            )));
        }
        let instance = BarrierExecutionInstance::new(identifier, plan_execution_id, positions);
        match self.barriers.insert(&instance).await {
            Ok(()) => Ok(instance),
            // Lost the creation race; take the winner.
            Err(PersistenceError::Duplicate { .. }) => {
                let raced = self
                    .barriers
                    .find_by_identifier_and_plan_execution_id(identifier, &plan_execution_id)
                    .await?;
                raced.into_iter().next().ok_or_else(|| {
                    EngineError::Persistence(format!("barrier {} vanished after race", identifier))
                })
            }
            Err(err) => Err(err.into()),
        }
    }

    /// One branch arrived. Returns the barrier state after the arrival; a
    /// DOWN result means this arrival released the rendezvous and every
    /// parked participant has been resumed.
    pub async fn arrive(
        &self,
        plan_execution_id: PlanExecutionId,
        identifier: &str,
        node_id: &NodeId,
        node_execution_id: NodeExecutionId,
    ) -> Result<BarrierState> {
        let instance = self.ensure_instance(plan_execution_id, identifier).await?;

        let mut attempts = 0;
        let updated = loop {
            attempts += 1;
            let fresh = self
                .barriers
                .find(&instance.uuid)
                .await?
                .ok_or_else(|| EngineError::NotFound(format!("barrier {}", instance.uuid)))?;
            if fresh.state == BarrierState::Down {
                // A barrier never stands back up; arriving after DOWN is a
                // caller error, surfaced instead of silently dropped.
                return Err(EngineError::Validation(format!(
                    "stale arrival on barrier {}: already down",
                    identifier
                )));
            }
            let mut next = fresh;
            {
                let position = next.position_mut(node_id).ok_or_else(|| {
                    EngineError::Validation(format!(
                        "node {} is not a participant of barrier {}",
                        node_id, identifier
                    ))
                })?;
                position.arrived = true;
                position.node_execution_id = Some(node_execution_id);
            }
            if next.all_arrived() {
                next.state = BarrierState::Down;
            }
            match self.barriers.update(&next).await {
                Ok(stored) => break stored,
                Err(err) if err.is_stale_version() && attempts < self.cas.max_attempts => {
                    backoff(&self.cas, attempts).await;
                }
                Err(err) if err.is_stale_version() => {
                    return Err(EngineError::StaleVersionConflict {
                        entity: "barrier",
                        id: instance.uuid.to_string(),
                        attempts,
                    });
                }
                Err(err) => return Err(err.into()),
            }
        };

        debug!(
            identifier,
            arrivals = updated.arrivals(),
            expected = updated.expected_participants(),
            "barrier arrival"
        );

        if updated.state == BarrierState::Down {
            info!(identifier, %plan_execution_id, "barrier down");
            if let Err(err) = self
                .publisher
                .publish(EngineEvent::BarrierDown {
                    identifier: identifier.to_string(),
                    plan_execution_id,
                })
                .await
            {
                warn!(error = %err, "barrier event publish failed");
            }
            // Resume every parked participant; the final arriver is resumed
            // through the same path once it parks.
            for waiter in updated
                .positions
                .iter()
                .filter_map(|p| p.node_execution_id)
                .filter(|id| *id != node_execution_id)
            {
                if let Err(err) = self.driver.resume_with(waiter, StepResponse::succeeded()).await
                {
                    warn!(node_execution_id = %waiter, error = %err, "barrier resume failed");
                }
            }
        }
        Ok(updated.state)
    }

    /// Resume the final arriver after it parked (ASYNC arrival of the
    /// participant that took the barrier down).
    pub async fn resume_final_arriver(&self, node_execution_id: NodeExecutionId) -> Result<()> {
        self.driver
            .resume_with(node_execution_id, StepResponse::succeeded())
            .await
    }

    /// Versioned state update, exposed for operational tooling.
    pub async fn update_state(
        &self,
        barrier_uuid: Uuid,
        new_state: BarrierState,
    ) -> Result<BarrierExecutionInstance> {
        let mut attempts = 0;
        loop {
            attempts += 1;
            let mut instance = self
                .barriers
                .find(&barrier_uuid)
                .await?
                .ok_or_else(|| EngineError::NotFound(format!("barrier {}", barrier_uuid)))?;
            if instance.state == BarrierState::Down && new_state == BarrierState::Standing {
                return Err(EngineError::Validation(
                    "a barrier never transitions DOWN to STANDING".to_string(),
                ));
            }
            instance.state = new_state;
            match self.barriers.update(&instance).await {
                Ok(stored) => return Ok(stored),
                Err(err) if err.is_stale_version() && attempts < self.cas.max_attempts => {
                    backoff(&self.cas, attempts).await;
                }
                Err(err) if err.is_stale_version() => {
                    return Err(EngineError::StaleVersionConflict {
                        entity: "barrier",
                        id: barrier_uuid.to_string(),
                        attempts,
                    });
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    /// Participant positions: every plan node of the barrier step type
    /// referencing this identifier, computed at plan-creation time.
    fn participant_positions(
        &self,
        plan_execution_id: &PlanExecutionId,
        identifier: &str,
    ) -> Result<Vec<BarrierPosition>> {
        let plan = self.plans.get(plan_execution_id)?;
        Ok(plan
            .nodes_with_step_type(BARRIER_STEP_TYPE)
            .into_iter()
            .filter(|node| {
                node.step_parameters
                    .get("identifier")
                    .and_then(|v| v.as_str())
                    .is_some_and(|id| id == identifier)
            })
            .map(|node| BarrierPosition::new(node.node_id.clone()))
            .collect())
    }
}
