//! Engine-internal step handlers
//!
//! Barrier and restraint gates are steps from the plan's point of view but
//! their semantics live in the engine, so their handlers are wired into the
//! step registry here. A handler may return a flowing waiting status to
//! park the node; the matching service resumes it later.

use crate::barrier::BarrierService;
use crate::expression;
use crate::restraint::ResourceRestraintService;
use async_trait::async_trait;
use ibai_core::{
    Ambiance, BarrierState, CallbackId, NodeExecutionId, NodeId, Status, StepResponse,
};
use ibai_ports::{StepError, StepHandler, StepResult};
use std::sync::Arc;
use tracing::debug;

pub const BARRIER_STEP_TYPE: &str = "BARRIER";
pub const RESOURCE_RESTRAINT_STEP_TYPE: &str = "RESOURCE_RESTRAINT";
pub const RESOURCE_RESTRAINT_RELEASE_STEP_TYPE: &str = "RESOURCE_RESTRAINT_RELEASE";

/// The engine pins the innermost ambiance level to the node execution, so
/// handlers can recover their own identity from the context stack.
fn own_execution(ambiance: &Ambiance) -> StepResult<(NodeId, NodeExecutionId)> {
    let level = ambiance
        .current_level()
        .ok_or_else(|| StepError::Execution("ambiance has no levels".to_string()))?;
    Ok((
        NodeId::from(level.setup_id.as_str()),
        NodeExecutionId::from_uuid(level.runtime_id),
    ))
}

fn required_str<'a>(parameters: &'a serde_json::Value, key: &str) -> StepResult<&'a str> {
    parameters
        .get(key)
        .and_then(|v| v.as_str())
        .ok_or_else(|| StepError::Execution(format!("missing step parameter: {}", key)))
}

/// Barrier rendezvous gate.
pub struct BarrierStepHandler {
    barriers: Arc<BarrierService>,
}

impl BarrierStepHandler {
    pub fn new(barriers: Arc<BarrierService>) -> Self {
        Self { barriers }
    }
}

#[async_trait]
impl StepHandler for BarrierStepHandler {
    /// Sole-participant path: the arrival takes the barrier down at once.
    async fn execute_sync(
        &self,
        ambiance: &Ambiance,
        parameters: &serde_json::Value,
    ) -> StepResult<StepResponse> {
        let identifier = required_str(parameters, "identifier")?;
        let (node_id, node_execution_id) = own_execution(ambiance)?;
        let state = self
            .barriers
            .arrive(ambiance.plan_execution_id, identifier, &node_id, node_execution_id)
            .await
            .map_err(|err| StepError::Execution(err.to_string()))?;
        match state {
            BarrierState::Down => Ok(StepResponse::succeeded()),
            // Peers appeared between facilitation and arrival; park.
            BarrierState::Standing => Ok(StepResponse {
                status: Status::AsyncWaiting,
                failure_info: None,
                outputs: Default::default(),
            }),
        }
    }

    /// Multi-participant path: the node is already parked; the arrival that
    /// takes the barrier down resumes every participant.
    async fn execute_async(
        &self,
        ambiance: &Ambiance,
        parameters: &serde_json::Value,
        _callback_id: CallbackId,
    ) -> StepResult<()> {
        let identifier = required_str(parameters, "identifier")?;
        let (node_id, node_execution_id) = own_execution(ambiance)?;
        let state = self
            .barriers
            .arrive(ambiance.plan_execution_id, identifier, &node_id, node_execution_id)
            .await
            .map_err(|err| StepError::Execution(err.to_string()))?;
        if state == BarrierState::Down {
            debug!(identifier, "final arrival took the barrier down");
            self.barriers
                .resume_final_arriver(node_execution_id)
                .await
                .map_err(|err| StepError::Execution(err.to_string()))?;
        }
        Ok(())
    }
}

/// Capacity-gate acquisition step.
pub struct RestraintStepHandler {
    restraints: Arc<ResourceRestraintService>,
}

impl RestraintStepHandler {
    pub fn new(restraints: Arc<ResourceRestraintService>) -> Self {
        Self { restraints }
    }
}

#[async_trait]
impl StepHandler for RestraintStepHandler {
    async fn execute_sync(
        &self,
        ambiance: &Ambiance,
        parameters: &serde_json::Value,
    ) -> StepResult<StepResponse> {
        let restraint_name = required_str(parameters, "restraint")?;
        let resource_unit = required_str(parameters, "resource_unit")?;
        let permits = parameters
            .get("permits")
            .and_then(|v| v.as_u64())
            .unwrap_or(1) as u32;
        let (_, node_execution_id) = own_execution(ambiance)?;
        let release_entity_id = match parameters.get("release_entity_id").and_then(|v| v.as_str())
        {
            Some(raw) => expression::resolve(ambiance, raw),
            None => node_execution_id.to_string(),
        };

        let instance = self
            .restraints
            .acquire(
                restraint_name,
                resource_unit,
                permits,
                &release_entity_id,
                Some(node_execution_id),
            )
            .await
            .map_err(|err| StepError::Execution(err.to_string()))?;

        if instance.is_active() {
            Ok(StepResponse::succeeded()
                .with_output("release_entity_id", release_entity_id.into()))
        } else {
            Ok(StepResponse {
                status: Status::ResourceWaiting,
                failure_info: None,
                outputs: Default::default(),
            })
        }
    }
}

/// Companion release step freeing the permit at the end of the protected
/// scope.
pub struct RestraintReleaseStepHandler {
    restraints: Arc<ResourceRestraintService>,
}

impl RestraintReleaseStepHandler {
    pub fn new(restraints: Arc<ResourceRestraintService>) -> Self {
        Self { restraints }
    }
}

#[async_trait]
impl StepHandler for RestraintReleaseStepHandler {
    async fn execute_sync(
        &self,
        ambiance: &Ambiance,
        parameters: &serde_json::Value,
    ) -> StepResult<StepResponse> {
        let resource_unit = required_str(parameters, "resource_unit")?;
        let release_entity_id =
            expression::resolve(ambiance, required_str(parameters, "release_entity_id")?);
        self.restraints
            .finish(resource_unit, &release_entity_id)
            .await
            .map_err(|err| StepError::Execution(err.to_string()))?;
        Ok(StepResponse::succeeded())
    }
}
