//! Facilitator subsystem
//!
//! Facilitators decide how a node executes once it is about to run. Each
//! plan node carries an ordered obtainment list; facilitators are consulted
//! in order and the first one producing a response wins.

mod barrier;
mod fixed;
mod restraint;

pub use barrier::BarrierFacilitator;
pub use fixed::FixedModeFacilitator;
pub use restraint::RestraintFacilitator;

use crate::barrier::BarrierService;
use crate::registry::Registry;
use async_trait::async_trait;
use ibai_core::{
    Ambiance, EngineError, ExecutionMode, FacilitatorResponse, FacilitatorType, PlanNode, Result,
};
use std::sync::Arc;

/// Policy deciding the execution mode of a node.
#[async_trait]
pub trait Facilitator: Send + Sync {
    /// `None` passes the decision to the next configured facilitator.
    async fn facilitate(
        &self,
        ambiance: &Ambiance,
        step_parameters: &serde_json::Value,
        facilitator_parameters: &serde_json::Value,
    ) -> Result<Option<FacilitatorResponse>>;
}

/// Named registry instance over facilitator handlers.
pub struct FacilitatorService {
    registry: Registry<FacilitatorType, Arc<dyn Facilitator>>,
}

impl FacilitatorService {
    /// Build the service with the canonical facilitators registered. The
    /// barrier facilitator needs the barrier service to inspect peers.
    pub fn new(barriers: Arc<BarrierService>) -> Result<Self> {
        let registry: Registry<FacilitatorType, Arc<dyn Facilitator>> = Registry::new();
        registry.register(
            FacilitatorType::Sync,
            Arc::new(FixedModeFacilitator::new(ExecutionMode::Sync)),
        )?;
        registry.register(
            FacilitatorType::Async,
            Arc::new(FixedModeFacilitator::new(ExecutionMode::Async)),
        )?;
        registry.register(
            FacilitatorType::Task,
            Arc::new(FixedModeFacilitator::new(ExecutionMode::Task)),
        )?;
        registry.register(
            FacilitatorType::TaskChain,
            Arc::new(FixedModeFacilitator::new(ExecutionMode::TaskChain)),
        )?;
        registry.register(
            FacilitatorType::Child,
            Arc::new(FixedModeFacilitator::new(ExecutionMode::Child)),
        )?;
        registry.register(
            FacilitatorType::Children,
            Arc::new(FixedModeFacilitator::new(ExecutionMode::Children)),
        )?;
        registry.register(
            FacilitatorType::Barrier,
            Arc::new(BarrierFacilitator::new(barriers)),
        )?;
        registry.register(FacilitatorType::ResourceRestraint, Arc::new(RestraintFacilitator))?;
        Ok(Self { registry })
    }

    /// Consult the node's facilitators in configured order.
    pub async fn facilitate(
        &self,
        node: &PlanNode,
        ambiance: &Ambiance,
    ) -> Result<FacilitatorResponse> {
        for obtainment in &node.facilitator_obtainments {
            let facilitator = self.registry.obtain(&obtainment.facilitator_type)?;
            if let Some(response) = facilitator
                .facilitate(ambiance, &node.step_parameters, &obtainment.parameters)
                .await?
            {
                return Ok(response);
            }
        }
        Err(EngineError::Validation(format!(
            "no facilitator produced a response for node {}",
            node.node_id
        )))
    }
}
