//! Barrier facilitation
//!
//! A barrier node with no peers has nothing to wait for: when this node is
//! the only participant of the barrier instance under the current plan
//! execution it runs SYNC, skipping the async bookkeeping. With peers it
//! runs ASYNC and the barrier's DOWN transition is what resumes it.

use super::Facilitator;
use crate::barrier::BarrierService;
use async_trait::async_trait;
use ibai_core::{Ambiance, EngineError, ExecutionMode, FacilitatorResponse, Result};
use std::sync::Arc;

pub struct BarrierFacilitator {
    barriers: Arc<BarrierService>,
}

impl BarrierFacilitator {
    pub fn new(barriers: Arc<BarrierService>) -> Self {
        Self { barriers }
    }
}

#[async_trait]
impl Facilitator for BarrierFacilitator {
    async fn facilitate(
        &self,
        ambiance: &Ambiance,
        step_parameters: &serde_json::Value,
        _facilitator_parameters: &serde_json::Value,
    ) -> Result<Option<FacilitatorResponse>> {
        let identifier = step_parameters
            .get("identifier")
            .and_then(|v| v.as_str())
            .ok_or_else(|| {
                EngineError::Validation("barrier step requires an identifier".to_string())
            })?;

        let instance = self
            .barriers
            .ensure_instance(ambiance.plan_execution_id, identifier)
            .await?;

        let mode = if instance.expected_participants() <= 1 {
            ExecutionMode::Sync
        } else {
            ExecutionMode::Async
        };
        Ok(Some(FacilitatorResponse::new(mode)))
    }
}
