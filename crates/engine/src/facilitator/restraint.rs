//! Restraint facilitation
//!
//! Restraint steps run inline: the admission scan inside the acquire call
//! settles whether the node proceeds or parks in RESOURCE_WAITING, so the
//! facilitator has no async bookkeeping to set up.

use super::Facilitator;
use async_trait::async_trait;
use ibai_core::{Ambiance, ExecutionMode, FacilitatorResponse, Result};

pub struct RestraintFacilitator;

#[async_trait]
impl Facilitator for RestraintFacilitator {
    async fn facilitate(
        &self,
        _ambiance: &Ambiance,
        _step_parameters: &serde_json::Value,
        _facilitator_parameters: &serde_json::Value,
    ) -> Result<Option<FacilitatorResponse>> {
        Ok(Some(FacilitatorResponse::new(ExecutionMode::Sync)))
    }
}
