//! Fixed-mode facilitators for the plain execution modes.

use super::Facilitator;
use async_trait::async_trait;
use ibai_core::{Ambiance, ExecutionMode, FacilitatorResponse, Result};
use std::time::Duration;

/// Facilitator that always settles on one execution mode. An optional
/// `initial_wait_secs` parameter delays the start.
pub struct FixedModeFacilitator {
    mode: ExecutionMode,
}

impl FixedModeFacilitator {
    pub fn new(mode: ExecutionMode) -> Self {
        Self { mode }
    }
}

#[async_trait]
impl Facilitator for FixedModeFacilitator {
    async fn facilitate(
        &self,
        _ambiance: &Ambiance,
        _step_parameters: &serde_json::Value,
        facilitator_parameters: &serde_json::Value,
    ) -> Result<Option<FacilitatorResponse>> {
        let wait_secs = facilitator_parameters
            .get("initial_wait_secs")
            .and_then(|v| v.as_u64())
            .unwrap_or(0);
        Ok(Some(
            FacilitatorResponse::new(self.mode)
                .with_initial_wait(Duration::from_secs(wait_secs)),
        ))
    }
}
