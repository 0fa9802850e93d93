//! On-abort adviser: end the plan once a node is aborted.

use super::Adviser;
use ibai_core::{Advice, AdvisingEvent, Result, Status};

pub struct OnAbortAdviser;

impl Adviser for OnAbortAdviser {
    fn can_advise(&self, event: &AdvisingEvent, _parameters: &serde_json::Value) -> bool {
        event.to_status == Status::Aborted
    }

    fn on_advise_event(
        &self,
        _event: &AdvisingEvent,
        _parameters: &serde_json::Value,
    ) -> Result<Advice> {
        Ok(Advice::EndPlan)
    }
}
