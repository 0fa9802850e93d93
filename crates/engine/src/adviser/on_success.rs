//! On-success adviser: proceed to the configured next node.

use super::{Adviser, parse_parameters};
use ibai_core::{Advice, AdvisingEvent, NodeId, Result};
use serde::Deserialize;

#[derive(Debug, Default, Deserialize)]
pub struct OnSuccessParameters {
    #[serde(default)]
    pub next_node_id: Option<String>,
}

pub struct OnSuccessAdviser;

impl Adviser for OnSuccessAdviser {
    fn can_advise(&self, event: &AdvisingEvent, _parameters: &serde_json::Value) -> bool {
        event.to_status.is_positive()
    }

    fn on_advise_event(
        &self,
        _event: &AdvisingEvent,
        parameters: &serde_json::Value,
    ) -> Result<Advice> {
        let params: OnSuccessParameters = parse_parameters(parameters)?;
        Ok(match params.next_node_id {
            Some(next) => Advice::NextStep {
                next_node_id: NodeId::from(next),
            },
            None => Advice::EndPlan,
        })
    }
}
