//! Ignore adviser: keep the broken status but continue the happy path.

use super::{Adviser, parse_parameters};
use ibai_core::{Advice, AdvisingEvent, NodeId, Result};
use serde::Deserialize;

#[derive(Debug, Default, Deserialize)]
pub struct IgnoreParameters {
    #[serde(default)]
    pub next_node_id: Option<String>,
}

pub struct IgnoreAdviser;

impl Adviser for IgnoreAdviser {
    fn can_advise(&self, event: &AdvisingEvent, _parameters: &serde_json::Value) -> bool {
        event.to_status.is_broken()
    }

    fn on_advise_event(
        &self,
        _event: &AdvisingEvent,
        parameters: &serde_json::Value,
    ) -> Result<Advice> {
        let params: IgnoreParameters = parse_parameters(parameters)?;
        Ok(Advice::IgnoreFailure {
            next_node_id: params.next_node_id.map(NodeId::from),
        })
    }
}
