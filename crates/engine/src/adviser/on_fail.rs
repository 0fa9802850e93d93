//! On-fail adviser: apply the configured failure-strategy action.

use super::{Adviser, advice_for_repair, parse_parameters};
use ibai_core::{Advice, AdvisingEvent, NodeId, RepairAction, Result, Status};
use serde::Deserialize;
use std::time::Duration;

const DEFAULT_INTERVENTION_TIMEOUT_SECS: u64 = 24 * 60 * 60;

#[derive(Debug, Default, Deserialize)]
pub struct OnFailParameters {
    #[serde(default)]
    pub action: RepairAction,
    /// Next node for the IGNORE action.
    #[serde(default)]
    pub next_node_id: Option<String>,
    /// Intervention window for the MANUAL_INTERVENTION action.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

pub struct OnFailAdviser;

impl Adviser for OnFailAdviser {
    fn can_advise(&self, event: &AdvisingEvent, _parameters: &serde_json::Value) -> bool {
        event.to_status.is_broken() && event.to_status != Status::Aborted
    }

    fn on_advise_event(
        &self,
        _event: &AdvisingEvent,
        parameters: &serde_json::Value,
    ) -> Result<Advice> {
        let params: OnFailParameters = parse_parameters(parameters)?;
        let timeout =
            Duration::from_secs(params.timeout_secs.unwrap_or(DEFAULT_INTERVENTION_TIMEOUT_SECS));
        Ok(advice_for_repair(
            params.action,
            params.next_node_id.map(NodeId::from),
            timeout,
        ))
    }
}
