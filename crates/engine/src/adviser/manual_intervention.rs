//! Manual-intervention adviser: park the node for an operator decision.

use super::{Adviser, parse_parameters};
use ibai_core::{Advice, AdvisingEvent, RepairAction, Result};
use serde::Deserialize;
use std::time::Duration;

const DEFAULT_TIMEOUT_SECS: u64 = 24 * 60 * 60;

#[derive(Debug, Default, Deserialize)]
pub struct ManualInterventionParameters {
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    /// Applied when the intervention window elapses without an operator
    /// decision.
    #[serde(default)]
    pub timeout_action: RepairAction,
}

pub struct ManualInterventionAdviser;

impl Adviser for ManualInterventionAdviser {
    fn can_advise(&self, event: &AdvisingEvent, _parameters: &serde_json::Value) -> bool {
        event.to_status.is_broken()
    }

    fn on_advise_event(
        &self,
        _event: &AdvisingEvent,
        parameters: &serde_json::Value,
    ) -> Result<Advice> {
        let params: ManualInterventionParameters = parse_parameters(parameters)?;
        Ok(Advice::InterventionWait {
            timeout: Duration::from_secs(params.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS)),
            timeout_action: params.timeout_action,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adviser::test_support::advising_event;
    use ibai_core::Status;
    use serde_json::json;

    #[test]
    fn test_parks_broken_node() {
        let adviser = ManualInterventionAdviser;
        let event = advising_event(Status::Running, Status::Failed);
        assert!(adviser.can_advise(&event, &json!({})));
        let advice = adviser
            .on_advise_event(&event, &json!({"timeout_secs": 300, "timeout_action": "END_PLAN"}))
            .unwrap();
        assert_eq!(
            advice,
            Advice::InterventionWait {
                timeout: Duration::from_secs(300),
                timeout_action: RepairAction::EndPlan,
            }
        );
    }
}
