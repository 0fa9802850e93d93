//! Adviser subsystem
//!
//! Advisers decide what the engine does after a node produced a status.
//! They are configured per plan node as an ordered obtainment list and
//! consulted first-match-wins: the first adviser whose `can_advise` returns
//! true produces the advice, later advisers are not consulted.

mod ignore;
mod manual_intervention;
mod on_abort;
mod on_fail;
mod on_success;
mod retry;

pub use ignore::IgnoreAdviser;
pub use manual_intervention::ManualInterventionAdviser;
pub use on_abort::OnAbortAdviser;
pub use on_fail::OnFailAdviser;
pub use on_success::OnSuccessAdviser;
pub use retry::RetryAdviser;

use crate::registry::Registry;
use ibai_core::{
    Advice, AdviserObtainment, AdviserType, AdvisingEvent, EngineError, NodeId, RepairAction,
    Result,
};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;

/// Policy deciding the engine's next move after a node status change.
pub trait Adviser: Send + Sync {
    fn can_advise(&self, event: &AdvisingEvent, parameters: &serde_json::Value) -> bool;

    fn on_advise_event(
        &self,
        event: &AdvisingEvent,
        parameters: &serde_json::Value,
    ) -> Result<Advice>;
}

/// Deserialize obtainment parameters, treating an absent payload as the
/// parameter type's default.
pub(crate) fn parse_parameters<T>(parameters: &serde_json::Value) -> Result<T>
where
    T: DeserializeOwned + Default,
{
    if parameters.is_null() {
        return Ok(T::default());
    }
    serde_json::from_value(parameters.clone())
        .map_err(|err| EngineError::Validation(format!("invalid adviser parameters: {}", err)))
}

/// Map a configured repair action to concrete advice.
pub(crate) fn advice_for_repair(
    action: RepairAction,
    next_node_id: Option<NodeId>,
    intervention_timeout: Duration,
) -> Advice {
    match action {
        RepairAction::Ignore => Advice::IgnoreFailure {
            next_node_id,
        },
        RepairAction::ManualIntervention => Advice::InterventionWait {
            timeout: intervention_timeout,
            timeout_action: RepairAction::EndPlan,
        },
        RepairAction::EndPlan | RepairAction::MarkFailed => Advice::EndPlan,
    }
}

/// Named registry instance over adviser handlers.
pub struct AdviserService {
    registry: Registry<AdviserType, Arc<dyn Adviser>>,
}

impl AdviserService {
    /// Build the service with the canonical advisers registered.
    pub fn new() -> Result<Self> {
        let registry: Registry<AdviserType, Arc<dyn Adviser>> = Registry::new();
        registry.register(AdviserType::OnSuccess, Arc::new(OnSuccessAdviser))?;
        registry.register(AdviserType::OnFail, Arc::new(OnFailAdviser))?;
        registry.register(AdviserType::OnAbort, Arc::new(OnAbortAdviser))?;
        registry.register(AdviserType::Retry, Arc::new(RetryAdviser))?;
        registry.register(
            AdviserType::ManualIntervention,
            Arc::new(ManualInterventionAdviser),
        )?;
        registry.register(AdviserType::Ignore, Arc::new(IgnoreAdviser))?;
        Ok(Self { registry })
    }

    /// Consult the node's advisers in configured order; the first match
    /// wins. `None` when no adviser matched.
    pub fn advise(
        &self,
        event: &AdvisingEvent,
        obtainments: &[AdviserObtainment],
    ) -> Result<Option<Advice>> {
        for obtainment in obtainments {
            let adviser = self.registry.obtain(&obtainment.adviser_type)?;
            if adviser.can_advise(event, &obtainment.parameters) {
                return adviser
                    .on_advise_event(event, &obtainment.parameters)
                    .map(Some);
            }
        }
        Ok(None)
    }
}
