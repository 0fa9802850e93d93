//! Retry adviser: re-queue a fresh execution with backoff, up to a bounded
//! number of attempts, then fall back to the configured repair action.

use super::{Adviser, advice_for_repair, parse_parameters};
use ibai_core::{Advice, AdvisingEvent, NodeId, RepairAction, Result};
use serde::Deserialize;
use std::time::Duration;

const DEFAULT_INTERVENTION_TIMEOUT_SECS: u64 = 24 * 60 * 60;

#[derive(Debug, Deserialize)]
pub struct RetryParameters {
    pub retry_count: u32,
    /// Wait before each re-queue; the last entry repeats when attempts
    /// outnumber entries.
    #[serde(default)]
    pub wait_interval_secs: Vec<u64>,
    #[serde(default)]
    pub repair_action_after_retry: RepairAction,
    #[serde(default)]
    pub next_node_id: Option<String>,
}

impl Default for RetryParameters {
    fn default() -> Self {
        Self {
            retry_count: 0,
            wait_interval_secs: Vec::new(),
            repair_action_after_retry: RepairAction::default(),
            next_node_id: None,
        }
    }
}

impl RetryParameters {
    fn wait_for_attempt(&self, attempt: usize) -> Duration {
        let secs = self
            .wait_interval_secs
            .get(attempt)
            .or(self.wait_interval_secs.last())
            .copied()
            .unwrap_or(0);
        Duration::from_secs(secs)
    }
}

pub struct RetryAdviser;

impl Adviser for RetryAdviser {
    fn can_advise(&self, event: &AdvisingEvent, _parameters: &serde_json::Value) -> bool {
        event.to_status.is_broken()
    }

    fn on_advise_event(
        &self,
        event: &AdvisingEvent,
        parameters: &serde_json::Value,
    ) -> Result<Advice> {
        let params: RetryParameters = parse_parameters(parameters)?;
        let attempts = event.node_execution.retry_attempts();
        if (attempts as u32) < params.retry_count {
            Ok(Advice::Retry {
                wait: params.wait_for_attempt(attempts),
            })
        } else {
            Ok(advice_for_repair(
                params.repair_action_after_retry,
                params.next_node_id.clone().map(NodeId::from),
                Duration::from_secs(DEFAULT_INTERVENTION_TIMEOUT_SECS),
            ))
        }
    }
}
