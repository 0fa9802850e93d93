//! Step outcome contracts
//!
//! Concrete step implementations are external collaborators; the engine only
//! sees the `StepResponse` they produce, synchronously or via callback.

use crate::status::Status;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Failure detail attached to a broken step outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureInfo {
    pub error_message: String,
    /// Machine-readable failure classifier steps may set (timeouts,
    /// authorization, infrastructure), consumed by failure strategies.
    #[serde(default)]
    pub failure_types: Vec<String>,
}

impl FailureInfo {
    pub fn new(error_message: impl Into<String>) -> Self {
        Self {
            error_message: error_message.into(),
            failure_types: Vec::new(),
        }
    }
}

/// What a step reports when it finishes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResponse {
    pub status: Status,
    #[serde(default)]
    pub failure_info: Option<FailureInfo>,
    #[serde(default)]
    pub outputs: HashMap<String, serde_json::Value>,
}

impl StepResponse {
    pub fn succeeded() -> Self {
        Self {
            status: Status::Succeeded,
            failure_info: None,
            outputs: HashMap::new(),
        }
    }

    pub fn failed(failure_info: FailureInfo) -> Self {
        Self {
            status: Status::Failed,
            failure_info: Some(failure_info),
            outputs: HashMap::new(),
        }
    }

    pub fn errored(failure_info: FailureInfo) -> Self {
        Self {
            status: Status::Errored,
            failure_info: Some(failure_info),
            outputs: HashMap::new(),
        }
    }

    pub fn with_output(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.outputs.insert(key.into(), value);
        self
    }
}
