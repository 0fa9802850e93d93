//! Error types shared across the engine

use thiserror::Error;

/// Base error type for the orchestration engine
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("duplicate registration for key: {key}")]
    DuplicateRegistration { key: String },

    #[error("no handler registered for key: {key}")]
    UnregisteredKey { key: String },

    #[error("invalid status transition from {from} to {to}")]
    InvalidStatusTransition { from: String, to: String },

    #[error("stale version conflict on {entity} {id} after {attempts} attempts")]
    StaleVersionConflict {
        entity: &'static str,
        id: String,
        attempts: u32,
    },

    #[error("interrupt target not applicable: {0}")]
    UnresolvedInterruptTarget(String),

    #[error("no adviser matched for node {node_id} on status {status}")]
    NoAdviserMatched { node_id: String, status: String },

    #[error("validation error: {0}")]
    Validation(String),

    #[error("resource not found: {0}")]
    NotFound(String),

    #[error("persistence error: {0}")]
    Persistence(String),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("event publish error: {0}")]
    EventBus(String),
}

impl EngineError {
    pub fn invalid_status_transition(from: &str, to: &str) -> Self {
        Self::InvalidStatusTransition {
            from: from.to_string(),
            to: to.to_string(),
        }
    }
}
