//! Persistence error types shared by all repository ports

use thiserror::Error;

/// Error surface of the durable store.
///
/// `StaleVersion` is the optimistic-concurrency signal: the caller retries
/// its read-modify-write loop; everything else is surfaced upward.
#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("stale version on {entity} {id}: expected {expected}")]
    StaleVersion {
        entity: &'static str,
        id: String,
        expected: u64,
    },

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("duplicate {entity}: {id}")]
    Duplicate { entity: &'static str, id: String },

    #[error("storage error: {0}")]
    Storage(String),
}

impl PersistenceError {
    pub fn is_stale_version(&self) -> bool {
        matches!(self, Self::StaleVersion { .. })
    }
}

impl From<PersistenceError> for ibai_core::EngineError {
    fn from(err: PersistenceError) -> Self {
        match err {
            PersistenceError::StaleVersion { entity, id, .. } => {
                ibai_core::EngineError::StaleVersionConflict {
                    entity,
                    id,
                    attempts: 1,
                }
            }
            PersistenceError::NotFound { entity, id } => {
                ibai_core::EngineError::NotFound(format!("{} {}", entity, id))
            }
            other => ibai_core::EngineError::Persistence(other.to_string()),
        }
    }
}

pub type PersistenceResult<T> = std::result::Result<T, PersistenceError>;
