//! Task Dispatcher Port
//!
//! Remote work delegation: the engine submits an opaque request and the
//! worker layer calls back with a `StepResponse` keyed by the callback id.

use crate::step_handler::TaskRequest;
use async_trait::async_trait;
use ibai_core::{CallbackId, TaskId};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("no worker available for task type {0}")]
    NoWorker(String),

    #[error("dispatch failed: {0}")]
    Submission(String),
}

#[async_trait]
pub trait TaskDispatcher: Send + Sync {
    /// Submit remote work; completion arrives later through the engine's
    /// callback ingress keyed by `callback_id`.
    async fn submit(
        &self,
        request: TaskRequest,
        callback_id: CallbackId,
    ) -> Result<TaskId, DispatchError>;
}
