//! Facilitation data contracts
//!
//! A facilitator decides how a node executes: inline, asynchronously, as
//! delegated remote work, or by spawning children. The implementations live
//! in the engine crate.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Closed discriminator for facilitator handlers, the registry key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FacilitatorType {
    Sync,
    Async,
    Task,
    TaskChain,
    Child,
    Children,
    Barrier,
    ResourceRestraint,
}

impl FacilitatorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sync => "SYNC",
            Self::Async => "ASYNC",
            Self::Task => "TASK",
            Self::TaskChain => "TASK_CHAIN",
            Self::Child => "CHILD",
            Self::Children => "CHILDREN",
            Self::Barrier => "BARRIER",
            Self::ResourceRestraint => "RESOURCE_RESTRAINT",
        }
    }
}

impl std::fmt::Display for FacilitatorType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How the engine drives the node once facilitation settles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionMode {
    /// Run inline; the driving task blocks until the step returns.
    Sync,
    /// Fire and wait for an external callback keyed by a callback id.
    Async,
    /// Delegate one remote call to the task-dispatch layer.
    Task,
    /// Delegate a sequence of remote calls, one at a time.
    TaskChain,
    /// Spawn a single child execution and wait for it.
    Child,
    /// Spawn several child executions and wait on their aggregate.
    Children,
}

/// Decision produced by the winning facilitator.
#[derive(Debug, Clone, PartialEq)]
pub struct FacilitatorResponse {
    pub mode: ExecutionMode,
    /// Delay before the engine starts executing in the chosen mode.
    pub initial_wait: Duration,
}

impl FacilitatorResponse {
    pub fn new(mode: ExecutionMode) -> Self {
        Self {
            mode,
            initial_wait: Duration::ZERO,
        }
    }

    pub fn with_initial_wait(mut self, wait: Duration) -> Self {
        self.initial_wait = wait;
        self
    }
}
