//! Adapters - In-Memory Collaborator Implementations
//!
//! Reference implementations of the orchestration ports: versioned
//! in-memory document stores with real compare-and-swap semantics, a
//! broadcast event bus and deterministic step/dispatcher fakes for tests.

pub mod bus;
pub mod memory;
pub mod testing;

pub use crate::bus::InMemoryBus;
pub use crate::memory::{
    InMemoryBarrierRepository, InMemoryInterruptRepository, InMemoryNodeExecutionRepository,
    InMemoryPlanExecutionRepository, InMemoryRestraintRepository,
    InMemoryTimeoutInstanceRepository,
};
pub use crate::testing::{
    AsyncStepHandler, ChildrenStepHandler, FailingStepHandler, FlakyStepHandler,
    RecordingTaskDispatcher, SucceedingStepHandler, TaskStepHandler, WaitingStepHandler,
};
