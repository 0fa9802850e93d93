//! Ports - Collaborator Interfaces
//!
//! Narrow interfaces through which the orchestration engine consumes its
//! collaborators: the durable versioned store, step implementations, the
//! remote task-dispatch layer and the event bus. Adapters implement these;
//! the engine never sees a concrete technology.

pub mod barrier_repository;
pub mod error;
pub mod event_bus;
pub mod interrupt_repository;
pub mod node_execution_repository;
pub mod plan_execution_repository;
pub mod restraint_repository;
pub mod step_handler;
pub mod task_dispatcher;
pub mod timeout_repository;

pub use crate::barrier_repository::BarrierRepository;
pub use crate::error::{PersistenceError, PersistenceResult};
pub use crate::event_bus::{EngineEvent, EventBusError, EventPublisher};
pub use crate::interrupt_repository::InterruptRepository;
pub use crate::node_execution_repository::NodeExecutionRepository;
pub use crate::plan_execution_repository::PlanExecutionRepository;
pub use crate::restraint_repository::RestraintRepository;
pub use crate::step_handler::{StepError, StepHandler, StepResult, TaskRequest};
pub use crate::task_dispatcher::{DispatchError, TaskDispatcher};
pub use crate::timeout_repository::TimeoutInstanceRepository;
