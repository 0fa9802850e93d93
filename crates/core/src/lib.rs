//! Domain Core - Orchestration Engine Types
//!
//! This crate contains the domain model of the orchestration engine: the
//! static plan, runtime execution records, the status machine, interrupt,
//! barrier, restraint and timeout records, and the shared error taxonomy.

pub mod advise;
pub mod ambiance;
pub mod barrier;
pub mod error;
pub mod facilitate;
pub mod interrupt;
pub mod node_execution;
pub mod plan;
pub mod plan_execution;
pub mod restraint;
pub mod status;
pub mod step;
pub mod timeout;

pub use crate::error::EngineError;
pub use chrono::{DateTime, Utc};
pub use uuid::Uuid;

// Re-export the types every layer needs
pub use crate::advise::{Advice, AdviserType, AdvisingEvent, RepairAction};
pub use crate::ambiance::{Ambiance, Level, StepCategory};
pub use crate::barrier::{BarrierExecutionInstance, BarrierPosition, BarrierState};
pub use crate::facilitate::{ExecutionMode, FacilitatorResponse, FacilitatorType};
pub use crate::interrupt::{Interrupt, InterruptId, InterruptType};
pub use crate::node_execution::{
    CallbackId, ExecutableResponse, InterruptEffect, NodeExecution, NodeExecutionId, TaskId,
};
pub use crate::plan::{
    AdviserObtainment, FacilitatorObtainment, NodeId, Plan, PlanNode, TimeoutObtainment,
};
pub use crate::plan_execution::{PlanExecution, PlanExecutionId};
pub use crate::restraint::{ResourceRestraint, ResourceRestraintInstance, RestraintState};
pub use crate::status::Status;
pub use crate::step::{FailureInfo, StepResponse};
pub use crate::timeout::{TimeoutDimension, TimeoutInstance, TimeoutTrackerState};

/// Domain result type
pub type Result<T> = std::result::Result<T, EngineError>;
