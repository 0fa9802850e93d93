//! Orchestration Engine
//!
//! Drives the runtime execution of a statically compiled plan: triggers
//! each node, facilitates its execution mode, routes outcomes through the
//! adviser chain, applies external interrupts, synchronizes branches on
//! barriers, gates shared resources behind restraints and enforces
//! pausable deadlines. All cross-node coordination is compare-and-swap
//! against the versioned store so multiple engine instances can run
//! concurrently.

pub mod adviser;
pub mod barrier;
pub mod cas;
pub mod config;
pub mod driver;
pub mod executor;
pub mod expression;
pub mod facilitator;
pub mod graph;
pub mod interrupt;
pub mod plan_store;
pub mod registry;
pub mod restraint;
pub mod steps;
pub mod telemetry;
pub mod timeout;
pub mod transitions;

pub use crate::adviser::{Adviser, AdviserService};
pub use crate::barrier::BarrierService;
pub use crate::config::{CasConfig, EngineConfig};
pub use crate::driver::{DriverHandle, NodeDriver};
pub use crate::executor::{EngineBuilder, OrchestrationEngine};
pub use crate::facilitator::{Facilitator, FacilitatorService};
pub use crate::graph::{GraphVertex, OrchestrationGraph, OrchestrationGraphService};
pub use crate::interrupt::{InterruptHandler, InterruptOutcome, InterruptService};
pub use crate::registry::Registry;
pub use crate::restraint::ResourceRestraintService;
pub use crate::steps::{
    BARRIER_STEP_TYPE, RESOURCE_RESTRAINT_RELEASE_STEP_TYPE, RESOURCE_RESTRAINT_STEP_TYPE,
};
pub use crate::timeout::{TimeoutEngine, TimeoutEvent, TimeoutTrackerFactory};
