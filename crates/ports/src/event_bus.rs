//! Event Bus Port
//!
//! Engine-emitted events consumed by observers (read models, notification
//! layers, tests). Publishing is best-effort from the engine's point of
//! view: a full bus is an operational signal, not a state-machine error.

use async_trait::async_trait;
use ibai_core::{
    InterruptId, InterruptType, NodeExecutionId, NodeId, PlanExecutionId, Status, TimeoutDimension,
};

/// Events emitted by the orchestration engine.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    NodeStatusChanged {
        plan_execution_id: PlanExecutionId,
        node_execution_id: NodeExecutionId,
        node_id: NodeId,
        from: Status,
        to: Status,
    },

    PlanExecutionConcluded {
        plan_execution_id: PlanExecutionId,
        status: Status,
    },

    InterruptRegistered {
        interrupt_id: InterruptId,
        interrupt_type: InterruptType,
        plan_execution_id: PlanExecutionId,
    },

    InterruptApplied {
        interrupt_id: InterruptId,
        interrupt_type: InterruptType,
        plan_execution_id: PlanExecutionId,
        touched_nodes: usize,
    },

    BarrierDown {
        identifier: String,
        plan_execution_id: PlanExecutionId,
    },

    RestraintActivated {
        resource_unit: String,
        release_entity_id: String,
    },

    TimeoutFired {
        node_execution_id: NodeExecutionId,
        dimension: TimeoutDimension,
    },
}

/// Event bus error types
#[derive(thiserror::Error, Debug)]
pub enum EventBusError {
    #[error("bus full (capacity: {0})")]
    Full(usize),

    #[error("channel closed")]
    Closed,

    #[error("internal error: {0}")]
    Internal(String),
}

/// Event publisher port
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, event: EngineEvent) -> Result<(), EventBusError>;
}
