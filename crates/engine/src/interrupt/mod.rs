//! Interrupt subsystem
//!
//! External control signals against a plan or node. Registration persists
//! the interrupt unseized; processing seizes it with a compare-and-set on
//! the seized flag, so even with racing processors exactly one executes the
//! type-specific handler. An interrupt whose target turns out not to be
//! applicable is a recorded no-op, never an error to the caller.

mod abort;
mod mark;
mod pause_resume;
mod retry;

pub use abort::{AbortAllHandler, AbortHandler};
pub use mark::{CustomFailureHandler, IgnoreHandler, MarkExpiredHandler, MarkFailedHandler, MarkSuccessHandler};
pub use pause_resume::{PauseAllHandler, ResumeAllHandler, ResumeHandler};
pub use retry::RetryHandler;

use crate::config::EngineConfig;
use crate::driver::NodeDriver;
use crate::plan_store::PlanStore;
use crate::registry::Registry;
use crate::timeout::TimeoutEngine;
use crate::transitions::TransitionService;
use async_trait::async_trait;
use ibai_core::{EngineError, Interrupt, InterruptType, Result};
use ibai_ports::{
    EngineEvent, EventPublisher, InterruptRepository, NodeExecutionRepository,
    PlanExecutionRepository,
};
use std::sync::Arc;
use tracing::{info, warn};

/// What applying an interrupt amounted to.
#[derive(Debug, Clone, PartialEq)]
pub enum InterruptOutcome {
    Applied { touched_nodes: usize },
    NoOp { reason: String },
}

/// Everything a handler needs to apply its state transition.
pub struct InterruptContext {
    pub node_executions: Arc<dyn NodeExecutionRepository>,
    pub plan_executions: Arc<dyn PlanExecutionRepository>,
    pub transitions: Arc<TransitionService>,
    pub timeouts: Arc<TimeoutEngine>,
    pub driver: Arc<dyn NodeDriver>,
    pub plans: Arc<PlanStore>,
    pub publisher: Arc<dyn EventPublisher>,
    pub config: EngineConfig,
}

/// Type-specific interrupt application.
#[async_trait]
pub trait InterruptHandler: Send + Sync {
    async fn handle(
        &self,
        ctx: &InterruptContext,
        interrupt: &Interrupt,
    ) -> Result<InterruptOutcome>;
}

pub struct InterruptService {
    interrupts: Arc<dyn InterruptRepository>,
    handlers: Registry<InterruptType, Arc<dyn InterruptHandler>>,
    ctx: InterruptContext,
}

impl InterruptService {
    /// Build the service with every handler registered.
    pub fn new(interrupts: Arc<dyn InterruptRepository>, ctx: InterruptContext) -> Result<Self> {
        let handlers: Registry<InterruptType, Arc<dyn InterruptHandler>> = Registry::new();
        handlers.register(InterruptType::Abort, Arc::new(AbortHandler))?;
        handlers.register(InterruptType::AbortAll, Arc::new(AbortAllHandler))?;
        handlers.register(InterruptType::PauseAll, Arc::new(PauseAllHandler))?;
        handlers.register(InterruptType::ResumeAll, Arc::new(ResumeAllHandler))?;
        handlers.register(InterruptType::Resume, Arc::new(ResumeHandler))?;
        handlers.register(InterruptType::Retry, Arc::new(RetryHandler))?;
        handlers.register(InterruptType::MarkExpired, Arc::new(MarkExpiredHandler))?;
        handlers.register(InterruptType::MarkSuccess, Arc::new(MarkSuccessHandler))?;
        handlers.register(InterruptType::MarkFailed, Arc::new(MarkFailedHandler))?;
        handlers.register(InterruptType::Ignore, Arc::new(IgnoreHandler))?;
        handlers.register(InterruptType::CustomFailure, Arc::new(CustomFailureHandler))?;
        Ok(Self {
            interrupts,
            handlers,
            ctx,
        })
    }

    /// Persist an interrupt and run it through the processing path. The
    /// returned record reflects the audit state after handling.
    pub async fn register_interrupt(&self, interrupt: Interrupt) -> Result<Interrupt> {
        if interrupt.interrupt_type.requires_node_target() && interrupt.node_execution_id.is_none()
        {
            return Err(EngineError::Validation(format!(
                "{} interrupt requires a node execution target",
                interrupt.interrupt_type
            )));
        }
        // The plan execution must exist; a dangling interrupt is a caller bug.
        self.ctx
            .plan_executions
            .fetch(&interrupt.plan_execution_id)
            .await?;

        self.interrupts.insert(&interrupt).await?;
        if let Err(err) = self
            .ctx
            .publisher
            .publish(EngineEvent::InterruptRegistered {
                interrupt_id: interrupt.uuid,
                interrupt_type: interrupt.interrupt_type,
                plan_execution_id: interrupt.plan_execution_id,
            })
            .await
        {
            warn!(error = %err, "interrupt event publish failed");
        }

        let outcome = self.process(&interrupt).await?;
        info!(
            interrupt_id = %interrupt.uuid,
            interrupt_type = %interrupt.interrupt_type,
            ?outcome,
            "interrupt processed"
        );
        self.interrupts.fetch(&interrupt.uuid).await.map_err(Into::into)
    }

    /// Seize and apply. Exactly one of any number of concurrent processors
    /// wins the seize; the rest observe a no-op.
    pub async fn process(&self, interrupt: &Interrupt) -> Result<InterruptOutcome> {
        if !self.interrupts.seize(&interrupt.uuid).await? {
            return Ok(InterruptOutcome::NoOp {
                reason: "interrupt already seized".to_string(),
            });
        }

        let handler = self.handlers.obtain(&interrupt.interrupt_type)?;
        let outcome = handler.handle(&self.ctx, interrupt).await?;

        let touched = match &outcome {
            InterruptOutcome::Applied { touched_nodes } => *touched_nodes,
            InterruptOutcome::NoOp { .. } => 0,
        };
        if let Err(err) = self
            .ctx
            .publisher
            .publish(EngineEvent::InterruptApplied {
                interrupt_id: interrupt.uuid,
                interrupt_type: interrupt.interrupt_type,
                plan_execution_id: interrupt.plan_execution_id,
                touched_nodes: touched,
            })
            .await
        {
            warn!(error = %err, "interrupt event publish failed");
        }
        Ok(outcome)
    }
}
