//! Pause / resume handlers
//!
//! PAUSE_ALL parks every node sitting at a discrete wait point (queued or
//! waiting) and remembers the status it held; ACTIVE-dimension timeouts
//! stop ticking through the regular status notification. RESUME_ALL
//! restores the remembered statuses and restarts queued work.

use super::{InterruptContext, InterruptHandler, InterruptOutcome};
use async_trait::async_trait;
use ibai_core::{Interrupt, InterruptEffect, NodeExecution, Result, Status};
use tracing::info;

pub struct PauseAllHandler;

#[async_trait]
impl InterruptHandler for PauseAllHandler {
    async fn handle(
        &self,
        ctx: &InterruptContext,
        interrupt: &Interrupt,
    ) -> Result<InterruptOutcome> {
        let flowing = ctx
            .node_executions
            .find_with_statuses(&interrupt.plan_execution_id, Status::flowing_statuses())
            .await?;

        let mut touched = 0;
        for node in flowing.iter().filter(|n| n.status.is_pausable()) {
            let paused_from = node.status;
            let interrupt_id = interrupt.uuid;
            let interrupt_type = interrupt.interrupt_type.as_str();
            ctx.transitions
                .transition_node_with(node.uuid, Status::Paused, move |n| {
                    n.paused_from = Some(paused_from);
                    n.record_interrupt_effect(InterruptEffect::new(interrupt_id, interrupt_type));
                })
                .await?;
            touched += 1;
        }

        ctx.transitions
            .transition_plan(interrupt.plan_execution_id, Status::Paused)
            .await?;
        info!(plan_execution_id = %interrupt.plan_execution_id, touched, "pause-all applied");
        Ok(InterruptOutcome::Applied {
            touched_nodes: touched,
        })
    }
}

pub struct ResumeAllHandler;

#[async_trait]
impl InterruptHandler for ResumeAllHandler {
    async fn handle(
        &self,
        ctx: &InterruptContext,
        interrupt: &Interrupt,
    ) -> Result<InterruptOutcome> {
        let plan_execution = ctx
            .plan_executions
            .fetch(&interrupt.plan_execution_id)
            .await?;
        if plan_execution.status != Status::Paused {
            return Ok(InterruptOutcome::NoOp {
                reason: "plan execution is not paused".to_string(),
            });
        }

        ctx.transitions
            .transition_plan(interrupt.plan_execution_id, Status::Running)
            .await?;

        let paused = ctx
            .node_executions
            .find_with_statuses(&interrupt.plan_execution_id, &[Status::Paused])
            .await?;
        let mut touched = 0;
        for node in &paused {
            restore(ctx, interrupt, node).await?;
            touched += 1;
        }

        // Nodes queued while the plan was paused were never started.
        for node in ctx
            .node_executions
            .find_with_statuses(&interrupt.plan_execution_id, &[Status::Queued])
            .await?
        {
            ctx.driver.drive(node.uuid).await?;
        }

        info!(plan_execution_id = %interrupt.plan_execution_id, touched, "resume-all applied");
        Ok(InterruptOutcome::Applied {
            touched_nodes: touched,
        })
    }
}

/// Single-node resume.
pub struct ResumeHandler;

#[async_trait]
impl InterruptHandler for ResumeHandler {
    async fn handle(
        &self,
        ctx: &InterruptContext,
        interrupt: &Interrupt,
    ) -> Result<InterruptOutcome> {
        let Some(target) = interrupt.node_execution_id else {
            return Ok(InterruptOutcome::NoOp {
                reason: "resume interrupt without node target".to_string(),
            });
        };
        let node = ctx.node_executions.fetch(&target).await?;
        if node.status != Status::Paused {
            return Ok(InterruptOutcome::NoOp {
                reason: format!("node {} is not paused", target),
            });
        }
        restore(ctx, interrupt, &node).await?;
        Ok(InterruptOutcome::Applied { touched_nodes: 1 })
    }
}

/// Put a paused node back where it was; queued nodes get re-driven.
async fn restore(
    ctx: &InterruptContext,
    interrupt: &Interrupt,
    node: &NodeExecution,
) -> Result<()> {
    let restore_to = node.paused_from.unwrap_or(Status::Queued);
    let interrupt_id = interrupt.uuid;
    let interrupt_type = interrupt.interrupt_type.as_str();
    ctx.transitions
        .transition_node_with(node.uuid, restore_to, move |n| {
            n.paused_from = None;
            n.record_interrupt_effect(InterruptEffect::new(interrupt_id, interrupt_type));
        })
        .await?;
    if restore_to == Status::Queued {
        ctx.driver.drive(node.uuid).await?;
    }
    Ok(())
}
