//! Retry handler: resurrect a node in a retryable terminal status through a
//! fresh execution linked to the exhausted one.

use super::{InterruptContext, InterruptHandler, InterruptOutcome};
use async_trait::async_trait;
use ibai_core::{Interrupt, InterruptEffect, NodeExecution, Result};
use tracing::info;

pub struct RetryHandler;

#[async_trait]
impl InterruptHandler for RetryHandler {
    async fn handle(
        &self,
        ctx: &InterruptContext,
        interrupt: &Interrupt,
    ) -> Result<InterruptOutcome> {
        let Some(target) = interrupt.node_execution_id else {
            return Ok(InterruptOutcome::NoOp {
                reason: "retry interrupt without node target".to_string(),
            });
        };

        let plan_execution = ctx
            .plan_executions
            .fetch(&interrupt.plan_execution_id)
            .await?;
        if plan_execution.is_terminal() {
            return Ok(InterruptOutcome::NoOp {
                reason: "plan execution already terminal".to_string(),
            });
        }

        let node = ctx.node_executions.fetch(&target).await?;
        if !node.status.is_retryable() {
            return Ok(InterruptOutcome::NoOp {
                reason: format!("node {} is not in a retryable status", target),
            });
        }

        let interrupt_id = interrupt.uuid;
        let interrupt_type = interrupt.interrupt_type.as_str();
        ctx.transitions
            .update_node_with(target, move |n| {
                n.record_interrupt_effect(InterruptEffect::new(interrupt_id, interrupt_type));
            })
            .await?;

        let successor = NodeExecution::retry_of(&node);
        ctx.node_executions.insert(&successor).await?;
        info!(
            exhausted = %node.uuid,
            successor = %successor.uuid,
            "retry interrupt created successor execution"
        );
        ctx.driver.drive(successor.uuid).await?;
        Ok(InterruptOutcome::Applied { touched_nodes: 1 })
    }
}
