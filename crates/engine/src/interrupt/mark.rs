//! Terminal-marking handlers: operator or engine decisions that finalize a
//! node from the outside (expiry, manual success/failure, ignore, custom
//! failure).

use super::{InterruptContext, InterruptHandler, InterruptOutcome};
use async_trait::async_trait;
use ibai_core::{
    FailureInfo, Interrupt, InterruptEffect, NodeExecution, NodeExecutionId, Result, Status,
};

/// Fetch the target or explain why there is nothing to do.
async fn applicable_target(
    ctx: &InterruptContext,
    interrupt: &Interrupt,
) -> Result<std::result::Result<NodeExecution, InterruptOutcome>> {
    let Some(target) = interrupt.node_execution_id else {
        return Ok(Err(InterruptOutcome::NoOp {
            reason: format!("{} interrupt without node target", interrupt.interrupt_type),
        }));
    };
    let node = ctx.node_executions.fetch(&target).await?;
    if node.is_terminal() {
        return Ok(Err(InterruptOutcome::NoOp {
            reason: format!("node {} already terminal", target),
        }));
    }
    Ok(Ok(node))
}

async fn record_effect(
    ctx: &InterruptContext,
    interrupt: &Interrupt,
    target: NodeExecutionId,
) -> Result<()> {
    let interrupt_id = interrupt.uuid;
    let interrupt_type = interrupt.interrupt_type.as_str();
    ctx.transitions
        .update_node_with(target, move |n| {
            n.record_interrupt_effect(InterruptEffect::new(interrupt_id, interrupt_type));
        })
        .await?;
    Ok(())
}

/// Raised by the timeout engine when a tracker fires.
pub struct MarkExpiredHandler;

#[async_trait]
impl InterruptHandler for MarkExpiredHandler {
    async fn handle(
        &self,
        ctx: &InterruptContext,
        interrupt: &Interrupt,
    ) -> Result<InterruptOutcome> {
        let node = match applicable_target(ctx, interrupt).await? {
            Ok(node) => node,
            Err(noop) => return Ok(noop),
        };
        record_effect(ctx, interrupt, node.uuid).await?;
        ctx.driver
            .finalize(
                node.uuid,
                Status::Expired,
                Some(FailureInfo::new("deadline exceeded")),
            )
            .await?;
        Ok(InterruptOutcome::Applied { touched_nodes: 1 })
    }
}

fn operator_actionable(status: Status) -> bool {
    matches!(status, Status::InterventionWaiting | Status::ApprovalWaiting)
}

pub struct MarkSuccessHandler;

#[async_trait]
impl InterruptHandler for MarkSuccessHandler {
    async fn handle(
        &self,
        ctx: &InterruptContext,
        interrupt: &Interrupt,
    ) -> Result<InterruptOutcome> {
        let node = match applicable_target(ctx, interrupt).await? {
            Ok(node) => node,
            Err(noop) => return Ok(noop),
        };
        if !operator_actionable(node.status) {
            return Ok(InterruptOutcome::NoOp {
                reason: format!("node {} is not awaiting an operator decision", node.uuid),
            });
        }
        record_effect(ctx, interrupt, node.uuid).await?;
        ctx.driver.finalize(node.uuid, Status::Succeeded, None).await?;
        Ok(InterruptOutcome::Applied { touched_nodes: 1 })
    }
}

pub struct MarkFailedHandler;

#[async_trait]
impl InterruptHandler for MarkFailedHandler {
    async fn handle(
        &self,
        ctx: &InterruptContext,
        interrupt: &Interrupt,
    ) -> Result<InterruptOutcome> {
        let node = match applicable_target(ctx, interrupt).await? {
            Ok(node) => node,
            Err(noop) => return Ok(noop),
        };
        if !operator_actionable(node.status) {
            return Ok(InterruptOutcome::NoOp {
                reason: format!("node {} is not awaiting an operator decision", node.uuid),
            });
        }
        record_effect(ctx, interrupt, node.uuid).await?;
        let failure = FailureInfo::new(format!("marked failed by {}", interrupt.created_by));
        ctx.driver
            .finalize(node.uuid, Status::Failed, Some(failure))
            .await?;
        Ok(InterruptOutcome::Applied { touched_nodes: 1 })
    }
}

/// Operator chose to ignore the failure: the node keeps a broken status but
/// the plan keeps walking the happy path. Advisers are not consulted.
pub struct IgnoreHandler;

#[async_trait]
impl InterruptHandler for IgnoreHandler {
    async fn handle(
        &self,
        ctx: &InterruptContext,
        interrupt: &Interrupt,
    ) -> Result<InterruptOutcome> {
        let node = match applicable_target(ctx, interrupt).await? {
            Ok(node) => node,
            Err(noop) => return Ok(noop),
        };
        if node.status != Status::InterventionWaiting {
            return Ok(InterruptOutcome::NoOp {
                reason: format!("node {} is not awaiting intervention", node.uuid),
            });
        }
        let effect = InterruptEffect::new(interrupt.uuid, interrupt.interrupt_type.as_str());
        ctx.driver.ignore_and_proceed(node.uuid, effect).await?;
        Ok(InterruptOutcome::Applied { touched_nodes: 1 })
    }
}

/// Externally supplied failure with caller-provided detail.
pub struct CustomFailureHandler;

#[async_trait]
impl InterruptHandler for CustomFailureHandler {
    async fn handle(
        &self,
        ctx: &InterruptContext,
        interrupt: &Interrupt,
    ) -> Result<InterruptOutcome> {
        let node = match applicable_target(ctx, interrupt).await? {
            Ok(node) => node,
            Err(noop) => return Ok(noop),
        };
        record_effect(ctx, interrupt, node.uuid).await?;
        let message = interrupt
            .parameters
            .get("error_message")
            .and_then(|v| v.as_str())
            .unwrap_or("custom failure");
        ctx.driver
            .finalize(node.uuid, Status::Failed, Some(FailureInfo::new(message)))
            .await?;
        Ok(InterruptOutcome::Applied { touched_nodes: 1 })
    }
}
