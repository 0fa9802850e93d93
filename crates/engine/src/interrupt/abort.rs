//! Abort handlers
//!
//! Abort propagates top-down but applies bottom-up: every non-terminal
//! descendant is driven to DISCONTINUING then ABORTED before its parent,
//! so a parent never reads as aborted while a child still runs.

use super::{InterruptContext, InterruptHandler, InterruptOutcome};
use async_trait::async_trait;
use ibai_core::{Interrupt, InterruptEffect, NodeExecutionId, Result, Status};
use tracing::info;

pub struct AbortHandler;

#[async_trait]
impl InterruptHandler for AbortHandler {
    async fn handle(
        &self,
        ctx: &InterruptContext,
        interrupt: &Interrupt,
    ) -> Result<InterruptOutcome> {
        let Some(target) = interrupt.node_execution_id else {
            return Ok(InterruptOutcome::NoOp {
                reason: "abort interrupt without node target".to_string(),
            });
        };
        let node = ctx.node_executions.fetch(&target).await?;
        if node.is_terminal() {
            return Ok(InterruptOutcome::NoOp {
                reason: format!("node {} already terminal", target),
            });
        }

        let order = children_first(ctx, target).await?;
        let mut touched = 0;
        for id in order {
            if abort_node(ctx, interrupt, id).await? {
                touched += 1;
            }
        }
        info!(target = %target, touched, "abort applied");
        // A parent waiting on the aborted target must see the aggregation.
        if let Some(parent_id) = node.parent_id {
            ctx.driver.notify_children_concluded(parent_id).await?;
        }
        ctx.driver
            .conclude_if_done(interrupt.plan_execution_id)
            .await?;
        Ok(InterruptOutcome::Applied {
            touched_nodes: touched,
        })
    }
}

pub struct AbortAllHandler;

#[async_trait]
impl InterruptHandler for AbortAllHandler {
    async fn handle(
        &self,
        ctx: &InterruptContext,
        interrupt: &Interrupt,
    ) -> Result<InterruptOutcome> {
        let mut flowing = ctx
            .node_executions
            .find_with_statuses(&interrupt.plan_execution_id, Status::flowing_statuses())
            .await?;
        if flowing.is_empty() {
            return Ok(InterruptOutcome::NoOp {
                reason: "nothing flowing".to_string(),
            });
        }
        // Deepest first: children are aborted before their parents.
        flowing.sort_by_key(|node| std::cmp::Reverse(node.ambiance.depth()));

        let mut touched = 0;
        for node in flowing {
            if abort_node(ctx, interrupt, node.uuid).await? {
                touched += 1;
            }
        }
        info!(plan_execution_id = %interrupt.plan_execution_id, touched, "abort-all applied");
        ctx.driver
            .conclude_if_done(interrupt.plan_execution_id)
            .await?;
        Ok(InterruptOutcome::Applied {
            touched_nodes: touched,
        })
    }
}

/// Subtree of `root` ordered so every node appears after its descendants.
async fn children_first(
    ctx: &InterruptContext,
    root: NodeExecutionId,
) -> Result<Vec<NodeExecutionId>> {
    let mut frontier = vec![root];
    let mut ordered = vec![root];
    while let Some(id) = frontier.pop() {
        for child in ctx.node_executions.find_children(&id).await? {
            ordered.push(child.uuid);
            frontier.push(child.uuid);
        }
    }
    ordered.reverse();
    Ok(ordered)
}

/// Drive one node DISCONTINUING → ABORTED, recording the interrupt effect.
/// Already-terminal nodes are skipped.
async fn abort_node(
    ctx: &InterruptContext,
    interrupt: &Interrupt,
    id: NodeExecutionId,
) -> Result<bool> {
    let node = ctx.node_executions.fetch(&id).await?;
    if node.is_terminal() {
        return Ok(false);
    }
    if node.status != Status::Discontinuing {
        ctx.transitions
            .transition_node(id, Status::Discontinuing)
            .await?;
    }
    let interrupt_id = interrupt.uuid;
    let interrupt_type = interrupt.interrupt_type.as_str();
    ctx.transitions
        .transition_node_with(id, Status::Aborted, move |n| {
            n.record_interrupt_effect(InterruptEffect::new(interrupt_id, interrupt_type));
            n.advised = true;
        })
        .await?;
    Ok(true)
}
