//! Versioned status transitions
//!
//! Single mutation path for execution records: a CAS loop against the
//! versioned store, transition-table validation inside the loop, then event
//! publication, timeout notification and graph invalidation. Both the run
//! loop and the interrupt handlers go through this service so the ordering
//! guarantees hold no matter who drives the change.

use crate::cas::backoff;
use crate::config::CasConfig;
use crate::graph::OrchestrationGraphService;
use crate::timeout::TimeoutEngine;
use ibai_core::{
    EngineError, NodeExecution, NodeExecutionId, PlanExecution, PlanExecutionId, Result, Status,
};
use ibai_ports::{EngineEvent, EventPublisher, NodeExecutionRepository, PlanExecutionRepository};
use std::sync::Arc;
use tracing::{debug, warn};

pub struct TransitionService {
    node_executions: Arc<dyn NodeExecutionRepository>,
    plan_executions: Arc<dyn PlanExecutionRepository>,
    publisher: Arc<dyn EventPublisher>,
    timeouts: Arc<TimeoutEngine>,
    graph: Arc<OrchestrationGraphService>,
    cas: CasConfig,
}

impl TransitionService {
    pub fn new(
        node_executions: Arc<dyn NodeExecutionRepository>,
        plan_executions: Arc<dyn PlanExecutionRepository>,
        publisher: Arc<dyn EventPublisher>,
        timeouts: Arc<TimeoutEngine>,
        graph: Arc<OrchestrationGraphService>,
        cas: CasConfig,
    ) -> Self {
        Self {
            node_executions,
            plan_executions,
            publisher,
            timeouts,
            graph,
            cas,
        }
    }

    /// Transition a node execution, applying `mutate` to the record inside
    /// the same store update. An `InvalidStatusTransition` is not retried:
    /// it is logged and the record left unchanged for inspection.
    pub async fn transition_node_with<F>(
        &self,
        id: NodeExecutionId,
        to: Status,
        mutate: F,
    ) -> Result<NodeExecution>
    where
        F: Fn(&mut NodeExecution) + Send + Sync,
    {
        let mut attempts = 0;
        let (from, stored) = loop {
            attempts += 1;
            let mut node = self.node_executions.fetch(&id).await?;
            let from = node.status;
            if let Err(err) = node.transition_to(to) {
                warn!(node_execution_id = %id, from = %from, to = %to, "transition rejected");
                return Err(err);
            }
            mutate(&mut node);
            match self.node_executions.update(&node).await {
                Ok(stored) => break (from, stored),
                Err(err) if err.is_stale_version() && attempts < self.cas.max_attempts => {
                    backoff(&self.cas, attempts).await;
                }
                Err(err) if err.is_stale_version() => {
                    return Err(EngineError::StaleVersionConflict {
                        entity: "node_execution",
                        id: id.to_string(),
                        attempts,
                    });
                }
                Err(err) => return Err(err.into()),
            }
        };

        debug!(node_execution_id = %id, from = %from, to = %to, "node transitioned");
        if let Err(err) = self
            .publisher
            .publish(EngineEvent::NodeStatusChanged {
                plan_execution_id: stored.plan_execution_id,
                node_execution_id: stored.uuid,
                node_id: stored.node_id.clone(),
                from,
                to,
            })
            .await
        {
            warn!(error = %err, "status event publish failed");
        }
        self.timeouts.on_node_status(stored.uuid, to).await?;
        self.graph.invalidate(&stored.plan_execution_id);
        Ok(stored)
    }

    pub async fn transition_node(&self, id: NodeExecutionId, to: Status) -> Result<NodeExecution> {
        self.transition_node_with(id, to, |_| {}).await
    }

    /// Mutate a node execution without a status change (audit fields,
    /// executable responses, timeout ids).
    pub async fn update_node_with<F>(&self, id: NodeExecutionId, mutate: F) -> Result<NodeExecution>
    where
        F: Fn(&mut NodeExecution) + Send + Sync,
    {
        let mut attempts = 0;
        loop {
            attempts += 1;
            let mut node = self.node_executions.fetch(&id).await?;
            mutate(&mut node);
            match self.node_executions.update(&node).await {
                Ok(stored) => {
                    self.graph.invalidate(&stored.plan_execution_id);
                    return Ok(stored);
                }
                Err(err) if err.is_stale_version() && attempts < self.cas.max_attempts => {
                    backoff(&self.cas, attempts).await;
                }
                Err(err) if err.is_stale_version() => {
                    return Err(EngineError::StaleVersionConflict {
                        entity: "node_execution",
                        id: id.to_string(),
                        attempts,
                    });
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    /// Transition a plan execution record.
    pub async fn transition_plan(
        &self,
        id: PlanExecutionId,
        to: Status,
    ) -> Result<PlanExecution> {
        let mut attempts = 0;
        let stored = loop {
            attempts += 1;
            let mut plan_execution = self.plan_executions.fetch(&id).await?;
            if plan_execution.status == to {
                return Ok(plan_execution);
            }
            plan_execution.transition_to(to)?;
            match self.plan_executions.update(&plan_execution).await {
                Ok(stored) => break stored,
                Err(err) if err.is_stale_version() && attempts < self.cas.max_attempts => {
                    backoff(&self.cas, attempts).await;
                }
                Err(err) if err.is_stale_version() => {
                    return Err(EngineError::StaleVersionConflict {
                        entity: "plan_execution",
                        id: id.to_string(),
                        attempts,
                    });
                }
                Err(err) => return Err(err.into()),
            }
        };

        if to.is_terminal() {
            if let Err(err) = self
                .publisher
                .publish(EngineEvent::PlanExecutionConcluded {
                    plan_execution_id: stored.uuid,
                    status: to,
                })
                .await
            {
                warn!(error = %err, "plan event publish failed");
            }
        }
        Ok(stored)
    }
}
