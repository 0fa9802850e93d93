//! Orchestration graph read model
//!
//! DAG plus per-node status snapshot rebuilt from node execution records,
//! cached per plan execution for external rendering. The cache is
//! invalidated on every node status change and rebuilt lazily on demand.

use crate::plan_store::PlanStore;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use ibai_core::{NodeExecution, NodeExecutionId, NodeId, PlanExecutionId, Result, Status};
use ibai_ports::NodeExecutionRepository;
use std::sync::Arc;

/// One node execution in the rendered graph.
#[derive(Debug, Clone)]
pub struct GraphVertex {
    pub node_execution_id: NodeExecutionId,
    pub node_id: NodeId,
    pub identifier: String,
    pub step_type: String,
    pub status: Status,
    pub parent_id: Option<NodeExecutionId>,
    pub previous_id: Option<NodeExecutionId>,
    pub children: Vec<NodeExecutionId>,
}

#[derive(Debug, Clone)]
pub struct OrchestrationGraph {
    pub plan_execution_id: PlanExecutionId,
    pub generated_at: DateTime<Utc>,
    pub vertices: Vec<GraphVertex>,
}

impl OrchestrationGraph {
    pub fn vertex(&self, id: &NodeExecutionId) -> Option<&GraphVertex> {
        self.vertices.iter().find(|v| &v.node_execution_id == id)
    }
}

pub struct OrchestrationGraphService {
    node_executions: Arc<dyn NodeExecutionRepository>,
    plans: Arc<PlanStore>,
    cache: DashMap<PlanExecutionId, Arc<OrchestrationGraph>>,
}

impl OrchestrationGraphService {
    pub fn new(node_executions: Arc<dyn NodeExecutionRepository>, plans: Arc<PlanStore>) -> Self {
        Self {
            node_executions,
            plans,
            cache: DashMap::new(),
        }
    }

    /// Cached graph for a plan execution, rebuilt when stale.
    pub async fn get_cached_graph(
        &self,
        plan_execution_id: &PlanExecutionId,
    ) -> Result<Arc<OrchestrationGraph>> {
        if let Some(graph) = self.cache.get(plan_execution_id) {
            return Ok(graph.value().clone());
        }
        let graph = Arc::new(self.build(plan_execution_id).await?);
        self.cache.insert(*plan_execution_id, graph.clone());
        Ok(graph)
    }

    pub fn invalidate(&self, plan_execution_id: &PlanExecutionId) {
        self.cache.remove(plan_execution_id);
    }

    async fn build(&self, plan_execution_id: &PlanExecutionId) -> Result<OrchestrationGraph> {
        let executions = self
            .node_executions
            .find_by_plan_execution(plan_execution_id)
            .await?;
        let plan = self.plans.get(plan_execution_id)?;

        let vertices = executions
            .iter()
            .map(|execution| {
                let plan_node = plan.node(&execution.node_id);
                GraphVertex {
                    node_execution_id: execution.uuid,
                    node_id: execution.node_id.clone(),
                    identifier: plan_node
                        .map(|n| n.identifier.clone())
                        .unwrap_or_else(|| execution.node_id.to_string()),
                    step_type: plan_node
                        .map(|n| n.step_type.clone())
                        .unwrap_or_default(),
                    status: execution.status,
                    parent_id: execution.parent_id,
                    previous_id: execution.previous_id,
                    children: children_of(&executions, execution),
                }
            })
            .collect();

        Ok(OrchestrationGraph {
            plan_execution_id: *plan_execution_id,
            generated_at: Utc::now(),
            vertices,
        })
    }
}

fn children_of(executions: &[NodeExecution], parent: &NodeExecution) -> Vec<NodeExecutionId> {
    executions
        .iter()
        .filter(|e| e.parent_id == Some(parent.uuid))
        .map(|e| e.uuid)
        .collect()
}
