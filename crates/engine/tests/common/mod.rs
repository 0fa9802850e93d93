//! Shared harness for engine integration tests

use ibai_adapters::{
    InMemoryBarrierRepository, InMemoryBus, InMemoryInterruptRepository,
    InMemoryNodeExecutionRepository, InMemoryPlanExecutionRepository, InMemoryRestraintRepository,
    InMemoryTimeoutInstanceRepository, RecordingTaskDispatcher,
};
use ibai_core::{
    AdviserObtainment, AdviserType, EngineError, FacilitatorObtainment, FacilitatorType, NodeId,
    NodeExecution, PlanExecutionId, PlanNode, Status,
};
use ibai_engine::{EngineBuilder, EngineConfig, OrchestrationEngine};
use ibai_ports::{NodeExecutionRepository, StepHandler};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

// Not every suite touches every collaborator.
#[allow(dead_code)]
pub struct TestHarness {
    pub engine: Arc<OrchestrationEngine>,
    pub node_executions: Arc<InMemoryNodeExecutionRepository>,
    pub plan_executions: Arc<InMemoryPlanExecutionRepository>,
    pub interrupt_repository: Arc<InMemoryInterruptRepository>,
    pub restraint_repository: Arc<InMemoryRestraintRepository>,
    pub timeout_repository: Arc<InMemoryTimeoutInstanceRepository>,
    pub bus: Arc<InMemoryBus>,
    pub dispatcher: Arc<RecordingTaskDispatcher>,
}

pub fn test_config() -> EngineConfig {
    EngineConfig {
        timeout_sweep_interval: Duration::from_millis(50),
        ..EngineConfig::default()
    }
}

/// Engine over fresh in-memory stores with the given step handlers.
pub fn harness(steps: Vec<(&str, Arc<dyn StepHandler>)>) -> TestHarness {
    let node_executions = Arc::new(InMemoryNodeExecutionRepository::new());
    let plan_executions = Arc::new(InMemoryPlanExecutionRepository::new());
    let interrupt_repository = Arc::new(InMemoryInterruptRepository::new());
    let barrier_repository = Arc::new(InMemoryBarrierRepository::new());
    let restraint_repository = Arc::new(InMemoryRestraintRepository::new());
    let timeout_repository = Arc::new(InMemoryTimeoutInstanceRepository::new());
    let bus = Arc::new(InMemoryBus::default());
    let dispatcher = Arc::new(RecordingTaskDispatcher::new());

    let mut builder = EngineBuilder::new(
        node_executions.clone(),
        plan_executions.clone(),
        interrupt_repository.clone(),
        barrier_repository.clone(),
        restraint_repository.clone(),
        timeout_repository.clone(),
        bus.clone(),
        dispatcher.clone(),
    )
    .with_config(test_config());
    for (step_type, handler) in steps {
        builder = builder.with_step_handler(step_type, handler);
    }
    let engine = builder.build().expect("engine wiring");

    TestHarness {
        engine,
        node_executions,
        plan_executions,
        interrupt_repository,
        restraint_repository,
        timeout_repository,
        bus,
        dispatcher,
    }
}

/// Plan node with the default test wiring: sync facilitation, proceed on
/// success, end the plan on failure.
pub fn shell_node(id: &str, next: Option<&str>) -> PlanNode {
    let on_success = match next {
        Some(next) => json!({"next_node_id": next}),
        None => json!({}),
    };
    PlanNode::new(id, id, "SHELL")
        .with_facilitator(FacilitatorObtainment::new(FacilitatorType::Sync, json!({})))
        .with_adviser(AdviserObtainment::new(AdviserType::OnSuccess, on_success))
        .with_adviser(AdviserObtainment::new(
            AdviserType::OnFail,
            json!({"action": "END_PLAN"}),
        ))
        .with_adviser(AdviserObtainment::new(AdviserType::OnAbort, json!({})))
}

/// Like `shell_node` but with a caller-chosen step type and facilitator.
pub fn typed_node(
    id: &str,
    step_type: &str,
    facilitator: FacilitatorType,
    next: Option<&str>,
) -> PlanNode {
    let mut node = shell_node(id, next);
    node.step_type = step_type.to_string();
    node.facilitator_obtainments =
        vec![FacilitatorObtainment::new(facilitator, json!({}))];
    node
}

/// All executions of one plan node, oldest first.
pub async fn executions_for(
    repo: &Arc<InMemoryNodeExecutionRepository>,
    plan_execution_id: PlanExecutionId,
    node_id: &str,
) -> Vec<NodeExecution> {
    let mut executions: Vec<NodeExecution> = repo
        .find_by_plan_execution(&plan_execution_id)
        .await
        .expect("repository")
        .into_iter()
        .filter(|e| e.node_id == NodeId::from(node_id))
        .collect();
    executions.sort_by_key(|e| e.start_ts);
    executions
}

/// Latest execution of one plan node, if any.
pub async fn find_node(
    repo: &Arc<InMemoryNodeExecutionRepository>,
    plan_execution_id: PlanExecutionId,
    node_id: &str,
) -> Option<NodeExecution> {
    executions_for(repo, plan_execution_id, node_id)
        .await
        .into_iter()
        .last()
}

/// Poll until the latest execution of `node_id` reaches `status`.
pub async fn wait_for_node_status(
    repo: &Arc<InMemoryNodeExecutionRepository>,
    plan_execution_id: PlanExecutionId,
    node_id: &str,
    status: Status,
    timeout: Duration,
) -> Result<NodeExecution, EngineError> {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if let Some(execution) = find_node(repo, plan_execution_id, node_id).await {
            if execution.status == status {
                return Ok(execution);
            }
        }
        if tokio::time::Instant::now() >= deadline {
            return Err(EngineError::Timeout(format!(
                "node {} never reached {}",
                node_id, status
            )));
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
