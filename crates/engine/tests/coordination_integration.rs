//! Coordination integration tests: barriers, restraints, interrupts and
//! timeouts, over in-memory collaborators.

mod common;

use common::{find_node, harness, shell_node, typed_node, wait_for_node_status};
use ibai_adapters::{
    AsyncStepHandler, ChildrenStepHandler, FailingStepHandler, FlakyStepHandler,
    SucceedingStepHandler, WaitingStepHandler,
};
use ibai_core::{
    AdviserObtainment, AdviserType, BarrierState, ExecutableResponse, FacilitatorObtainment,
    FacilitatorType, InterruptType, NodeExecutionId, Plan, PlanNode, Status, StepResponse,
    TimeoutDimension, TimeoutObtainment,
};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

const CONCLUSION_TIMEOUT: Duration = Duration::from_secs(5);

fn barrier_node(id: &str, identifier: &str) -> PlanNode {
    let mut node = shell_node(id, None);
    node.step_type = "BARRIER".to_string();
    node.step_parameters = json!({"identifier": identifier});
    node.facilitator_obtainments = vec![FacilitatorObtainment::new(
        FacilitatorType::Barrier,
        json!({}),
    )];
    node
}

fn fork_node(id: &str, children: &[&str]) -> PlanNode {
    let mut node = typed_node(id, "FORK", FacilitatorType::Children, None);
    node.step_parameters = json!({"child_node_ids": children});
    node
}

#[tokio::test]
async fn test_barrier_with_two_participants_stands_then_drops() {
    let hold = Arc::new(AsyncStepHandler::new());
    let harness = harness(vec![
        ("FORK", Arc::new(ChildrenStepHandler)),
        ("SHELL", Arc::new(SucceedingStepHandler)),
        ("HOLD", hold.clone()),
    ]);

    // Branch one reaches its barrier immediately; branch two is held at an
    // async step so the intermediate barrier state is observable.
    let plan = Plan::new(
        "fork",
        vec![
            fork_node("fork", &["w1", "hold2"]),
            shell_node("w1", Some("gate_a")),
            barrier_node("gate_a", "gate1"),
            typed_node("hold2", "HOLD", FacilitatorType::Async, Some("gate_b")),
            barrier_node("gate_b", "gate1"),
        ],
    );

    let plan_execution_id = harness
        .engine
        .start_plan_execution(plan, HashMap::new())
        .await
        .unwrap();

    // First arrival: the barrier stands, nobody is resumed.
    let gate_a = wait_for_node_status(
        &harness.node_executions,
        plan_execution_id,
        "gate_a",
        Status::AsyncWaiting,
        CONCLUSION_TIMEOUT,
    )
    .await
    .unwrap();
    let instances = harness
        .engine
        .barrier_service()
        .find_by_identifier_and_plan_execution_id("gate1", &plan_execution_id)
        .await
        .unwrap();
    assert_eq!(instances.len(), 1);
    assert_eq!(instances[0].state, BarrierState::Standing);
    assert_eq!(instances[0].arrivals(), 1);
    assert_eq!(instances[0].expected_participants(), 2);
    assert_eq!(gate_a.status, Status::AsyncWaiting);

    // Release branch two; its arrival takes the barrier down and resumes
    // both participants.
    let callback_id = hold.last_callback().unwrap();
    harness
        .engine
        .resume_async(callback_id, StepResponse::succeeded())
        .await
        .unwrap();

    let status = harness
        .engine
        .wait_for_conclusion(plan_execution_id, CONCLUSION_TIMEOUT)
        .await
        .unwrap();
    assert_eq!(status, Status::Succeeded);

    let instances = harness
        .engine
        .barrier_service()
        .find_by_identifier_and_plan_execution_id("gate1", &plan_execution_id)
        .await
        .unwrap();
    assert_eq!(instances[0].state, BarrierState::Down);
    assert_eq!(instances[0].arrivals(), 2);
    for gate in ["gate_a", "gate_b"] {
        let node = find_node(&harness.node_executions, plan_execution_id, gate)
            .await
            .unwrap();
        assert_eq!(node.status, Status::Succeeded);
    }
}

#[tokio::test]
async fn test_sole_barrier_participant_runs_sync() {
    let harness = harness(vec![("SHELL", Arc::new(SucceedingStepHandler))]);
    let plan = Plan::new(
        "a",
        vec![shell_node("a", Some("gate")), barrier_node("gate", "solo")],
    );

    let plan_execution_id = harness
        .engine
        .start_plan_execution(plan, HashMap::new())
        .await
        .unwrap();
    let status = harness
        .engine
        .wait_for_conclusion(plan_execution_id, CONCLUSION_TIMEOUT)
        .await
        .unwrap();
    assert_eq!(status, Status::Succeeded);

    // No peers to wait for: the barrier facilitation picked SYNC.
    let gate = find_node(&harness.node_executions, plan_execution_id, "gate")
        .await
        .unwrap();
    assert!(matches!(
        gate.latest_executable_response(),
        Some(ExecutableResponse::Sync)
    ));
    let instances = harness
        .engine
        .barrier_service()
        .find_by_identifier_and_plan_execution_id("solo", &plan_execution_id)
        .await
        .unwrap();
    assert_eq!(instances[0].state, BarrierState::Down);
}

#[tokio::test]
async fn test_stale_arrival_after_down_is_an_error() {
    let harness = harness(vec![("SHELL", Arc::new(SucceedingStepHandler))]);
    let plan = Plan::new(
        "a",
        vec![shell_node("a", Some("gate")), barrier_node("gate", "solo")],
    );
    let plan_execution_id = harness
        .engine
        .start_plan_execution(plan, HashMap::new())
        .await
        .unwrap();
    harness
        .engine
        .wait_for_conclusion(plan_execution_id, CONCLUSION_TIMEOUT)
        .await
        .unwrap();

    let err = harness
        .engine
        .barrier_service()
        .arrive(
            plan_execution_id,
            "solo",
            &ibai_core::NodeId::from("gate"),
            NodeExecutionId::new(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ibai_core::EngineError::Validation(_)));
}

#[tokio::test]
async fn test_restraint_service_fifo_capacity_scenario() {
    // The admission scenario at the service surface: capacity 1, X active,
    // Y blocked, X finishes, Y activates.
    use ibai_ports::RestraintRepository as _;

    let harness = harness(vec![]);
    let restraints = harness.engine.restraint_service();
    restraints.register_restraint("env-prod", 1).await.unwrap();

    let x = restraints
        .acquire("env-prod", "env-prod-unit", 1, "holder-x", None)
        .await
        .unwrap();
    assert!(x.is_active());

    let y = restraints
        .acquire("env-prod", "env-prod-unit", 1, "holder-y", None)
        .await
        .unwrap();
    assert!(y.is_blocked());
    assert!(x.order < y.order);

    restraints.finish("env-prod-unit", "holder-x").await.unwrap();

    let x = harness
        .restraint_repository
        .find_instance(&x.uuid)
        .await
        .unwrap()
        .unwrap();
    let y = harness
        .restraint_repository
        .find_instance(&y.uuid)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(x.state, ibai_core::RestraintState::Finished);
    assert!(y.is_active());
}

#[tokio::test]
async fn test_restraint_admission_never_skips_ahead() {
    // Strict FIFO: a small request behind a too-large one waits its turn
    // even though it would fit.
    use ibai_ports::RestraintRepository as _;

    let harness = harness(vec![]);
    let restraints = harness.engine.restraint_service();
    restraints.register_restraint("gpu-pool", 2).await.unwrap();

    let x = restraints
        .acquire("gpu-pool", "gpu-unit", 2, "holder-x", None)
        .await
        .unwrap();
    assert!(x.is_active());
    let y = restraints
        .acquire("gpu-pool", "gpu-unit", 2, "holder-y", None)
        .await
        .unwrap();
    assert!(y.is_blocked());
    let z = restraints
        .acquire("gpu-pool", "gpu-unit", 1, "holder-z", None)
        .await
        .unwrap();
    assert!(z.is_blocked(), "a later small request must not jump the queue");

    restraints.finish("gpu-unit", "holder-x").await.unwrap();
    let y = harness
        .restraint_repository
        .find_instance(&y.uuid)
        .await
        .unwrap()
        .unwrap();
    let z = harness
        .restraint_repository
        .find_instance(&z.uuid)
        .await
        .unwrap()
        .unwrap();
    assert!(y.is_active());
    assert!(z.is_blocked(), "capacity is consumed by the promoted head");

    restraints.finish("gpu-unit", "holder-y").await.unwrap();
    let z = harness
        .restraint_repository
        .find_instance(&z.uuid)
        .await
        .unwrap()
        .unwrap();
    assert!(z.is_active());
}

#[tokio::test]
async fn test_restraint_gates_parallel_branches_fifo() {
    let harness = harness(vec![
        ("FORK", Arc::new(ChildrenStepHandler)),
        ("SHELL", Arc::new(SucceedingStepHandler)),
    ]);
    harness
        .engine
        .restraint_service()
        .register_restraint("env-prod", 1)
        .await
        .unwrap();

    let acquire = |id: &str, next: &str, key: &str| {
        let mut node = shell_node(id, Some(next));
        node.step_type = "RESOURCE_RESTRAINT".to_string();
        node.step_parameters = json!({
            "restraint": "env-prod",
            "resource_unit": "env-prod-unit",
            "permits": 1,
            "release_entity_id": key,
        });
        node.facilitator_obtainments = vec![FacilitatorObtainment::new(
            FacilitatorType::ResourceRestraint,
            json!({}),
        )];
        node
    };
    let release = |id: &str, key: &str| {
        let mut node = shell_node(id, None);
        node.step_type = "RESOURCE_RESTRAINT_RELEASE".to_string();
        node.step_parameters =
            json!({"resource_unit": "env-prod-unit", "release_entity_id": key});
        node
    };

    let plan = Plan::new(
        "fork",
        vec![
            fork_node("fork", &["acq1", "acq2"]),
            acquire("acq1", "work1", "deploy-a"),
            shell_node("work1", Some("rel1")),
            release("rel1", "deploy-a"),
            acquire("acq2", "work2", "deploy-b"),
            shell_node("work2", Some("rel2")),
            release("rel2", "deploy-b"),
        ],
    );

    let plan_execution_id = harness
        .engine
        .start_plan_execution(plan, HashMap::new())
        .await
        .unwrap();
    let status = harness
        .engine
        .wait_for_conclusion(plan_execution_id, CONCLUSION_TIMEOUT)
        .await
        .unwrap();
    assert_eq!(status, Status::Succeeded);

    for node_id in ["acq1", "acq2", "rel1", "rel2", "work1", "work2"] {
        let node = find_node(&harness.node_executions, plan_execution_id, node_id)
            .await
            .unwrap();
        assert_eq!(node.status, Status::Succeeded, "node {}", node_id);
    }
}

#[tokio::test]
async fn test_abort_interrupt_aborts_children_before_parent() {
    let hold = Arc::new(AsyncStepHandler::new());
    let harness = harness(vec![
        ("FORK", Arc::new(ChildrenStepHandler)),
        ("HOLD", hold.clone()),
    ]);
    let plan = Plan::new(
        "fork",
        vec![
            fork_node("fork", &["c1", "c2"]),
            typed_node("c1", "HOLD", FacilitatorType::Async, None),
            typed_node("c2", "HOLD", FacilitatorType::Async, None),
        ],
    );

    let plan_execution_id = harness
        .engine
        .start_plan_execution(plan, HashMap::new())
        .await
        .unwrap();
    for child in ["c1", "c2"] {
        wait_for_node_status(
            &harness.node_executions,
            plan_execution_id,
            child,
            Status::AsyncWaiting,
            CONCLUSION_TIMEOUT,
        )
        .await
        .unwrap();
    }
    let fork = find_node(&harness.node_executions, plan_execution_id, "fork")
        .await
        .unwrap();

    let interrupt = harness
        .engine
        .register_interrupt(
            InterruptType::Abort,
            plan_execution_id,
            Some(fork.uuid),
            "operator",
        )
        .await
        .unwrap();
    assert!(interrupt.seized);

    // The audit record survives processing.
    use ibai_ports::InterruptRepository as _;
    let stored = harness
        .interrupt_repository
        .fetch(&interrupt.uuid)
        .await
        .unwrap();
    assert!(stored.seized);
    assert_eq!(stored.created_by, "operator");

    let status = harness
        .engine
        .wait_for_conclusion(plan_execution_id, CONCLUSION_TIMEOUT)
        .await
        .unwrap();
    assert_eq!(status, Status::Aborted);

    let fork = find_node(&harness.node_executions, plan_execution_id, "fork")
        .await
        .unwrap();
    assert_eq!(fork.status, Status::Aborted);
    let parent_aborted_at = fork.end_ts.unwrap();
    for child_id in ["c1", "c2"] {
        let child = find_node(&harness.node_executions, plan_execution_id, child_id)
            .await
            .unwrap();
        assert_eq!(child.status, Status::Aborted);
        assert!(!child.interrupt_histories.is_empty());
        // Children reach ABORTED before the parent does.
        assert!(child.end_ts.unwrap() <= parent_aborted_at);
    }

    // A remote completion arriving after the abort is dropped.
    let callback_id = hold.last_callback().unwrap();
    harness
        .engine
        .resume_async(callback_id, StepResponse::succeeded())
        .await
        .unwrap();
    for child_id in ["c1", "c2"] {
        let child = find_node(&harness.node_executions, plan_execution_id, child_id)
            .await
            .unwrap();
        assert_eq!(child.status, Status::Aborted);
    }
}

#[tokio::test]
async fn test_pause_all_parks_nodes_and_pauses_active_timeouts() {
    let hold = Arc::new(AsyncStepHandler::new());
    let harness = harness(vec![("HOLD", hold.clone())]);
    let mut node = typed_node("a", "HOLD", FacilitatorType::Async, None);
    node.timeout_obtainments = vec![TimeoutObtainment::new(TimeoutDimension::Active, 3600)];
    let plan = Plan::new("a", vec![node]);

    let plan_execution_id = harness
        .engine
        .start_plan_execution(plan, HashMap::new())
        .await
        .unwrap();
    let a = wait_for_node_status(
        &harness.node_executions,
        plan_execution_id,
        "a",
        Status::AsyncWaiting,
        CONCLUSION_TIMEOUT,
    )
    .await
    .unwrap();

    harness
        .engine
        .register_interrupt(InterruptType::PauseAll, plan_execution_id, None, "operator")
        .await
        .unwrap();
    let paused = wait_for_node_status(
        &harness.node_executions,
        plan_execution_id,
        "a",
        Status::Paused,
        CONCLUSION_TIMEOUT,
    )
    .await
    .unwrap();
    assert_eq!(paused.paused_from, Some(Status::AsyncWaiting));
    let plan_execution = harness.plan_executions.fetch(&plan_execution_id).await.unwrap();
    assert_eq!(plan_execution.status, Status::Paused);

    use ibai_ports::{PlanExecutionRepository as _, TimeoutInstanceRepository as _};
    let instances = harness
        .timeout_repository
        .find_by_node_execution(&a.uuid)
        .await
        .unwrap();
    assert_eq!(instances.len(), 1);
    assert!(instances[0].tracker.is_paused());

    // Let measurable paused time accumulate before resuming.
    tokio::time::sleep(Duration::from_millis(50)).await;

    harness
        .engine
        .register_interrupt(InterruptType::ResumeAll, plan_execution_id, None, "operator")
        .await
        .unwrap();
    wait_for_node_status(
        &harness.node_executions,
        plan_execution_id,
        "a",
        Status::AsyncWaiting,
        CONCLUSION_TIMEOUT,
    )
    .await
    .unwrap();
    let instances = harness
        .timeout_repository
        .find_by_node_execution(&a.uuid)
        .await
        .unwrap();
    assert!(!instances[0].tracker.is_paused());
    assert!(instances[0].tracker.paused_total_ms > 0);

    let callback_id = hold.last_callback().unwrap();
    harness
        .engine
        .resume_async(callback_id, StepResponse::succeeded())
        .await
        .unwrap();
    let status = harness
        .engine
        .wait_for_conclusion(plan_execution_id, CONCLUSION_TIMEOUT)
        .await
        .unwrap();
    assert_eq!(status, Status::Succeeded);
}

#[tokio::test]
async fn test_active_timeout_expires_waiting_node() {
    let hold = Arc::new(AsyncStepHandler::new());
    let harness = harness(vec![("HOLD", hold)]);
    let mut node = typed_node("a", "HOLD", FacilitatorType::Async, None);
    node.timeout_obtainments = vec![TimeoutObtainment::new(TimeoutDimension::Active, 1)];
    let plan = Plan::new("a", vec![node]);

    let plan_execution_id = harness
        .engine
        .start_plan_execution(plan, HashMap::new())
        .await
        .unwrap();
    let status = harness
        .engine
        .wait_for_conclusion(plan_execution_id, CONCLUSION_TIMEOUT)
        .await
        .unwrap();
    assert_eq!(status, Status::Expired);

    let a = find_node(&harness.node_executions, plan_execution_id, "a")
        .await
        .unwrap();
    assert_eq!(a.status, Status::Expired);
    assert_eq!(
        a.failure_info.as_ref().map(|f| f.error_message.as_str()),
        Some("deadline exceeded")
    );
    assert!(!a.interrupt_histories.is_empty());
}

#[tokio::test]
async fn test_manual_intervention_then_mark_success() {
    let harness = harness(vec![("FAIL", Arc::new(FailingStepHandler))]);
    let mut node = typed_node("a", "FAIL", FacilitatorType::Sync, None);
    node.adviser_obtainments = vec![
        AdviserObtainment::new(
            AdviserType::OnFail,
            json!({"action": "MANUAL_INTERVENTION", "timeout_secs": 3600}),
        ),
        AdviserObtainment::new(AdviserType::OnAbort, json!({})),
    ];
    let plan = Plan::new("a", vec![node]);

    let plan_execution_id = harness
        .engine
        .start_plan_execution(plan, HashMap::new())
        .await
        .unwrap();
    let a = wait_for_node_status(
        &harness.node_executions,
        plan_execution_id,
        "a",
        Status::InterventionWaiting,
        CONCLUSION_TIMEOUT,
    )
    .await
    .unwrap();

    harness
        .engine
        .register_interrupt(
            InterruptType::MarkSuccess,
            plan_execution_id,
            Some(a.uuid),
            "operator",
        )
        .await
        .unwrap();
    let status = harness
        .engine
        .wait_for_conclusion(plan_execution_id, CONCLUSION_TIMEOUT)
        .await
        .unwrap();
    assert_eq!(status, Status::Succeeded);
}

#[tokio::test]
async fn test_mark_failed_resolves_approval_gate() {
    let harness = harness(vec![(
        "APPROVAL",
        Arc::new(WaitingStepHandler::new(Status::ApprovalWaiting)),
    )]);
    let plan = Plan::new(
        "a",
        vec![typed_node("a", "APPROVAL", FacilitatorType::Sync, None)],
    );

    let plan_execution_id = harness
        .engine
        .start_plan_execution(plan, HashMap::new())
        .await
        .unwrap();
    let a = wait_for_node_status(
        &harness.node_executions,
        plan_execution_id,
        "a",
        Status::ApprovalWaiting,
        CONCLUSION_TIMEOUT,
    )
    .await
    .unwrap();

    harness
        .engine
        .register_interrupt(
            InterruptType::MarkFailed,
            plan_execution_id,
            Some(a.uuid),
            "operator",
        )
        .await
        .unwrap();
    let status = harness
        .engine
        .wait_for_conclusion(plan_execution_id, CONCLUSION_TIMEOUT)
        .await
        .unwrap();
    assert_eq!(status, Status::Failed);
}

#[tokio::test]
async fn test_retry_interrupt_supersedes_failed_attempt() {
    let flaky = Arc::new(FlakyStepHandler::failing_times(1));
    let hold = Arc::new(AsyncStepHandler::new());
    let harness = harness(vec![
        ("FORK", Arc::new(ChildrenStepHandler)),
        ("FLAKY", flaky),
        ("HOLD", hold.clone()),
    ]);
    let plan = Plan::new(
        "fork",
        vec![
            fork_node("fork", &["flaky1", "hold2"]),
            typed_node("flaky1", "FLAKY", FacilitatorType::Sync, None),
            typed_node("hold2", "HOLD", FacilitatorType::Async, None),
        ],
    );

    let plan_execution_id = harness
        .engine
        .start_plan_execution(plan, HashMap::new())
        .await
        .unwrap();
    let failed = wait_for_node_status(
        &harness.node_executions,
        plan_execution_id,
        "flaky1",
        Status::Failed,
        CONCLUSION_TIMEOUT,
    )
    .await
    .unwrap();

    let outcome = harness
        .engine
        .register_interrupt(
            InterruptType::Retry,
            plan_execution_id,
            Some(failed.uuid),
            "operator",
        )
        .await
        .unwrap();
    assert!(outcome.seized);

    wait_for_node_status(
        &harness.node_executions,
        plan_execution_id,
        "flaky1",
        Status::Succeeded,
        CONCLUSION_TIMEOUT,
    )
    .await
    .unwrap();

    let callback_id = hold.last_callback().unwrap();
    harness
        .engine
        .resume_async(callback_id, StepResponse::succeeded())
        .await
        .unwrap();
    let status = harness
        .engine
        .wait_for_conclusion(plan_execution_id, CONCLUSION_TIMEOUT)
        .await
        .unwrap();
    // The superseded failed attempt does not drag the aggregate down.
    assert_eq!(status, Status::Succeeded);
}

#[tokio::test]
async fn test_retry_interrupt_on_succeeded_node_is_noop() {
    let hold = Arc::new(AsyncStepHandler::new());
    let harness = harness(vec![
        ("SHELL", Arc::new(SucceedingStepHandler)),
        ("HOLD", hold),
    ]);
    let plan = Plan::new(
        "a",
        vec![
            shell_node("a", Some("b")),
            typed_node("b", "HOLD", FacilitatorType::Async, None),
        ],
    );

    let plan_execution_id = harness
        .engine
        .start_plan_execution(plan, HashMap::new())
        .await
        .unwrap();
    let a = wait_for_node_status(
        &harness.node_executions,
        plan_execution_id,
        "a",
        Status::Succeeded,
        CONCLUSION_TIMEOUT,
    )
    .await
    .unwrap();

    let interrupt = harness
        .engine
        .register_interrupt(
            InterruptType::Retry,
            plan_execution_id,
            Some(a.uuid),
            "operator",
        )
        .await
        .unwrap();
    // The interrupt is consumed and audited, but nothing changed.
    assert!(interrupt.seized);
    let attempts = common::executions_for(&harness.node_executions, plan_execution_id, "a").await;
    assert_eq!(attempts.len(), 1);
    assert_eq!(attempts[0].status, Status::Succeeded);
}
