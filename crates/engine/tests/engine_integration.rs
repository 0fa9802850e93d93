//! Run-loop integration tests: advising, retries, execution modes and the
//! orchestration graph, over in-memory collaborators.

mod common;

use common::{executions_for, find_node, harness, shell_node, typed_node, wait_for_node_status};
use ibai_adapters::{
    AsyncStepHandler, ChildrenStepHandler, FailingStepHandler, FlakyStepHandler,
    SucceedingStepHandler, TaskStepHandler,
};
use ibai_core::{
    AdviserObtainment, AdviserType, ExecutableResponse, FacilitatorType, Plan, Status,
    StepResponse,
};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

const CONCLUSION_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::test]
async fn test_linear_plan_succeeds_and_chains_nodes() {
    let harness = harness(vec![("SHELL", Arc::new(SucceedingStepHandler))]);
    let mut events = harness.bus.subscribe();
    let plan = Plan::new("a", vec![shell_node("a", Some("b")), shell_node("b", None)]);

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

    // The event stream shows B leaving QUEUED only after A succeeded.
    let mut saw_a_succeed = false;
    let mut b_claimed_after_a = false;
    while let Ok(event) = events.try_recv() {
        if let ibai_ports::EngineEvent::NodeStatusChanged {
            node_id, from, to, ..
        } = event
        {
            if node_id == ibai_core::NodeId::from("a") && to == Status::Succeeded {
                saw_a_succeed = true;
            }
            if node_id == ibai_core::NodeId::from("b")
                && from == Status::Queued
                && to == Status::Running
            {
                b_claimed_after_a = saw_a_succeed;
            }
        }
    }
    assert!(saw_a_succeed);
    assert!(b_claimed_after_a);

    let a = find_node(&harness.node_executions, plan_execution_id, "a")
        .await
        .unwrap();
    let b = find_node(&harness.node_executions, plan_execution_id, "b")
        .await
        .unwrap();
    assert_eq!(a.status, Status::Succeeded);
    assert_eq!(b.status, Status::Succeeded);
    // The successor is chained to its predecessor, not parented under it.
    assert_eq!(b.previous_id, Some(a.uuid));
    assert_eq!(b.parent_id, None);
    assert!(a.advised);
    assert!(a.end_ts.is_some());
}

#[tokio::test]
async fn test_successor_is_queued_when_predecessor_succeeds() {
    // B parks forever, so the state right after A's success is observable.
    let harness = harness(vec![
        ("SHELL", Arc::new(SucceedingStepHandler)),
        ("HOLD", Arc::new(AsyncStepHandler::new())),
    ]);
    let mut hold = typed_node("b", "HOLD", FacilitatorType::Async, None);
    hold.identifier = "hold-step".to_string();
    let plan = Plan::new("a", vec![shell_node("a", Some("b")), hold]);

    let plan_execution_id = harness
        .engine
        .start_plan_execution(plan, HashMap::new())
        .await
        .unwrap();
    wait_for_node_status(
        &harness.node_executions,
        plan_execution_id,
        "a",
        Status::Succeeded,
        CONCLUSION_TIMEOUT,
    )
    .await
    .unwrap();

    // B was created in the same advising step that finalized A.
    let b = find_node(&harness.node_executions, plan_execution_id, "b")
        .await
        .expect("successor must exist once A is terminal");
    assert!(
        matches!(
            b.status,
            Status::Queued | Status::Running | Status::AsyncWaiting
        ),
        "unexpected successor status {}",
        b.status
    );
}

#[tokio::test]
async fn test_skip_condition_skips_node_and_proceeds() {
    let harness = harness(vec![("SHELL", Arc::new(SucceedingStepHandler))]);
    let skipped = shell_node("a", Some("b")).with_skip_condition("${setup.skip_a}");
    let plan = Plan::new("a", vec![skipped, shell_node("b", None)]);

    let mut setup = HashMap::new();
    setup.insert("skip_a".to_string(), "true".to_string());
    let plan_execution_id = harness
        .engine
        .start_plan_execution(plan, setup)
        .await
        .unwrap();
    let status = harness
        .engine
        .wait_for_conclusion(plan_execution_id, CONCLUSION_TIMEOUT)
        .await
        .unwrap();
    assert_eq!(status, Status::Succeeded);

    let a = find_node(&harness.node_executions, plan_execution_id, "a")
        .await
        .unwrap();
    assert_eq!(a.status, Status::Skipped);
    let b = find_node(&harness.node_executions, plan_execution_id, "b")
        .await
        .unwrap();
    assert_eq!(b.status, Status::Succeeded);
}

#[tokio::test]
async fn test_step_failure_ends_plan_via_on_fail_adviser() {
    let harness = harness(vec![("SHELL", Arc::new(FailingStepHandler))]);
    let plan = Plan::new("a", vec![shell_node("a", Some("b")), shell_node("b", None)]);

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
    assert_eq!(status, Status::Failed);

    let a = find_node(&harness.node_executions, plan_execution_id, "a")
        .await
        .unwrap();
    assert_eq!(a.status, Status::Failed);
    assert_eq!(
        a.failure_info.as_ref().map(|f| f.error_message.as_str()),
        Some("always fails")
    );
    // The failure never reached B.
    assert!(find_node(&harness.node_executions, plan_execution_id, "b")
        .await
        .is_none());
}

#[tokio::test]
async fn test_retry_adviser_requeues_until_success() {
    let flaky = Arc::new(FlakyStepHandler::failing_times(2));
    let harness = harness(vec![("SHELL", flaky.clone())]);
    let node = shell_node("a", None).with_adviser(AdviserObtainment::new(
        AdviserType::Retry,
        json!({"retry_count": 3, "wait_interval_secs": [0]}),
    ));
    // Retry must be consulted before the default on-fail adviser.
    let mut node = node;
    node.adviser_obtainments.rotate_right(1);
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
    assert_eq!(status, Status::Succeeded);
    assert_eq!(flaky.executions.load(Ordering::SeqCst), 3);

    let attempts = executions_for(&harness.node_executions, plan_execution_id, "a").await;
    assert_eq!(attempts.len(), 3);
    let last = attempts.last().unwrap();
    assert_eq!(last.status, Status::Succeeded);
    assert_eq!(last.retry_ids.len(), 2);
    // Exhausted attempts stay terminal and untouched.
    assert!(attempts[0].status == Status::Failed && attempts[1].status == Status::Failed);
}

#[tokio::test]
async fn test_retry_exhaustion_falls_back_to_repair_action() {
    let flaky = Arc::new(FlakyStepHandler::failing_times(10));
    let harness = harness(vec![("SHELL", flaky.clone())]);
    let mut node = shell_node("a", None).with_adviser(AdviserObtainment::new(
        AdviserType::Retry,
        json!({"retry_count": 1, "wait_interval_secs": [0], "repair_action_after_retry": "END_PLAN"}),
    ));
    node.adviser_obtainments.rotate_right(1);
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
    assert_eq!(status, Status::Failed);
    assert_eq!(flaky.executions.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_ignored_failure_keeps_plan_on_happy_path() {
    let harness = harness(vec![
        ("FAIL", Arc::new(FailingStepHandler)),
        ("SHELL", Arc::new(SucceedingStepHandler)),
    ]);
    let mut failing = typed_node("a", "FAIL", FacilitatorType::Sync, None);
    failing.adviser_obtainments = vec![
        AdviserObtainment::new(
            AdviserType::OnFail,
            json!({"action": "IGNORE", "next_node_id": "b"}),
        ),
        AdviserObtainment::new(AdviserType::OnAbort, json!({})),
    ];
    let plan = Plan::new("a", vec![failing, shell_node("b", None)]);

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

    let a = find_node(&harness.node_executions, plan_execution_id, "a")
        .await
        .unwrap();
    assert_eq!(a.status, Status::Failed);
    assert!(a.failure_ignored);
}

#[tokio::test]
async fn test_async_step_completes_through_callback() {
    let async_step = Arc::new(AsyncStepHandler::new());
    let harness = harness(vec![("ASYNC_WORK", async_step.clone())]);
    let plan = Plan::new(
        "a",
        vec![typed_node("a", "ASYNC_WORK", FacilitatorType::Async, None)],
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
        Status::AsyncWaiting,
        CONCLUSION_TIMEOUT,
    )
    .await
    .unwrap();
    assert!(matches!(
        a.latest_executable_response(),
        Some(ExecutableResponse::Async { .. })
    ));

    let callback_id = async_step.last_callback().expect("callback recorded");
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
async fn test_task_step_delegates_and_resumes() {
    let harness = harness(vec![("TASK_WORK", Arc::new(TaskStepHandler))]);
    let mut node = typed_node("a", "TASK_WORK", FacilitatorType::Task, None);
    node.step_parameters = json!({"tasks": ["build"]});
    let plan = Plan::new("a", vec![node]);

    let plan_execution_id = harness
        .engine
        .start_plan_execution(plan, HashMap::new())
        .await
        .unwrap();
    wait_for_node_status(
        &harness.node_executions,
        plan_execution_id,
        "a",
        Status::TaskWaiting,
        CONCLUSION_TIMEOUT,
    )
    .await
    .unwrap();
    assert_eq!(harness.dispatcher.submission_count(), 1);

    let callback_id = harness.dispatcher.last_callback().unwrap();
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
async fn test_task_chain_submits_links_sequentially() {
    let harness = harness(vec![("TASK_WORK", Arc::new(TaskStepHandler))]);
    let mut node = typed_node("a", "TASK_WORK", FacilitatorType::TaskChain, None);
    node.step_parameters = json!({"tasks": ["build", "deploy"]});
    let plan = Plan::new("a", vec![node]);

    let plan_execution_id = harness
        .engine
        .start_plan_execution(plan, HashMap::new())
        .await
        .unwrap();
    wait_for_node_status(
        &harness.node_executions,
        plan_execution_id,
        "a",
        Status::TaskWaiting,
        CONCLUSION_TIMEOUT,
    )
    .await
    .unwrap();
    assert_eq!(harness.dispatcher.submission_count(), 1);

    // Completing the first link submits the second; the plan is not done.
    let callback_id = harness.dispatcher.last_callback().unwrap();
    harness
        .engine
        .resume_async(callback_id, StepResponse::succeeded())
        .await
        .unwrap();
    let deadline = tokio::time::Instant::now() + CONCLUSION_TIMEOUT;
    while harness.dispatcher.submission_count() < 2 {
        assert!(tokio::time::Instant::now() < deadline, "second link never submitted");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let callback_id = harness.dispatcher.last_callback().unwrap();
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
    assert_eq!(harness.dispatcher.submission_count(), 2);
}

#[tokio::test]
async fn test_children_aggregate_into_parent_success() {
    let harness = harness(vec![
        ("FORK", Arc::new(ChildrenStepHandler)),
        ("SHELL", Arc::new(SucceedingStepHandler)),
    ]);
    let mut fork = typed_node("fork", "FORK", FacilitatorType::Children, None);
    fork.step_parameters = json!({"child_node_ids": ["c1", "c2"]});
    let plan = Plan::new(
        "fork",
        vec![fork, shell_node("c1", None), shell_node("c2", None)],
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

    let fork = find_node(&harness.node_executions, plan_execution_id, "fork")
        .await
        .unwrap();
    assert_eq!(fork.status, Status::Succeeded);
    assert!(matches!(
        fork.executable_responses.first(),
        Some(ExecutableResponse::Children { child_execution_ids }) if child_execution_ids.len() == 2
    ));
    for child_id in ["c1", "c2"] {
        let child = find_node(&harness.node_executions, plan_execution_id, child_id)
            .await
            .unwrap();
        assert_eq!(child.parent_id, Some(fork.uuid));
        assert_eq!(child.status, Status::Succeeded);
        // Children execute one ambiance level below the parent.
        assert_eq!(child.ambiance.depth(), fork.ambiance.depth() + 1);
    }
}

#[tokio::test]
async fn test_child_failure_fails_the_parent() {
    let harness = harness(vec![
        ("FORK", Arc::new(ChildrenStepHandler)),
        ("SHELL", Arc::new(SucceedingStepHandler)),
        ("FAIL", Arc::new(FailingStepHandler)),
    ]);
    let mut fork = typed_node("fork", "FORK", FacilitatorType::Children, None);
    fork.step_parameters = json!({"child_node_ids": ["ok", "bad"]});
    let plan = Plan::new(
        "fork",
        vec![
            fork,
            shell_node("ok", None),
            typed_node("bad", "FAIL", FacilitatorType::Sync, None),
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
    assert_eq!(status, Status::Failed);

    let fork = find_node(&harness.node_executions, plan_execution_id, "fork")
        .await
        .unwrap();
    assert_eq!(fork.status, Status::Failed);
}

#[tokio::test]
async fn test_plan_validation_rejects_missing_broken_coverage() {
    let harness = harness(vec![("SHELL", Arc::new(SucceedingStepHandler))]);
    let mut node = shell_node("a", None);
    node.adviser_obtainments
        .retain(|o| o.adviser_type == AdviserType::OnSuccess);
    let plan = Plan::new("a", vec![node]);

    let err = harness
        .engine
        .start_plan_execution(plan, HashMap::new())
        .await
        .unwrap_err();
    assert!(matches!(err, ibai_core::EngineError::Validation(_)));
}

#[tokio::test]
async fn test_graph_read_model_reflects_statuses_and_edges() {
    let harness = harness(vec![("SHELL", Arc::new(SucceedingStepHandler))]);
    let plan = Plan::new("a", vec![shell_node("a", Some("b")), shell_node("b", None)]);

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

    let graph = harness
        .engine
        .get_cached_graph(&plan_execution_id)
        .await
        .unwrap();
    assert_eq!(graph.vertices.len(), 2);
    assert!(graph.vertices.iter().all(|v| v.status == Status::Succeeded));

    let a = find_node(&harness.node_executions, plan_execution_id, "a")
        .await
        .unwrap();
    let b = graph
        .vertices
        .iter()
        .find(|v| v.node_id == ibai_core::NodeId::from("b"))
        .unwrap();
    assert_eq!(b.previous_id, Some(a.uuid));
    assert_eq!(b.step_type, "SHELL");
}
