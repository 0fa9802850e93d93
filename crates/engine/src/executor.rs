//! Orchestration engine run loop
//!
//! The top-level driver: advances a plan execution from start to a terminal
//! status by triggering nodes, facilitating their execution mode, routing
//! step outcomes through the adviser chain and aggregating node statuses
//! into the plan status. One tokio task drives each in-flight node; every
//! cross-node effect goes through the versioned store.

use crate::adviser::AdviserService;
use crate::barrier::BarrierService;
use crate::config::EngineConfig;
use crate::driver::{DriverHandle, NodeDriver};
use crate::expression;
use crate::facilitator::FacilitatorService;
use crate::graph::{OrchestrationGraph, OrchestrationGraphService};
use crate::interrupt::{InterruptContext, InterruptService};
use crate::plan_store::PlanStore;
use crate::registry::Registry;
use crate::restraint::ResourceRestraintService;
use crate::steps::{
    BARRIER_STEP_TYPE, BarrierStepHandler, RESOURCE_RESTRAINT_RELEASE_STEP_TYPE,
    RESOURCE_RESTRAINT_STEP_TYPE, RestraintReleaseStepHandler, RestraintStepHandler,
};
use crate::timeout::TimeoutEngine;
use crate::transitions::TransitionService;
use ibai_core::{
    Advice, AdviserType, AdvisingEvent, Ambiance, CallbackId, EngineError, ExecutableResponse,
    ExecutionMode, FailureInfo, Interrupt, InterruptEffect, InterruptType, Level, NodeExecution,
    NodeExecutionId, NodeId, Plan, PlanExecution, PlanExecutionId, PlanNode, RepairAction, Result,
    Status, StepCategory, StepResponse, TimeoutDimension, TimeoutObtainment,
};
use ibai_ports::{
    EventPublisher, NodeExecutionRepository, PlanExecutionRepository, StepHandler, TaskDispatcher,
};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

pub struct OrchestrationEngine {
    config: EngineConfig,
    plans: Arc<PlanStore>,
    node_executions: Arc<dyn NodeExecutionRepository>,
    plan_executions: Arc<dyn PlanExecutionRepository>,
    task_dispatcher: Arc<dyn TaskDispatcher>,
    transitions: Arc<TransitionService>,
    advisers: Arc<AdviserService>,
    facilitators: Arc<FacilitatorService>,
    steps: Arc<Registry<String, Arc<dyn StepHandler>>>,
    barriers: Arc<BarrierService>,
    restraints: Arc<ResourceRestraintService>,
    timeouts: Arc<TimeoutEngine>,
    interrupts: Arc<InterruptService>,
    graph: Arc<OrchestrationGraphService>,
    driver: Arc<DriverHandle>,
    sweeper: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl Drop for OrchestrationEngine {
    fn drop(&mut self) {
        if let Some(handle) = self.sweeper.lock().take() {
            handle.abort();
        }
    }
}

impl OrchestrationEngine {
    fn self_arc(&self) -> Result<Arc<Self>> {
        self.driver.engine_arc()
    }

    // ---- public surface -------------------------------------------------

    /// Validate and launch a plan: persists the plan execution, queues the
    /// start node and begins driving it.
    pub async fn start_plan_execution(
        &self,
        plan: Plan,
        setup_abstractions: HashMap<String, String>,
    ) -> Result<PlanExecutionId> {
        plan.validate()?;

        let plan_execution = PlanExecution::new(plan.uuid);
        let plan_execution_id = plan_execution.uuid;
        self.plan_executions.insert(&plan_execution).await?;

        let plan = Arc::new(plan);
        self.plans.put(plan_execution_id, plan.clone());

        let base = Ambiance::new(plan_execution_id, plan.uuid, setup_abstractions)
            .clone_for_child(Level::with_runtime_id(
                plan_execution_id.as_uuid(),
                plan.uuid.to_string(),
                "PLAN",
                StepCategory::Pipeline,
            ));

        let start_node = plan.fetch_node(&plan.start_node_id)?.clone();
        let execution =
            self.create_node_execution(plan_execution_id, &start_node, &base, None, None);
        self.node_executions.insert(&execution).await?;

        info!(%plan_execution_id, start_node = %start_node.node_id, "plan execution started");
        self.drive(execution.uuid).await?;
        Ok(plan_execution_id)
    }

    /// Callback ingress for ASYNC and TASK completions. Unknown or stale
    /// callback ids are dropped, not errors: the sender lost a race with an
    /// interrupt or a retry.
    pub async fn resume_async(&self, callback_id: CallbackId, response: StepResponse) -> Result<()> {
        let Some(node) = self.node_executions.find_by_callback_id(&callback_id).await? else {
            warn!(%callback_id, "callback for unknown id dropped");
            return Ok(());
        };
        let current = match node.latest_executable_response() {
            Some(ExecutableResponse::Async { callback_id }) => Some(*callback_id),
            Some(ExecutableResponse::Task { callback_id, .. }) => Some(*callback_id),
            Some(ExecutableResponse::TaskChain { callback_id, .. }) => Some(*callback_id),
            _ => None,
        };
        if current != Some(callback_id) {
            warn!(%callback_id, node_execution_id = %node.uuid, "stale callback dropped");
            return Ok(());
        }
        self.resume_with(node.uuid, response).await
    }

    /// Register an external control signal and apply it.
    pub async fn register_interrupt(
        &self,
        interrupt_type: InterruptType,
        plan_execution_id: PlanExecutionId,
        node_execution_id: Option<NodeExecutionId>,
        created_by: impl Into<String>,
    ) -> Result<Interrupt> {
        let interrupt = Interrupt::new(
            interrupt_type,
            plan_execution_id,
            node_execution_id,
            created_by,
        );
        self.register_interrupt_record(interrupt).await
    }

    pub async fn register_interrupt_record(&self, interrupt: Interrupt) -> Result<Interrupt> {
        self.interrupts.register_interrupt(interrupt).await
    }

    /// Read model for external rendering.
    pub async fn get_cached_graph(
        &self,
        plan_execution_id: &PlanExecutionId,
    ) -> Result<Arc<OrchestrationGraph>> {
        self.graph.get_cached_graph(plan_execution_id).await
    }

    pub fn restraint_service(&self) -> Arc<ResourceRestraintService> {
        self.restraints.clone()
    }

    pub fn barrier_service(&self) -> Arc<BarrierService> {
        self.barriers.clone()
    }

    pub fn timeout_engine(&self) -> Arc<TimeoutEngine> {
        self.timeouts.clone()
    }

    /// Poll the plan execution until it reaches a terminal status.
    pub async fn wait_for_conclusion(
        &self,
        plan_execution_id: PlanExecutionId,
        timeout: Duration,
    ) -> Result<Status> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let plan_execution = self.plan_executions.fetch(&plan_execution_id).await?;
            if plan_execution.is_terminal() {
                return Ok(plan_execution.status);
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(EngineError::Timeout(format!(
                    "plan execution {} did not conclude in time",
                    plan_execution_id
                )));
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    // ---- run loop -------------------------------------------------------

    /// Spawn a driving task for a queued node execution.
    pub async fn drive(&self, node_execution_id: NodeExecutionId) -> Result<()> {
        let engine = self.self_arc()?;
        tokio::spawn(engine.run_node(node_execution_id));
        Ok(())
    }

    fn run_node(
        self: Arc<Self>,
        node_execution_id: NodeExecutionId,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send>> {
        Box::pin(self.run_node_inner(node_execution_id))
    }

    async fn run_node_inner(self: Arc<Self>, node_execution_id: NodeExecutionId) {
        if let Err(err) = self.drive_node(node_execution_id).await {
            error!(node_execution_id = %node_execution_id, error = %err, "node drive failed");
            if let Err(err) = self
                .finalize(
                    node_execution_id,
                    Status::Errored,
                    Some(FailureInfo::new(err.to_string())),
                )
                .await
            {
                error!(node_execution_id = %node_execution_id, error = %err, "errored finalize failed");
            }
        }
    }

    /// Trigger one queued node: skip check, claim, timeout registration,
    /// facilitation, then execution in the settled mode.
    async fn drive_node(&self, node_execution_id: NodeExecutionId) -> Result<()> {
        let node = self.node_executions.fetch(&node_execution_id).await?;
        if node.status != Status::Queued {
            debug!(node_execution_id = %node_execution_id, status = %node.status, "not queued, drive skipped");
            return Ok(());
        }
        let plan_execution = self.plan_executions.fetch(&node.plan_execution_id).await?;
        if plan_execution.status == Status::Paused {
            debug!(node_execution_id = %node_execution_id, "plan paused, drive deferred");
            return Ok(());
        }
        let plan = self.plans.get(&node.plan_execution_id)?;
        let plan_node = plan.fetch_node(&node.node_id)?.clone();

        if let Some(condition) = &plan_node.skip_condition {
            if expression::evaluate_skip_condition(&node.ambiance, condition) {
                info!(node_id = %plan_node.node_id, "skip condition met");
                return self.finalize(node_execution_id, Status::Skipped, None).await;
            }
        }

        // Claim: exactly one driver wins the QUEUED -> RUNNING edge.
        match self
            .transitions
            .transition_node(node_execution_id, Status::Running)
            .await
        {
            Ok(_) => {}
            Err(EngineError::InvalidStatusTransition { .. }) => {
                debug!(node_execution_id = %node_execution_id, "lost drive claim");
                return Ok(());
            }
            Err(err) => return Err(err),
        }

        let mut instance_ids = Vec::new();
        for obtainment in &plan_node.timeout_obtainments {
            let instance = self
                .timeouts
                .register_timeout(
                    node.plan_execution_id,
                    node_execution_id,
                    obtainment,
                    InterruptType::MarkExpired,
                )
                .await?;
            instance_ids.push(instance.uuid);
        }
        if !instance_ids.is_empty() {
            let ids = instance_ids.clone();
            self.transitions
                .update_node_with(node_execution_id, move |n| {
                    for id in &ids {
                        if !n.timeout_instance_ids.contains(id) {
                            n.timeout_instance_ids.push(*id);
                        }
                    }
                })
                .await?;
        }

        let node = self.node_executions.fetch(&node_execution_id).await?;
        let response = self.facilitators.facilitate(&plan_node, &node.ambiance).await?;
        debug!(node_id = %plan_node.node_id, mode = ?response.mode, "facilitated");
        if !response.initial_wait.is_zero() {
            tokio::time::sleep(response.initial_wait).await;
        }

        self.execute_mode(&plan, &plan_node, node, response.mode).await
    }

    async fn execute_mode(
        &self,
        plan: &Arc<Plan>,
        plan_node: &PlanNode,
        node: NodeExecution,
        mode: ExecutionMode,
    ) -> Result<()> {
        let handler = self.steps.obtain(&plan_node.step_type)?;
        match mode {
            ExecutionMode::Sync => {
                self.transitions
                    .update_node_with(node.uuid, |n| {
                        n.record_executable_response(ExecutableResponse::Sync)
                    })
                    .await?;
                let response = match handler
                    .execute_sync(&node.ambiance, &plan_node.step_parameters)
                    .await
                {
                    Ok(response) => response,
                    // Step failures are data, not engine errors.
                    Err(err) => StepResponse::errored(FailureInfo::new(err.to_string())),
                };
                self.handle_step_response(node.uuid, response).await
            }

            ExecutionMode::Async => {
                let callback_id = CallbackId::new();
                self.transitions
                    .update_node_with(node.uuid, move |n| {
                        n.record_executable_response(ExecutableResponse::Async { callback_id })
                    })
                    .await?;
                self.transitions
                    .transition_node(node.uuid, Status::AsyncWaiting)
                    .await?;
                if let Err(err) = handler
                    .execute_async(&node.ambiance, &plan_node.step_parameters, callback_id)
                    .await
                {
                    return self
                        .finalize(node.uuid, Status::Errored, Some(FailureInfo::new(err.to_string())))
                        .await;
                }
                Ok(())
            }

            ExecutionMode::Task | ExecutionMode::TaskChain => {
                let requests = match handler
                    .build_task_requests(&node.ambiance, &plan_node.step_parameters)
                {
                    Ok(requests) if !requests.is_empty() => requests,
                    Ok(_) => {
                        return self
                            .finalize(
                                node.uuid,
                                Status::Errored,
                                Some(FailureInfo::new("step built no task request")),
                            )
                            .await;
                    }
                    Err(err) => {
                        return self
                            .finalize(
                                node.uuid,
                                Status::Errored,
                                Some(FailureInfo::new(err.to_string())),
                            )
                            .await;
                    }
                };

                let callback_id = CallbackId::new();
                let task_id = match self
                    .task_dispatcher
                    .submit(requests[0].clone(), callback_id)
                    .await
                {
                    Ok(task_id) => task_id,
                    Err(err) => {
                        return self
                            .finalize(
                                node.uuid,
                                Status::Errored,
                                Some(FailureInfo::new(err.to_string())),
                            )
                            .await;
                    }
                };

                let chain_total = requests.len();
                let task_response = if mode == ExecutionMode::Task {
                    ExecutableResponse::Task {
                        task_id,
                        callback_id,
                    }
                } else {
                    ExecutableResponse::TaskChain {
                        task_id,
                        callback_id,
                        chain_index: 0,
                        chain_total,
                    }
                };
                self.transitions
                    .update_node_with(node.uuid, move |n| {
                        n.record_executable_response(task_response.clone())
                    })
                    .await?;
                self.transitions
                    .transition_node(node.uuid, Status::TaskWaiting)
                    .await?;
                Ok(())
            }

            ExecutionMode::Child | ExecutionMode::Children => {
                let child_ids = match handler.child_node_ids(&plan_node.step_parameters) {
                    Ok(ids) if !ids.is_empty() => ids,
                    Ok(_) => {
                        return self
                            .finalize(
                                node.uuid,
                                Status::Errored,
                                Some(FailureInfo::new("step declared no children")),
                            )
                            .await;
                    }
                    Err(err) => {
                        return self
                            .finalize(
                                node.uuid,
                                Status::Errored,
                                Some(FailureInfo::new(err.to_string())),
                            )
                            .await;
                    }
                };
                let child_ids = if mode == ExecutionMode::Child {
                    child_ids.into_iter().take(1).collect::<Vec<_>>()
                } else {
                    child_ids
                };

                let mut spawned = Vec::new();
                for child_node_id in &child_ids {
                    let child_node = plan.fetch_node(child_node_id)?.clone();
                    let child = self.create_node_execution(
                        node.plan_execution_id,
                        &child_node,
                        &node.ambiance,
                        Some(node.uuid),
                        None,
                    );
                    self.node_executions.insert(&child).await?;
                    spawned.push(child.uuid);
                }

                let executable_response = if mode == ExecutionMode::Child {
                    ExecutableResponse::Child {
                        child_node_id: child_ids[0].clone(),
                        child_execution_id: spawned[0],
                    }
                } else {
                    ExecutableResponse::Children {
                        child_execution_ids: spawned.clone(),
                    }
                };
                self.transitions
                    .update_node_with(node.uuid, move |n| {
                        n.record_executable_response(executable_response.clone())
                    })
                    .await?;
                self.transitions
                    .transition_node(node.uuid, Status::AsyncWaiting)
                    .await?;
                for child in spawned {
                    self.drive(child).await?;
                }
                Ok(())
            }
        }
    }

    /// Route a step outcome: waiting statuses park the node, terminal
    /// statuses run the advising path.
    async fn handle_step_response(
        &self,
        node_execution_id: NodeExecutionId,
        response: StepResponse,
    ) -> Result<()> {
        if !response.status.is_terminal() {
            if !response.status.is_waiting() {
                return Err(EngineError::Validation(format!(
                    "step produced non-waiting flowing status {}",
                    response.status
                )));
            }
            self.transitions
                .transition_node(node_execution_id, response.status)
                .await?;
            return Ok(());
        }
        self.finalize_with_response(node_execution_id, response).await
    }

    /// Deliver a completion to a waiting node.
    pub async fn resume_with(
        &self,
        node_execution_id: NodeExecutionId,
        response: StepResponse,
    ) -> Result<()> {
        let node = self.node_executions.fetch(&node_execution_id).await?;

        // A completion for a paused node resumes it first.
        if node.status == Status::Paused {
            let restore = node.paused_from.unwrap_or(Status::Queued);
            if !restore.is_waiting() {
                warn!(node_execution_id = %node_execution_id, "completion for paused node dropped");
                return Ok(());
            }
            self.transitions
                .transition_node_with(node_execution_id, restore, |n| n.paused_from = None)
                .await?;
        }

        let node = self.node_executions.fetch(&node_execution_id).await?;
        if !node.status.is_waiting() {
            // Late callback after abort/expiry: checked against current
            // status and dropped.
            warn!(
                node_execution_id = %node_execution_id,
                status = %node.status,
                "late completion dropped"
            );
            return Ok(());
        }

        if let Some(ExecutableResponse::TaskChain {
            chain_index,
            chain_total,
            ..
        }) = node.latest_executable_response()
        {
            if response.status.is_positive() && chain_index + 1 < *chain_total {
                return self.advance_task_chain(&node, chain_index + 1, *chain_total).await;
            }
        }

        self.handle_step_response(node_execution_id, response).await
    }

    /// Submit the next link of a task chain.
    async fn advance_task_chain(
        &self,
        node: &NodeExecution,
        next_index: usize,
        chain_total: usize,
    ) -> Result<()> {
        let plan = self.plans.get(&node.plan_execution_id)?;
        let plan_node = plan.fetch_node(&node.node_id)?;
        let handler = self.steps.obtain(&plan_node.step_type)?;

        let requests = match handler.build_task_requests(&node.ambiance, &plan_node.step_parameters)
        {
            Ok(requests) if next_index < requests.len() => requests,
            Ok(_) | Err(_) => {
                return self
                    .finalize(
                        node.uuid,
                        Status::Errored,
                        Some(FailureInfo::new("task chain could not be rebuilt")),
                    )
                    .await;
            }
        };

        let callback_id = CallbackId::new();
        let task_id = match self
            .task_dispatcher
            .submit(requests[next_index].clone(), callback_id)
            .await
        {
            Ok(task_id) => task_id,
            Err(err) => {
                return self
                    .finalize(node.uuid, Status::Errored, Some(FailureInfo::new(err.to_string())))
                    .await;
            }
        };

        debug!(node_execution_id = %node.uuid, next_index, chain_total, "task chain advanced");
        let response = ExecutableResponse::TaskChain {
            task_id,
            callback_id,
            chain_index: next_index,
            chain_total,
        };
        self.transitions
            .update_node_with(node.uuid, move |n| {
                n.record_executable_response(response.clone())
            })
            .await?;
        Ok(())
    }

    /// Finalize through the advising path with a bare proposed status.
    pub async fn finalize(
        &self,
        node_execution_id: NodeExecutionId,
        proposed: Status,
        failure_info: Option<FailureInfo>,
    ) -> Result<()> {
        self.finalize_with_response(
            node_execution_id,
            StepResponse {
                status: proposed,
                failure_info,
                outputs: HashMap::new(),
            },
        )
        .await
    }

    /// The advising path: compute the first-match advice for the proposed
    /// status, then apply the decision. Advisers run at most once per
    /// execution; a node that was already advised just gets the status.
    async fn finalize_with_response(
        &self,
        node_execution_id: NodeExecutionId,
        response: StepResponse,
    ) -> Result<()> {
        let node = self.node_executions.fetch(&node_execution_id).await?;
        if node.is_terminal() {
            debug!(node_execution_id = %node_execution_id, "late result for terminal node dropped");
            return Ok(());
        }
        if node.status == Status::Discontinuing {
            debug!(node_execution_id = %node_execution_id, "result for discontinuing node dropped");
            return Ok(());
        }
        let plan = self.plans.get(&node.plan_execution_id)?;
        let plan_node = plan.fetch_node(&node.node_id)?.clone();
        let proposed = response.status;

        let advice = if node.advised {
            None
        } else {
            let event = AdvisingEvent {
                node_execution: node.clone(),
                from_status: node.status,
                to_status: proposed,
            };
            self.advisers.advise(&event, &plan_node.adviser_obtainments)?
        };

        match advice {
            None => {
                self.apply_terminal(&node, proposed, &response).await?;
                self.post_terminal(&node).await?;
                if proposed.is_broken() && !node.advised {
                    // Exhaustive adviser coverage is validated at plan
                    // compile time; reaching this is an engine bug.
                    return Err(EngineError::NoAdviserMatched {
                        node_id: node.node_id.to_string(),
                        status: proposed.as_str().to_string(),
                    });
                }
                Ok(())
            }

            Some(Advice::NextStep { next_node_id }) => {
                self.apply_terminal(&node, proposed, &response).await?;
                self.spawn_next(node.uuid, next_node_id).await?;
                Ok(())
            }

            Some(Advice::IgnoreFailure { next_node_id }) => {
                self.apply_terminal(&node, proposed, &response).await?;
                self.transitions
                    .update_node_with(node.uuid, |n| n.failure_ignored = true)
                    .await?;
                match next_node_id {
                    Some(next) => {
                        self.spawn_next(node.uuid, next).await?;
                        Ok(())
                    }
                    None => self.post_terminal(&node).await,
                }
            }

            Some(Advice::EndPlan) => {
                self.apply_terminal(&node, proposed, &response).await?;
                self.post_terminal(&node).await
            }

            Some(Advice::Retry { wait }) => {
                self.apply_terminal(&node, proposed, &response).await?;
                let exhausted = self.node_executions.fetch(&node_execution_id).await?;
                let successor = NodeExecution::retry_of(&exhausted);
                self.node_executions.insert(&successor).await?;
                info!(
                    exhausted = %exhausted.uuid,
                    successor = %successor.uuid,
                    wait_ms = wait.as_millis() as u64,
                    "retry advised"
                );
                let engine = self.self_arc()?;
                let successor_id = successor.uuid;
                tokio::spawn(async move {
                    if !wait.is_zero() {
                        tokio::time::sleep(wait).await;
                    }
                    engine.run_node(successor_id).await;
                });
                Ok(())
            }

            Some(Advice::InterventionWait {
                timeout,
                timeout_action,
            }) => {
                let failure_info = response.failure_info.clone();
                self.transitions
                    .transition_node_with(node_execution_id, Status::InterventionWaiting, move |n| {
                        n.failure_info = failure_info.clone();
                    })
                    .await?;
                let expiry_interrupt = match timeout_action {
                    RepairAction::Ignore => InterruptType::Ignore,
                    _ => InterruptType::MarkFailed,
                };
                let timeout = if timeout.is_zero() {
                    self.config.default_intervention_timeout
                } else {
                    timeout
                };
                let obtainment =
                    TimeoutObtainment::new(TimeoutDimension::Absolute, timeout.as_secs());
                let instance = self
                    .timeouts
                    .register_timeout(
                        node.plan_execution_id,
                        node_execution_id,
                        &obtainment,
                        expiry_interrupt,
                    )
                    .await?;
                let instance_uuid = instance.uuid;
                self.transitions
                    .update_node_with(node_execution_id, move |n| {
                        n.timeout_instance_ids.push(instance_uuid)
                    })
                    .await?;
                info!(node_execution_id = %node_execution_id, "parked for manual intervention");
                Ok(())
            }
        }
    }

    /// Apply a terminal status together with the step outcome; abort passes
    /// through DISCONTINUING first.
    async fn apply_terminal(
        &self,
        node: &NodeExecution,
        to: Status,
        response: &StepResponse,
    ) -> Result<NodeExecution> {
        if to == Status::Aborted && node.status != Status::Discontinuing {
            self.transitions
                .transition_node(node.uuid, Status::Discontinuing)
                .await?;
        }
        let response = response.clone();
        self.transitions
            .transition_node_with(node.uuid, to, move |n| {
                n.apply_step_outcome(&response);
                n.advised = true;
            })
            .await
    }

    /// After a terminal status: notify a waiting parent and conclude the
    /// plan when nothing is left flowing.
    async fn post_terminal(&self, node: &NodeExecution) -> Result<()> {
        if let Some(parent_id) = node.parent_id {
            self.check_parent_aggregation(parent_id).await?;
        }
        self.conclude_if_done(node.plan_execution_id).await
    }

    /// When every (non-superseded) child of a waiting parent is terminal,
    /// resume the parent with the aggregate outcome.
    pub(crate) async fn check_parent_aggregation(&self, parent_id: NodeExecutionId) -> Result<()> {
        let parent = self.node_executions.fetch(&parent_id).await?;
        if !parent.status.is_waiting() {
            return Ok(());
        }
        let children = self.node_executions.find_children(&parent_id).await?;
        if children.is_empty() {
            return Ok(());
        }
        let statuses = effective_statuses(&children);
        let Some(aggregate) = PlanExecution::calculate_status(&statuses) else {
            return Ok(());
        };
        debug!(parent = %parent_id, aggregate = %aggregate, "children concluded");

        let response = if aggregate.is_positive() {
            StepResponse::succeeded()
        } else {
            StepResponse {
                status: aggregate,
                failure_info: Some(FailureInfo::new("child execution failed")),
                outputs: HashMap::new(),
            }
        };
        Box::pin(self.resume_with(parent_id, response)).await
    }

    /// Create and start driving the successor node.
    pub async fn spawn_next(
        &self,
        after: NodeExecutionId,
        next: NodeId,
    ) -> Result<NodeExecutionId> {
        let after_node = self.node_executions.fetch(&after).await?;
        let plan = self.plans.get(&after_node.plan_execution_id)?;
        let next_node = plan.fetch_node(&next)?.clone();

        let base = after_node.ambiance.clone_for_finish();
        let successor = self.create_node_execution(
            after_node.plan_execution_id,
            &next_node,
            &base,
            after_node.parent_id,
            Some(after_node.uuid),
        );
        self.node_executions.insert(&successor).await?;
        info!(after = %after_node.node_id, next = %next_node.node_id, "successor queued");
        self.drive(successor.uuid).await?;
        Ok(successor.uuid)
    }

    /// Conclude the plan execution once no node execution remains
    /// non-terminal. Superseded retry attempts do not count.
    pub async fn conclude_if_done(&self, plan_execution_id: PlanExecutionId) -> Result<()> {
        let plan_execution = self.plan_executions.fetch(&plan_execution_id).await?;
        if plan_execution.is_terminal() {
            return Ok(());
        }
        let executions = self
            .node_executions
            .find_by_plan_execution(&plan_execution_id)
            .await?;
        if executions.is_empty() {
            return Ok(());
        }
        let statuses = effective_statuses(&executions);
        let Some(aggregate) = PlanExecution::calculate_status(&statuses) else {
            return Ok(());
        };
        match self
            .transitions
            .transition_plan(plan_execution_id, aggregate)
            .await
        {
            Ok(_) => {
                info!(%plan_execution_id, status = %aggregate, "plan execution concluded");
                Ok(())
            }
            // Another branch concluded the plan in between.
            Err(EngineError::InvalidStatusTransition { .. }) => Ok(()),
            Err(err) => Err(err),
        }
    }

    /// Operator IGNORE: mark failed without advisers, continue on the
    /// happy-path successor the node's on-success adviser names.
    pub async fn ignore_and_proceed(
        &self,
        node_execution_id: NodeExecutionId,
        effect: InterruptEffect,
    ) -> Result<()> {
        let node = self.node_executions.fetch(&node_execution_id).await?;
        let plan = self.plans.get(&node.plan_execution_id)?;
        let plan_node = plan.fetch_node(&node.node_id)?.clone();

        self.transitions
            .transition_node_with(node_execution_id, Status::Failed, move |n| {
                n.record_interrupt_effect(effect.clone());
                n.advised = true;
                n.failure_ignored = true;
            })
            .await?;

        let next = plan_node
            .adviser_obtainments
            .iter()
            .filter(|o| o.adviser_type == AdviserType::OnSuccess)
            .find_map(|o| {
                o.parameters
                    .get("next_node_id")
                    .and_then(|v| v.as_str())
                    .map(NodeId::from)
            });
        match next {
            Some(next) => {
                self.spawn_next(node_execution_id, next).await?;
                Ok(())
            }
            None => {
                let node = self.node_executions.fetch(&node_execution_id).await?;
                self.post_terminal(&node).await
            }
        }
    }

    fn create_node_execution(
        &self,
        plan_execution_id: PlanExecutionId,
        plan_node: &PlanNode,
        base_ambiance: &Ambiance,
        parent_id: Option<NodeExecutionId>,
        previous_id: Option<NodeExecutionId>,
    ) -> NodeExecution {
        let mut execution = NodeExecution::new(
            plan_execution_id,
            plan_node.node_id.clone(),
            base_ambiance.clone(),
        );
        if let Some(parent_id) = parent_id {
            execution = execution.with_parent(parent_id);
        }
        if let Some(previous_id) = previous_id {
            execution = execution.with_previous(previous_id);
        }
        execution.ambiance = base_ambiance.clone_for_child(Level::with_runtime_id(
            execution.uuid.as_uuid(),
            plan_node.node_id.as_str(),
            plan_node.step_type.clone(),
            StepCategory::Step,
        ));
        execution
    }
}

/// Wires the engine and its services against the collaborator ports.
/// Registries are populated here, once, before anything runs; duplicate
/// registrations fail the build.
pub struct EngineBuilder {
    node_executions: Arc<dyn NodeExecutionRepository>,
    plan_executions: Arc<dyn PlanExecutionRepository>,
    interrupt_repository: Arc<dyn ibai_ports::InterruptRepository>,
    barrier_repository: Arc<dyn ibai_ports::BarrierRepository>,
    restraint_repository: Arc<dyn ibai_ports::RestraintRepository>,
    timeout_repository: Arc<dyn ibai_ports::TimeoutInstanceRepository>,
    publisher: Arc<dyn EventPublisher>,
    task_dispatcher: Arc<dyn TaskDispatcher>,
    step_handlers: Vec<(String, Arc<dyn StepHandler>)>,
    config: EngineConfig,
}

impl EngineBuilder {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        node_executions: Arc<dyn NodeExecutionRepository>,
        plan_executions: Arc<dyn PlanExecutionRepository>,
        interrupt_repository: Arc<dyn ibai_ports::InterruptRepository>,
        barrier_repository: Arc<dyn ibai_ports::BarrierRepository>,
        restraint_repository: Arc<dyn ibai_ports::RestraintRepository>,
        timeout_repository: Arc<dyn ibai_ports::TimeoutInstanceRepository>,
        publisher: Arc<dyn EventPublisher>,
        task_dispatcher: Arc<dyn TaskDispatcher>,
    ) -> Self {
        Self {
            node_executions,
            plan_executions,
            interrupt_repository,
            barrier_repository,
            restraint_repository,
            timeout_repository,
            publisher,
            task_dispatcher,
            step_handlers: Vec::new(),
            config: EngineConfig::default(),
        }
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_step_handler(
        mut self,
        step_type: impl Into<String>,
        handler: Arc<dyn StepHandler>,
    ) -> Self {
        self.step_handlers.push((step_type.into(), handler));
        self
    }

    /// Build and start the engine. Must run inside a tokio runtime: the
    /// timeout sweeper is spawned here.
    pub fn build(self) -> Result<Arc<OrchestrationEngine>> {
        let driver = Arc::new(DriverHandle::new());
        let driver_dyn: Arc<dyn NodeDriver> = driver.clone();

        let plans = Arc::new(PlanStore::new());
        let graph = Arc::new(OrchestrationGraphService::new(
            self.node_executions.clone(),
            plans.clone(),
        ));
        let timeouts = Arc::new(TimeoutEngine::new(
            self.timeout_repository.clone(),
            self.publisher.clone(),
            driver_dyn.clone(),
            self.config.clone(),
        )?);
        let transitions = Arc::new(TransitionService::new(
            self.node_executions.clone(),
            self.plan_executions.clone(),
            self.publisher.clone(),
            timeouts.clone(),
            graph.clone(),
            self.config.cas.clone(),
        ));
        let barriers = Arc::new(BarrierService::new(
            self.barrier_repository.clone(),
            plans.clone(),
            driver_dyn.clone(),
            self.publisher.clone(),
            self.config.cas.clone(),
        ));
        let restraints = Arc::new(ResourceRestraintService::new(
            self.restraint_repository.clone(),
            driver_dyn.clone(),
            self.publisher.clone(),
            self.config.cas.clone(),
        ));
        let advisers = Arc::new(AdviserService::new()?);
        let facilitators = Arc::new(FacilitatorService::new(barriers.clone())?);

        let steps: Registry<String, Arc<dyn StepHandler>> = Registry::new();
        steps.register(
            BARRIER_STEP_TYPE.to_string(),
            Arc::new(BarrierStepHandler::new(barriers.clone())),
        )?;
        steps.register(
            RESOURCE_RESTRAINT_STEP_TYPE.to_string(),
            Arc::new(RestraintStepHandler::new(restraints.clone())),
        )?;
        steps.register(
            RESOURCE_RESTRAINT_RELEASE_STEP_TYPE.to_string(),
            Arc::new(RestraintReleaseStepHandler::new(restraints.clone())),
        )?;
        for (step_type, handler) in self.step_handlers {
            steps.register(step_type, handler)?;
        }

        let ctx = InterruptContext {
            node_executions: self.node_executions.clone(),
            plan_executions: self.plan_executions.clone(),
            transitions: transitions.clone(),
            timeouts: timeouts.clone(),
            driver: driver_dyn.clone(),
            plans: plans.clone(),
            publisher: self.publisher.clone(),
            config: self.config.clone(),
        };
        let interrupts = Arc::new(InterruptService::new(self.interrupt_repository, ctx)?);

        let engine = Arc::new(OrchestrationEngine {
            config: self.config,
            plans,
            node_executions: self.node_executions,
            plan_executions: self.plan_executions,
            task_dispatcher: self.task_dispatcher,
            transitions,
            advisers,
            facilitators,
            steps: Arc::new(steps),
            barriers,
            restraints,
            timeouts,
            interrupts,
            graph,
            driver: driver.clone(),
            sweeper: Mutex::new(None),
        });
        driver.attach(&engine);
        *engine.sweeper.lock() = Some(engine.timeouts.spawn_sweeper());
        Ok(engine)
    }
}

/// Statuses of the given executions as aggregation sees them: superseded
/// retry attempts are filtered out and ignored failures count as positive.
fn effective_statuses(executions: &[NodeExecution]) -> Vec<Status> {
    let superseded: HashSet<NodeExecutionId> = executions
        .iter()
        .flat_map(|e| e.retry_ids.iter().copied())
        .collect();
    executions
        .iter()
        .filter(|e| !superseded.contains(&e.uuid))
        .map(|e| {
            if e.failure_ignored && e.status.is_broken() {
                Status::Succeeded
            } else {
                e.status
            }
        })
        .collect()
}
