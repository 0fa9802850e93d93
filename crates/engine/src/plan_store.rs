//! In-memory plan store
//!
//! Plans are compile-time artifacts; the engine keeps the plan of every
//! in-flight execution here so services (barriers, interrupt handlers) can
//! read node configuration without a persistence round trip.

use dashmap::DashMap;
use ibai_core::{EngineError, Plan, PlanExecutionId, Result};
use std::sync::Arc;

#[derive(Default)]
pub struct PlanStore {
    plans: DashMap<PlanExecutionId, Arc<Plan>>,
}

impl PlanStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, plan_execution_id: PlanExecutionId, plan: Arc<Plan>) {
        self.plans.insert(plan_execution_id, plan);
    }

    pub fn get(&self, plan_execution_id: &PlanExecutionId) -> Result<Arc<Plan>> {
        self.plans
            .get(plan_execution_id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| {
                EngineError::NotFound(format!("plan for execution {}", plan_execution_id))
            })
    }

    pub fn remove(&self, plan_execution_id: &PlanExecutionId) {
        self.plans.remove(plan_execution_id);
    }
}
