//! Ambiance - the execution context stack
//!
//! An `Ambiance` is the nested context threaded through a node execution's
//! lifetime: plan-level identifiers, setup-time scoping abstractions, and an
//! ordered stack of levels (pipeline, stage, step group, step). It is a plain
//! immutable value; entering a nested scope clones the stack and appends a
//! level, so no shared mutable state ever crosses task boundaries.

use crate::plan_execution::PlanExecutionId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Category tag for a level in the ambiance stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StepCategory {
    Pipeline,
    Stage,
    StepGroup,
    Step,
}

/// One level of the execution context stack.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Level {
    pub runtime_id: Uuid,
    pub setup_id: String,
    pub group: String,
    pub category: StepCategory,
}

impl Level {
    pub fn new(setup_id: impl Into<String>, group: impl Into<String>, category: StepCategory) -> Self {
        Self {
            runtime_id: Uuid::new_v4(),
            setup_id: setup_id.into(),
            group: group.into(),
            category,
        }
    }

    /// Level pinned to a caller-chosen runtime id. The engine pins the
    /// innermost level to the node execution id so steps can recover their
    /// own identity from the context stack.
    pub fn with_runtime_id(
        runtime_id: Uuid,
        setup_id: impl Into<String>,
        group: impl Into<String>,
        category: StepCategory,
    ) -> Self {
        Self {
            runtime_id,
            setup_id: setup_id.into(),
            group: group.into(),
            category,
        }
    }
}

/// Execution context stack, shared by value across a node's lifetime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ambiance {
    pub plan_execution_id: PlanExecutionId,
    pub plan_id: Uuid,
    /// Setup-time scoping keys (account/org/project style), resolved once at
    /// plan-execution start.
    pub setup_abstractions: HashMap<String, String>,
    pub levels: Vec<Level>,
}

impl Ambiance {
    pub fn new(
        plan_execution_id: PlanExecutionId,
        plan_id: Uuid,
        setup_abstractions: HashMap<String, String>,
    ) -> Self {
        Self {
            plan_execution_id,
            plan_id,
            setup_abstractions,
            levels: Vec::new(),
        }
    }

    /// Clone the stack and append a level for a nested scope.
    pub fn clone_for_child(&self, level: Level) -> Self {
        let mut cloned = self.clone();
        cloned.levels.push(level);
        cloned
    }

    /// Clone the stack dropping the innermost level, used when finishing a
    /// scope and reporting at the parent's altitude.
    pub fn clone_for_finish(&self) -> Self {
        let mut cloned = self.clone();
        cloned.levels.pop();
        cloned
    }

    /// Clone for a retry attempt: the innermost level gets a fresh runtime id
    /// so the new execution is distinguishable from the exhausted one.
    pub fn clone_for_retry(&self) -> Self {
        let mut cloned = self.clone();
        if let Some(level) = cloned.levels.last_mut() {
            level.runtime_id = Uuid::new_v4();
        }
        cloned
    }

    pub fn current_level(&self) -> Option<&Level> {
        self.levels.last()
    }

    pub fn obtain_current_runtime_id(&self) -> Option<Uuid> {
        self.current_level().map(|l| l.runtime_id)
    }

    pub fn obtain_current_setup_id(&self) -> Option<&str> {
        self.current_level().map(|l| l.setup_id.as_str())
    }

    pub fn find_level_by_group(&self, group: &str) -> Option<&Level> {
        self.levels.iter().rev().find(|l| l.group == group)
    }

    pub fn setup_abstraction(&self, key: &str) -> Option<&str> {
        self.setup_abstractions.get(key).map(String::as_str)
    }

    pub fn depth(&self) -> usize {
        self.levels.len()
    }
}
