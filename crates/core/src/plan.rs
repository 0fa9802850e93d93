//! Static execution plan
//!
//! A `Plan` is the compiled DAG of `PlanNode`s. It is authored once at
//! compile time and never mutated afterwards; the engine only reads it.

use crate::advise::AdviserType;
use crate::facilitate::FacilitatorType;
use crate::timeout::TimeoutDimension;
use crate::{EngineError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

/// Plan-authored node identifier - Value Object
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeId(String);

impl NodeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for NodeId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Ordered adviser configuration on a node. Advisers are consulted in the
/// declared order, first match wins.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdviserObtainment {
    pub adviser_type: AdviserType,
    #[serde(default)]
    pub parameters: serde_json::Value,
}

impl AdviserObtainment {
    pub fn new(adviser_type: AdviserType, parameters: serde_json::Value) -> Self {
        Self {
            adviser_type,
            parameters,
        }
    }
}

/// Facilitator configuration on a node, consulted in order until one
/// produces a response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FacilitatorObtainment {
    pub facilitator_type: FacilitatorType,
    #[serde(default)]
    pub parameters: serde_json::Value,
}

impl FacilitatorObtainment {
    pub fn new(facilitator_type: FacilitatorType, parameters: serde_json::Value) -> Self {
        Self {
            facilitator_type,
            parameters,
        }
    }
}

/// Deadline configuration on a node, one per tracked dimension.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutObtainment {
    pub dimension: TimeoutDimension,
    pub duration_secs: u64,
}

impl TimeoutObtainment {
    pub fn new(dimension: TimeoutDimension, duration_secs: u64) -> Self {
        Self {
            dimension,
            duration_secs,
        }
    }
}

/// Immutable plan node, authored at compile time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanNode {
    pub node_id: NodeId,
    /// Human-readable identifier within the plan (step name).
    pub identifier: String,
    pub step_type: String,
    #[serde(default)]
    pub step_parameters: serde_json::Value,
    pub adviser_obtainments: Vec<AdviserObtainment>,
    pub facilitator_obtainments: Vec<FacilitatorObtainment>,
    #[serde(default)]
    pub timeout_obtainments: Vec<TimeoutObtainment>,
    /// Expression evaluated against the ambiance before the node runs; a
    /// "true" result skips the node.
    #[serde(default)]
    pub skip_condition: Option<String>,
}

impl PlanNode {
    pub fn new(node_id: impl Into<NodeId>, identifier: impl Into<String>, step_type: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            identifier: identifier.into(),
            step_type: step_type.into(),
            step_parameters: serde_json::Value::Null,
            adviser_obtainments: Vec::new(),
            facilitator_obtainments: Vec::new(),
            timeout_obtainments: Vec::new(),
            skip_condition: None,
        }
    }

    pub fn with_step_parameters(mut self, parameters: serde_json::Value) -> Self {
        self.step_parameters = parameters;
        self
    }

    pub fn with_adviser(mut self, obtainment: AdviserObtainment) -> Self {
        self.adviser_obtainments.push(obtainment);
        self
    }

    pub fn with_facilitator(mut self, obtainment: FacilitatorObtainment) -> Self {
        self.facilitator_obtainments.push(obtainment);
        self
    }

    pub fn with_timeout(mut self, obtainment: TimeoutObtainment) -> Self {
        self.timeout_obtainments.push(obtainment);
        self
    }

    pub fn with_skip_condition(mut self, condition: impl Into<String>) -> Self {
        self.skip_condition = Some(condition.into());
        self
    }

    /// True when at least one configured adviser reacts to broken statuses.
    pub fn covers_broken_statuses(&self) -> bool {
        self.adviser_obtainments
            .iter()
            .any(|o| o.adviser_type.handles_broken())
    }
}

impl From<String> for NodeId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// The static DAG of plan nodes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    pub uuid: Uuid,
    pub start_node_id: NodeId,
    pub nodes: Vec<PlanNode>,
}

impl Plan {
    pub fn new(start_node_id: impl Into<NodeId>, nodes: Vec<PlanNode>) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            start_node_id: start_node_id.into(),
            nodes,
        }
    }

    pub fn node(&self, node_id: &NodeId) -> Option<&PlanNode> {
        self.nodes.iter().find(|n| &n.node_id == node_id)
    }

    pub fn fetch_node(&self, node_id: &NodeId) -> Result<&PlanNode> {
        self.node(node_id)
            .ok_or_else(|| EngineError::NotFound(format!("plan node {}", node_id)))
    }

    pub fn nodes_with_step_type(&self, step_type: &str) -> Vec<&PlanNode> {
        self.nodes
            .iter()
            .filter(|n| n.step_type == step_type)
            .collect()
    }

    /// Compile-time validation: node-id uniqueness, a resolvable start node,
    /// resolvable next-node references, at least one facilitator per node and
    /// adviser coverage of the broken-status partition.
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for node in &self.nodes {
            if !seen.insert(node.node_id.clone()) {
                return Err(EngineError::Validation(format!(
                    "duplicate plan node id: {}",
                    node.node_id
                )));
            }
        }

        self.fetch_node(&self.start_node_id).map_err(|_| {
            EngineError::Validation(format!(
                "start node {} not present in plan",
                self.start_node_id
            ))
        })?;

        for node in &self.nodes {
            if node.facilitator_obtainments.is_empty() {
                return Err(EngineError::Validation(format!(
                    "plan node {} has no facilitator obtainment",
                    node.node_id
                )));
            }

            if !node.covers_broken_statuses() {
                return Err(EngineError::Validation(format!(
                    "plan node {} has no adviser covering broken statuses",
                    node.node_id
                )));
            }

            for obtainment in &node.adviser_obtainments {
                if let Some(next) = obtainment
                    .parameters
                    .get("next_node_id")
                    .and_then(|v| v.as_str())
                {
                    let next_id = NodeId::from(next);
                    if self.node(&next_id).is_none() {
                        return Err(EngineError::Validation(format!(
                            "plan node {} references unknown next node {}",
                            node.node_id, next_id
                        )));
                    }
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn valid_node(id: &str) -> PlanNode {
        PlanNode::new(id, id, "SHELL")
            .with_facilitator(FacilitatorObtainment::new(FacilitatorType::Sync, json!({})))
            .with_adviser(AdviserObtainment::new(AdviserType::OnFail, json!({})))
    }

    #[test]
    fn test_plan_validate_accepts_well_formed_plan() {
        let plan = Plan::new("a", vec![valid_node("a"), valid_node("b")]);
        plan.validate().unwrap();
    }

    #[test]
    fn test_plan_validate_rejects_duplicate_node_ids() {
        let plan = Plan::new("a", vec![valid_node("a"), valid_node("a")]);
        assert!(plan.validate().is_err());
    }

    #[test]
    fn test_plan_validate_rejects_unknown_start_node() {
        let plan = Plan::new("missing", vec![valid_node("a")]);
        assert!(plan.validate().is_err());
    }

    #[test]
    fn test_plan_validate_rejects_dangling_next_node_reference() {
        let node = valid_node("a").with_adviser(AdviserObtainment::new(
            AdviserType::OnSuccess,
            json!({"next_node_id": "ghost"}),
        ));
        let plan = Plan::new("a", vec![node]);
        assert!(plan.validate().is_err());
    }

    #[test]
    fn test_plan_validate_rejects_missing_broken_coverage() {
        let node = PlanNode::new("a", "a", "SHELL")
            .with_facilitator(FacilitatorObtainment::new(FacilitatorType::Sync, json!({})))
            .with_adviser(AdviserObtainment::new(
                AdviserType::OnSuccess,
                json!({"next_node_id": "a"}),
            ));
        let plan = Plan::new("a", vec![node]);
        let err = plan.validate().unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
    }

    #[test]
    fn test_plan_validate_rejects_node_without_facilitator() {
        let node =
            PlanNode::new("a", "a", "SHELL").with_adviser(AdviserObtainment::new(AdviserType::OnFail, json!({})));
        let plan = Plan::new("a", vec![node]);
        assert!(plan.validate().is_err());
    }

    #[test]
    fn test_nodes_with_step_type() {
        let mut barrier = valid_node("b1");
        barrier.step_type = "BARRIER".to_string();
        let plan = Plan::new("a", vec![valid_node("a"), barrier]);
        assert_eq!(plan.nodes_with_step_type("BARRIER").len(), 1);
    }
}
