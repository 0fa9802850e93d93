//! Barrier execution records
//!
//! A barrier is a rendezvous point across parallel branches: one instance
//! per (identifier, plan execution), holding the participating node
//! positions. The instance stands until every participant arrives, goes
//! DOWN exactly once, and never stands back up.

use crate::node_execution::NodeExecutionId;
use crate::plan::NodeId;
use crate::plan_execution::PlanExecutionId;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BarrierState {
    Standing,
    Down,
}

/// One participating branch of a barrier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BarrierPosition {
    pub node_id: NodeId,
    pub node_execution_id: Option<NodeExecutionId>,
    pub arrived: bool,
}

impl BarrierPosition {
    pub fn new(node_id: NodeId) -> Self {
        Self {
            node_id,
            node_execution_id: None,
            arrived: false,
        }
    }
}

/// Runtime barrier instance, created lazily on first reference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BarrierExecutionInstance {
    pub uuid: Uuid,
    pub identifier: String,
    pub plan_execution_id: PlanExecutionId,
    pub state: BarrierState,
    pub positions: Vec<BarrierPosition>,
    pub version: u64,
}

impl BarrierExecutionInstance {
    pub fn new(
        identifier: impl Into<String>,
        plan_execution_id: PlanExecutionId,
        positions: Vec<BarrierPosition>,
    ) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            identifier: identifier.into(),
            plan_execution_id,
            state: BarrierState::Standing,
            positions,
            version: 0,
        }
    }

    pub fn arrivals(&self) -> usize {
        self.positions.iter().filter(|p| p.arrived).count()
    }

    pub fn expected_participants(&self) -> usize {
        self.positions.len()
    }

    pub fn all_arrived(&self) -> bool {
        self.positions.iter().all(|p| p.arrived)
    }

    pub fn position_mut(&mut self, node_id: &NodeId) -> Option<&mut BarrierPosition> {
        self.positions.iter_mut().find(|p| &p.node_id == node_id)
    }

    /// Node executions parked on this barrier other than the given arriver.
    pub fn waiting_executions(&self, arriver: NodeExecutionId) -> Vec<NodeExecutionId> {
        self.positions
            .iter()
            .filter_map(|p| p.node_execution_id)
            .filter(|id| *id != arriver)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_barrier_starts_standing() {
        let instance = BarrierExecutionInstance::new(
            "gate1",
            PlanExecutionId::new(),
            vec![
                BarrierPosition::new(NodeId::from("a")),
                BarrierPosition::new(NodeId::from("b")),
            ],
        );
        assert_eq!(instance.state, BarrierState::Standing);
        assert_eq!(instance.arrivals(), 0);
        assert_eq!(instance.expected_participants(), 2);
        assert!(!instance.all_arrived());
    }

    #[test]
    fn test_arrival_counting() {
        let mut instance = BarrierExecutionInstance::new(
            "gate1",
            PlanExecutionId::new(),
            vec![
                BarrierPosition::new(NodeId::from("a")),
                BarrierPosition::new(NodeId::from("b")),
            ],
        );
        let position = instance.position_mut(&NodeId::from("a")).unwrap();
        position.arrived = true;
        position.node_execution_id = Some(NodeExecutionId::new());
        assert_eq!(instance.arrivals(), 1);
        assert!(!instance.all_arrived());
    }
}
