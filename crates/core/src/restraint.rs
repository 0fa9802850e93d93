//! Resource restraint records
//!
//! A resource restraint is a capacity-bounded admission gate on a named
//! resource. Consumers queue instances in strict FIFO order; the admission
//! scan activates them while their permits fit under the capacity.

use crate::node_execution::NodeExecutionId;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Restraint definition: the constraint itself, carrying capacity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceRestraint {
    pub uuid: Uuid,
    pub name: String,
    pub capacity: u32,
}

impl ResourceRestraint {
    pub fn new(name: impl Into<String>, capacity: u32) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            name: name.into(),
            capacity,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RestraintState {
    Blocked,
    Active,
    Finished,
}

/// One queued or admitted consumer of a restrained resource.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceRestraintInstance {
    pub uuid: Uuid,
    /// Identifier of the concrete limited resource (e.g. an environment).
    pub resource_unit: String,
    pub resource_restraint_id: Uuid,
    pub permits: u32,
    /// Monotonic FIFO key assigned at acquisition time.
    pub order: u64,
    pub state: RestraintState,
    /// Entity whose completion releases the permit; a logical key shared by
    /// the acquiring and releasing sides.
    pub release_entity_id: String,
    /// Node execution parked behind this instance, resumed on activation.
    pub holder_node_execution_id: Option<NodeExecutionId>,
    pub version: u64,
}

impl ResourceRestraintInstance {
    pub fn new(
        resource_unit: impl Into<String>,
        resource_restraint_id: Uuid,
        permits: u32,
        order: u64,
        release_entity_id: impl Into<String>,
    ) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            resource_unit: resource_unit.into(),
            resource_restraint_id,
            permits,
            order,
            state: RestraintState::Blocked,
            release_entity_id: release_entity_id.into(),
            holder_node_execution_id: None,
            version: 0,
        }
    }

    pub fn with_holder(mut self, node_execution_id: NodeExecutionId) -> Self {
        self.holder_node_execution_id = Some(node_execution_id);
        self
    }

    pub fn is_blocked(&self) -> bool {
        self.state == RestraintState::Blocked
    }

    pub fn is_active(&self) -> bool {
        self.state == RestraintState::Active
    }
}
