//! In-memory event bus
//!
//! Broadcast-channel publisher for engine events. Publishing never fails
//! on missing receivers; observers subscribe on demand.

use async_trait::async_trait;
use ibai_ports::{EngineEvent, EventBusError, EventPublisher};
use tokio::sync::broadcast;

pub struct InMemoryBus {
    sender: broadcast::Sender<EngineEvent>,
}

impl InMemoryBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.sender.subscribe()
    }
}

impl Default for InMemoryBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[async_trait]
impl EventPublisher for InMemoryBus {
    async fn publish(&self, event: EngineEvent) -> Result<(), EventBusError> {
        // A send error only means nobody is listening right now.
        let _ = self.sender.send(event);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ibai_core::{PlanExecutionId, Status};

    #[tokio::test]
    async fn test_publish_without_subscribers_is_ok() {
        let bus = InMemoryBus::default();
        bus.publish(EngineEvent::PlanExecutionConcluded {
            plan_execution_id: PlanExecutionId::new(),
            status: Status::Succeeded,
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_subscriber_receives_event() {
        let bus = InMemoryBus::default();
        let mut receiver = bus.subscribe();
        let plan_execution_id = PlanExecutionId::new();
        bus.publish(EngineEvent::PlanExecutionConcluded {
            plan_execution_id,
            status: Status::Succeeded,
        })
        .await
        .unwrap();
        match receiver.recv().await.unwrap() {
            EngineEvent::PlanExecutionConcluded {
                plan_execution_id: got,
                status,
            } => {
                assert_eq!(got, plan_execution_id);
                assert_eq!(status, Status::Succeeded);
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }
}
