//! Timeout Engine
//!
//! Tracks per-node deadlines across dimensions. Deadlines are checked by a
//! periodic sweep over the live instances rather than one timer per
//! instance, bounding the number of scheduled wakeups. Active-dimension
//! trackers pause and resume with the owning node's status.

use crate::cas::backoff;
use crate::config::EngineConfig;
use crate::driver::NodeDriver;
use crate::registry::Registry;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use ibai_core::{
    Interrupt, InterruptType, NodeExecutionId, PlanExecutionId, Result, Status, TimeoutDimension,
    TimeoutInstance, TimeoutObtainment, TimeoutTrackerState,
};
use ibai_ports::{EngineEvent, EventPublisher, TimeoutInstanceRepository};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Events delivered to live trackers; each tracker decides independently
/// whether the event changes its state.
#[derive(Debug, Clone)]
pub enum TimeoutEvent {
    StatusUpdate {
        node_execution_id: NodeExecutionId,
        status: Status,
    },
}

/// Factory producing fresh tracker state for one dimension; registered in
/// the engine's tracker registry at startup.
pub trait TimeoutTrackerFactory: Send + Sync {
    fn create(&self, duration: ChronoDuration, now: DateTime<Utc>) -> TimeoutTrackerState;
}

pub struct AbsoluteTrackerFactory;

impl TimeoutTrackerFactory for AbsoluteTrackerFactory {
    fn create(&self, duration: ChronoDuration, now: DateTime<Utc>) -> TimeoutTrackerState {
        TimeoutTrackerState::new(TimeoutDimension::Absolute, duration, now)
    }
}

pub struct ActiveTrackerFactory;

impl TimeoutTrackerFactory for ActiveTrackerFactory {
    fn create(&self, duration: ChronoDuration, now: DateTime<Utc>) -> TimeoutTrackerState {
        TimeoutTrackerState::new(TimeoutDimension::Active, duration, now)
    }
}

pub struct TimeoutEngine {
    instances: Arc<dyn TimeoutInstanceRepository>,
    publisher: Arc<dyn EventPublisher>,
    driver: Arc<dyn NodeDriver>,
    factories: Registry<TimeoutDimension, Arc<dyn TimeoutTrackerFactory>>,
    config: EngineConfig,
}

impl TimeoutEngine {
    pub fn new(
        instances: Arc<dyn TimeoutInstanceRepository>,
        publisher: Arc<dyn EventPublisher>,
        driver: Arc<dyn NodeDriver>,
        config: EngineConfig,
    ) -> Result<Self> {
        let factories: Registry<TimeoutDimension, Arc<dyn TimeoutTrackerFactory>> = Registry::new();
        factories.register(TimeoutDimension::Absolute, Arc::new(AbsoluteTrackerFactory))?;
        factories.register(TimeoutDimension::Active, Arc::new(ActiveTrackerFactory))?;
        Ok(Self {
            instances,
            publisher,
            driver,
            factories,
            config,
        })
    }

    /// Register a deadline for a node. The returned instance is already
    /// persisted and will be swept until it fires or the node terminates.
    pub async fn register_timeout(
        &self,
        plan_execution_id: PlanExecutionId,
        node_execution_id: NodeExecutionId,
        obtainment: &TimeoutObtainment,
        expiry_interrupt: InterruptType,
    ) -> Result<TimeoutInstance> {
        let factory = self.factories.obtain(&obtainment.dimension)?;
        let tracker = factory.create(
            ChronoDuration::seconds(obtainment.duration_secs as i64),
            Utc::now(),
        );
        let instance = TimeoutInstance::new(plan_execution_id, node_execution_id, tracker)
            .with_expiry_interrupt(expiry_interrupt);
        self.instances.insert(&instance).await?;
        debug!(
            node_execution_id = %node_execution_id,
            dimension = %obtainment.dimension,
            duration_secs = obtainment.duration_secs,
            "timeout registered"
        );
        Ok(instance)
    }

    /// Deliver an event to every tracker it concerns.
    pub async fn on_event(&self, event: TimeoutEvent) -> Result<()> {
        match event {
            TimeoutEvent::StatusUpdate {
                node_execution_id,
                status,
            } => self.on_node_status(node_execution_id, status).await,
        }
    }

    /// Status change of an owning node: terminal statuses destroy the
    /// node's instances; otherwise Active trackers pause or resume.
    pub async fn on_node_status(
        &self,
        node_execution_id: NodeExecutionId,
        status: Status,
    ) -> Result<()> {
        if status.is_terminal() {
            self.delete_for_node(node_execution_id).await;
            return Ok(());
        }

        let ticking = status.is_timer_ticking();
        let now = Utc::now();
        for instance in self.instances.find_by_node_execution(&node_execution_id).await? {
            if instance.tracker.dimension != TimeoutDimension::Active {
                continue;
            }
            if let Err(err) = self.update_tracker(instance.uuid, ticking, now).await {
                warn!(instance = %instance.uuid, error = %err, "tracker update failed");
            }
        }
        Ok(())
    }

    async fn update_tracker(&self, uuid: uuid::Uuid, ticking: bool, now: DateTime<Utc>) -> Result<()> {
        let mut attempts = 0;
        loop {
            attempts += 1;
            let Some(mut instance) = self.instances.find(&uuid).await? else {
                return Ok(());
            };
            if ticking {
                instance.tracker.resume(now);
            } else {
                instance.tracker.pause(now);
            }
            match self.instances.update(&instance).await {
                Ok(_) => return Ok(()),
                Err(err) if err.is_stale_version() && attempts < self.config.cas.max_attempts => {
                    backoff(&self.config.cas, attempts).await;
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    /// One pass over the live instances; fires expired trackers exactly
    /// once. Returns how many fired.
    pub async fn sweep(&self) -> Result<usize> {
        let now = Utc::now();
        let mut fired = 0;
        for instance in self.instances.find_live().await? {
            if !instance.tracker.expired(now) {
                continue;
            }
            match self.fire(instance, now).await {
                Ok(true) => fired += 1,
                Ok(false) => {}
                Err(err) => warn!(error = %err, "timeout fire failed"),
            }
        }
        Ok(fired)
    }

    /// Win the fire race via CAS, then raise the configured interrupt
    /// against the owning node.
    async fn fire(&self, instance: TimeoutInstance, now: DateTime<Utc>) -> Result<bool> {
        let mut attempts = 0;
        let fired = loop {
            attempts += 1;
            let Some(mut fresh) = self.instances.find(&instance.uuid).await? else {
                return Ok(false);
            };
            if !fresh.tracker.try_fire(now) {
                return Ok(false);
            }
            match self.instances.update(&fresh).await {
                Ok(updated) => break updated,
                Err(err) if err.is_stale_version() && attempts < self.config.cas.max_attempts => {
                    backoff(&self.config.cas, attempts).await;
                }
                Err(err) => return Err(err.into()),
            }
        };

        info!(
            node_execution_id = %fired.node_execution_id,
            dimension = %fired.tracker.dimension,
            "timeout expired"
        );
        if let Err(err) = self
            .publisher
            .publish(EngineEvent::TimeoutFired {
                node_execution_id: fired.node_execution_id,
                dimension: fired.tracker.dimension,
            })
            .await
        {
            warn!(error = %err, "timeout event publish failed");
        }
        self.instances.delete(&fired.uuid).await?;

        let interrupt = Interrupt::new(
            fired.expiry_interrupt,
            fired.plan_execution_id,
            Some(fired.node_execution_id),
            "timeout-engine",
        );
        if let Err(err) = self.driver.register_interrupt(interrupt).await {
            error!(error = %err, "expiry interrupt failed");
        }
        Ok(true)
    }

    /// Destroy every instance owned by a node.
    pub async fn delete_for_node(&self, node_execution_id: NodeExecutionId) {
        match self.instances.find_by_node_execution(&node_execution_id).await {
            Ok(instances) => {
                for instance in instances {
                    if let Err(err) = self.instances.delete(&instance.uuid).await {
                        warn!(instance = %instance.uuid, error = %err, "timeout delete failed");
                    }
                }
            }
            Err(err) => warn!(error = %err, "timeout lookup failed"),
        }
    }

    /// Periodic sweep task; aborted on engine shutdown.
    pub fn spawn_sweeper(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let engine = self.clone();
        let interval = engine.config.timeout_sweep_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                if let Err(err) = engine.sweep().await {
                    warn!(error = %err, "timeout sweep failed");
                }
            }
        })
    }
}
