//! Timeout tracking records
//!
//! A timeout instance tracks one deadline dimension for a node execution.
//! The tracker state is pure data: all clock arithmetic takes `now` as a
//! parameter so the engine (and tests) control time explicitly.

use crate::interrupt::InterruptType;
use crate::node_execution::NodeExecutionId;
use crate::plan_execution::PlanExecutionId;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Deadline dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TimeoutDimension {
    /// Wall-clock deadline from registration; never pauses.
    Absolute,
    /// Elapses only while the owning node is actively running; paused
    /// intervals do not count against the deadline.
    Active,
}

impl TimeoutDimension {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Absolute => "ABSOLUTE",
            Self::Active => "ACTIVE",
        }
    }
}

impl std::fmt::Display for TimeoutDimension {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Serializable tracker state: deadline, accumulated paused duration and the
/// running/paused flag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeoutTrackerState {
    pub dimension: TimeoutDimension,
    pub duration_ms: i64,
    pub started_at: DateTime<Utc>,
    pub paused_total_ms: i64,
    pub paused_since: Option<DateTime<Utc>>,
    pub fired: bool,
}

impl TimeoutTrackerState {
    pub fn new(dimension: TimeoutDimension, duration: Duration, now: DateTime<Utc>) -> Self {
        Self {
            dimension,
            duration_ms: duration.num_milliseconds(),
            started_at: now,
            paused_total_ms: 0,
            paused_since: None,
            fired: false,
        }
    }

    /// Stop the clock. Idempotent: pausing an already-paused tracker does
    /// not stack; an absolute tracker never pauses.
    pub fn pause(&mut self, now: DateTime<Utc>) {
        if self.dimension == TimeoutDimension::Absolute {
            return;
        }
        if self.paused_since.is_none() {
            self.paused_since = Some(now);
        }
    }

    /// Restart the clock, folding the pause interval into the accumulated
    /// paused duration. Idempotent on a running tracker.
    pub fn resume(&mut self, now: DateTime<Utc>) {
        if let Some(paused_at) = self.paused_since.take() {
            self.paused_total_ms += (now - paused_at).num_milliseconds().max(0);
        }
    }

    pub fn is_paused(&self) -> bool {
        self.paused_since.is_some()
    }

    /// Milliseconds of running time consumed so far.
    pub fn elapsed_running_ms(&self, now: DateTime<Utc>) -> i64 {
        let mut paused = self.paused_total_ms;
        if let Some(paused_at) = self.paused_since {
            paused += (now - paused_at).num_milliseconds().max(0);
        }
        ((now - self.started_at).num_milliseconds() - paused).max(0)
    }

    pub fn remaining(&self, now: DateTime<Utc>) -> Duration {
        Duration::milliseconds((self.duration_ms - self.elapsed_running_ms(now)).max(0))
    }

    /// Whether the deadline has elapsed. A paused tracker cannot expire and
    /// a fired tracker never expires again.
    pub fn expired(&self, now: DateTime<Utc>) -> bool {
        if self.fired || self.is_paused() {
            return false;
        }
        self.elapsed_running_ms(now) >= self.duration_ms
    }

    /// Transition to fired exactly once; returns whether this call won.
    pub fn try_fire(&mut self, now: DateTime<Utc>) -> bool {
        if self.expired(now) {
            self.fired = true;
            true
        } else {
            false
        }
    }
}

/// Persistent record of one registered timeout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutInstance {
    pub uuid: Uuid,
    pub plan_execution_id: PlanExecutionId,
    pub node_execution_id: NodeExecutionId,
    pub tracker: TimeoutTrackerState,
    /// Interrupt raised against the owning node when the tracker fires.
    pub expiry_interrupt: InterruptType,
    pub version: u64,
}

impl TimeoutInstance {
    pub fn new(
        plan_execution_id: PlanExecutionId,
        node_execution_id: NodeExecutionId,
        tracker: TimeoutTrackerState,
    ) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            plan_execution_id,
            node_execution_id,
            tracker,
            expiry_interrupt: InterruptType::MarkExpired,
            version: 0,
        }
    }

    pub fn with_expiry_interrupt(mut self, interrupt_type: InterruptType) -> Self {
        self.expiry_interrupt = interrupt_type;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn test_absolute_tracker_never_pauses() {
        let mut tracker =
            TimeoutTrackerState::new(TimeoutDimension::Absolute, Duration::seconds(10), at(0));
        tracker.pause(at(2));
        assert!(!tracker.is_paused());
        assert!(tracker.expired(at(10)));
    }

    #[test]
    fn test_active_tracker_pauses_and_resumes() {
        let mut tracker =
            TimeoutTrackerState::new(TimeoutDimension::Active, Duration::seconds(10), at(0));
        tracker.pause(at(5));
        // Paused time does not count; tracker cannot expire while paused.
        assert!(!tracker.expired(at(60)));
        tracker.resume(at(65));
        assert_eq!(tracker.paused_total_ms, 60_000);
        // 5s consumed before the pause; 5s of running time remain.
        assert_eq!(tracker.remaining(at(65)), Duration::seconds(5));
        assert!(!tracker.expired(at(69)));
        assert!(tracker.expired(at(70)));
    }

    #[test]
    fn test_duplicate_pause_accumulates_once() {
        let mut tracker =
            TimeoutTrackerState::new(TimeoutDimension::Active, Duration::seconds(10), at(0));
        tracker.pause(at(2));
        tracker.pause(at(4));
        tracker.resume(at(7));
        // Pause interval is [2, 7]; the second pause event must not restart it.
        assert_eq!(tracker.paused_total_ms, 5_000);
        tracker.resume(at(8));
        assert_eq!(tracker.paused_total_ms, 5_000);
    }

    #[test]
    fn test_remaining_after_pause_cycles() {
        let mut tracker =
            TimeoutTrackerState::new(TimeoutDimension::Active, Duration::seconds(30), at(0));
        // Running intervals: [0,3], [10,15], [20,22] = 10s consumed.
        tracker.pause(at(3));
        tracker.resume(at(10));
        tracker.pause(at(15));
        tracker.resume(at(20));
        tracker.pause(at(22));
        tracker.resume(at(22));
        assert_eq!(tracker.remaining(at(22)), Duration::seconds(20));
    }

    #[test]
    fn test_try_fire_is_exactly_once() {
        let mut tracker =
            TimeoutTrackerState::new(TimeoutDimension::Absolute, Duration::seconds(1), at(0));
        assert!(!tracker.try_fire(at(0)));
        assert!(tracker.try_fire(at(2)));
        assert!(!tracker.try_fire(at(3)));
        assert!(!tracker.expired(at(4)));
    }
}
