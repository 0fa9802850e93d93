//! Engine configuration

use std::time::Duration;

/// Optimistic-concurrency retry settings for read-modify-write loops
/// against the versioned store.
#[derive(Debug, Clone)]
pub struct CasConfig {
    pub max_attempts: u32,
    pub backoff_base: Duration,
    pub backoff_jitter: Duration,
}

impl Default for CasConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            backoff_base: Duration::from_millis(10),
            backoff_jitter: Duration::from_millis(10),
        }
    }
}

/// Configuration for the orchestration engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub cas: CasConfig,
    /// Interval of the timeout sweep; a trade-off between timeout-firing
    /// latency and store load.
    pub timeout_sweep_interval: Duration,
    /// Default intervention window when an adviser parks a node for an
    /// operator decision without configuring one.
    pub default_intervention_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cas: CasConfig::default(),
            timeout_sweep_interval: Duration::from_millis(200),
            default_intervention_timeout: Duration::from_secs(24 * 60 * 60),
        }
    }
}
