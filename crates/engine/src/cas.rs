//! Optimistic-concurrency retry support
//!
//! Cross-node coordination is CAS-on-store, never in-process locks; every
//! read-modify-write loop in the engine backs off with jitter between
//! attempts and surfaces `StaleVersionConflict` once the attempt budget is
//! exhausted.

use crate::config::CasConfig;
use rand::Rng;
use std::time::Duration;

/// Sleep before the next CAS attempt: linear backoff plus random jitter so
/// racing engine instances decorrelate.
pub async fn backoff(config: &CasConfig, attempt: u32) {
    let jitter_ms = config.backoff_jitter.as_millis() as u64;
    let jitter = if jitter_ms == 0 {
        0
    } else {
        rand::thread_rng().gen_range(0..=jitter_ms)
    };
    let wait = config.backoff_base.saturating_mul(attempt) + Duration::from_millis(jitter);
    tokio::time::sleep(wait).await;
}
