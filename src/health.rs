//! Streak-based health classification.
//!
//! # States
//! - UP: candidate eligible for selection
//! - DOWN: candidate excluded
//!
//! # Transitions
//! ```text
//! DOWN -> UP: success_threshold consecutive successes
//! UP -> DOWN: fail_threshold consecutive failures
//! ```
//!
//! Hysteresis prevents flapping: inside the success branch the UP flag is
//! sticky (a single success after a sub-threshold failure run keeps the
//! candidate UP); only the failure branch can clear it, and only at the
//! threshold. The aggregator is a pure fold; the orchestrator owns the
//! persisted map.

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::probe::{ProbeOutcome, ProbeResult};
use crate::store::{HealthMap, HealthRecord};

/// Fold one tick's probe results into the health map.
///
/// Each non-skip result touches its candidate's record exactly once.
/// Results for candidates skipped at call time are ignored.
pub fn apply_results(
    health: &mut HealthMap,
    results: &[ProbeResult],
    now: DateTime<Utc>,
    success_threshold: u32,
    fail_threshold: u32,
) {
    for result in results {
        match &result.outcome {
            ProbeOutcome::Skipped => continue,
            ProbeOutcome::Success { latency_ms } => {
                let record = entry(health, result, now);
                record.label = result.label.clone();
                record.ip = result.ip.clone();
                record.last_latency_ms = Some(*latency_ms);
                record.last_error = None;
                record.last_ok = Some(now);
                record.last_checked = now;
                record.fail_streak = 0;
                record.ok_streak += 1;
                let was_healthy = record.healthy;
                record.healthy = record.healthy || record.ok_streak >= success_threshold;
                if record.healthy && !was_healthy {
                    info!(
                        id = %result.id,
                        ip = %result.ip,
                        ok_streak = record.ok_streak,
                        "candidate is UP"
                    );
                } else {
                    debug!(id = %result.id, latency_ms, "probe ok");
                }
            }
            ProbeOutcome::Failure { error } => {
                let record = entry(health, result, now);
                record.label = result.label.clone();
                record.ip = result.ip.clone();
                record.last_latency_ms = None;
                record.last_error = Some(error.clone());
                record.last_checked = now;
                record.ok_streak = 0;
                record.fail_streak += 1;
                if record.fail_streak >= fail_threshold {
                    if record.healthy {
                        info!(
                            id = %result.id,
                            ip = %result.ip,
                            fail_streak = record.fail_streak,
                            error = %error,
                            "candidate is DOWN"
                        );
                    }
                    record.healthy = false;
                } else {
                    debug!(
                        id = %result.id,
                        fail_streak = record.fail_streak,
                        error = %error,
                        "probe failed"
                    );
                }
            }
        }
    }
}

/// Fetch the record for a result's candidate, creating it DOWN with zeros.
fn entry<'a>(
    health: &'a mut HealthMap,
    result: &ProbeResult,
    now: DateTime<Utc>,
) -> &'a mut HealthRecord {
    health
        .entry(result.id.clone())
        .or_insert_with(|| HealthRecord {
            label: result.label.clone(),
            ip: result.ip.clone(),
            healthy: false,
            last_latency_ms: None,
            last_error: None,
            last_ok: None,
            last_checked: now,
            ok_streak: 0,
            fail_streak: 0,
            extra: serde_json::Map::new(),
        })
}
