//! Metrics instrumentation for steer-dns.
//!
//! All metrics are prefixed with `steer_dns.`

use metrics::{counter, gauge, histogram};
use std::time::Instant;

use crate::reconcile::ReconcileOutcome;

/// Record one candidate probe.
pub fn record_probe(success: bool, latency_ms: Option<u64>) {
    let result = if success { "success" } else { "failure" };
    counter!("steer_dns.probe.count", "result" => result).increment(1);
    if let Some(latency_ms) = latency_ms {
        histogram!("steer_dns.probe.latency.ms").record(latency_ms as f64);
    }
}

/// Record the candidate set after aggregation.
pub fn record_health_counts(healthy: usize, total: usize) {
    gauge!("steer_dns.health.healthy").set(healthy as f64);
    gauge!("steer_dns.health.total").set(total as f64);
}

/// Record one reconcile pass for a managed domain.
pub fn record_reconcile(outcome: ReconcileOutcome) {
    counter!("steer_dns.dns.reconcile.count", "outcome" => outcome.as_str()).increment(1);
}

/// Record a failed provider call during reconciliation.
pub fn record_reconcile_error() {
    counter!("steer_dns.dns.reconcile.count", "outcome" => "error").increment(1);
}

/// Record an operator alert (fired or suppressed by cooldown).
pub fn record_alert(fired: bool) {
    let outcome = if fired { "fired" } else { "suppressed" };
    counter!("steer_dns.alert.count", "outcome" => outcome).increment(1);
}

/// Record a tick invocation.
pub fn record_tick(kind: &'static str, outcome: &'static str) {
    counter!("steer_dns.tick.count", "kind" => kind, "outcome" => outcome).increment(1);
}

/// Record a whole-tick duration.
pub fn record_tick_duration(kind: &'static str, duration: std::time::Duration) {
    histogram!("steer_dns.tick.duration.seconds", "kind" => kind).record(duration.as_secs_f64());
}

/// Helper for timing operations.
pub struct Timer {
    start: Instant,
}

impl Timer {
    /// Start a new timer.
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Get elapsed duration since timer start.
    pub fn elapsed(&self) -> std::time::Duration {
        self.start.elapsed()
    }
}
