//! Selection policies over health snapshots.
//!
//! Both selectors are pure: they read a snapshot and return values the
//! orchestrator commits. The health map iterates sorted by candidate ID,
//! so latency ties in `best` resolve to the smallest ID.

use crate::store::HealthMap;

/// Egress IP of the healthy candidate with the lowest measured latency.
///
/// `None` when no healthy candidate has a latency measurement.
pub fn best(health: &HealthMap) -> Option<String> {
    health
        .values()
        .filter(|r| r.healthy)
        .filter_map(|r| r.last_latency_ms.map(|latency| (latency, &r.ip)))
        .min_by_key(|(latency, _)| *latency)
        .map(|(_, ip)| ip.clone())
}

/// Next healthy egress IP in round-robin order.
///
/// Picks from the sorted-unique healthy IP list at `index % len` and
/// returns the advanced cursor. `None` when the healthy set is empty.
pub fn rotate(health: &HealthMap, index: u64) -> Option<(String, u64)> {
    let mut ips: Vec<&str> = health
        .values()
        .filter(|r| r.healthy)
        .map(|r| r.ip.as_str())
        .collect();
    ips.sort_unstable();
    ips.dedup();

    if ips.is_empty() {
        return None;
    }
    let len = ips.len() as u64;
    let selected = ips[(index % len) as usize].to_string();
    Some((selected, (index + 1) % len))
}
