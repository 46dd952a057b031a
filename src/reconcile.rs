//! Throttled reconciliation of managed A-records.
//!
//! Reconciling compares the desired IP to the domain's recorded `last_ip`
//! and issues a provider write iff the value changed and the record's
//! throttle window has passed. The entry is mutated in place on success;
//! the orchestrator commits the domains document and current-IP cache.

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info};

use crate::error::SteerError;
use crate::provider::{DnsProvider, RecordSpec};
use crate::store::DomainEntry;

/// What a reconcile pass did for one domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Provider write issued and recorded.
    Updated,
    /// Desired IP equals `last_ip`; no call made.
    Unchanged,
    /// Inside the min-update window; no call made.
    Throttled,
}

impl ReconcileOutcome {
    /// Stable label for logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            ReconcileOutcome::Updated => "updated",
            ReconcileOutcome::Unchanged => "unchanged",
            ReconcileOutcome::Throttled => "throttled",
        }
    }
}

/// Point `domain` at `ip`, unless suppressed or throttled.
///
/// Change suppression is checked before the throttle window: an unchanged
/// IP inside the window still reports `Unchanged`.
pub async fn update_record(
    provider: &dyn DnsProvider,
    entry: &mut DomainEntry,
    domain: &str,
    ip: &str,
    ttl: u32,
    min_update_interval_secs: u64,
    now: DateTime<Utc>,
) -> Result<ReconcileOutcome, SteerError> {
    if entry.last_ip.as_deref() == Some(ip) {
        debug!(domain, ip, "record already points at target");
        return Ok(ReconcileOutcome::Unchanged);
    }

    if let Some(last_update) = entry.last_update {
        if now - last_update < Duration::seconds(min_update_interval_secs as i64) {
            debug!(domain, ip, %last_update, "update throttled");
            return Ok(ReconcileOutcome::Throttled);
        }
    }

    provider
        .update_record(
            &entry.record_id,
            &RecordSpec {
                zone_id: entry.zone_id.clone(),
                record_type: "A".to_string(),
                name: entry.record_name.clone(),
                value: ip.to_string(),
                ttl,
            },
        )
        .await?;

    info!(domain, ip, previous = ?entry.last_ip, "A-record updated");
    entry.last_ip = Some(ip.to_string());
    entry.last_update = Some(now);
    Ok(ReconcileOutcome::Updated)
}
