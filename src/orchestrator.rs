//! Tick entry points and admin operations.
//!
//! The orchestrator is the only component that mutates persistent state.
//! Probing, aggregation, selection, and reconciliation are pure or
//! port-backed; the orchestrator wires them together, guards tick
//! intervals, holds the named locks, and decides which failures alert.

use chrono::Utc;
use std::fmt::Write as _;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::alert::{self, Notifier};
use crate::config::Settings;
use crate::error::SteerError;
use crate::health;
use crate::lock::TickLock;
use crate::metrics;
use crate::probe::{ProbeOutcome, ProbeResult, Prober};
use crate::provider::{self, DnsProvider};
use crate::reconcile;
use crate::select;
use crate::store::{CandidateConfig, DomainEntry, Mode, Store};

/// How a tick invocation ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickReport {
    /// Tick ran to completion.
    Completed,
    /// Within the tick interval; nothing ran.
    SkippedInterval,
    /// Another process holds the tick lock; nothing ran.
    SkippedLocked,
    /// No candidates are registered; nothing to probe or point at.
    NoCandidates,
    /// Tick ran but no healthy endpoint could be selected; alert fired.
    NoSelection,
}

impl TickReport {
    /// Whether the invocation should exit non-zero.
    pub fn is_failure(&self) -> bool {
        matches!(self, TickReport::NoSelection)
    }

    /// Stable label for logs, metrics, and command output.
    pub fn as_str(&self) -> &'static str {
        match self {
            TickReport::Completed => "completed",
            TickReport::SkippedInterval => "skipped_interval",
            TickReport::SkippedLocked => "skipped_locked",
            TickReport::NoCandidates => "no_candidates",
            TickReport::NoSelection => "no_selection",
        }
    }
}

/// Owner of all state mutations; every command goes through here.
pub struct Orchestrator {
    settings: Settings,
    store: Store,
    prober: Arc<dyn Prober>,
    notifier: Arc<dyn Notifier>,
    provider: Option<Arc<dyn DnsProvider>>,
}

impl Orchestrator {
    /// Wire an orchestrator from its ports.
    ///
    /// `provider` is optional so commands that never touch DNS work
    /// without the API token; DNS-touching commands fail with a
    /// configuration error instead.
    pub fn new(
        settings: Settings,
        store: Store,
        prober: Arc<dyn Prober>,
        notifier: Arc<dyn Notifier>,
        provider: Option<Arc<dyn DnsProvider>>,
    ) -> Self {
        Self {
            settings,
            store,
            prober,
            notifier,
            provider,
        }
    }

    fn provider(&self) -> Result<&Arc<dyn DnsProvider>, SteerError> {
        self.provider
            .as_ref()
            .ok_or_else(|| SteerError::Config("HETZNER_DNS_API_TOKEN is not set".to_string()))
    }

    // --- ticks ---

    /// Probe all enabled candidates, fold health, and (in `best` mode)
    /// repoint every managed domain.
    pub async fn monitor_once(&self) -> Result<TickReport, SteerError> {
        let timer = metrics::Timer::start();
        let now = Utc::now();
        let now_epoch = now.timestamp();

        let last = self.store.read_last_monitor()?;
        if now_epoch - last < self.settings.monitor_interval as i64 {
            info!(last, "monitor tick within interval, skipping");
            metrics::record_tick("monitor", "skipped_interval");
            return Ok(TickReport::SkippedInterval);
        }

        let Some(_lock) = TickLock::try_acquire(&self.store.paths().state_dir(), "monitor")?
        else {
            metrics::record_tick("monitor", "skipped_locked");
            return Ok(TickReport::SkippedLocked);
        };

        let candidates = self.store.list_candidates()?;
        if candidates.is_empty() {
            info!("no configs");
            metrics::record_tick("monitor", "no_candidates");
            return Ok(TickReport::NoCandidates);
        }

        let results = self.probe_all(&candidates).await;
        for result in &results {
            match &result.outcome {
                ProbeOutcome::Success { latency_ms } => {
                    metrics::record_probe(true, Some(*latency_ms))
                }
                ProbeOutcome::Failure { .. } => metrics::record_probe(false, None),
                ProbeOutcome::Skipped => {}
            }
        }

        let mut health = self.store.read_health()?;
        health::apply_results(
            &mut health,
            &results,
            now,
            self.settings.success_threshold,
            self.settings.fail_threshold,
        );
        self.store.write_health(&health)?;
        metrics::record_health_counts(
            health.values().filter(|r| r.healthy).count(),
            health.len(),
        );

        let report = if self.store.read_mode()? != Mode::Best {
            TickReport::Completed
        } else {
            match select::best(&health) {
                None => {
                    let fired = alert::fire(
                        &self.store,
                        self.notifier.as_ref(),
                        self.settings.alert_cooldown,
                        "best-IP unavailable: no healthy candidate with a latency measurement",
                        now_epoch,
                    )
                    .await?;
                    metrics::record_alert(fired);
                    TickReport::NoSelection
                }
                Some(ip) => {
                    self.reconcile_domains(&ip, now).await?;
                    TickReport::Completed
                }
            }
        };

        self.store.write_last_monitor(now_epoch)?;
        metrics::record_tick("monitor", report.as_str());
        metrics::record_tick_duration("monitor", timer.elapsed());
        Ok(report)
    }

    /// Point every managed domain at the next healthy IP in round-robin
    /// order and advance the cursor.
    pub async fn rotate_once(&self) -> Result<TickReport, SteerError> {
        let timer = metrics::Timer::start();
        let now = Utc::now();
        let now_epoch = now.timestamp();

        let last = self.store.read_last_rotate()?;
        if now_epoch - last < self.settings.lb_interval as i64 {
            info!(last, "rotate tick within interval, skipping");
            metrics::record_tick("rotate", "skipped_interval");
            return Ok(TickReport::SkippedInterval);
        }

        let Some(_lock) = TickLock::try_acquire(&self.store.paths().state_dir(), "rotate")?
        else {
            metrics::record_tick("rotate", "skipped_locked");
            return Ok(TickReport::SkippedLocked);
        };

        let health = self.store.read_health()?;
        let index = self.store.read_rr_index()?;

        let report = match select::rotate(&health, index) {
            None => {
                let fired = alert::fire(
                    &self.store,
                    self.notifier.as_ref(),
                    self.settings.alert_cooldown,
                    "no healthy IPs: rotation has nothing to point at",
                    now_epoch,
                )
                .await?;
                metrics::record_alert(fired);
                TickReport::NoSelection
            }
            Some((ip, next_index)) => {
                self.store.write_rr_index(next_index)?;
                self.reconcile_domains(&ip, now).await?;
                TickReport::Completed
            }
        };

        self.store.write_last_rotate(now_epoch)?;
        metrics::record_tick("rotate", report.as_str());
        metrics::record_tick_duration("rotate", timer.elapsed());
        Ok(report)
    }

    /// One probe task per enabled candidate; disabled candidates yield
    /// synthetic skip records. Completion order is unobserved.
    async fn probe_all(&self, candidates: &[CandidateConfig]) -> Vec<ProbeResult> {
        let mut results = Vec::with_capacity(candidates.len());
        let mut tasks = Vec::new();

        for candidate in candidates {
            if !candidate.enabled {
                results.push(ProbeResult::skipped(candidate));
                continue;
            }
            let prober = Arc::clone(&self.prober);
            let candidate = candidate.clone();
            tasks.push(tokio::spawn(
                async move { prober.probe(&candidate).await },
            ));
        }

        for joined in futures::future::join_all(tasks).await {
            match joined {
                Ok(result) => results.push(result),
                Err(e) => error!("probe task panicked: {e}"),
            }
        }
        results
    }

    /// Reconcile every managed domain towards `ip`, continuing past
    /// per-domain provider failures.
    async fn reconcile_domains(
        &self,
        ip: &str,
        now: chrono::DateTime<Utc>,
    ) -> Result<(), SteerError> {
        let mut domains = self.store.read_domains()?;
        if domains.is_empty() {
            return Ok(());
        }
        let dns = self.provider()?;

        let mut dirty = false;
        for (domain, entry) in domains.iter_mut() {
            match reconcile::update_record(
                dns.as_ref(),
                entry,
                domain,
                ip,
                self.settings.default_ttl,
                self.settings.dns_min_update_interval,
                now,
            )
            .await
            {
                Ok(outcome) => {
                    metrics::record_reconcile(outcome);
                    if outcome == reconcile::ReconcileOutcome::Updated {
                        self.store.write_current_ip(ip)?;
                        dirty = true;
                    }
                }
                Err(e) => {
                    metrics::record_reconcile_error();
                    warn!(%domain, ip, "DNS update failed: {e}");
                }
            }
        }

        if dirty {
            self.store.write_domains(&domains)?;
        }
        Ok(())
    }

    // --- admin operations ---

    /// Register a candidate. The outbound descriptor must be valid JSON;
    /// it is stored verbatim and substituted into the probe template.
    pub fn add_config(
        &self,
        label: &str,
        ip: &str,
        outbound_json: &str,
    ) -> Result<CandidateConfig, SteerError> {
        let config_json: serde_json::Value = serde_json::from_str(outbound_json)
            .map_err(|e| SteerError::Config(format!("outbound descriptor is not JSON: {e}")))?;

        let candidate = CandidateConfig {
            id: Uuid::new_v4().to_string(),
            label: label.to_string(),
            ip: ip.to_string(),
            enabled: true,
            config_json,
            extra: serde_json::Map::new(),
        };
        self.store.write_candidate(&candidate)?;
        info!(id = %candidate.id, label, ip, "candidate added");
        Ok(candidate)
    }

    /// Delete a candidate and its health record.
    pub fn remove_config(&self, id: &str) -> Result<(), SteerError> {
        if !self.store.remove_candidate(id)? {
            return Err(SteerError::UnknownCandidate(id.to_string()));
        }
        let mut health = self.store.read_health()?;
        if health.remove(id).is_some() {
            self.store.write_health(&health)?;
        }
        info!(id, "candidate removed");
        Ok(())
    }

    /// Toggle a candidate's enabled flag.
    pub fn set_enabled(&self, id: &str, enabled: bool) -> Result<(), SteerError> {
        let mut candidate = self
            .store
            .read_candidate(id)?
            .ok_or_else(|| SteerError::UnknownCandidate(id.to_string()))?;
        candidate.enabled = enabled;
        self.store.write_candidate(&candidate)?;
        info!(id, enabled, "candidate toggled");
        Ok(())
    }

    /// Persist the selection policy.
    pub fn set_mode(&self, mode: Mode) -> Result<(), SteerError> {
        self.store.write_mode(mode)?;
        info!(%mode, "mode set");
        Ok(())
    }

    /// Register a managed domain: resolve its zone, ensure the A-record
    /// exists, and cache the provider IDs. Idempotent; re-running
    /// refreshes the cached IDs and keeps the update history.
    pub async fn set_domain(&self, domain: &str) -> Result<DomainEntry, SteerError> {
        let dns = self.provider()?.as_ref();
        let zone = provider::find_zone(dns, domain).await?;
        let name = provider::record_name(domain, &zone.name);
        let record_id =
            provider::ensure_record(dns, &zone, &name, self.settings.default_ttl).await?;

        let mut domains = self.store.read_domains()?;
        let previous = domains.remove(domain);
        let entry = DomainEntry {
            zone_id: zone.id,
            record_id,
            record_name: name,
            last_ip: previous.as_ref().and_then(|p| p.last_ip.clone()),
            last_update: previous.as_ref().and_then(|p| p.last_update),
            extra: previous.map(|p| p.extra).unwrap_or_default(),
        };
        domains.insert(domain.to_string(), entry.clone());
        self.store.write_domains(&domains)?;
        info!(domain, zone_id = %entry.zone_id, record_id = %entry.record_id, "domain registered");
        Ok(entry)
    }

    /// Human-readable candidate table with health snippets.
    pub fn list(&self) -> Result<String, SteerError> {
        let candidates = self.store.list_candidates()?;
        if candidates.is_empty() {
            return Ok("no configs\n".to_string());
        }
        let health = self.store.read_health()?;

        let mut out = String::new();
        for candidate in candidates {
            let snippet = match health.get(&candidate.id) {
                None => "never probed".to_string(),
                Some(record) if record.healthy => format!(
                    "UP latency={}ms ok_streak={}",
                    record
                        .last_latency_ms
                        .map_or_else(|| "?".to_string(), |v| v.to_string()),
                    record.ok_streak
                ),
                Some(record) => format!(
                    "DOWN fail_streak={} last_error={}",
                    record.fail_streak,
                    record.last_error.as_deref().unwrap_or("-")
                ),
            };
            let _ = writeln!(
                out,
                "{}  {}  {}  enabled={}  {}",
                candidate.id, candidate.label, candidate.ip, candidate.enabled, snippet
            );
        }
        Ok(out)
    }

    /// Mode, current-IP cache, managed domains, and the candidate table.
    pub fn status(&self) -> Result<String, SteerError> {
        let mut out = String::new();
        let _ = writeln!(out, "mode: {}", self.store.read_mode()?);
        let _ = writeln!(
            out,
            "current_ip: {}",
            self.store.read_current_ip()?.as_deref().unwrap_or("-")
        );

        let domains = self.store.read_domains()?;
        if domains.is_empty() {
            let _ = writeln!(out, "domains: none");
        } else {
            for (domain, entry) in &domains {
                let _ = writeln!(
                    out,
                    "domain {}  last_ip={}  last_update={}",
                    domain,
                    entry.last_ip.as_deref().unwrap_or("-"),
                    entry
                        .last_update
                        .map_or_else(|| "-".to_string(), |t| t.to_rfc3339()),
                );
            }
        }

        out.push_str(&self.list()?);
        Ok(out)
    }

    /// Verify the external pieces a tick depends on.
    ///
    /// Returns the report and whether every required piece is present.
    pub fn self_check(&self) -> Result<(String, bool), SteerError> {
        let mut out = String::new();
        let mut ok = true;

        let bin_ok = crate::probe::binary_available(&self.settings.xray_bin);
        ok &= bin_ok;
        let _ = writeln!(
            out,
            "probe binary {}: {}",
            self.settings.xray_bin,
            if bin_ok { "ok" } else { "MISSING" }
        );

        let template_path = self.store.paths().socks_template();
        let template_ok = match std::fs::read_to_string(&template_path) {
            Ok(template) => template.contains("{{PORT}}") && template.contains("{{OUTBOUND}}"),
            Err(_) => false,
        };
        ok &= template_ok;
        let _ = writeln!(
            out,
            "socks template {}: {}",
            template_path.display(),
            if template_ok { "ok" } else { "MISSING or lacks tokens" }
        );

        let token_ok = self.settings.hetzner_dns_api_token.is_some();
        ok &= token_ok;
        let _ = writeln!(
            out,
            "HETZNER_DNS_API_TOKEN: {}",
            if token_ok { "set" } else { "MISSING" }
        );

        let telegram_ok = self.settings.telegram_bot_token.is_some()
            && self.settings.telegram_allowed_user_id.is_some();
        let _ = writeln!(
            out,
            "telegram notifications: {}",
            if telegram_ok { "configured" } else { "not configured (alerts logged only)" }
        );

        Ok((out, ok))
    }
}
