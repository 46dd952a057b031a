//! Shared test infrastructure for tick integration tests.
//!
//! Ticks run against a real store in a temp base directory; the probe,
//! DNS provider, and notification ports are replaced with scripted
//! in-memory fakes so no subprocess or network is involved.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use tempfile::TempDir;

use steer_dns::alert::Notifier;
use steer_dns::config::{Paths, Settings};
use steer_dns::error::SteerError;
use steer_dns::probe::{ProbeOutcome, ProbeResult, Prober};
use steer_dns::provider::{DnsProvider, ProviderRecord, RecordSpec, Zone};
use steer_dns::store::{CandidateConfig, DomainEntry, HealthRecord, Store};
use steer_dns::Orchestrator;

// --- FakeProber ---

/// Returns scripted outcomes per candidate ID and counts probe calls.
#[derive(Default)]
pub struct FakeProber {
    outcomes: Mutex<HashMap<String, ProbeOutcome>>,
    pub calls: Mutex<Vec<String>>,
}

impl FakeProber {
    /// Script the outcome of every probe of `id`.
    pub fn set(&self, id: &str, outcome: ProbeOutcome) {
        self.outcomes.lock().unwrap().insert(id.to_string(), outcome);
    }

    /// Script a success with the given latency.
    pub fn succeed(&self, id: &str, latency_ms: u64) {
        self.set(id, ProbeOutcome::Success { latency_ms });
    }

    /// Script a failure with the given error.
    pub fn fail(&self, id: &str, error: &str) {
        self.set(
            id,
            ProbeOutcome::Failure {
                error: error.to_string(),
            },
        );
    }

    /// Total probe calls across all ticks.
    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl Prober for FakeProber {
    async fn probe(&self, candidate: &CandidateConfig) -> ProbeResult {
        self.calls.lock().unwrap().push(candidate.id.clone());
        let outcome = self
            .outcomes
            .lock()
            .unwrap()
            .get(&candidate.id)
            .cloned()
            .unwrap_or(ProbeOutcome::Failure {
                error: "unscripted candidate".to_string(),
            });
        ProbeResult {
            id: candidate.id.clone(),
            label: candidate.label.clone(),
            ip: candidate.ip.clone(),
            outcome,
        }
    }
}

// --- MemoryProvider ---

/// In-memory DNS provider recording every write.
pub struct MemoryProvider {
    zones: Vec<Zone>,
    records: Mutex<Vec<(String, ProviderRecord)>>,
    /// Every `update_record` call as (record_id, spec).
    pub puts: Mutex<Vec<(String, RecordSpec)>>,
    next_id: AtomicU32,
}

impl MemoryProvider {
    /// Provider with a single zone `example.com` (ID `zone1`).
    pub fn new() -> Self {
        Self {
            zones: vec![Zone {
                id: "zone1".to_string(),
                name: "example.com".to_string(),
            }],
            records: Mutex::new(Vec::new()),
            puts: Mutex::new(Vec::new()),
            next_id: AtomicU32::new(1),
        }
    }

    /// Values written by successive updates, in order.
    pub fn put_values(&self) -> Vec<String> {
        self.puts
            .lock()
            .unwrap()
            .iter()
            .map(|(_, spec)| spec.value.clone())
            .collect()
    }
}

#[async_trait]
impl DnsProvider for MemoryProvider {
    async fn list_zones(&self) -> Result<Vec<Zone>, SteerError> {
        Ok(self.zones.clone())
    }

    async fn list_records(&self, zone_id: &str) -> Result<Vec<ProviderRecord>, SteerError> {
        Ok(self
            .records
            .lock()
            .unwrap()
            .iter()
            .filter(|(z, _)| z == zone_id)
            .map(|(_, r)| r.clone())
            .collect())
    }

    async fn create_record(&self, spec: &RecordSpec) -> Result<ProviderRecord, SteerError> {
        let record = ProviderRecord {
            id: format!("rec{}", self.next_id.fetch_add(1, Ordering::SeqCst)),
            record_type: spec.record_type.clone(),
            name: spec.name.clone(),
            value: spec.value.clone(),
        };
        self.records
            .lock()
            .unwrap()
            .push((spec.zone_id.clone(), record.clone()));
        Ok(record)
    }

    async fn update_record(&self, record_id: &str, spec: &RecordSpec) -> Result<(), SteerError> {
        self.puts
            .lock()
            .unwrap()
            .push((record_id.to_string(), spec.clone()));
        let mut records = self.records.lock().unwrap();
        if let Some((_, record)) = records.iter_mut().find(|(_, r)| r.id == record_id) {
            record.value = spec.value.clone();
        }
        Ok(())
    }
}

// --- RecordingNotifier ---

/// Captures delivered alert messages.
#[derive(Default)]
pub struct RecordingNotifier {
    pub sent: Mutex<Vec<String>>,
}

impl RecordingNotifier {
    /// Delivered messages so far.
    pub fn messages(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, message: &str) -> Result<(), SteerError> {
        self.sent.lock().unwrap().push(message.to_string());
        Ok(())
    }
}

// --- TestEnv ---

/// A complete environment: temp base directory, store, scripted ports.
pub struct TestEnv {
    #[allow(dead_code)]
    dir: TempDir,
    pub store: Store,
    pub settings: Settings,
    pub prober: Arc<FakeProber>,
    pub provider: Arc<MemoryProvider>,
    pub notifier: Arc<RecordingNotifier>,
}

impl TestEnv {
    /// Environment with interval guards and throttling disabled, so
    /// back-to-back ticks in one test all run.
    pub fn new() -> Self {
        let settings = Settings {
            monitor_interval: 0,
            lb_interval: 0,
            dns_min_update_interval: 0,
            success_threshold: 2,
            fail_threshold: 3,
            ..Settings::default()
        };
        Self::with_settings(settings)
    }

    /// Environment with explicit settings.
    pub fn with_settings(settings: Settings) -> Self {
        let dir = TempDir::new().unwrap();
        let store = Store::new(Paths::new(dir.path()));
        store.ensure_layout().unwrap();
        Self {
            dir,
            store,
            settings,
            prober: Arc::new(FakeProber::default()),
            provider: Arc::new(MemoryProvider::new()),
            notifier: Arc::new(RecordingNotifier::default()),
        }
    }

    /// Orchestrator wired to this environment's fakes.
    pub fn orchestrator(&self) -> Orchestrator {
        Orchestrator::new(
            self.settings.clone(),
            self.store.clone(),
            self.prober.clone(),
            self.notifier.clone(),
            Some(self.provider.clone() as Arc<dyn DnsProvider>),
        )
    }

    /// Register a candidate with a stable ID.
    pub fn add_candidate(&self, id: &str, ip: &str, enabled: bool) {
        self.store
            .write_candidate(&CandidateConfig {
                id: id.to_string(),
                label: format!("label-{id}"),
                ip: ip.to_string(),
                enabled,
                config_json: serde_json::json!({"protocol": "vless"}),
                extra: serde_json::Map::new(),
            })
            .unwrap();
    }

    /// Register a managed domain under the provider's `example.com` zone.
    pub fn add_domain(&self, fqdn: &str, record_id: &str) {
        let mut domains = self.store.read_domains().unwrap();
        domains.insert(
            fqdn.to_string(),
            DomainEntry {
                zone_id: "zone1".to_string(),
                record_id: record_id.to_string(),
                record_name: fqdn.strip_suffix(".example.com").unwrap_or("@").to_string(),
                last_ip: None,
                last_update: None,
                extra: serde_json::Map::new(),
            },
        );
        self.store.write_domains(&domains).unwrap();
    }

    /// Write a healthy record directly, bypassing the probe pipeline.
    pub fn seed_healthy(&self, id: &str, ip: &str, latency_ms: u64) {
        let mut health = self.store.read_health().unwrap();
        health.insert(
            id.to_string(),
            HealthRecord {
                label: format!("label-{id}"),
                ip: ip.to_string(),
                healthy: true,
                last_latency_ms: Some(latency_ms),
                last_error: None,
                last_ok: Some(Utc::now()),
                last_checked: Utc::now(),
                ok_streak: 2,
                fail_streak: 0,
                extra: serde_json::Map::new(),
            },
        );
        self.store.write_health(&health).unwrap();
    }
}
