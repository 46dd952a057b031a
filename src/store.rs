//! Durable JSON documents under the base directory.
//!
//! Layout:
//! - `configs/<id>.json`: one candidate per file
//! - `state/health.json`: candidate ID -> health record
//! - `state/domains.json`: FQDN -> managed record entry
//! - `state/mode`, `state/rr_index`, `state/last_alert`,
//!   `state/last_monitor`, `state/last_rotate`, `state/current_ip`
//!
//! Every write goes to a sibling temp file and is renamed into place, so
//! concurrent readers always see a complete document. Documents are
//! rewritten whole on change; unknown JSON fields survive the round-trip.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::debug;

use crate::config::Paths;
use crate::error::SteerError;

/// One proxy endpoint under consideration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateConfig {
    /// Stable opaque ID, unique across the candidate set.
    pub id: String,
    /// Human label.
    pub label: String,
    /// Egress IP the candidate exits through.
    pub ip: String,
    /// Disabled candidates are skipped by probing.
    pub enabled: bool,
    /// Opaque outbound descriptor passed verbatim to the probe proxy.
    pub config_json: serde_json::Value,
    /// Fields written by newer versions or external tools.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Rolling health for one candidate, keyed by candidate ID.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthRecord {
    /// Label mirror, refreshed every tick.
    pub label: String,
    /// Egress IP mirror, refreshed every tick.
    pub ip: String,
    /// UP/DOWN classification with streak hysteresis.
    pub healthy: bool,
    /// Minimum observed latency of the last successful probe batch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_latency_ms: Option<u64>,
    /// Last transport-level error, absent while the candidate succeeds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    /// Last successful probe time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_ok: Option<DateTime<Utc>>,
    /// Time of the most recent probe, success or not.
    pub last_checked: DateTime<Utc>,
    /// Consecutive successes; zero while failing.
    pub ok_streak: u32,
    /// Consecutive failures; zero while succeeding.
    pub fail_streak: u32,
    /// Fields written by newer versions or external tools.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// One managed A-record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainEntry {
    /// Provider zone ID, cached at `set-domain` time.
    pub zone_id: String,
    /// Provider record ID, cached at `set-domain` time.
    pub record_id: String,
    /// Record name relative to the zone (`@` at the apex), cached with
    /// the IDs so updates need no zone lookup.
    #[serde(default)]
    pub record_name: String,
    /// Last value written to the provider, absent before the first update.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_ip: Option<String>,
    /// Time of the last successful provider write.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_update: Option<DateTime<Utc>>,
    /// Fields written by newer versions or external tools.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Process-wide selection policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Point managed records at the lowest-latency healthy endpoint.
    Best,
    /// Round-robin over the healthy set on each rotate tick.
    Rr,
}

impl FromStr for Mode {
    type Err = SteerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "best" => Ok(Mode::Best),
            "rr" => Ok(Mode::Rr),
            other => Err(SteerError::Config(format!(
                "mode must be best or rr, got {other:?}"
            ))),
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Best => f.write_str("best"),
            Mode::Rr => f.write_str("rr"),
        }
    }
}

/// Candidate-ID -> health record map, iterated in sorted-by-ID order.
pub type HealthMap = BTreeMap<String, HealthRecord>;

/// FQDN -> managed record map.
pub type DomainMap = BTreeMap<String, DomainEntry>;

/// File-backed store for all durable state.
#[derive(Debug, Clone)]
pub struct Store {
    paths: Paths,
}

impl Store {
    /// Store rooted at the given base directory layout.
    pub fn new(paths: Paths) -> Self {
        Self { paths }
    }

    /// Create the state/configs/logs directories when absent.
    pub fn ensure_layout(&self) -> Result<(), SteerError> {
        fs::create_dir_all(self.paths.state_dir())?;
        fs::create_dir_all(self.paths.configs_dir())?;
        fs::create_dir_all(self.paths.logs_dir())?;
        Ok(())
    }

    /// Base directory layout this store operates on.
    pub fn paths(&self) -> &Paths {
        &self.paths
    }

    // --- candidate configs ---

    fn candidate_path(&self, id: &str) -> PathBuf {
        self.paths.configs_dir().join(format!("{id}.json"))
    }

    /// All candidates, sorted by ID.
    pub fn list_candidates(&self) -> Result<Vec<CandidateConfig>, SteerError> {
        let dir = self.paths.configs_dir();
        let mut out = Vec::new();
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(out),
            Err(e) => return Err(e.into()),
        };
        for entry in entries {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let candidate: CandidateConfig = serde_json::from_slice(&fs::read(&path)?)?;
            out.push(candidate);
        }
        out.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(out)
    }

    /// One candidate by ID, if present.
    pub fn read_candidate(&self, id: &str) -> Result<Option<CandidateConfig>, SteerError> {
        match fs::read(self.candidate_path(id)) {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Persist a candidate, overwriting any previous version.
    pub fn write_candidate(&self, candidate: &CandidateConfig) -> Result<(), SteerError> {
        let bytes = serde_json::to_vec_pretty(candidate)?;
        atomic_write(&self.candidate_path(&candidate.id), &bytes)?;
        debug!(id = %candidate.id, "wrote candidate config");
        Ok(())
    }

    /// Delete a candidate file. Returns false when it did not exist.
    pub fn remove_candidate(&self, id: &str) -> Result<bool, SteerError> {
        match fs::remove_file(self.candidate_path(id)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    // --- documents ---

    /// Health document; empty map when absent.
    pub fn read_health(&self) -> Result<HealthMap, SteerError> {
        self.read_document("health.json")
    }

    /// Rewrite the whole health document.
    pub fn write_health(&self, health: &HealthMap) -> Result<(), SteerError> {
        self.write_document("health.json", health)
    }

    /// Domains document; empty map when absent.
    pub fn read_domains(&self) -> Result<DomainMap, SteerError> {
        self.read_document("domains.json")
    }

    /// Rewrite the whole domains document.
    pub fn write_domains(&self, domains: &DomainMap) -> Result<(), SteerError> {
        self.write_document("domains.json", domains)
    }

    fn read_document<T: serde::de::DeserializeOwned + Default>(
        &self,
        name: &str,
    ) -> Result<T, SteerError> {
        match fs::read(self.paths.state_dir().join(name)) {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(T::default()),
            Err(e) => Err(e.into()),
        }
    }

    fn write_document<T: Serialize>(&self, name: &str, value: &T) -> Result<(), SteerError> {
        let bytes = serde_json::to_vec_pretty(value)?;
        atomic_write(&self.paths.state_dir().join(name), &bytes)
    }

    // --- scalars ---

    /// Selection policy; `best` when unset.
    pub fn read_mode(&self) -> Result<Mode, SteerError> {
        match self.read_scalar("mode")? {
            Some(s) => s.parse(),
            None => Ok(Mode::Best),
        }
    }

    /// Persist the selection policy.
    pub fn write_mode(&self, mode: Mode) -> Result<(), SteerError> {
        self.write_scalar("mode", &mode.to_string())
    }

    /// Round-robin cursor; 0 when unset.
    pub fn read_rr_index(&self) -> Result<u64, SteerError> {
        self.read_parsed_scalar("rr_index")
    }

    /// Persist the round-robin cursor.
    pub fn write_rr_index(&self, index: u64) -> Result<(), SteerError> {
        self.write_scalar("rr_index", &index.to_string())
    }

    /// Last alert epoch; 0 when no alert has fired.
    pub fn read_last_alert(&self) -> Result<i64, SteerError> {
        self.read_parsed_scalar("last_alert")
    }

    /// Persist the alert cooldown stamp.
    pub fn write_last_alert(&self, epoch: i64) -> Result<(), SteerError> {
        self.write_scalar("last_alert", &epoch.to_string())
    }

    /// Last monitor-tick epoch; 0 when never run.
    pub fn read_last_monitor(&self) -> Result<i64, SteerError> {
        self.read_parsed_scalar("last_monitor")
    }

    /// Persist the monitor-tick stamp.
    pub fn write_last_monitor(&self, epoch: i64) -> Result<(), SteerError> {
        self.write_scalar("last_monitor", &epoch.to_string())
    }

    /// Last rotate-tick epoch; 0 when never run.
    pub fn read_last_rotate(&self) -> Result<i64, SteerError> {
        self.read_parsed_scalar("last_rotate")
    }

    /// Persist the rotate-tick stamp.
    pub fn write_last_rotate(&self, epoch: i64) -> Result<(), SteerError> {
        self.write_scalar("last_rotate", &epoch.to_string())
    }

    /// IP most recently written to the provider, if any.
    pub fn read_current_ip(&self) -> Result<Option<String>, SteerError> {
        self.read_scalar("current_ip")
    }

    /// Persist the current-IP cache.
    pub fn write_current_ip(&self, ip: &str) -> Result<(), SteerError> {
        self.write_scalar("current_ip", ip)
    }

    fn read_scalar(&self, name: &str) -> Result<Option<String>, SteerError> {
        match fs::read_to_string(self.paths.state_dir().join(name)) {
            Ok(s) => Ok(Some(s.trim().to_string())),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn read_parsed_scalar<T: FromStr + Default>(&self, name: &str) -> Result<T, SteerError> {
        match self.read_scalar(name)? {
            Some(s) => s
                .parse()
                .map_err(|_| SteerError::Config(format!("corrupt scalar {name}: {s:?}"))),
            None => Ok(T::default()),
        }
    }

    fn write_scalar(&self, name: &str, value: &str) -> Result<(), SteerError> {
        atomic_write(
            &self.paths.state_dir().join(name),
            format!("{value}\n").as_bytes(),
        )
    }
}

/// Write to a sibling temp file and rename into place.
fn atomic_write(path: &Path, bytes: &[u8]) -> Result<(), SteerError> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    fs::write(&tmp, bytes)?;
    fs::rename(&tmp, path)?;
    Ok(())
}
