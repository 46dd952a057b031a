//! Per-candidate liveness probing through a probe-proxy subprocess.
//!
//! For each candidate the runner renders the operator-supplied template
//! (substituting `{{PORT}}` and `{{OUTBOUND}}`), spawns the probe proxy on
//! an ephemeral local port, issues HTTPS liveness checks through the
//! resulting SOCKS5 inbound, and tears everything down. The subprocess,
//! rendered config, and capture log never outlive the probe.

use async_trait::async_trait;
use rand::Rng;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::{Child, Command};
use tracing::{debug, warn};

use crate::error::SteerError;
use crate::store::CandidateConfig;

/// Local port window for probe-proxy inbounds.
const PORT_RANGE: std::ops::Range<u16> = 20000..60000;

/// Warm-up before the first liveness attempt.
const WARMUP: Duration = Duration::from_secs(1);

/// Grace between SIGTERM and SIGKILL at teardown.
const TERM_GRACE: Duration = Duration::from_millis(500);

/// Outcome of probing one candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// At least one liveness attempt completed.
    Success {
        /// Minimum observed wall-clock latency, rounded to milliseconds.
        latency_ms: u64,
    },
    /// Every attempt failed; carries the last transport error.
    Failure {
        /// Last transport-level error string.
        error: String,
    },
    /// Candidate was disabled at call time; ignored by the aggregator.
    Skipped,
}

/// Result of one candidate's probe, stamped by the orchestrator.
#[derive(Debug, Clone)]
pub struct ProbeResult {
    /// Candidate ID.
    pub id: String,
    /// Label mirror for the health record.
    pub label: String,
    /// Egress IP mirror for the health record.
    pub ip: String,
    /// What happened.
    pub outcome: ProbeOutcome,
}

impl ProbeResult {
    /// Synthetic record for a candidate disabled at call time.
    pub fn skipped(candidate: &CandidateConfig) -> Self {
        Self {
            id: candidate.id.clone(),
            label: candidate.label.clone(),
            ip: candidate.ip.clone(),
            outcome: ProbeOutcome::Skipped,
        }
    }

    fn failure(candidate: &CandidateConfig, error: String) -> Self {
        Self {
            id: candidate.id.clone(),
            label: candidate.label.clone(),
            ip: candidate.ip.clone(),
            outcome: ProbeOutcome::Failure { error },
        }
    }
}

/// Probe port, so ticks are testable without subprocesses.
#[async_trait]
pub trait Prober: Send + Sync {
    /// Probe one enabled candidate.
    async fn probe(&self, candidate: &CandidateConfig) -> ProbeResult;
}

/// Substitute `{{PORT}}` and `{{OUTBOUND}}` in the operator template.
///
/// Both tokens must be present; a template missing either cannot express
/// the probe inbound/outbound pair.
pub fn render_template(
    template: &str,
    port: u16,
    outbound: &serde_json::Value,
) -> Result<String, SteerError> {
    if !template.contains("{{PORT}}") || !template.contains("{{OUTBOUND}}") {
        return Err(SteerError::Config(
            "socks template must contain {{PORT}} and {{OUTBOUND}}".to_string(),
        ));
    }
    let outbound = serde_json::to_string(outbound)?;
    Ok(template
        .replace("{{PORT}}", &port.to_string())
        .replace("{{OUTBOUND}}", &outbound))
}

/// Whether the probe-proxy binary can be spawned.
///
/// Paths are checked directly; bare names are searched on PATH.
pub fn binary_available(bin: &str) -> bool {
    let path = Path::new(bin);
    if path.components().count() > 1 {
        return path.is_file();
    }
    std::env::var_os("PATH")
        .map(|paths| std::env::split_paths(&paths).any(|dir| dir.join(bin).is_file()))
        .unwrap_or(false)
}

/// Spawns the probe proxy and measures liveness through it.
pub struct XrayProber {
    bin: String,
    template_path: PathBuf,
    urls: Vec<String>,
    attempts: u32,
    request_timeout: Duration,
}

impl XrayProber {
    /// Build a prober from resolved settings.
    pub fn new(
        bin: String,
        template_path: PathBuf,
        urls: Vec<String>,
        attempts: u32,
        request_timeout: Duration,
    ) -> Self {
        Self {
            bin,
            template_path,
            urls,
            attempts: attempts.max(1),
            request_timeout,
        }
    }

    async fn spawn_proxy(
        &self,
        candidate: &CandidateConfig,
        port: u16,
        config_path: &Path,
        log_path: &Path,
    ) -> Result<Child, String> {
        let template = tokio::fs::read_to_string(&self.template_path)
            .await
            .map_err(|e| format!("template {}: {e}", self.template_path.display()))?;
        let rendered = render_template(&template, port, &candidate.config_json)
            .map_err(|e| e.to_string())?;
        tokio::fs::write(config_path, rendered)
            .await
            .map_err(|e| format!("write probe config: {e}"))?;

        let log = std::fs::File::create(log_path).map_err(|e| format!("probe log: {e}"))?;
        let stderr_log = log.try_clone().map_err(|e| format!("probe log: {e}"))?;

        Command::new(&self.bin)
            .arg("-c")
            .arg(config_path)
            .stdin(Stdio::null())
            .stdout(Stdio::from(log))
            .stderr(Stdio::from(stderr_log))
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| format!("spawn {}: {e}", self.bin))
    }

    /// Run the configured attempts through the local SOCKS5 inbound.
    ///
    /// Returns the minimum latency on any success, else the last error.
    async fn run_attempts(&self, port: u16) -> Result<u64, String> {
        let proxy = reqwest::Proxy::all(format!("socks5h://127.0.0.1:{port}"))
            .map_err(|e| e.to_string())?;
        let client = reqwest::Client::builder()
            .proxy(proxy)
            .timeout(self.request_timeout)
            .build()
            .map_err(|e| e.to_string())?;

        let mut best: Option<u64> = None;
        let mut last_error = "no liveness URLs configured".to_string();

        for _ in 0..self.attempts {
            for url in &self.urls {
                let started = Instant::now();
                match client.get(url).send().await {
                    Ok(_response) => {
                        // Any completed response counts, 204 or otherwise.
                        let latency = (started.elapsed().as_secs_f64() * 1000.0).round() as u64;
                        best = Some(best.map_or(latency, |b| b.min(latency)));
                    }
                    Err(e) => {
                        last_error = e.to_string();
                    }
                }
            }
        }

        best.ok_or(last_error)
    }
}

#[async_trait]
impl Prober for XrayProber {
    async fn probe(&self, candidate: &CandidateConfig) -> ProbeResult {
        if !binary_available(&self.bin) {
            return ProbeResult::failure(candidate, SteerError::ProbeBinaryMissing.to_string());
        }

        let port: u16 = rand::thread_rng().gen_range(PORT_RANGE);
        let scratch = std::env::temp_dir();
        let config_path = scratch.join(format!("steer-probe-{}-{port}.json", candidate.id));
        let log_path = scratch.join(format!("steer-probe-{}-{port}.log", candidate.id));

        let outcome = match self
            .spawn_proxy(candidate, port, &config_path, &log_path)
            .await
        {
            Err(error) => {
                warn!(id = %candidate.id, error = %error, "probe proxy failed to start");
                Err(error)
            }
            Ok(mut child) => {
                tokio::time::sleep(WARMUP).await;
                let measured = self.run_attempts(port).await;
                terminate(&mut child).await;
                measured
            }
        };

        for path in [&config_path, &log_path] {
            if let Err(e) = tokio::fs::remove_file(path).await {
                if e.kind() != std::io::ErrorKind::NotFound {
                    debug!(path = %path.display(), "failed to remove probe scratch file: {e}");
                }
            }
        }

        match outcome {
            Ok(latency_ms) => {
                debug!(id = %candidate.id, latency_ms, "probe succeeded");
                ProbeResult {
                    id: candidate.id.clone(),
                    label: candidate.label.clone(),
                    ip: candidate.ip.clone(),
                    outcome: ProbeOutcome::Success { latency_ms },
                }
            }
            Err(error) => ProbeResult::failure(candidate, error),
        }
    }
}

/// SIGTERM the probe proxy, give it a moment, then force-kill and reap.
async fn terminate(child: &mut Child) {
    if let Some(pid) = child.id() {
        let pid = nix::unistd::Pid::from_raw(pid as i32);
        if let Err(e) = nix::sys::signal::kill(pid, nix::sys::signal::Signal::SIGTERM) {
            debug!("SIGTERM failed: {e}");
        }
        match tokio::time::timeout(TERM_GRACE, child.wait()).await {
            Ok(_) => return,
            Err(_) => debug!("probe proxy ignored SIGTERM"),
        }
    }
    if let Err(e) = child.kill().await {
        warn!("failed to kill probe proxy: {e}");
    }
}
