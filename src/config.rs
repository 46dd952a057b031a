//! Configuration types for steer-dns.
//!
//! Settings are layered: the `env` file at the base directory root
//! (KEY=VALUE lines) is read first, then process environment variables
//! override it. Every knob has a default so a bare directory works.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use crate::error::SteerError;

/// Runtime settings, resolved from the `env` file and process environment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Bearer token for the DNS provider API.
    #[serde(default)]
    pub hetzner_dns_api_token: Option<String>,

    /// Telegram bot token used for operator notifications.
    #[serde(default)]
    pub telegram_bot_token: Option<String>,

    /// Telegram user ID allowed to talk to the bot shell.
    #[serde(default)]
    pub telegram_allowed_user_id: Option<i64>,

    /// Optional outbound HTTP proxy for Telegram API calls.
    #[serde(default)]
    pub telegram_proxy: Option<String>,

    /// Minimum seconds between monitor ticks.
    #[serde(default = "default_monitor_interval")]
    pub monitor_interval: u64,

    /// Minimum seconds between rotate ticks.
    #[serde(default = "default_lb_interval")]
    pub lb_interval: u64,

    /// Minimum seconds between DNS updates for one record.
    #[serde(default = "default_dns_min_update_interval")]
    pub dns_min_update_interval: u64,

    /// Consecutive failures before a candidate goes DOWN.
    #[serde(default = "default_fail_threshold")]
    pub fail_threshold: u32,

    /// Consecutive successes before a candidate comes UP.
    #[serde(default = "default_success_threshold")]
    pub success_threshold: u32,

    /// Per-request liveness probe timeout in seconds.
    #[serde(default = "default_curl_timeout")]
    pub curl_timeout: u64,

    /// Liveness attempts per candidate and tick.
    #[serde(default = "default_curl_retries")]
    pub curl_retries: u32,

    /// Seconds between operator alerts (global, all alert kinds).
    #[serde(default = "default_alert_cooldown")]
    pub alert_cooldown: u64,

    /// TTL for managed A-records in seconds.
    #[serde(default = "default_ttl")]
    pub default_ttl: u32,

    /// Telegram long-poll timeout in seconds (bot shell interface).
    #[serde(default = "default_poll_timeout")]
    pub poll_timeout: u64,

    /// Probe-proxy binary name or path.
    #[serde(default = "default_xray_bin")]
    pub xray_bin: String,

    /// Comma-separated HTTPS 204 liveness endpoints.
    #[serde(default = "default_check_urls")]
    pub check_urls: String,

    /// DNS provider API base URL.
    #[serde(default = "default_hetzner_api_base")]
    pub hetzner_api_base: String,

    /// Telegram API base URL.
    #[serde(default = "default_telegram_api_base")]
    pub telegram_api_base: String,

    /// Prometheus metrics exporter address (with the `prometheus` feature).
    #[serde(default)]
    pub prometheus_addr: Option<SocketAddr>,
}

impl Settings {
    /// Load settings for the given base directory.
    ///
    /// Reads `<base>/env` when present, then overlays process environment
    /// variables, then fills the documented defaults.
    pub fn load(base: &Path) -> Result<Self, SteerError> {
        let env_file = base.join("env");
        config::Config::builder()
            .add_source(
                config::File::from(env_file)
                    .format(config::FileFormat::Ini)
                    .required(false),
            )
            .add_source(config::Environment::default().try_parsing(true))
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| SteerError::Config(e.to_string()))
    }

    /// Liveness URLs as a list.
    pub fn liveness_urls(&self) -> Vec<String> {
        self.check_urls
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect()
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            hetzner_dns_api_token: None,
            telegram_bot_token: None,
            telegram_allowed_user_id: None,
            telegram_proxy: None,
            monitor_interval: default_monitor_interval(),
            lb_interval: default_lb_interval(),
            dns_min_update_interval: default_dns_min_update_interval(),
            fail_threshold: default_fail_threshold(),
            success_threshold: default_success_threshold(),
            curl_timeout: default_curl_timeout(),
            curl_retries: default_curl_retries(),
            alert_cooldown: default_alert_cooldown(),
            default_ttl: default_ttl(),
            poll_timeout: default_poll_timeout(),
            xray_bin: default_xray_bin(),
            check_urls: default_check_urls(),
            hetzner_api_base: default_hetzner_api_base(),
            telegram_api_base: default_telegram_api_base(),
            prometheus_addr: None,
        }
    }
}

/// Well-known paths under the base directory.
#[derive(Debug, Clone)]
pub struct Paths {
    base: PathBuf,
}

impl Paths {
    /// Paths rooted at the given base directory.
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    /// Base directory root.
    pub fn base(&self) -> &Path {
        &self.base
    }

    /// `state/` directory (documents, scalar stamps, tick locks).
    pub fn state_dir(&self) -> PathBuf {
        self.base.join("state")
    }

    /// `configs/` directory, one JSON file per candidate.
    pub fn configs_dir(&self) -> PathBuf {
        self.base.join("configs")
    }

    /// Operator-supplied probe-proxy template.
    pub fn socks_template(&self) -> PathBuf {
        self.base.join("templates").join("socks-template.json")
    }

    /// `logs/` directory for append-only plain-text logs.
    pub fn logs_dir(&self) -> PathBuf {
        self.base.join("logs")
    }
}

fn default_monitor_interval() -> u64 {
    15
}

fn default_lb_interval() -> u64 {
    60
}

fn default_dns_min_update_interval() -> u64 {
    10
}

fn default_fail_threshold() -> u32 {
    3
}

fn default_success_threshold() -> u32 {
    2
}

fn default_curl_timeout() -> u64 {
    5
}

fn default_curl_retries() -> u32 {
    2
}

fn default_alert_cooldown() -> u64 {
    300
}

fn default_ttl() -> u32 {
    60
}

fn default_poll_timeout() -> u64 {
    30
}

fn default_xray_bin() -> String {
    "xray".to_string()
}

fn default_check_urls() -> String {
    "https://www.gstatic.com/generate_204,https://cp.cloudflare.com/generate_204".to_string()
}

fn default_hetzner_api_base() -> String {
    "https://dns.hetzner.com/api/v1".to_string()
}

fn default_telegram_api_base() -> String {
    "https://api.telegram.org".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_documented_values() {
        let s = Settings::default();
        assert_eq!(s.monitor_interval, 15);
        assert_eq!(s.lb_interval, 60);
        assert_eq!(s.dns_min_update_interval, 10);
        assert_eq!(s.fail_threshold, 3);
        assert_eq!(s.success_threshold, 2);
        assert_eq!(s.curl_timeout, 5);
        assert_eq!(s.curl_retries, 2);
        assert_eq!(s.alert_cooldown, 300);
        assert_eq!(s.default_ttl, 60);
        assert_eq!(s.poll_timeout, 30);
        assert!(s.prometheus_addr.is_none());
    }

    #[test]
    fn test_liveness_urls_splits_and_trims() {
        let s = Settings {
            check_urls: "https://a/generate_204, https://b/generate_204 ,".to_string(),
            ..Settings::default()
        };
        assert_eq!(
            s.liveness_urls(),
            vec!["https://a/generate_204", "https://b/generate_204"]
        );
    }

    #[test]
    fn test_paths_layout() {
        let p = Paths::new("/var/lib/steer");
        assert_eq!(p.state_dir(), PathBuf::from("/var/lib/steer/state"));
        assert_eq!(p.configs_dir(), PathBuf::from("/var/lib/steer/configs"));
        assert_eq!(
            p.socks_template(),
            PathBuf::from("/var/lib/steer/templates/socks-template.json")
        );
    }
}
