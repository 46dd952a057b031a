//! Telemetry setup for steer-dns.
//!
//! Supports:
//! - Tracing with configurable log levels on stderr
//! - Append-only plain-text log file under `logs/` (UTC, no ANSI)
//! - Prometheus metrics endpoint (with `prometheus` feature)

use std::fs::OpenOptions;
use std::net::SocketAddr;
use std::path::Path;
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Initialize telemetry for a command invocation.
///
/// Each invocation is a short-lived process, so the log file is opened in
/// append mode; rotation belongs to the host. The Prometheus exporter
/// starts when an address is configured and the feature is enabled.
pub fn init(
    logs_dir: &Path,
    prometheus_addr: Option<SocketAddr>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    std::fs::create_dir_all(logs_dir)?;
    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(logs_dir.join("steer-dns.log"))?;

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::sync::Arc::new(log_file))
        .with_ansi(false)
        .with_timer(UtcTime::rfc_3339());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .init();

    // Start Prometheus exporter if configured
    #[cfg(feature = "prometheus")]
    if let Some(addr) = prometheus_addr {
        start_prometheus_exporter(addr)?;
    }
    #[cfg(not(feature = "prometheus"))]
    let _ = prometheus_addr;

    Ok(())
}

/// Start Prometheus metrics HTTP exporter.
#[cfg(feature = "prometheus")]
fn start_prometheus_exporter(
    addr: SocketAddr,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    use metrics_exporter_prometheus::PrometheusBuilder;

    PrometheusBuilder::new().with_http_listener(addr).install()?;

    tracing::info!(%addr, "Prometheus metrics exporter started");

    Ok(())
}
