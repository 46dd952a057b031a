//! steer-dns binary entry point.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::error;

use steer_dns::alert::{Notifier, NullNotifier, TelegramNotifier};
use steer_dns::probe::XrayProber;
use steer_dns::provider::{DnsProvider, HetznerProvider};
use steer_dns::{telemetry, Mode, Orchestrator, Paths, Settings, Store, SteerError};

/// Total timeout per DNS provider API call.
const DNS_API_TIMEOUT: Duration = Duration::from_secs(15);

/// DNS-based load balancer steering managed A-records at healthy proxy endpoints.
#[derive(Parser, Debug)]
#[command(name = "steer-dns")]
#[command(version, about, long_about = None)]
struct Args {
    /// Base directory (env file, state/, configs/, templates/, logs/).
    #[arg(short, long, default_value = "/var/lib/steer-dns")]
    base: PathBuf,

    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Subcommand, Debug)]
enum CliCommand {
    /// Probe all candidates once and reconcile in best mode.
    MonitorOnce,
    /// Rotate managed domains to the next healthy IP.
    RotateOnce,
    /// Set the selection policy.
    SetMode {
        /// `best` or `rr`.
        mode: String,
    },
    /// Print each candidate with its health snippet.
    List,
    /// Register a candidate proxy.
    AddConfig {
        /// Human label.
        label: String,
        /// Egress IP.
        ip: String,
        /// Outbound descriptor, passed verbatim to the probe proxy.
        outbound_json: String,
    },
    /// Delete a candidate and its health record.
    RemoveConfig {
        /// Candidate ID.
        id: String,
    },
    /// Enable a candidate.
    EnableConfig {
        /// Candidate ID.
        id: String,
    },
    /// Disable a candidate (kept, but skipped by probing).
    DisableConfig {
        /// Candidate ID.
        id: String,
    },
    /// Register a managed A-record.
    SetDomain {
        /// Fully qualified domain name.
        fqdn: String,
    },
    /// Print mode, current IP, domains, and candidates.
    Status,
    /// Verify external binary availability and env presence.
    SelfCheck,
}

#[tokio::main]
async fn main() {
    // Argument errors exit 1; --help and --version stay on stdout with 0.
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) => {
            let code = i32::from(e.use_stderr());
            let _ = e.print();
            std::process::exit(code);
        }
    };

    let paths = Paths::new(&args.base);
    let settings = match Settings::load(paths.base()) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("error: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = telemetry::init(&paths.logs_dir(), settings.prometheus_addr) {
        eprintln!("error: failed to initialize logging: {e}");
        std::process::exit(1);
    }

    let code = match run(args, paths, settings).await {
        Ok(code) => code,
        Err(e) => {
            error!("command failed: {e}");
            eprintln!("error: {e}");
            1
        }
    };
    std::process::exit(code);
}

async fn run(args: Args, paths: Paths, settings: Settings) -> Result<i32, SteerError> {
    let store = Store::new(paths.clone());
    store.ensure_layout()?;

    let orchestrator = build_orchestrator(&settings, &paths, store)?;

    match args.command {
        CliCommand::MonitorOnce => {
            let report = orchestrator.monitor_once().await?;
            println!("monitor: {}", report.as_str());
            Ok(i32::from(report.is_failure()))
        }
        CliCommand::RotateOnce => {
            let report = orchestrator.rotate_once().await?;
            println!("rotate: {}", report.as_str());
            Ok(i32::from(report.is_failure()))
        }
        CliCommand::SetMode { mode } => {
            let mode: Mode = mode.parse()?;
            orchestrator.set_mode(mode)?;
            println!("mode set to {mode}");
            Ok(0)
        }
        CliCommand::List => {
            print!("{}", orchestrator.list()?);
            Ok(0)
        }
        CliCommand::AddConfig {
            label,
            ip,
            outbound_json,
        } => {
            let candidate = orchestrator.add_config(&label, &ip, &outbound_json)?;
            println!("added {} ({} via {})", candidate.id, candidate.label, candidate.ip);
            Ok(0)
        }
        CliCommand::RemoveConfig { id } => {
            orchestrator.remove_config(&id)?;
            println!("removed {id}");
            Ok(0)
        }
        CliCommand::EnableConfig { id } => {
            orchestrator.set_enabled(&id, true)?;
            println!("enabled {id}");
            Ok(0)
        }
        CliCommand::DisableConfig { id } => {
            orchestrator.set_enabled(&id, false)?;
            println!("disabled {id}");
            Ok(0)
        }
        CliCommand::SetDomain { fqdn } => {
            let entry = orchestrator.set_domain(&fqdn).await?;
            println!(
                "domain {fqdn} -> zone {} record {}",
                entry.zone_id, entry.record_id
            );
            Ok(0)
        }
        CliCommand::Status => {
            print!("{}", orchestrator.status()?);
            Ok(0)
        }
        CliCommand::SelfCheck => {
            let (report, ok) = orchestrator.self_check()?;
            print!("{report}");
            Ok(i32::from(!ok))
        }
    }
}

fn build_orchestrator(
    settings: &Settings,
    paths: &Paths,
    store: Store,
) -> Result<Orchestrator, SteerError> {
    let prober = Arc::new(XrayProber::new(
        settings.xray_bin.clone(),
        paths.socks_template(),
        settings.liveness_urls(),
        settings.curl_retries,
        Duration::from_secs(settings.curl_timeout),
    ));

    let notifier: Arc<dyn Notifier> = match (
        settings.telegram_bot_token.clone(),
        settings.telegram_allowed_user_id,
    ) {
        (Some(token), Some(chat_id)) => Arc::new(TelegramNotifier::new(
            settings.telegram_api_base.clone(),
            token,
            chat_id,
            settings.telegram_proxy.as_deref(),
        )?),
        _ => Arc::new(NullNotifier),
    };

    let provider: Option<Arc<dyn DnsProvider>> = settings
        .hetzner_dns_api_token
        .clone()
        .map(|token| {
            HetznerProvider::new(settings.hetzner_api_base.clone(), token, DNS_API_TIMEOUT)
                .map(|p| Arc::new(p) as Arc<dyn DnsProvider>)
        })
        .transpose()?;

    Ok(Orchestrator::new(
        settings.clone(),
        store,
        prober,
        notifier,
        provider,
    ))
}
