//! Steer DNS - a DNS-based load balancer for outbound proxy endpoints.
//!
//! This crate keeps a set of managed A-records pointed at working proxy
//! egress IPs. Every candidate proxy is probed through a local probe-proxy
//! subprocess, classified with streak-based hysteresis, and the managed
//! records follow either the lowest-latency healthy endpoint ("best") or
//! rotate over the healthy set ("rr").
//!
//! ## Features
//!
//! - Parallel liveness probing through per-candidate SOCKS5 forwarders
//! - UP/DOWN hysteresis with configurable success/fail streaks
//! - Best-latency and round-robin selection policies
//! - Throttled, change-suppressed A-record reconciliation (Hetzner API)
//! - Cooldown-gated operator alerts over Telegram
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                          steer-dns tick                          │
//! │                                                                  │
//! │  ┌────────────┐   ┌──────────────┐   ┌──────────┐                │
//! │  │ Probe      │──▶│ Health       │──▶│ Selector │                │
//! │  │ Runner ×N  │   │ Aggregator   │   │ best/rr  │                │
//! │  └─────┬──────┘   └──────────────┘   └────┬─────┘                │
//! │        │ xray subprocess                  │                      │
//! │        │ SOCKS5 :ephemeral                ▼                      │
//! │        │                       ┌──────────────────┐   DNS API    │
//! │        │                       │ DNS Reconciler   │──▶ PUT /records
//! │        │                       │ throttle+suppress│              │
//! │        │                       └──────────────────┘              │
//! │        ▼                                                         │
//! │  https://…/generate_204        state/*.json  (atomic rename)     │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Ticks are discrete process invocations driven by an external timer;
//! each tick kind is gated by an interval guard and a named file lock, so
//! overlapping timer firings skip instead of queueing.
//!
//! ## Example Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use steer_dns::{Orchestrator, Paths, Settings, Store};
//!
//! #[tokio::main]
//! async fn main() {
//!     let paths = Paths::new("/var/lib/steer-dns");
//!     let settings = Settings::load(paths.base()).unwrap();
//!     let store = Store::new(paths);
//!     store.ensure_layout().unwrap();
//!
//!     let orchestrator = Orchestrator::new(
//!         settings,
//!         store,
//!         prober,   // Arc<dyn Prober>
//!         notifier, // Arc<dyn Notifier>
//!         provider, // Option<Arc<dyn DnsProvider>>
//!     );
//!     orchestrator.monitor_once().await.unwrap();
//! }
//! ```

#![warn(missing_docs)]

pub mod alert;
pub mod config;
pub mod error;
pub mod health;
pub mod lock;
pub mod metrics;
pub mod orchestrator;
pub mod probe;
pub mod provider;
pub mod reconcile;
pub mod select;
pub mod store;
pub mod telemetry;

// Re-export main types
pub use config::{Paths, Settings};
pub use error::SteerError;
pub use orchestrator::{Orchestrator, TickReport};
pub use store::{CandidateConfig, DomainEntry, HealthRecord, Mode, Store};
