//! Monitor tick end-to-end: probe fan-out, hysteresis, best-mode
//! reconciliation, alerting, and the interval guard.

mod common;

use common::TestEnv;
use steer_dns::store::Mode;
use steer_dns::{Settings, TickReport};

#[tokio::test]
async fn test_candidate_comes_up_and_domain_follows() {
    let env = TestEnv::new();
    env.add_candidate("a", "10.0.0.1", true);
    env.add_domain("proxy.example.com", "rec1");
    env.prober.succeed("a", 80);
    let orchestrator = env.orchestrator();

    // First success: streak 1 of 2, still DOWN, nothing to point at.
    let report = orchestrator.monitor_once().await.unwrap();
    assert_eq!(report, TickReport::NoSelection);
    let health = env.store.read_health().unwrap();
    assert!(!health["a"].healthy);
    assert!(env.provider.puts.lock().unwrap().is_empty());

    // Second success reaches the threshold and repoints the record.
    let report = orchestrator.monitor_once().await.unwrap();
    assert_eq!(report, TickReport::Completed);
    let health = env.store.read_health().unwrap();
    assert!(health["a"].healthy);
    assert_eq!(health["a"].ok_streak, 2);

    assert_eq!(env.provider.put_values(), vec!["10.0.0.1"]);
    assert_eq!(
        env.store.read_current_ip().unwrap().as_deref(),
        Some("10.0.0.1")
    );
    let domains = env.store.read_domains().unwrap();
    assert_eq!(
        domains["proxy.example.com"].last_ip.as_deref(),
        Some("10.0.0.1")
    );
}

#[tokio::test]
async fn test_stable_selection_issues_no_further_writes() {
    let env = TestEnv::new();
    env.add_candidate("a", "10.0.0.1", true);
    env.add_domain("proxy.example.com", "rec1");
    env.prober.succeed("a", 80);
    let orchestrator = env.orchestrator();

    for _ in 0..4 {
        orchestrator.monitor_once().await.unwrap();
    }

    // Exactly one PUT despite four ticks: the IP never changed.
    assert_eq!(env.provider.put_values(), vec!["10.0.0.1"]);
}

#[tokio::test]
async fn test_best_picks_lowest_latency_candidate() {
    let env = TestEnv::new();
    env.add_candidate("a", "10.0.0.1", true);
    env.add_candidate("b", "10.0.0.2", true);
    env.add_domain("proxy.example.com", "rec1");
    env.prober.succeed("a", 120);
    env.prober.succeed("b", 45);
    let orchestrator = env.orchestrator();

    orchestrator.monitor_once().await.unwrap();
    orchestrator.monitor_once().await.unwrap();

    assert_eq!(env.provider.put_values(), vec!["10.0.0.2"]);
}

#[tokio::test]
async fn test_failures_bring_candidate_down_and_fire_alert() {
    let env = TestEnv::new();
    env.add_candidate("a", "10.0.0.1", true);
    env.add_domain("proxy.example.com", "rec1");
    env.prober.succeed("a", 80);
    let orchestrator = env.orchestrator();

    orchestrator.monitor_once().await.unwrap();
    orchestrator.monitor_once().await.unwrap();
    assert!(env.store.read_health().unwrap()["a"].healthy);

    env.prober.fail("a", "connection reset");
    for _ in 0..3 {
        orchestrator.monitor_once().await.unwrap();
    }

    let health = env.store.read_health().unwrap();
    assert!(!health["a"].healthy);
    assert_eq!(health["a"].fail_streak, 3);
    assert_eq!(
        health["a"].last_error.as_deref(),
        Some("connection reset")
    );

    // A failed probe clears the latency measurement, so selection went
    // empty on the first failing tick; the cooldown keeps it to one.
    let messages = env.notifier.messages();
    assert_eq!(messages.len(), 1);
    assert!(messages[0].contains("best-IP unavailable"));
}

#[tokio::test]
async fn test_alert_cooldown_suppresses_repeat_alerts() {
    let env = TestEnv::new();
    env.add_candidate("a", "10.0.0.1", true);
    env.prober.fail("a", "timeout");
    let orchestrator = env.orchestrator();

    for _ in 0..5 {
        let report = orchestrator.monitor_once().await.unwrap();
        assert_eq!(report, TickReport::NoSelection);
    }

    // Five no-selection ticks inside one cooldown window: one delivery.
    assert_eq!(env.notifier.messages().len(), 1);
}

#[tokio::test]
async fn test_empty_candidate_set_is_a_clean_noop() {
    let env = TestEnv::new();
    let orchestrator = env.orchestrator();

    let report = orchestrator.monitor_once().await.unwrap();
    assert_eq!(report, TickReport::NoCandidates);
    assert!(!report.is_failure());
    assert_eq!(env.prober.call_count(), 0);
    assert!(env.notifier.messages().is_empty());
}

#[tokio::test]
async fn test_disabled_candidates_are_not_probed() {
    let env = TestEnv::new();
    env.add_candidate("a", "10.0.0.1", true);
    env.add_candidate("b", "10.0.0.2", false);
    env.prober.succeed("a", 80);
    let orchestrator = env.orchestrator();

    orchestrator.monitor_once().await.unwrap();

    assert_eq!(env.prober.calls.lock().unwrap().as_slice(), ["a"]);
    let health = env.store.read_health().unwrap();
    assert!(health.contains_key("a"));
    // The skip record never reaches the aggregator.
    assert!(!health.contains_key("b"));
}

#[tokio::test]
async fn test_interval_guard_coalesces_rapid_invocations() {
    let settings = Settings {
        monitor_interval: 900,
        lb_interval: 0,
        dns_min_update_interval: 0,
        ..Settings::default()
    };
    let env = TestEnv::with_settings(settings);
    env.add_candidate("a", "10.0.0.1", true);
    env.prober.succeed("a", 80);
    let orchestrator = env.orchestrator();

    let first = orchestrator.monitor_once().await.unwrap();
    assert_ne!(first, TickReport::SkippedInterval);
    let second = orchestrator.monitor_once().await.unwrap();
    assert_eq!(second, TickReport::SkippedInterval);

    // Exactly one probe batch.
    assert_eq!(env.prober.call_count(), 1);
}

#[tokio::test]
async fn test_rr_mode_monitor_updates_health_but_not_dns() {
    let env = TestEnv::new();
    env.store.write_mode(Mode::Rr).unwrap();
    env.add_candidate("a", "10.0.0.1", true);
    env.add_domain("proxy.example.com", "rec1");
    env.prober.succeed("a", 80);
    let orchestrator = env.orchestrator();

    orchestrator.monitor_once().await.unwrap();
    let report = orchestrator.monitor_once().await.unwrap();

    assert_eq!(report, TickReport::Completed);
    assert!(env.store.read_health().unwrap()["a"].healthy);
    assert!(env.provider.puts.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_remove_config_deletes_health_entry() {
    let env = TestEnv::new();
    env.add_candidate("a", "10.0.0.1", true);
    env.prober.succeed("a", 80);
    let orchestrator = env.orchestrator();

    orchestrator.monitor_once().await.unwrap();
    assert!(env.store.read_health().unwrap().contains_key("a"));

    orchestrator.remove_config("a").unwrap();
    assert!(env.store.read_health().unwrap().is_empty());
    assert!(env.store.read_candidate("a").unwrap().is_none());

    // Removing again reports the unknown ID.
    assert!(orchestrator.remove_config("a").is_err());
}
