mod common;

use chrono::Utc;
use common::FakeProbe;
use std::sync::Arc;
use std::time::Duration;
use tandem_store::RecordStore;
use tandem_sync::{ConnectionStatus, ConnectivityManager, NetworkProbe, TcpProbe, Transition};
use tandem_types::ConnectionMode;
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

fn manager(dir: &TempDir, probe: Arc<FakeProbe>) -> ConnectivityManager {
    ConnectivityManager::new(
        RecordStore::open("local", dir.path().join("local.db")).unwrap(),
        RecordStore::open("cloud", dir.path().join("cloud.db")).unwrap(),
        probe,
        Duration::from_secs(10),
    )
}

// ── State machine ────────────────────────────────────────────────

#[test]
fn starts_hybrid_and_unavailable() {
    let status = ConnectionStatus::default();
    assert_eq!(status.mode, ConnectionMode::Hybrid);
    assert!(!status.is_cloud_available);
    assert!(!status.manual_override);
    assert!(status.last_checked.is_none());
}

#[test]
fn reachability_drives_mode_without_override() {
    let now = Utc::now();
    let (online, event) = ConnectionStatus::default().apply(Transition::Reachability(true), now);
    assert_eq!(online.mode, ConnectionMode::Hybrid);
    assert!(online.is_cloud_available);
    assert_eq!(online.last_checked, Some(now));
    let event = event.unwrap();
    assert!(event.is_cloud_available);
    assert_eq!(event.message, "Cloud store reachable");

    let (offline, event) = online.apply(Transition::Reachability(false), now);
    assert_eq!(offline.mode, ConnectionMode::Local);
    assert!(!offline.is_cloud_available);
    let event = event.unwrap();
    assert_eq!(event.mode, ConnectionMode::Local);
    assert_eq!(event.message, "Cloud store unreachable");
}

#[test]
fn unchanged_reachability_emits_nothing() {
    let now = Utc::now();
    let (offline, _) = ConnectionStatus::default().apply(Transition::Reachability(false), now);
    let (again, event) = offline.apply(Transition::Reachability(false), now);
    assert!(event.is_none());
    assert_eq!(again.mode, ConnectionMode::Local);
}

#[test]
fn manual_mode_suspends_automatic_switching() {
    let now = Utc::now();
    let (local, event) = ConnectionStatus::default()
        .apply(Transition::ManualMode(ConnectionMode::Local), now);
    assert!(local.manual_override);
    assert_eq!(local.mode, ConnectionMode::Local);
    assert!(event.is_some());

    // Reachability updates availability but leaves the chosen mode alone.
    let (reachable, event) = local.apply(Transition::Reachability(true), now);
    assert_eq!(reachable.mode, ConnectionMode::Local);
    assert!(reachable.is_cloud_available);
    assert!(event.is_some());

    let (hybrid, event) = reachable.apply(Transition::ManualMode(ConnectionMode::Hybrid), now);
    assert!(!hybrid.manual_override);
    assert_eq!(hybrid.mode, ConnectionMode::Hybrid);
    assert!(event.unwrap().message.contains("resumed"));

    let (after, _) = hybrid.apply(Transition::Reachability(false), now);
    assert_eq!(after.mode, ConnectionMode::Local);
}

#[test]
fn manual_cloud_mode_sticks_through_outage() {
    let now = Utc::now();
    let (cloud, _) = ConnectionStatus::default()
        .apply(Transition::ManualMode(ConnectionMode::Cloud), now);
    let (down, _) = cloud.apply(Transition::Reachability(false), now);
    assert_eq!(down.mode, ConnectionMode::Cloud);
    assert!(down.manual_override);
    assert!(!down.is_cloud_available);
}

// ── Manager ──────────────────────────────────────────────────────

#[tokio::test]
async fn offline_network_skips_the_store_probe() {
    let dir = TempDir::new().unwrap();
    let probe = FakeProbe::new(false);
    let manager = manager(&dir, probe.clone());

    let status = manager.check_now().await;
    assert!(!status.is_cloud_available);
    assert_eq!(status.mode, ConnectionMode::Local);
    assert_eq!(probe.calls(), 1);
    // The cloud file is never opened.
    assert!(!dir.path().join("cloud.db").exists());
}

#[tokio::test]
async fn reachable_cloud_switches_to_hybrid() {
    let dir = TempDir::new().unwrap();
    let probe = FakeProbe::new(false);
    let manager = manager(&dir, probe.clone());
    let mut events = manager.subscribe();

    manager.check_now().await;
    assert_eq!(manager.mode().await, ConnectionMode::Local);

    probe.set_online(true);
    let status = manager.check_now().await;
    assert!(status.is_cloud_available);
    assert_eq!(status.mode, ConnectionMode::Hybrid);
    assert!(manager.test_local().await);

    let first = events.recv().await.unwrap();
    assert_eq!(first.mode, ConnectionMode::Local);
    let second = events.recv().await.unwrap();
    assert_eq!(second.mode, ConnectionMode::Hybrid);
    assert!(second.is_cloud_available);
}

#[tokio::test]
async fn unreachable_store_fails_second_stage() {
    let dir = TempDir::new().unwrap();
    let manager = ConnectivityManager::new(
        RecordStore::new("local", dir.path().join("local.db")),
        RecordStore::new("cloud", dir.path().join("missing").join("cloud.db")),
        FakeProbe::new(true),
        Duration::from_secs(10),
    );

    assert!(!manager.test_cloud().await);
    assert!(!manager.is_cloud_reachable().await);
    assert!(!manager.check_now().await.is_cloud_available);
}

#[tokio::test]
async fn missing_cloud_database_is_unreachable() {
    let dir = TempDir::new().unwrap();
    let cloud_path = dir.path().join("cloud.db");
    let manager = ConnectivityManager::new(
        RecordStore::open("local", dir.path().join("local.db")).unwrap(),
        RecordStore::new("cloud", &cloud_path),
        FakeProbe::new(true),
        Duration::from_secs(10),
    );

    assert!(!manager.test_cloud().await);
    assert!(!manager.check_now().await.is_cloud_available);
    assert!(!cloud_path.exists());
}

#[tokio::test]
async fn set_mode_reports_and_persists() {
    let dir = TempDir::new().unwrap();
    let manager = manager(&dir, FakeProbe::new(true));
    let mut events = manager.subscribe();

    let status = manager.set_mode(ConnectionMode::Local).await;
    assert!(status.manual_override);
    assert_eq!(manager.status().await, status);

    let event = events.recv().await.unwrap();
    assert_eq!(event.mode, ConnectionMode::Local);
    assert!(event.message.contains("operator"));

    // Still Local after a successful check.
    manager.check_now().await;
    assert_eq!(manager.mode().await, ConnectionMode::Local);
}

#[tokio::test(start_paused = true)]
async fn monitor_checks_periodically_until_cancelled() {
    let dir = TempDir::new().unwrap();
    let probe = FakeProbe::new(false);
    let manager = Arc::new(manager(&dir, probe.clone()));
    let cancel = CancellationToken::new();

    let handle = manager.spawn_monitor(cancel.clone());
    tokio::time::sleep(Duration::from_secs(25)).await;
    // Ticks at 0s, 10s and 20s.
    assert_eq!(probe.calls(), 3);

    cancel.cancel();
    handle.await.unwrap();
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(probe.calls(), 3);
}

// ── TCP probe ────────────────────────────────────────────────────

#[tokio::test]
async fn tcp_probe_connects_to_listening_host() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();

    let probe = TcpProbe::new(vec![addr], Duration::from_secs(2));
    assert!(probe.is_network_available().await);
}

#[tokio::test]
async fn tcp_probe_tries_hosts_in_order() {
    let closed = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().to_string()
    };
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let open = listener.local_addr().unwrap().to_string();

    let probe = TcpProbe::new(vec![closed.clone(), open], Duration::from_secs(2));
    assert!(probe.is_network_available().await);

    let probe = TcpProbe::new(vec![closed], Duration::from_secs(2));
    assert!(!probe.is_network_available().await);
}

#[tokio::test]
async fn tcp_probe_without_hosts_is_offline() {
    let probe = TcpProbe::new(Vec::new(), Duration::from_millis(100));
    assert!(!probe.is_network_available().await);
}
