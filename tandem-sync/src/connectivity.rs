//! Endpoint reachability and operating mode.
//!
//! The manager owns both store handles and a small state machine
//! ([`ConnectionStatus`]). Every change goes through
//! [`ConnectionStatus::apply`], and each transition that changes what a
//! caller can observe is broadcast as a [`ConnectionStatusChanged`] event.
//!
//! Reachability of the cloud is tested in two stages: a cheap network
//! probe first, then a real query against the cloud store only when the
//! network is up.

use crate::config::ConnectivityConfig;
use crate::run_blocking;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tandem_store::RecordStore;
use tandem_types::ConnectionMode;
use tokio::net::TcpStream;
use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const EVENT_CAPACITY: usize = 64;

/// Network-liveness check run before any cloud store probe.
#[async_trait]
pub trait NetworkProbe: Send + Sync {
    /// Returns true if the network looks usable. Never fails: probe errors
    /// mean "unavailable".
    async fn is_network_available(&self) -> bool;
}

/// Probes by opening a TCP connection to well-known hosts.
#[derive(Debug, Clone)]
pub struct TcpProbe {
    hosts: Vec<String>,
    timeout: Duration,
}

impl TcpProbe {
    pub fn new(hosts: Vec<String>, timeout: Duration) -> Self {
        Self { hosts, timeout }
    }

    pub fn from_config(config: &ConnectivityConfig) -> Self {
        Self::new(config.probe_hosts.clone(), config.probe_timeout())
    }
}

#[async_trait]
impl NetworkProbe for TcpProbe {
    async fn is_network_available(&self) -> bool {
        for host in &self.hosts {
            match tokio::time::timeout(self.timeout, TcpStream::connect(host.as_str())).await {
                Ok(Ok(_)) => return true,
                Ok(Err(e)) => debug!("Network probe to {} failed: {}", host, e),
                Err(_) => debug!("Network probe to {} timed out", host),
            }
        }
        false
    }
}

/// Immutable snapshot of the connection state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionStatus {
    pub mode: ConnectionMode,
    pub is_cloud_available: bool,
    /// Set while an operator-chosen Local or Cloud mode suspends automatic
    /// mode switching.
    pub manual_override: bool,
    pub last_checked: Option<DateTime<Utc>>,
}

impl Default for ConnectionStatus {
    fn default() -> Self {
        Self {
            mode: ConnectionMode::Hybrid,
            is_cloud_available: false,
            manual_override: false,
            last_checked: None,
        }
    }
}

/// An input to the connection state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// A reachability check finished with this result.
    Reachability(bool),
    /// An operator picked a mode.
    ManualMode(ConnectionMode),
}

/// Emitted on every mode or availability transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionStatusChanged {
    pub is_cloud_available: bool,
    pub mode: ConnectionMode,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl ConnectionStatus {
    /// Computes the state after `transition`, plus the event to emit when
    /// the mode or availability changed.
    #[must_use]
    pub fn apply(
        &self,
        transition: Transition,
        at: DateTime<Utc>,
    ) -> (ConnectionStatus, Option<ConnectionStatusChanged>) {
        let mut next = self.clone();
        let message = match transition {
            Transition::Reachability(available) => {
                next.is_cloud_available = available;
                next.last_checked = Some(at);
                if !next.manual_override {
                    next.mode = if available {
                        ConnectionMode::Hybrid
                    } else {
                        ConnectionMode::Local
                    };
                }
                match (self.is_cloud_available, available) {
                    (false, true) => "Cloud store reachable".to_string(),
                    (true, false) => "Cloud store unreachable".to_string(),
                    _ => format!("Mode is {}", next.mode),
                }
            }
            Transition::ManualMode(mode) => {
                next.mode = mode;
                next.manual_override = mode != ConnectionMode::Hybrid;
                if next.manual_override {
                    format!("Mode set to {} by operator; automatic switching suspended", mode)
                } else {
                    "Mode set to Hybrid by operator; automatic switching resumed".to_string()
                }
            }
        };

        let changed = next.mode != self.mode
            || next.is_cloud_available != self.is_cloud_available
            || next.manual_override != self.manual_override;
        let event = changed.then(|| ConnectionStatusChanged {
            is_cloud_available: next.is_cloud_available,
            mode: next.mode,
            message,
            timestamp: at,
        });
        (next, event)
    }
}

/// Tracks endpoint reachability and the current operating mode.
pub struct ConnectivityManager {
    local: RecordStore,
    cloud: RecordStore,
    probe: Arc<dyn NetworkProbe>,
    status: RwLock<ConnectionStatus>,
    events: broadcast::Sender<ConnectionStatusChanged>,
    monitor_interval: Duration,
}

impl ConnectivityManager {
    pub fn new(
        local: RecordStore,
        cloud: RecordStore,
        probe: Arc<dyn NetworkProbe>,
        monitor_interval: Duration,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            local,
            cloud,
            probe,
            status: RwLock::new(ConnectionStatus::default()),
            events,
            monitor_interval,
        }
    }

    pub fn local(&self) -> &RecordStore {
        &self.local
    }

    pub fn cloud(&self) -> &RecordStore {
        &self.cloud
    }

    /// Returns true if the local store answers a query.
    pub async fn test_local(&self) -> bool {
        test_store(&self.local).await
    }

    /// Returns true if the cloud store answers a query.
    pub async fn test_cloud(&self) -> bool {
        test_store(&self.cloud).await
    }

    /// Two-stage check: network probe, then the cloud store itself.
    pub async fn is_cloud_reachable(&self) -> bool {
        if !self.probe.is_network_available().await {
            debug!("Network probe failed; skipping cloud store probe");
            return false;
        }
        self.test_cloud().await
    }

    /// Re-tests the cloud and feeds the result into the state machine.
    pub async fn check_now(&self) -> ConnectionStatus {
        let available = self.is_cloud_reachable().await;
        self.transition(Transition::Reachability(available)).await
    }

    pub async fn status(&self) -> ConnectionStatus {
        self.status.read().await.clone()
    }

    pub async fn mode(&self) -> ConnectionMode {
        self.status.read().await.mode
    }

    /// Sets the mode by hand. Local and Cloud suspend automatic switching
    /// until Hybrid is set again.
    pub async fn set_mode(&self, mode: ConnectionMode) -> ConnectionStatus {
        info!("Connection mode set to {} by operator", mode);
        self.transition(Transition::ManualMode(mode)).await
    }

    /// Subscribes to status-change events.
    pub fn subscribe(&self) -> broadcast::Receiver<ConnectionStatusChanged> {
        self.events.subscribe()
    }

    async fn transition(&self, transition: Transition) -> ConnectionStatus {
        let mut status = self.status.write().await;
        let (next, event) = status.apply(transition, Utc::now());
        *status = next.clone();
        drop(status);

        if let Some(event) = event {
            info!(
                "Connection status changed: mode={}, cloud_available={} ({})",
                event.mode, event.is_cloud_available, event.message
            );
            // No subscribers is fine.
            let _ = self.events.send(event);
        }
        next
    }

    /// Spawns the periodic reachability monitor.
    ///
    /// Checks run one at a time; ticks that come due while a check is still
    /// running are dropped rather than queued.
    pub fn spawn_monitor(self: &Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(manager.monitor_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            info!("Connectivity monitor started (every {:?})", manager.monitor_interval);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        manager.check_now().await;
                    }
                }
            }
            info!("Connectivity monitor stopped");
        })
    }
}

async fn test_store(store: &RecordStore) -> bool {
    let probe = store.clone();
    match run_blocking(move || probe.ping()).await {
        Ok(()) => true,
        Err(e) => {
            warn!("Store {} unreachable: {}", store.name(), e);
            false
        }
    }
}
