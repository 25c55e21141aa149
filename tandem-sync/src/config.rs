//! Engine configuration.
//!
//! Every field has a default so a configuration file only needs to name the
//! values it changes.

use crate::error::{EngineResult, SyncError};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tandem_types::ConflictStrategy;

/// Default change-query page size.
pub const DEFAULT_BATCH_SIZE: usize = 500;

/// Configuration for the sync engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// The local (branch/edge) endpoint. Also holds the sync journal.
    pub local: EndpointConfig,
    /// The central cloud endpoint.
    pub cloud: EndpointConfig,
    pub retry: RetryConfig,
    /// Rows read per page by change queries.
    pub batch_size: usize,
    /// Whether soft-deleted records are propagated to the other store.
    pub propagate_deletes: bool,
    /// Strategy applied to conflicts found during a run.
    pub conflict_strategy: ConflictStrategy,
    pub connectivity: ConnectivityConfig,
    pub scheduler: SchedulerConfig,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            local: EndpointConfig::new("local", "tandem-local.db"),
            cloud: EndpointConfig::new("cloud", "tandem-cloud.db"),
            retry: RetryConfig::default(),
            batch_size: DEFAULT_BATCH_SIZE,
            propagate_deletes: true,
            conflict_strategy: ConflictStrategy::default(),
            connectivity: ConnectivityConfig::default(),
            scheduler: SchedulerConfig::default(),
        }
    }
}

impl SyncConfig {
    /// Checks values that would make the engine misbehave.
    pub fn validate(&self) -> EngineResult<()> {
        if self.batch_size == 0 {
            return Err(SyncError::Config("batch_size must be at least 1".into()));
        }
        if self.local.connection == self.cloud.connection {
            return Err(SyncError::Config(format!(
                "local and cloud endpoints share the same database: {}",
                self.local.connection.display()
            )));
        }
        if self.scheduler.interval_secs == 0 {
            return Err(SyncError::Config("scheduler.interval_secs must be at least 1".into()));
        }
        Ok(())
    }
}

/// One named database endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointConfig {
    pub name: String,
    /// Path of the endpoint's database file.
    pub connection: PathBuf,
}

impl EndpointConfig {
    pub fn new(name: impl Into<String>, connection: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            connection: connection.into(),
        }
    }
}

/// Retry tuning for record applies.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts per operation, including the first.
    pub max_retries: u32,
    /// Delay before the second attempt.
    pub base_delay_ms: u64,
    /// Double the delay after every failed attempt.
    pub exponential: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 1_000,
            exponential: true,
        }
    }
}

/// Reachability probing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectivityConfig {
    /// `host:port` pairs for the network-liveness probe. Any one answering
    /// counts as online.
    pub probe_hosts: Vec<String>,
    pub probe_timeout_ms: u64,
    /// How often the background monitor re-tests the cloud.
    pub monitor_interval_secs: u64,
}

impl Default for ConnectivityConfig {
    fn default() -> Self {
        Self {
            probe_hosts: vec!["1.1.1.1:443".into(), "8.8.8.8:53".into()],
            probe_timeout_ms: 3_000,
            monitor_interval_secs: 120,
        }
    }
}

impl ConnectivityConfig {
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn monitor_interval(&self) -> Duration {
        Duration::from_secs(self.monitor_interval_secs)
    }
}

/// Scheduled incremental sync.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub enabled: bool,
    /// Delay before the first tick after startup.
    pub warmup_secs: u64,
    /// Delay between ticks.
    pub interval_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            warmup_secs: 30,
            interval_secs: 300,
        }
    }
}

impl SchedulerConfig {
    pub fn warmup(&self) -> Duration {
        Duration::from_secs(self.warmup_secs)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}
