//! Scheduled incremental sync.
//!
//! After a warm-up delay the scheduler ticks on a fixed interval until its
//! cancellation token fires. A tick re-tests the cloud and, when it is
//! reachable, runs an incremental sync. Nothing a tick does can stop the
//! loop; only cancellation does.

use crate::config::SchedulerConfig;
use crate::error::SyncError;
use crate::orchestrator::SyncOrchestrator;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Lifecycle of the scheduler loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SchedulerState {
    /// Waiting for warm-up or the next tick.
    Idle,
    /// A tick is in progress.
    Running,
    /// The loop has exited.
    Stopped,
}

/// What one tick did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    Completed { synced: u64 },
    CompletedWithErrors { synced: u64, failed: u64 },
    /// The cloud was unreachable; the tick was skipped.
    Offline,
    /// Another run was active.
    Busy,
    Failed(String),
}

/// Background trigger for incremental syncs.
pub struct SyncScheduler {
    orchestrator: Arc<SyncOrchestrator>,
    warmup: Duration,
    interval: Duration,
    state: watch::Sender<SchedulerState>,
}

impl SyncScheduler {
    pub fn new(orchestrator: Arc<SyncOrchestrator>, warmup: Duration, interval: Duration) -> Self {
        let (state, _) = watch::channel(SchedulerState::Idle);
        Self {
            orchestrator,
            warmup,
            interval,
            state,
        }
    }

    pub fn from_config(orchestrator: Arc<SyncOrchestrator>, config: &SchedulerConfig) -> Self {
        Self::new(orchestrator, config.warmup(), config.interval())
    }

    /// Watches the scheduler's state.
    pub fn state(&self) -> watch::Receiver<SchedulerState> {
        self.state.subscribe()
    }

    /// Runs one tick.
    pub async fn tick(&self, cancel: &CancellationToken) -> TickOutcome {
        self.state.send_replace(SchedulerState::Running);
        let outcome = self.tick_inner(cancel).await;
        self.state.send_replace(SchedulerState::Idle);

        match &outcome {
            TickOutcome::Completed { synced } => {
                info!("Scheduled sync completed: {} record(s) synced", synced)
            }
            TickOutcome::CompletedWithErrors { synced, failed } => warn!(
                "Scheduled sync completed with errors: {} synced, {} failed",
                synced, failed
            ),
            TickOutcome::Offline => debug!("Scheduled sync skipped: cloud offline"),
            TickOutcome::Busy => debug!("Scheduled sync skipped: another run is active"),
            TickOutcome::Failed(e) => error!("Scheduled sync failed: {}", e),
        }
        outcome
    }

    async fn tick_inner(&self, cancel: &CancellationToken) -> TickOutcome {
        if !self
            .orchestrator
            .connectivity()
            .check_now()
            .await
            .is_cloud_available
        {
            return TickOutcome::Offline;
        }
        match self.orchestrator.sync_incremental(cancel).await {
            Ok(result) if result.offline => TickOutcome::Offline,
            Ok(result) if result.success => TickOutcome::Completed {
                synced: result.entities_synced,
            },
            Ok(result) => TickOutcome::CompletedWithErrors {
                synced: result.entities_synced,
                failed: result.entities_failed,
            },
            Err(SyncError::AlreadyRunning) => TickOutcome::Busy,
            Err(e) => TickOutcome::Failed(e.to_string()),
        }
    }

    /// Runs the loop until `cancel` fires.
    pub async fn run(&self, cancel: CancellationToken) {
        info!(
            "Sync scheduler started (warm-up {:?}, interval {:?})",
            self.warmup, self.interval
        );
        self.state.send_replace(SchedulerState::Idle);

        let mut delay = self.warmup;
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
            self.tick(&cancel).await;
            delay = self.interval;
        }

        self.state.send_replace(SchedulerState::Stopped);
        info!("Sync scheduler stopped");
    }

    /// Spawns [`run`](Self::run) on the runtime.
    pub fn spawn(self: Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move { self.run(cancel).await })
    }
}
