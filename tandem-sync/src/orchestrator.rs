//! Sync orchestrator: drives one run across every registered record type.
//!
//! A run checks cloud reachability first, then sweeps the registry in
//! priority order. For each type it detects local and cloud changes,
//! pushes local changes to the cloud and pulls cloud changes to the local
//! store. Every record apply is its own committed write, retried under the
//! configured [`RetryPolicy`], and followed by a metadata upsert. Failures
//! are contained at the smallest level that still makes sense (record, then
//! type, then run) and the run's report is always written to the sync log.
//!
//! At most one run is active at a time. A second request fails fast with
//! [`SyncError::AlreadyRunning`].

use crate::config::SyncConfig;
use crate::connectivity::{ConnectivityManager, NetworkProbe};
use crate::detector::ChangeDetector;
use crate::error::{EngineResult, SyncError};
use crate::handler::{HandlerRegistry, RecordHandler};
use crate::resolver::{ConflictResolver, Side};
use crate::retry::RetryPolicy;
use crate::run_blocking;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tandem_store::{RecordStore, SyncJournal};
use tandem_types::{
    ChangeRecord, ConflictStrategy, ConnectionMode, MetadataStatus, RecordId, SyncDirection,
    SyncLog, SyncLogStatus, SyncMetadata, SyncRecord, SyncType, TypeSummary, Versioned,
};
use tokio::sync::{Mutex, MutexGuard, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Report of one sync run. Persisted as a [`SyncLog`] row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncResult {
    pub session_id: Uuid,
    pub sync_type: SyncType,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub success: bool,
    pub error_message: Option<String>,
    pub entities_synced: u64,
    pub entities_failed: u64,
    pub conflicts_detected: u64,
    pub conflicts_resolved: u64,
    pub per_type: Vec<TypeSummary>,
    pub errors: Vec<String>,
    /// The run was skipped because the cloud was unreachable or disabled.
    pub offline: bool,
    /// The run stopped early on cancellation.
    pub cancelled: bool,
}

impl SyncResult {
    /// The log row recorded for this run.
    pub fn to_log(&self) -> SyncLog {
        SyncLog {
            id: None,
            session_id: self.session_id,
            started_at: self.started_at,
            completed_at: self.completed_at,
            sync_type: self.sync_type,
            status: if self.success {
                SyncLogStatus::Completed
            } else {
                SyncLogStatus::Failed
            },
            entities_synced: self.entities_synced,
            entities_failed: self.entities_failed,
            conflicts_detected: self.conflicts_detected,
            conflicts_resolved: self.conflicts_resolved,
            error_message: self.error_message.clone(),
            per_type: self.per_type.clone(),
            errors: self.errors.clone(),
        }
    }

    /// Counts for one record type, if it took part in the run.
    pub fn summary_for(&self, entity_type: &str) -> Option<&TypeSummary> {
        self.per_type.iter().find(|s| s.entity_type == entity_type)
    }
}

/// Outcome of [`SyncOrchestrator::resolve_conflict`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManualResolution {
    pub metadata_id: i64,
    pub entity_type: String,
    pub entity_id: RecordId,
    pub winner: Side,
    pub message: String,
}

#[derive(Debug, Clone, Copy)]
struct RunPlan {
    sync_type: SyncType,
    push: bool,
    pull: bool,
    incremental: bool,
    only: Option<&'static str>,
}

impl RunPlan {
    fn both(sync_type: SyncType, incremental: bool) -> Self {
        Self {
            sync_type,
            push: true,
            pull: true,
            incremental,
            only: None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum WriteOp {
    Insert,
    Update,
    Delete,
}

impl fmt::Display for WriteOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Insert => write!(f, "insert"),
            Self::Update => write!(f, "update"),
            Self::Delete => write!(f, "delete"),
        }
    }
}

enum Applied {
    /// The target store was written.
    Written,
    /// Nothing to write: already in sync, superseded or left for an operator.
    Skipped,
}

/// Mutable bookkeeping for the run in progress.
struct RunState {
    session_id: Uuid,
    sync_type: SyncType,
    started_at: DateTime<Utc>,
    per_type: Vec<TypeSummary>,
    errors: Vec<String>,
    conflicts_seen: HashSet<(String, RecordId)>,
    resolved_seen: HashSet<(String, RecordId)>,
    /// Records the push pass wrote or parked.
    settled: HashSet<(String, RecordId)>,
    fatal: Option<String>,
    offline: bool,
    cancelled: bool,
}

impl RunState {
    fn new(sync_type: SyncType) -> Self {
        Self {
            session_id: Uuid::now_v7(),
            sync_type,
            started_at: Utc::now(),
            per_type: Vec::new(),
            errors: Vec::new(),
            conflicts_seen: HashSet::new(),
            resolved_seen: HashSet::new(),
            settled: HashSet::new(),
            fatal: None,
            offline: false,
            cancelled: false,
        }
    }

    /// Counts a conflict once per record per run, whichever pass sees it.
    fn conflict_detected(&mut self, change: &ChangeRecord, summary: &mut TypeSummary) {
        let key = (change.entity_type.clone(), change.entity_id.clone());
        if self.conflicts_seen.insert(key) {
            summary.conflicts += 1;
        }
    }

    fn conflict_resolved(&mut self, change: &ChangeRecord) {
        self.resolved_seen
            .insert((change.entity_type.clone(), change.entity_id.clone()));
    }

    fn settle(&mut self, change: &ChangeRecord, direction: SyncDirection) {
        if direction == SyncDirection::Push {
            self.settled
                .insert((change.entity_type.clone(), change.entity_id.clone()));
        }
    }

    fn is_settled(&self, change: &ChangeRecord) -> bool {
        self.settled
            .contains(&(change.entity_type.clone(), change.entity_id.clone()))
    }

    fn finish(self) -> SyncResult {
        let entities_synced = self.per_type.iter().map(TypeSummary::synced).sum();
        let entities_failed = self.per_type.iter().map(|s| s.failed).sum();
        let success =
            self.fatal.is_none() && !self.offline && !self.cancelled && self.errors.is_empty();

        let error_message = if let Some(fatal) = self.fatal {
            Some(fatal)
        } else if self.cancelled {
            Some(format!(
                "Sync cancelled; partial results ({} error(s))",
                self.errors.len()
            ))
        } else if !self.errors.is_empty() {
            Some(format!("{} error(s) during sync", self.errors.len()))
        } else {
            None
        };

        SyncResult {
            session_id: self.session_id,
            sync_type: self.sync_type,
            started_at: self.started_at,
            completed_at: Utc::now(),
            success,
            error_message,
            entities_synced,
            entities_failed,
            conflicts_detected: self.conflicts_seen.len() as u64,
            conflicts_resolved: self.resolved_seen.len() as u64,
            per_type: self.per_type,
            errors: self.errors,
            offline: self.offline,
            cancelled: self.cancelled,
        }
    }
}

/// Holds the run lock; clears the running flag when dropped.
struct RunGuard<'a> {
    _lock: MutexGuard<'a, ()>,
    running: &'a AtomicBool,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Release);
    }
}

/// Coordinates sync runs between the local and the cloud store.
pub struct SyncOrchestrator {
    connectivity: Arc<ConnectivityManager>,
    registry: HandlerRegistry,
    journal: SyncJournal,
    detector: ChangeDetector,
    resolver: ConflictResolver,
    retry: RetryPolicy,
    strategy: ConflictStrategy,
    propagate_deletes: bool,
    run_lock: Mutex<()>,
    running: AtomicBool,
    last_result: RwLock<Option<SyncResult>>,
}

impl SyncOrchestrator {
    pub fn new(
        config: &SyncConfig,
        connectivity: Arc<ConnectivityManager>,
        registry: HandlerRegistry,
        journal: SyncJournal,
    ) -> Self {
        Self {
            connectivity,
            registry,
            journal,
            detector: ChangeDetector::new(config.batch_size),
            resolver: ConflictResolver::new(),
            retry: RetryPolicy::from_config(&config.retry),
            strategy: config.conflict_strategy,
            propagate_deletes: config.propagate_deletes,
            run_lock: Mutex::new(()),
            running: AtomicBool::new(false),
            last_result: RwLock::new(None),
        }
    }

    /// Builds the engine from configuration: opens the local store and the
    /// journal, describes the cloud store (it may be offline at startup and
    /// is never created here) and creates the local tables of every
    /// registered type.
    pub fn from_config(
        config: &SyncConfig,
        registry: HandlerRegistry,
        probe: Arc<dyn NetworkProbe>,
    ) -> EngineResult<Self> {
        config.validate()?;
        let local = RecordStore::open(&config.local.name, &config.local.connection)?;
        let cloud = RecordStore::new(&config.cloud.name, &config.cloud.connection);
        let journal = SyncJournal::open(&config.local.connection)?;
        for handler in registry.ordered() {
            handler.prepare(&local)?;
        }
        let connectivity = Arc::new(ConnectivityManager::new(
            local,
            cloud,
            probe,
            config.connectivity.monitor_interval(),
        ));
        info!(
            "Sync engine ready: {} record type(s) [{}]",
            registry.len(),
            registry.type_names().join(", ")
        );
        Ok(Self::new(config, connectivity, registry, journal))
    }

    pub fn connectivity(&self) -> &Arc<ConnectivityManager> {
        &self.connectivity
    }

    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    pub fn journal(&self) -> &SyncJournal {
        &self.journal
    }

    pub fn strategy(&self) -> ConflictStrategy {
        self.strategy
    }

    /// Returns true while a run or a manual resolution is in progress.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    fn try_begin(&self) -> EngineResult<RunGuard<'_>> {
        let lock = self
            .run_lock
            .try_lock()
            .map_err(|_| SyncError::AlreadyRunning)?;
        self.running.store(true, Ordering::Release);
        Ok(RunGuard {
            _lock: lock,
            running: &self.running,
        })
    }

    /// The report of the most recent run, if any.
    pub async fn last_result(&self) -> Option<SyncResult> {
        self.last_result.read().await.clone()
    }

    // ── Runs ─────────────────────────────────────────────────────

    /// Reconciles every record of every type in both directions.
    pub async fn sync_all(&self, cancel: &CancellationToken) -> EngineResult<SyncResult> {
        self.run(RunPlan::both(SyncType::Full, false), cancel).await
    }

    /// Reconciles changes made since the last successful full or
    /// incremental run started. Without one, every record is considered.
    pub async fn sync_incremental(&self, cancel: &CancellationToken) -> EngineResult<SyncResult> {
        self.run(RunPlan::both(SyncType::Incremental, true), cancel).await
    }

    /// Sends local changes to the cloud only.
    pub async fn push_to_cloud(&self, cancel: &CancellationToken) -> EngineResult<SyncResult> {
        let plan = RunPlan {
            pull: false,
            ..RunPlan::both(SyncType::Push, false)
        };
        self.run(plan, cancel).await
    }

    /// Brings cloud changes to the local store only.
    pub async fn pull_from_cloud(&self, cancel: &CancellationToken) -> EngineResult<SyncResult> {
        let plan = RunPlan {
            push: false,
            ..RunPlan::both(SyncType::Pull, false)
        };
        self.run(plan, cancel).await
    }

    /// Reconciles a single registered record type in both directions.
    pub async fn sync_one<T: SyncRecord>(
        &self,
        cancel: &CancellationToken,
    ) -> EngineResult<SyncResult> {
        if self.registry.get(T::TYPE_NAME).is_none() {
            return Err(SyncError::UnknownType(T::TYPE_NAME.to_string()));
        }
        let plan = RunPlan {
            only: Some(T::TYPE_NAME),
            ..RunPlan::both(SyncType::Single, false)
        };
        self.run(plan, cancel).await
    }

    async fn run(&self, plan: RunPlan, cancel: &CancellationToken) -> EngineResult<SyncResult> {
        let _guard = self.try_begin().inspect_err(|_| {
            warn!("{} sync requested while another run is active", plan.sync_type);
        })?;

        let mut run = RunState::new(plan.sync_type);
        info!("Sync {} started ({})", run.session_id, plan.sync_type);

        if let Err(e) = self.execute(plan, &mut run, cancel).await {
            error!("Sync {} failed: {}", run.session_id, e);
            run.fatal = Some(e.to_string());
        }

        let mut result = run.finish();
        self.persist_log(&mut result).await;

        if result.success {
            info!(
                "Sync {} completed: {} synced, {} conflict(s) ({} resolved)",
                result.session_id,
                result.entities_synced,
                result.conflicts_detected,
                result.conflicts_resolved
            );
        } else {
            warn!(
                "Sync {} finished with errors: {} synced, {} failed: {}",
                result.session_id,
                result.entities_synced,
                result.entities_failed,
                result.error_message.as_deref().unwrap_or("unknown error")
            );
        }

        *self.last_result.write().await = Some(result.clone());
        Ok(result)
    }

    async fn execute(
        &self,
        plan: RunPlan,
        run: &mut RunState,
        cancel: &CancellationToken,
    ) -> EngineResult<()> {
        let status = self.connectivity.status().await;
        if status.manual_override && status.mode == ConnectionMode::Local {
            warn!("Sync skipped: connection mode is set to Local");
            run.offline = true;
            run.fatal = Some("Cloud sync disabled: connection mode is Local".into());
            return Ok(());
        }
        if !self.connectivity.check_now().await.is_cloud_available {
            warn!("Sync skipped: cloud store is unreachable");
            run.offline = true;
            run.fatal = Some("Cloud store is unreachable; sync skipped".into());
            return Ok(());
        }

        let since = if plan.incremental {
            self.checkpoint().await?
        } else {
            None
        };
        if let Some(since) = since {
            debug!("Using checkpoint {}", since);
        }

        let handlers: Vec<Arc<dyn RecordHandler>> = match plan.only {
            Some(name) => vec![self
                .registry
                .get(name)
                .ok_or_else(|| SyncError::UnknownType(name.to_string()))?],
            None => self.registry.ordered().to_vec(),
        };

        for handler in handlers {
            if cancel.is_cancelled() {
                run.cancelled = true;
                break;
            }
            let name = handler.type_name();
            let mut summary = TypeSummary::new(name);
            match self
                .sync_record_type(&handler, plan, since, run, &mut summary, cancel)
                .await
            {
                Ok(()) => info!(
                    "{}: pushed {}, pulled {}, failed {}, conflicts {}, skipped {}",
                    name,
                    summary.pushed,
                    summary.pulled,
                    summary.failed,
                    summary.conflicts,
                    summary.skipped
                ),
                Err(e) => {
                    warn!("Sync of {} failed: {}", name, e);
                    run.errors.push(format!("{name}: {e}"));
                }
            }
            run.per_type.push(summary);
        }

        if run.cancelled {
            info!("Sync {} cancelled", run.session_id);
        }
        Ok(())
    }

    async fn checkpoint(&self) -> EngineResult<Option<DateTime<Utc>>> {
        let journal = self.journal.clone();
        let last = run_blocking(move || journal.last_successful_sync()).await?;
        Ok(last.map(|log| log.started_at))
    }

    async fn sync_record_type(
        &self,
        handler: &Arc<dyn RecordHandler>,
        plan: RunPlan,
        since: Option<DateTime<Utc>>,
        run: &mut RunState,
        summary: &mut TypeSummary,
        cancel: &CancellationToken,
    ) -> EngineResult<()> {
        let local = self.connectivity.local().clone();
        let cloud = self.connectivity.cloud().clone();
        {
            let handler = Arc::clone(handler);
            let (local, cloud) = (local.clone(), cloud.clone());
            run_blocking(move || {
                handler.prepare(&local)?;
                handler.prepare(&cloud)
            })
            .await?;
        }

        let local_changes = if plan.push {
            self.detect(handler, &local, since).await?
        } else {
            Vec::new()
        };
        let cloud_changes = if plan.pull {
            self.detect(handler, &cloud, since).await?
        } else {
            Vec::new()
        };
        debug!(
            "{}: {} local and {} cloud change(s)",
            handler.type_name(),
            local_changes.len(),
            cloud_changes.len()
        );

        let passes = [
            (SyncDirection::Push, local_changes),
            (SyncDirection::Pull, cloud_changes),
        ];
        for (direction, changes) in passes {
            for change in changes {
                if cancel.is_cancelled() {
                    run.cancelled = true;
                    return Ok(());
                }
                self.apply_counted(handler, &change, direction, run, summary)
                    .await;
            }
        }
        Ok(())
    }

    async fn detect(
        &self,
        handler: &Arc<dyn RecordHandler>,
        store: &RecordStore,
        since: Option<DateTime<Utc>>,
    ) -> EngineResult<Vec<ChangeRecord>> {
        let handler = Arc::clone(handler);
        let store = store.clone();
        let detector = self.detector;
        let with_deletes = self.propagate_deletes && handler.soft_delete();
        run_blocking(move || {
            let mut changes = handler.get_changed(&detector, &store, since)?;
            if with_deletes {
                changes.extend(handler.get_deleted(&detector, &store, since)?);
            }
            Ok::<_, SyncError>(changes)
        })
        .await
    }

    // ── Record apply ─────────────────────────────────────────────

    async fn apply_counted(
        &self,
        handler: &Arc<dyn RecordHandler>,
        change: &ChangeRecord,
        direction: SyncDirection,
        run: &mut RunState,
        summary: &mut TypeSummary,
    ) {
        match self.apply_change(handler, change, direction, run, summary).await {
            Ok(Applied::Written) => match direction {
                SyncDirection::Pull => summary.pulled += 1,
                _ => summary.pushed += 1,
            },
            Ok(Applied::Skipped) => summary.skipped += 1,
            Err(e) => {
                summary.failed += 1;
                warn!(
                    "Failed to {} {}/{}: {}",
                    direction, change.entity_type, change.entity_id, e
                );
                run.errors.push(format!(
                    "{}/{} ({}): {}",
                    change.entity_type, change.entity_id, direction, e
                ));
            }
        }
    }

    async fn apply_change(
        &self,
        handler: &Arc<dyn RecordHandler>,
        change: &ChangeRecord,
        direction: SyncDirection,
        run: &mut RunState,
        summary: &mut TypeSummary,
    ) -> EngineResult<Applied> {
        // The push pass already wrote or parked this record; the cloud
        // snapshot taken before it is superseded.
        if direction == SyncDirection::Pull && run.is_settled(change) {
            debug!(
                "{}/{} already settled by the push pass",
                change.entity_type, change.entity_id
            );
            return Ok(Applied::Skipped);
        }

        let metadata = self.load_metadata(change).await?;
        if let Some(meta) = &metadata {
            if !meta.is_stale_for(change.changed_at) {
                debug!(
                    "{}/{} unchanged since last sync",
                    change.entity_type, change.entity_id
                );
                return Ok(Applied::Skipped);
            }
        }

        let target = self.target_store(direction);
        let current = self.fetch(handler, target, &change.entity_id).await?;

        let Some(current) = current else {
            if change.is_deleted() {
                // Nothing left to remove on the target.
                self.mark_synced(change, direction).await;
                return Ok(Applied::Skipped);
            }
            self.write(handler, target, change, WriteOp::Insert).await?;
            debug!(
                "Inserted {}/{} on {}",
                change.entity_type,
                change.entity_id,
                target.name()
            );
            self.mark_synced(change, direction).await;
            run.settle(change, direction);
            return Ok(Applied::Written);
        };

        if current.content_hash == change.content_hash
            || (change.is_deleted() && current.is_deleted())
        {
            self.mark_synced(change, direction).await;
            return Ok(Applied::Skipped);
        }

        // The target still holds what was last synced: plain fast-forward.
        let target_unchanged = metadata.as_ref().is_some_and(|m| {
            m.status == MetadataStatus::Synced && m.content_hash == current.content_hash
        });

        if !target_unchanged {
            let (local, cloud) = match direction {
                SyncDirection::Pull => (&current, change),
                _ => (change, &current),
            };
            // Deleted-vs-live pairs always conflict and are settled by the
            // same rule whichever side deleted.
            if self.resolver.has_conflict(local, cloud) {
                run.conflict_detected(change, summary);
                let resolution = self.resolver.resolve(local, cloud, self.strategy);
                if !resolution.resolved {
                    warn!(
                        "Conflict on {}/{} left for manual resolution",
                        change.entity_type, change.entity_id
                    );
                    self.record_conflict(change, direction, &resolution.message)
                        .await?;
                    run.settle(change, direction);
                    return Ok(Applied::Skipped);
                }
                run.conflict_resolved(change);

                let incoming = match direction {
                    SyncDirection::Pull => Side::Cloud,
                    _ => Side::Local,
                };
                if resolution.side != Some(incoming) {
                    debug!(
                        "{}/{}: kept {} version ({})",
                        change.entity_type,
                        change.entity_id,
                        target.name(),
                        resolution.message
                    );
                    return Ok(Applied::Skipped);
                }
                debug!(
                    "{}/{}: {}",
                    change.entity_type, change.entity_id, resolution.message
                );
            }
        }

        if change.is_deleted() {
            self.write(handler, target, change, WriteOp::Delete).await?;
            debug!(
                "Deleted {}/{} from {}",
                change.entity_type,
                change.entity_id,
                target.name()
            );
        } else {
            self.write(handler, target, change, WriteOp::Update).await?;
            debug!(
                "Updated {}/{} on {}",
                change.entity_type,
                change.entity_id,
                target.name()
            );
        }
        self.mark_synced(change, direction).await;
        run.settle(change, direction);
        Ok(Applied::Written)
    }

    fn target_store(&self, direction: SyncDirection) -> &RecordStore {
        match direction {
            SyncDirection::Pull => self.connectivity.local(),
            _ => self.connectivity.cloud(),
        }
    }

    async fn fetch(
        &self,
        handler: &Arc<dyn RecordHandler>,
        store: &RecordStore,
        id: &RecordId,
    ) -> EngineResult<Option<ChangeRecord>> {
        let handler = Arc::clone(handler);
        let store = store.clone();
        let id = id.clone();
        let detector = self.detector;
        run_blocking(move || handler.fetch(&detector, &store, &id)).await
    }

    async fn write(
        &self,
        handler: &Arc<dyn RecordHandler>,
        target: &RecordStore,
        change: &ChangeRecord,
        op: WriteOp,
    ) -> EngineResult<()> {
        let name = format!(
            "{} {}/{} on {}",
            op,
            change.entity_type,
            change.entity_id,
            target.name()
        );
        self.retry
            .execute(&name, || {
                let handler = Arc::clone(handler);
                let store = target.clone();
                let change = change.clone();
                run_blocking(move || match op {
                    WriteOp::Insert => handler.apply_insert(&store, &change),
                    WriteOp::Update => handler.apply_update(&store, &change),
                    WriteOp::Delete => handler.apply_delete(&store, &change.entity_id).map(|_| ()),
                })
            })
            .await
    }

    // ── Journal ──────────────────────────────────────────────────

    async fn load_metadata(&self, change: &ChangeRecord) -> EngineResult<Option<SyncMetadata>> {
        let journal = self.journal.clone();
        let entity_type = change.entity_type.clone();
        let entity_id = change.entity_id.clone();
        run_blocking(move || journal.get_metadata(&entity_type, &entity_id)).await
    }

    /// Records a successful apply. Failures are logged and never undo the
    /// data change.
    async fn mark_synced(&self, change: &ChangeRecord, direction: SyncDirection) {
        let meta = SyncMetadata::synced(
            &change.entity_type,
            change.entity_id.clone(),
            &change.content_hash,
            direction,
        );
        let journal = self.journal.clone();
        if let Err(e) = run_blocking(move || journal.upsert_metadata(&meta)).await {
            warn!(
                "Failed to record sync metadata for {}/{}: {}",
                change.entity_type, change.entity_id, e
            );
        }
    }

    async fn record_conflict(
        &self,
        change: &ChangeRecord,
        direction: SyncDirection,
        message: &str,
    ) -> EngineResult<()> {
        let journal = self.journal.clone();
        let change = change.clone();
        let message = message.to_string();
        run_blocking(move || {
            journal.record_conflict(
                &change.entity_type,
                &change.entity_id,
                &change.content_hash,
                direction,
                &message,
            )
        })
        .await?;
        Ok(())
    }

    /// Writes the run's log row. A failed write marks the run failed and is
    /// retried once with the failure recorded.
    async fn persist_log(&self, result: &mut SyncResult) {
        let journal = self.journal.clone();
        let log = result.to_log();
        let Err(e) = run_blocking(move || journal.save_log(&log)).await else {
            return;
        };

        error!("Failed to write sync log {}: {}", result.session_id, e);
        result.success = false;
        result.error_message = Some(format!("Failed to write sync log: {e}"));

        let journal = self.journal.clone();
        let log = result.to_log();
        if let Err(e) = run_blocking(move || journal.save_log(&log)).await {
            error!(
                "Failed to record sync log failure for {}: {}",
                result.session_id, e
            );
        }
    }

    // ── Manual conflict resolution ───────────────────────────────

    /// Settles a conflict left unresolved by the `Manual` strategy: the
    /// winner under `strategy` is written to the other store (a winning
    /// deletion removes the other row) and the metadata entry goes back to
    /// `Synced`.
    pub async fn resolve_conflict(
        &self,
        metadata_id: i64,
        strategy: ConflictStrategy,
    ) -> EngineResult<ManualResolution> {
        let _guard = self.try_begin()?;

        let journal = self.journal.clone();
        let meta = run_blocking(move || journal.get_metadata_by_id(metadata_id))
            .await?
            .ok_or_else(|| SyncError::NotFound(format!("sync metadata {metadata_id}")))?;
        if meta.status != MetadataStatus::Conflict {
            return Err(SyncError::NotFound(format!(
                "no pending conflict for sync metadata {metadata_id}"
            )));
        }
        let handler = self
            .registry
            .get(&meta.entity_type)
            .ok_or_else(|| SyncError::UnknownType(meta.entity_type.clone()))?;

        if !self.connectivity.check_now().await.is_cloud_available {
            return Err(SyncError::Offline("cloud store is unreachable".into()));
        }

        let local = self
            .fetch(&handler, self.connectivity.local(), &meta.entity_id)
            .await?;
        let cloud = self
            .fetch(&handler, self.connectivity.cloud(), &meta.entity_id)
            .await?;

        let (winner, side, loser_exists, message) = match (local, cloud) {
            (Some(local), Some(cloud)) => {
                let resolution = self.resolver.resolve(&local, &cloud, strategy);
                let (side, message) = match resolution.side {
                    Some(side) if resolution.resolved => (side, resolution.message),
                    _ => return Err(SyncError::Unresolved(resolution.message)),
                };
                let winner = match side {
                    Side::Local => local,
                    Side::Cloud => cloud,
                };
                (winner, side, true, message)
            }
            (Some(local), None) => (
                local,
                Side::Local,
                false,
                "Only the local version exists".to_string(),
            ),
            (None, Some(cloud)) => (
                cloud,
                Side::Cloud,
                false,
                "Only the cloud version exists".to_string(),
            ),
            (None, None) => {
                return Err(SyncError::NotFound(format!(
                    "{}/{} exists in neither store",
                    meta.entity_type, meta.entity_id
                )));
            }
        };

        let target = match side {
            Side::Local => self.connectivity.cloud(),
            Side::Cloud => self.connectivity.local(),
        };
        // A winning tombstone removes the other side's row, as in a run.
        let op = match (winner.is_deleted(), loser_exists) {
            (true, true) => Some(WriteOp::Delete),
            (true, false) => None,
            (false, true) => Some(WriteOp::Update),
            (false, false) => Some(WriteOp::Insert),
        };
        if let Some(op) = op {
            self.write(&handler, target, &winner, op).await?;
        }

        let synced = SyncMetadata::synced(
            &meta.entity_type,
            meta.entity_id.clone(),
            &winner.content_hash,
            SyncDirection::Both,
        );
        let journal = self.journal.clone();
        run_blocking(move || journal.upsert_metadata(&synced)).await?;

        info!(
            "Resolved conflict on {}/{} with {}: {} version kept",
            meta.entity_type, meta.entity_id, strategy, side
        );
        Ok(ManualResolution {
            metadata_id,
            entity_type: meta.entity_type,
            entity_id: meta.entity_id,
            winner: side,
            message,
        })
    }
}
