//! Bidirectional local/cloud sync engine for tandem.
//!
//! Replicates records between two independent SQLite endpoints, a local
//! store that keeps working offline and a central cloud store, and
//! reconciles them whenever the cloud is reachable.
//!
//! # Architecture
//!
//! ## Components
//!
//! - **Retry**: bounded retries with exponential backoff for store writes
//! - **Connectivity**: two-stage reachability checks, operating mode state
//!   machine, status-change events
//! - **Detector**: change queries since a checkpoint, content fingerprints
//! - **Resolver**: conflict detection and strategy-driven resolution
//! - **Handler registry**: per-type store operations in priority order
//! - **Orchestrator**: one sync run across all registered types
//! - **Scheduler**: periodic incremental sync until cancelled
//!
//! ## Sync Process
//!
//! 1. **Reachability**: abort early if the cloud cannot be reached
//! 2. **Detection**: collect local and cloud changes for each type
//! 3. **Push**: apply local changes to the cloud store
//! 4. **Pull**: apply cloud changes to the local store
//! 5. **Bookkeeping**: upsert sync metadata per record, append the run log
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use tandem_sync::{HandlerRegistry, SyncConfig, SyncOrchestrator, TcpProbe};
//!
//! # fn build() -> tandem_sync::EngineResult<SyncOrchestrator> {
//! let config = SyncConfig::default();
//! let probe = Arc::new(TcpProbe::from_config(&config.connectivity));
//! let orchestrator = SyncOrchestrator::from_config(&config, HandlerRegistry::new(), probe)?;
//! # Ok(orchestrator)
//! # }
//! ```

mod config;
mod connectivity;
mod detector;
mod error;
mod handler;
mod orchestrator;
mod resolver;
mod retry;
mod scheduler;

pub use config::{
    ConnectivityConfig, EndpointConfig, RetryConfig, SchedulerConfig, SyncConfig,
    DEFAULT_BATCH_SIZE,
};
pub use connectivity::{
    ConnectionStatus, ConnectionStatusChanged, ConnectivityManager, NetworkProbe, TcpProbe,
    Transition,
};
pub use detector::ChangeDetector;
pub use error::{EngineResult, SyncError};
pub use handler::{HandlerRegistry, RecordHandler, TypedHandler};
pub use orchestrator::{ManualResolution, SyncOrchestrator, SyncResult};
pub use resolver::{ConflictResolver, Resolution, Side};
pub use retry::{is_retry_due, RetryPolicy, MAX_RETRY_BACKOFF};
pub use scheduler::{SchedulerState, SyncScheduler, TickOutcome};

/// Runs blocking store work on the blocking thread pool.
pub(crate) async fn run_blocking<T, E, F>(work: F) -> EngineResult<T>
where
    F: FnOnce() -> Result<T, E> + Send + 'static,
    T: Send + 'static,
    E: Into<SyncError> + Send + 'static,
{
    tokio::task::spawn_blocking(work).await?.map_err(Into::into)
}
