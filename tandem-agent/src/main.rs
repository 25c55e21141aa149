//! Tandem sync agent
//!
//! Runs next to a branch or edge installation and keeps its local store
//! reconciled with the central cloud store:
//! 1. Monitors cloud reachability and the operating mode
//! 2. Runs an incremental sync on a fixed interval
//! 3. Serves an admin HTTP API for status, manual runs and conflicts
//!
//! Usage:
//!   tandem-agent --config tandem.toml
//!   tandem-agent --local branch.db --cloud /mnt/central/cloud.db --once

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tandem_agent::{build_router, catalog, load_config, AppState};
use tandem_sync::{SyncConfig, SyncOrchestrator, SyncScheduler, TcpProbe};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "tandem-agent")]
#[command(about = "Bidirectional local/cloud record sync agent")]
struct Args {
    /// Path to a TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Local database path (overrides the config file)
    #[arg(long)]
    local: Option<PathBuf>,

    /// Cloud database path (overrides the config file)
    #[arg(long)]
    cloud: Option<PathBuf>,

    /// Seconds between scheduled incremental syncs
    #[arg(long)]
    interval: Option<u64>,

    /// Run one full sync and exit
    #[arg(long)]
    once: bool,

    /// HTTP port for the admin API
    #[arg(long, default_value = "4610")]
    http_port: u16,

    /// Enable verbose debug logging
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    fn sync_config(&self) -> Result<SyncConfig> {
        let mut config = match &self.config {
            Some(path) => load_config(path)?,
            None => SyncConfig::default(),
        };
        if let Some(local) = &self.local {
            config.local.connection = local.clone();
        }
        if let Some(cloud) = &self.cloud {
            config.cloud.connection = cloud.clone();
        }
        if let Some(interval) = self.interval {
            config.scheduler.interval_secs = interval;
        }
        Ok(config)
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);

    info!("Tandem agent starting...");
    let config = args.sync_config()?;
    let registry = catalog::registry().context("Failed to register record types")?;
    let probe = Arc::new(TcpProbe::from_config(&config.connectivity));
    let orchestrator = Arc::new(
        SyncOrchestrator::from_config(&config, registry, probe)
            .context("Failed to start sync engine")?,
    );

    let status = orchestrator.connectivity().check_now().await;
    info!(
        "Mode: {} (cloud {})",
        status.mode,
        if status.is_cloud_available { "reachable" } else { "unreachable" }
    );

    let cancel = CancellationToken::new();

    if args.once {
        let result = orchestrator.sync_all(&cancel).await?;
        info!(
            "Sync finished: {} synced, {} failed, {} conflict(s)",
            result.entities_synced, result.entities_failed, result.conflicts_detected
        );
        if !result.success {
            anyhow::bail!(
                "sync failed: {}",
                result.error_message.unwrap_or_else(|| "unknown error".into())
            );
        }
        return Ok(());
    }

    let monitor = orchestrator.connectivity().spawn_monitor(cancel.clone());
    let scheduler = if config.scheduler.enabled {
        let scheduler = Arc::new(SyncScheduler::from_config(
            Arc::clone(&orchestrator),
            &config.scheduler,
        ));
        Some(scheduler.spawn(cancel.clone()))
    } else {
        warn!("Scheduled sync disabled; runs only start through the admin API");
        None
    };

    let shutdown = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Shutdown requested"),
            Err(e) => error!("Failed to listen for shutdown signal: {}", e),
        }
        shutdown.cancel();
    });

    let app = build_router(AppState {
        orchestrator: Arc::clone(&orchestrator),
        cancel: cancel.clone(),
    });
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", args.http_port))
        .await
        .with_context(|| format!("Failed to bind HTTP port {}", args.http_port))?;

    println!("\n========================================");
    println!("  Tandem Agent Running");
    println!("========================================");
    println!("  Local:     {}", config.local.connection.display());
    println!("  Cloud:     {}", config.cloud.connection.display());
    println!("  HTTP Port: {}", args.http_port);
    println!("  Record types: {}", orchestrator.registry().type_names().join(", "));
    println!("========================================\n");

    let serve_cancel = cancel.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { serve_cancel.cancelled().await })
        .await
        .context("HTTP server failed")?;

    cancel.cancel();
    if let Err(e) = monitor.await {
        warn!("Connectivity monitor ended abnormally: {}", e);
    }
    if let Some(handle) = scheduler {
        if let Err(e) = handle.await {
            warn!("Scheduler ended abnormally: {}", e);
        }
    }
    info!("Tandem agent stopped");
    Ok(())
}
