//! Storage Gateway
//!
//! Single-binary service that:
//! 1. Loads per-account credential files into the account pool
//! 2. Runs uploads through the ingestion pipeline (media processing,
//!    account selection, transfer)
//! 3. Serves stored objects back with range and HLS placeholder support

mod arena;
mod config;
mod error;
mod handlers;
mod hls;
mod ingest;
mod jobs;
mod media;
mod metrics;
mod progress;
mod range;
mod remote;
mod sessions;
mod stream;

use std::sync::Arc;
use std::time::{Duration, Instant};

use account_pool::AccountPool;
use anyhow::{Context, Result};
use provider::{MemoryCatalog, MemoryStore, ObjectStore};
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::arena::Arena;
use crate::config::Config;
use crate::handlers::{AppState, build_router};
use crate::ingest::{IngestSettings, Ingestor};
use crate::jobs::JobRegistry;
use crate::media::FfmpegProcessor;
use crate::remote::RemoteStore;
use crate::sessions::SessionRegistry;
use crate::stream::Streamer;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and LOG_LEVEL / RUST_LOG support
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("starting storage-gateway");

    // Install the Prometheus recorder before any metrics are emitted
    let prometheus = metrics::install_recorder()?;

    // CLI: simple --config flag parsing
    let args: Vec<String> = std::env::args().collect();
    let cli_config_path = args
        .iter()
        .position(|a| a == "--config")
        .and_then(|i| args.get(i + 1))
        .map(|s| s.as_str());

    let config_path = Config::resolve_path(cli_config_path);
    info!(path = %config_path.display(), "loading configuration");

    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;

    info!(
        listen_addr = %config.server.listen_addr,
        provider_mode = %config.provider.mode,
        credential_dir = %config.accounts.credential_dir.display(),
        "configuration loaded"
    );

    let accounts =
        account_pool::load_accounts(&config.accounts.credential_dir, &config.account_defaults())
            .await
            .context("loading account credentials")?;
    if accounts.is_empty() {
        warn!(
            dir = %config.accounts.credential_dir.display(),
            "no account credentials found; uploads will fail until accounts are added"
        );
    }
    let pool = Arc::new(AccountPool::new(accounts, config.pool_config()));
    let maintenance = account_pool::spawn_maintenance_task(
        pool.clone(),
        Duration::from_secs(config.accounts.maintenance_interval_secs),
    );

    let store: Arc<dyn ObjectStore> = match config.provider.mode.as_str() {
        "memory" => {
            warn!("provider.mode = memory: objects are held in process memory only");
            Arc::new(MemoryStore::new())
        }
        _ => Arc::new(RemoteStore::new(
            &config.provider.base_url,
            Duration::from_secs(config.provider.timeout_secs),
            pool.clone(),
        )?),
    };

    // The file catalog is an external collaborator; until its service ships
    // the gateway runs against the in-process implementation.
    let catalog = Arc::new(MemoryCatalog::new());

    tokio::fs::create_dir_all(&config.upload.temp_dir)
        .await
        .with_context(|| format!("creating temp dir {}", config.upload.temp_dir.display()))?;

    let jobs = Arc::new(JobRegistry::new());
    let sessions = Arc::new(SessionRegistry::new());
    let ingestor = Arc::new(Ingestor::new(
        pool.clone(),
        store.clone(),
        catalog.clone(),
        jobs.clone(),
        Arc::new(FfmpegProcessor::new(
            config.media.ffmpeg_path.clone(),
            config.media.ffprobe_path.clone(),
        )),
        Arena::new(config.upload.temp_dir.clone()),
        IngestSettings {
            chunk_threshold: config.upload.chunk_threshold,
            chunk_size: config.upload.chunk_size,
            progress_cadence: Duration::from_millis(config.upload.progress_interval_ms),
            thumbnail_offset_secs: config.upload.thumbnail_offset_secs,
            transfer_retry_attempts: config.upload.transfer_retry_attempts,
        },
    ));
    let streamer = Arc::new(Streamer::new(
        pool.clone(),
        store,
        catalog.clone(),
        sessions.clone(),
        config.stream.buffer_size,
        config.stream.cross_account_read,
    ));

    let state = AppState {
        ingestor,
        streamer,
        jobs,
        sessions,
        pool,
        catalog,
        segment_size: config.stream.segment_size,
        started_at: Instant::now(),
        prometheus,
    };
    let app = build_router(state, config.server.max_connections);

    let listener = TcpListener::bind(config.server.listen_addr)
        .await
        .with_context(|| format!("failed to bind to {}", config.server.listen_addr))?;
    info!(addr = %config.server.listen_addr, "accepting requests");

    // Graceful shutdown: stop accepting on SIGTERM/SIGINT, then drain
    // in-flight requests under a deadline so a stalled stream cannot block
    // process exit.
    let drain_timeout = Duration::from_secs(config.server.drain_timeout_secs);
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

    let server_handle = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await
    });

    shutdown_signal().await;
    let _ = shutdown_tx.send(());

    match tokio::time::timeout(drain_timeout, server_handle).await {
        Ok(Ok(Ok(()))) => {
            info!("all in-flight requests drained");
        }
        Ok(Ok(Err(e))) => {
            error!(error = %e, "server error during shutdown");
        }
        Ok(Err(e)) => {
            error!(error = %e, "server task panicked");
        }
        Err(_) => {
            warn!(
                drain_timeout_secs = drain_timeout.as_secs(),
                "drain timeout exceeded, forcing shutdown"
            );
        }
    }

    maintenance.abort();
    info!("shutdown complete");
    Ok(())
}

/// Wait for SIGTERM or SIGINT for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received SIGINT, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}
