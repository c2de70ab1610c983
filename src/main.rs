//! Offline Relay - an offline-capable caching proxy
//!
//! Binary entry point: wires storage, upstream, strategies and lifecycle
//! together and serves the HTTP surface.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::signal;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use offline_relay::cache::CacheStore;
use offline_relay::clock::{SharedClock, SystemClock};
use offline_relay::db::Database;
use offline_relay::lifecycle::AssetManifest;
use offline_relay::queue::ReplayQueue;
use offline_relay::routing::RouteClassifier;
use offline_relay::strategy::{HttpUpstream, Upstream};
use offline_relay::{
    create_router, spawn_connectivity_monitor, spawn_retention_task, AppState, Config,
    LifecycleController, StrategyEngine,
};

/// Main entry point for the offline relay.
///
/// # Startup Sequence
/// 1. Initialize tracing subscriber for logging
/// 2. Load configuration from environment variables
/// 3. Open the database and rebuild the cache index from it
/// 4. Install the release (precache the asset manifest) and activate it
/// 5. Start the connectivity monitor and the retention sweep
/// 6. Start HTTP server on configured port
/// 7. Handle graceful shutdown on SIGINT/SIGTERM, then flush pending cache writes
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "offline_relay=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Offline Relay");

    let config = Config::from_env();
    info!(
        "Configuration loaded: upstream={}, data={}, port={}, retention={}h",
        config.upstream_origin,
        config.data_path.display(),
        config.server_port,
        config.retention_hours
    );

    let origin = config
        .origin()
        .with_context(|| format!("invalid UPSTREAM_ORIGIN '{}'", config.upstream_origin))?;
    let probe_url = config
        .probe_url()
        .with_context(|| format!("invalid PROBE_PATH '{}'", config.probe_path))?;

    let clock: SharedClock = Arc::new(SystemClock);
    let db = Arc::new(
        Database::open(&config.data_path)
            .with_context(|| format!("opening {}", config.data_path.display()))?,
    );
    let upstream: Arc<dyn Upstream> = Arc::new(HttpUpstream::new(config.request_timeout())?);

    let cache = {
        let (policies, clock, db) = (config.namespaces.clone(), clock.clone(), db.clone());
        tokio::task::spawn_blocking(move || CacheStore::with_database(policies, clock, db))
            .await?
            .context("loading cache entries")?
    };
    let queue = ReplayQueue::new(db, upstream.clone(), clock.clone(), config.retention());
    info!(
        "Storage ready: {} queued mutation(s) waiting",
        queue.pending().await?
    );

    let engine = StrategyEngine::new(cache, upstream, queue.clone(), clock);
    let controller = Arc::new(LifecycleController::new(
        engine,
        RouteClassifier::new(config.api_prefix.clone()),
        origin.clone(),
    ));

    let manifest = match &config.asset_manifest {
        Some(path) => AssetManifest::load(path)
            .await
            .with_context(|| format!("loading asset manifest {}", path.display()))?,
        None => AssetManifest::default(),
    };
    controller
        .install(config.release_version.clone(), &manifest)
        .await?;
    controller.activate().await?;

    let tasks = vec![
        spawn_connectivity_monitor(
            controller.clone(),
            probe_url,
            Duration::from_secs(config.probe_interval),
        ),
        spawn_retention_task(queue, Duration::from_secs(config.retention_sweep_interval)),
    ];
    info!("Background tasks started");

    let app = create_router(AppState::new(controller.clone(), origin));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!("Relay listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(tasks))
        .await?;

    controller.engine().flush_cache().await;

    info!("Relay shutdown complete");
    Ok(())
}

/// Waits for shutdown signal (Ctrl+C or SIGTERM), then aborts the
/// background tasks.
async fn shutdown_signal(tasks: Vec<JoinHandle<()>>) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown...");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown...");
        }
    }

    for task in &tasks {
        task.abort();
    }
    warn!("Background tasks aborted");
}
