//! TaskMesh: task dispatch, orchestration and anticipation server.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use taskmesh_server::{routes, AppState};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

const PURGE_INTERVAL: Duration = Duration::from_secs(300);

fn resolve_data_dir() -> PathBuf {
    std::env::var("TASKMESH_DATA_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("data"))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let data_dir = resolve_data_dir();
    info!("Data directory: {}", data_dir.display());

    let config = taskmesh_core::TaskMeshConfig::from_env(&data_dir)?;
    let port = config.port;

    let state = Arc::new(
        AppState::open(config).map_err(|e| anyhow::anyhow!("Failed to open state: {}", e))?,
    );

    state
        .orchestrator
        .connect()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to connect orchestrator: {}", e))?;
    state.anticipation.start();

    let cancel = CancellationToken::new();
    let worker = state.coordinator.clone().spawn(cancel.clone());
    let purger = spawn_purger(state.clone(), cancel.clone());

    let app = routes::build_router(state.clone());

    let addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("TaskMesh server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to listen for ctrl-c: {}", e);
            }
            info!("Shutdown requested");
        })
        .await?;

    cancel.cancel();
    if let Err(e) = worker.await {
        warn!("Coordinator ended abnormally: {}", e);
    }
    let _ = purger.await;

    if let Err(e) = state.anticipation.shutdown().await {
        warn!("Failed to write anticipation checkpoint: {}", e);
    }
    state.orchestrator.disconnect();

    info!("TaskMesh server stopped");
    Ok(())
}

/// Periodically drop expired metadata and finished queue entries.
fn spawn_purger(state: Arc<AppState>, cancel: CancellationToken) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(PURGE_INTERVAL);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    match taskmesh_store::MetadataStore::purge_expired(state.store.as_ref()) {
                        Ok(n) if n > 0 => debug!("Purged {} expired rows", n),
                        Ok(_) => {}
                        Err(e) => warn!("Purge failed: {}", e),
                    }
                }
            }
        }
    })
}
