//! Asset cache service binary
//!
//! Serves assets over HTTP from the memory cache, the write-back buffer
//! and the remote store.

use asset_cache_service::server::{start_server, ServerState, SharedState};
use asset_cache_service::{Result, ServiceConfig, ServiceError, StoreOrchestrator};
use asset_remote::{HttpRemoteStore, MemoryRemoteStore, RemoteStore};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    let env_filter =
        EnvFilter::from_default_env().add_directive("asset_cache_service=info".parse()?);

    // Use JSON format for GCP Cloud Logging when LOG_FORMAT=json
    if std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false)
    {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_stackdriver::layer())
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    };

    info!("Starting asset cache service...");

    let config = ServiceConfig::from_env()?;
    info!("Port: {}", config.port);
    match &config.orchestrator.cache {
        Some(cache) => info!(
            "Memory cache: {} MB, assets up to {} KB",
            cache.capacity_bytes / (1024 * 1024),
            cache.max_cacheable_asset_size / 1024
        ),
        None => info!("Memory cache disabled"),
    }
    match &config.orchestrator.writeback {
        Some(writeback) => info!("Write-back dir: {:?}", writeback.dir),
        None => warn!("Write-back disabled, stores fail while the remote store is down"),
    }

    let remote: Arc<dyn RemoteStore> = match config.remote.clone() {
        Some(remote_config) => {
            info!("Remote store: {}", remote_config.base_url);
            Arc::new(HttpRemoteStore::new(remote_config)?)
        }
        None => {
            warn!("REMOTE_STORE_URL not set, using an in-process remote store");
            Arc::new(MemoryRemoteStore::new())
        }
    };

    let orchestrator = Arc::new(StoreOrchestrator::open(config.orchestrator, remote).await?);
    orchestrator.start();

    let state: SharedState = Arc::new(ServerState::new(orchestrator.clone()));

    // Serve until ctrl-c, then stop the background tasks
    let served = start_server(state, config.port)
        .await
        .map_err(|e| ServiceError::Config(format!("Server error: {}", e)));
    orchestrator.shutdown().await;
    served?;

    info!("Asset cache service stopped");
    Ok(())
}
