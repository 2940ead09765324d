//! Tilevault Asset Proxy - cache-first offline asset delivery
//!
//! Keeps the map application's static pages and CDN libraries available
//! when the network is unreachable. PMTiles archive requests are explicitly
//! excluded from interception; the blob store serves archive bytes.

mod cache;
mod error;
mod fetch;
mod fetcher;
mod lifecycle;
mod manifest;
mod server;
mod types;

use crate::cache::DiskCacheStore;
use crate::error::{ProxyError, Result};
use crate::fetcher::{HttpFetcher, NetworkFetcher};
use crate::lifecycle::AssetProxy;
use crate::manifest::AssetManifest;
use crate::server::{start_server, ServerState, SharedState};
use crate::types::ProxyConfig;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{prelude::*, EnvFilter};
use url::Url;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    let env_filter =
        EnvFilter::from_default_env().add_directive("tilevault_asset_proxy=info".parse()?);

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

    info!("Starting Tilevault Asset Proxy...");

    // Load configuration from environment
    let config = load_config()?;
    info!("Port: {}", config.port);
    info!("Upstream origin: {}", config.upstream_origin);
    info!("Cache dir: {:?}", config.cache_dir);

    let upstream_origin = Url::parse(&config.upstream_origin)
        .map_err(|e| ProxyError::Config(format!("invalid UPSTREAM_ORIGIN: {}", e)))?;

    // Create cache store, fetcher and proxy
    let cache = Arc::new(DiskCacheStore::new(config.cache_dir));
    let fetcher: Arc<dyn NetworkFetcher> = Arc::new(HttpFetcher::new());
    let manifest = AssetManifest::baked(upstream_origin);
    let proxy = AssetProxy::new(cache, fetcher.clone(), manifest);

    // Install pre-populates the current generation and activates; missing
    // manifest assets are logged and skipped, so an offline start still
    // serves whatever a prior session cached.
    proxy.install().await?;

    // Create shared state
    let state: SharedState = Arc::new(ServerState::new(proxy, fetcher));

    // Start HTTP server (blocking)
    start_server(state, config.port)
        .await
        .map_err(|e| ProxyError::Config(format!("Server error: {}", e)))?;

    Ok(())
}

fn load_config() -> Result<ProxyConfig> {
    let port = std::env::var("PORT")
        .ok()
        .and_then(|s| s.parse::<u16>().ok())
        .unwrap_or(3002);

    let upstream_origin =
        std::env::var("UPSTREAM_ORIGIN").unwrap_or_else(|_| "http://localhost:8080".to_string());

    let cache_dir = std::env::var("CACHE_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("./cache/assets"));

    Ok(ProxyConfig {
        port,
        upstream_origin,
        cache_dir,
    })
}
