//! Proxy lifecycle: install, activate, fetch interception and control
//! messages
//!
//! Install pre-populates the current cache generation from the baked
//! manifests, activation purges every other generation wholesale, and the
//! fetch path serves cache-first with an opportunistic write-back. There is
//! no per-entry expiry anywhere; a version bump is the only eviction.

use crate::cache::CacheStore;
use crate::error::{ProxyError, Result};
use crate::fetch;
use crate::fetcher::NetworkFetcher;
use crate::manifest::AssetManifest;
use crate::types::{
    AssetRequest, AssetSnapshot, CacheStats, ControlMessage, Destination, FetchOutcome,
    LifecyclePhase,
};
use futures::future::join_all;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};
use url::Url;

/// The cache-first asset proxy.
///
/// Storage and network are injected capabilities; production wires a disk
/// cache and a live HTTP client, tests substitute in-memory fakes.
pub struct AssetProxy {
    cache: Arc<dyn CacheStore>,
    fetcher: Arc<dyn NetworkFetcher>,
    manifest: AssetManifest,
    phase: RwLock<LifecyclePhase>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl AssetProxy {
    pub fn new(
        cache: Arc<dyn CacheStore>,
        fetcher: Arc<dyn NetworkFetcher>,
        manifest: AssetManifest,
    ) -> Self {
        Self {
            cache,
            fetcher,
            manifest,
            phase: RwLock::new(LifecyclePhase::Idle),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub async fn phase(&self) -> LifecyclePhase {
        *self.phase.read().await
    }

    pub fn generation(&self) -> &str {
        &self.manifest.generation
    }

    pub fn manifest(&self) -> &AssetManifest {
        &self.manifest
    }

    /// Install: open the current generation and pre-populate both asset
    /// manifests.
    ///
    /// The two bulk-populates are independent; a failure in either is
    /// logged and swallowed so it blocks neither the other manifest nor
    /// install completion. Completes by skipping the waiting period and
    /// activating, as the hosting application expects.
    pub async fn install(&self) -> Result<()> {
        info!(generation = %self.manifest.generation, "installing");
        self.set_phase(LifecyclePhase::Installing).await;

        self.cache.init().await?;
        self.cache.open_generation(&self.manifest.generation).await?;

        let (static_result, cdn_result) = futures::join!(
            self.populate(self.manifest.static_urls()),
            self.populate(self.manifest.cdn_urls()),
        );
        if let Err(err) = static_result {
            warn!(error = %err, "failed to cache static assets");
        }
        if let Err(err) = cdn_result {
            warn!(error = %err, "failed to cache CDN assets");
        }

        self.set_phase(LifecyclePhase::Waiting).await;
        info!("install complete");
        self.skip_waiting().await
    }

    /// Activate: delete every cache generation other than the current one,
    /// then claim traffic for this version so it takes effect without a
    /// restart.
    pub async fn activate(&self) -> Result<()> {
        info!(generation = %self.manifest.generation, "activating");

        for name in self.cache.list_generations().await? {
            if name != self.manifest.generation {
                info!(generation = %name, "deleting old cache generation");
                self.cache.drop_generation(&name).await?;
            }
        }

        self.set_phase(LifecyclePhase::Active).await;
        info!("activation complete");
        Ok(())
    }

    /// Force a waiting version active immediately.
    pub async fn skip_waiting(&self) -> Result<()> {
        if self.phase().await == LifecyclePhase::Active {
            return Ok(());
        }
        self.activate().await
    }

    /// Handle one control message from the hosting application.
    pub async fn handle_message(&self, message: ControlMessage) -> Result<()> {
        match message {
            ControlMessage::SkipWaiting => self.skip_waiting().await,
        }
    }

    /// One interception decision per outgoing request.
    ///
    /// Cache hits are returned without any network round-trip or freshness
    /// check. Misses go to the network, and a successful same-origin or
    /// allow-listed response is snapshotted into the cache before the
    /// original goes back to the caller. A failed fetch falls back to the
    /// cached entry page for document navigations only.
    pub async fn handle_fetch(&self, request: &AssetRequest) -> Result<FetchOutcome> {
        if !fetch::should_intercept(request, &self.manifest) {
            debug!(method = %request.method, url = %request.url, "passing request through");
            return Ok(FetchOutcome::PassThrough);
        }

        let key = request.cache_key();
        match self.cache.lookup(&self.manifest.generation, &key).await {
            Ok(Some(snapshot)) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                debug!(url = %request.url, "serving from cache");
                return Ok(FetchOutcome::Served {
                    snapshot,
                    from_cache: true,
                });
            }
            Ok(None) => {}
            Err(err) => {
                // A broken cache entry degrades to a miss, not a failure.
                warn!(url = %request.url, error = %err, "cache lookup failed");
            }
        }
        self.misses.fetch_add(1, Ordering::Relaxed);

        match self.fetcher.fetch(request).await {
            Ok(snapshot) => {
                if snapshot.is_success() && fetch::is_cacheable(&request.url, &self.manifest) {
                    // The caller gets the original; the cache gets its own
                    // copy.
                    if let Err(err) = self
                        .cache
                        .store(&self.manifest.generation, &key, snapshot.clone())
                        .await
                    {
                        warn!(url = %request.url, error = %err, "failed to cache response");
                    }
                }
                Ok(FetchOutcome::Served {
                    snapshot,
                    from_cache: false,
                })
            }
            Err(err) => {
                error!(url = %request.url, error = %err, "network fetch failed");
                if request.destination == Destination::Document {
                    if let Some(snapshot) = self.offline_fallback().await {
                        info!(url = %request.url, "serving offline fallback page");
                        return Ok(FetchOutcome::Served {
                            snapshot,
                            from_cache: true,
                        });
                    }
                }
                Err(ProxyError::NetworkUnavailable(request.url.to_string()))
            }
        }
    }

    /// Cache statistics for the current generation, with live hit/miss
    /// counters.
    pub async fn stats(&self) -> CacheStats {
        let mut stats = self
            .cache
            .stats(&self.manifest.generation)
            .await
            .unwrap_or_default();
        stats.hits = self.hits.load(Ordering::Relaxed);
        stats.misses = self.misses.load(Ordering::Relaxed);
        stats
    }

    async fn set_phase(&self, phase: LifecyclePhase) {
        *self.phase.write().await = phase;
    }

    /// Fetch every manifest URL and cache the snapshots; the first failure
    /// aborts this manifest (and only this manifest).
    async fn populate(&self, urls: Vec<Url>) -> Result<()> {
        let results = join_all(urls.into_iter().map(|url| self.populate_one(url))).await;
        results.into_iter().collect::<Result<Vec<()>>>()?;
        Ok(())
    }

    async fn populate_one(&self, url: Url) -> Result<()> {
        let request = AssetRequest::get(url);
        let snapshot = self.fetcher.fetch(&request).await?;
        if !snapshot.is_success() {
            return Err(ProxyError::Network(format!(
                "{} returned status {}",
                request.url, snapshot.status
            )));
        }
        self.cache
            .store(&self.manifest.generation, &request.cache_key(), snapshot)
            .await?;
        debug!(url = %request.url, "pre-cached asset");
        Ok(())
    }

    async fn offline_fallback(&self) -> Option<AssetSnapshot> {
        let url = self.manifest.offline_fallback_url()?;
        let key = AssetRequest::get(url).cache_key();
        self.cache
            .lookup(&self.manifest.generation, &key)
            .await
            .ok()
            .flatten()
    }
}
