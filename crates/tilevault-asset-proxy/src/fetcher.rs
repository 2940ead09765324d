//! Network boundary for live asset fetches

use crate::error::Result;
use crate::types::{AssetRequest, AssetSnapshot};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use tracing::debug;

/// The live network, as seen by the proxy.
///
/// Injected so tests can observe exactly which requests reached the
/// network (the cache-first property is an absence of calls).
#[async_trait]
pub trait NetworkFetcher: Send + Sync + 'static {
    /// Forward a request with its body, snapshotting status, content type
    /// and response body.
    ///
    /// Non-success statuses are reported inside the snapshot; only
    /// transport-level failures (offline, DNS) are errors.
    async fn forward(&self, request: &AssetRequest, body: Vec<u8>) -> Result<AssetSnapshot>;

    /// Fetch a bodyless read request (cache misses, manifest population).
    async fn fetch(&self, request: &AssetRequest) -> Result<AssetSnapshot> {
        self.forward(request, Vec::new()).await
    }
}

/// Fetcher backed by a shared HTTP client.
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
        }
    }
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NetworkFetcher for HttpFetcher {
    async fn forward(&self, request: &AssetRequest, body: Vec<u8>) -> Result<AssetSnapshot> {
        debug!(method = %request.method, url = %request.url, "fetching from network");

        let mut builder = self
            .client
            .request(request.method.clone(), request.url.as_str());
        if !body.is_empty() {
            builder = builder.body(body);
        }
        let response = builder.send().await?;

        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("application/octet-stream")
            .to_string();
        let body = response.bytes().await?.to_vec();

        debug!(
            url = %request.url,
            status,
            bytes = body.len(),
            "network response"
        );

        Ok(AssetSnapshot {
            url: request.url.to_string(),
            status,
            content_type,
            cached_at: Utc::now(),
            body,
        })
    }
}

/// Recording fake for tests: serves canned snapshots and logs every URL
/// that reached the "network".
#[cfg(test)]
pub(crate) struct RecordingFetcher {
    responses: std::sync::Mutex<std::collections::HashMap<String, AssetSnapshot>>,
    offline: std::sync::atomic::AtomicBool,
    calls: std::sync::Mutex<Vec<String>>,
}

#[cfg(test)]
impl RecordingFetcher {
    pub(crate) fn new() -> Self {
        Self {
            responses: std::sync::Mutex::new(std::collections::HashMap::new()),
            offline: std::sync::atomic::AtomicBool::new(false),
            calls: std::sync::Mutex::new(Vec::new()),
        }
    }

    /// Serve `body` with status 200 for `url`.
    pub(crate) fn respond(&self, url: &str, content_type: &str, body: &[u8]) {
        self.responses.lock().unwrap().insert(
            url.to_string(),
            AssetSnapshot {
                url: url.to_string(),
                status: 200,
                content_type: content_type.to_string(),
                cached_at: Utc::now(),
                body: body.to_vec(),
            },
        );
    }

    /// Make every subsequent fetch fail at the transport level.
    pub(crate) fn go_offline(&self) {
        self.offline.store(true, std::sync::atomic::Ordering::SeqCst);
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[cfg(test)]
#[async_trait]
impl NetworkFetcher for RecordingFetcher {
    async fn forward(&self, request: &AssetRequest, _body: Vec<u8>) -> Result<AssetSnapshot> {
        self.calls.lock().unwrap().push(request.url.to_string());

        if self.offline.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(crate::error::ProxyError::Network(
                "connection refused".to_string(),
            ));
        }

        match self.responses.lock().unwrap().get(request.url.as_str()) {
            Some(snapshot) => Ok(snapshot.clone()),
            None => Ok(AssetSnapshot {
                url: request.url.to_string(),
                status: 404,
                content_type: "text/plain".to_string(),
                cached_at: Utc::now(),
                body: b"not found".to_vec(),
            }),
        }
    }
}
