//! Core types for the tilevault asset proxy

use axum::http::Method;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use url::Url;

/// Destination of an intercepted request.
///
/// Only top-level document navigations are special-cased (they get the
/// offline fallback page); everything else is a plain subresource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Destination {
    Document,
    Other,
}

/// One intercepted outgoing request.
#[derive(Debug, Clone)]
pub struct AssetRequest {
    pub method: Method,
    pub url: Url,
    pub destination: Destination,
}

impl AssetRequest {
    /// A plain GET subresource request, the shape used for manifest
    /// pre-population.
    pub fn get(url: Url) -> Self {
        Self {
            method: Method::GET,
            url,
            destination: Destination::Other,
        }
    }

    /// Exact-match cache key: method plus full URL.
    pub fn cache_key(&self) -> String {
        format!("{} {}", self.method, self.url)
    }
}

/// An independent snapshot of a response.
///
/// Storing a snapshot and returning one to the caller always uses separate
/// copies, so neither consumes the other.
#[derive(Debug, Clone)]
pub struct AssetSnapshot {
    pub url: String,
    pub status: u16,
    pub content_type: String,
    pub cached_at: DateTime<Utc>,
    pub body: Vec<u8>,
}

impl AssetSnapshot {
    /// Only plain 200 responses are eligible for caching.
    pub fn is_success(&self) -> bool {
        self.status == 200
    }
}

/// Control message accepted from the hosting application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ControlMessage {
    #[serde(rename = "SKIP_WAITING")]
    SkipWaiting,
}

/// Proxy lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecyclePhase {
    Idle,
    Installing,
    Waiting,
    Active,
}

impl fmt::Display for LifecyclePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let phase = match self {
            LifecyclePhase::Idle => "idle",
            LifecyclePhase::Installing => "installing",
            LifecyclePhase::Waiting => "waiting",
            LifecyclePhase::Active => "active",
        };
        write!(f, "{}", phase)
    }
}

/// Result of one interception decision.
#[derive(Debug)]
pub enum FetchOutcome {
    /// Not intercepted; the request goes to the network untouched and is
    /// never cached.
    PassThrough,
    /// Served from the cache or from a live fetch.
    Served {
        snapshot: AssetSnapshot,
        from_cache: bool,
    },
}

/// Statistics about one cache generation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheStats {
    pub entries: usize,
    pub total_size: u64,
    pub hits: u64,
    pub misses: u64,
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub phase: String,
    pub generation: String,
    pub uptime_secs: u64,
    pub cache: CacheStats,
}

/// Configuration for the asset proxy
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    pub port: u16,
    pub upstream_origin: String,
    pub cache_dir: PathBuf,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            port: 3002,
            upstream_origin: "http://localhost:8080".to_string(),
            cache_dir: PathBuf::from("./cache/assets"),
        }
    }
}
