//! Deploy-time asset manifest
//!
//! The lists below are baked in at build/deploy time and are not runtime
//! configurable. A URL outside these lists is still served cache-first if a
//! prior successful fetch happened to cache it, but is never pre-populated
//! at install time nor eligible for the CDN caching rule on live fetches.

use url::Url;

// --- Cache generation ---

/// Name of the current cache generation. Bump the version suffix to retire
/// every previously cached asset on the next activation.
pub const CACHE_GENERATION: &str = "tilevault-assets-v1";

// --- Same-origin static assets ---

/// Application shell paths cached at install time.
pub const STATIC_ASSETS: &[&str] = &["/", "/index.html", "/map.html", "/manifest.json"];

/// Entry page served as the offline fallback for document navigations.
pub const OFFLINE_FALLBACK: &str = "/index.html";

// --- CDN assets ---

/// External library URLs cached at install time and allow-listed for
/// caching on live fetches.
pub const CDN_ASSETS: &[&str] = &[
    "https://unpkg.com/maplibre-gl@4.7.1/dist/maplibre-gl.css",
    "https://unpkg.com/maplibre-gl@4.7.1/dist/maplibre-gl.js",
    "https://unpkg.com/pmtiles@4.3.1/dist/pmtiles.js",
];

// --- Archive exclusion ---

/// Tiled-map archive extension. Requests for these files are never
/// intercepted; the blob store serves archive bytes, and caching them here
/// would buffer the same payload twice.
pub const ARCHIVE_EXTENSION: &str = ".pmtiles";

/// The manifest the proxy carries at runtime, resolved against the
/// configured upstream origin.
#[derive(Debug, Clone)]
pub struct AssetManifest {
    pub generation: String,
    pub static_assets: Vec<String>,
    pub cdn_assets: Vec<String>,
    pub offline_fallback: String,
    pub archive_extension: String,
    pub upstream_origin: Url,
}

impl AssetManifest {
    /// The baked deploy-time manifest against the given upstream origin.
    pub fn baked(upstream_origin: Url) -> Self {
        Self {
            generation: CACHE_GENERATION.to_string(),
            static_assets: STATIC_ASSETS.iter().map(|p| p.to_string()).collect(),
            cdn_assets: CDN_ASSETS.iter().map(|u| u.to_string()).collect(),
            offline_fallback: OFFLINE_FALLBACK.to_string(),
            archive_extension: ARCHIVE_EXTENSION.to_string(),
            upstream_origin,
        }
    }

    /// Static asset paths resolved to absolute URLs on the upstream origin.
    pub fn static_urls(&self) -> Vec<Url> {
        self.static_assets
            .iter()
            .filter_map(|path| self.upstream_origin.join(path).ok())
            .collect()
    }

    /// CDN asset URLs, skipping any that fail to parse.
    pub fn cdn_urls(&self) -> Vec<Url> {
        self.cdn_assets
            .iter()
            .filter_map(|raw| Url::parse(raw).ok())
            .collect()
    }

    /// The offline fallback page as an absolute URL.
    pub fn offline_fallback_url(&self) -> Option<Url> {
        self.upstream_origin.join(&self.offline_fallback).ok()
    }

    /// Whether `url` is on the CDN allow-list (exact match).
    pub fn is_cdn_asset(&self, url: &Url) -> bool {
        self.cdn_assets.iter().any(|asset| asset == url.as_str())
    }

    /// Whether `url` shares the upstream application origin.
    pub fn is_same_origin(&self, url: &Url) -> bool {
        url.origin() == self.upstream_origin.origin()
    }
}
