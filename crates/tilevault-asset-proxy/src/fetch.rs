//! Fetch interception rules
//!
//! Pure decision logic for one intercepted request: what passes through
//! untouched and what a live response must look like to be cached.

use crate::manifest::AssetManifest;
use crate::types::AssetRequest;
use axum::http::Method;
use url::Url;

/// Whether the request is intercepted at all.
///
/// Non-read methods, non-network schemes and tiled-map archive files pass
/// through untouched; archive bytes are the blob store's job, and caching
/// them here would hold the payload in two places.
pub fn should_intercept(request: &AssetRequest, manifest: &AssetManifest) -> bool {
    if request.method != Method::GET {
        return false;
    }
    if !matches!(request.url.scheme(), "http" | "https") {
        return false;
    }
    if request
        .url
        .path()
        .ends_with(manifest.archive_extension.as_str())
    {
        return false;
    }
    true
}

/// Whether a successful live response for `url` may be stored: same-origin
/// assets and allow-listed CDN assets only.
pub fn is_cacheable(url: &Url, manifest: &AssetManifest) -> bool {
    manifest.is_same_origin(url) || manifest.is_cdn_asset(url)
}
