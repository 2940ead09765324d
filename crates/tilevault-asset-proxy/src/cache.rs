//! Cache generation storage
//!
//! Named generations of response snapshots keyed by method + URL. Entries
//! are never individually expired; a generation is only dropped wholesale
//! when a newer version activates. The storage capability is injected so
//! tests run against an in-memory store instead of the filesystem.

use crate::error::{ProxyError, Result};
use crate::types::{AssetSnapshot, CacheStats};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::io::ErrorKind;
use std::path::PathBuf;
use tokio::fs;
use tracing::{debug, warn};

/// Storage capability behind the proxy's cache generations.
#[async_trait]
pub trait CacheStore: Send + Sync + 'static {
    /// Prepare the backing storage.
    async fn init(&self) -> Result<()>;

    /// Ensure a generation exists.
    async fn open_generation(&self, generation: &str) -> Result<()>;

    /// Names of all existing generations.
    async fn list_generations(&self) -> Result<Vec<String>>;

    /// Drop a whole generation; true if it existed.
    async fn drop_generation(&self, generation: &str) -> Result<bool>;

    /// Exact-match lookup by request key.
    async fn lookup(&self, generation: &str, key: &str) -> Result<Option<AssetSnapshot>>;

    /// Store an independent snapshot under the request key, replacing any
    /// prior entry.
    async fn store(&self, generation: &str, key: &str, snapshot: AssetSnapshot) -> Result<()>;

    /// Entry count and payload size for a generation.
    async fn stats(&self, generation: &str) -> Result<CacheStats>;

    /// Release the backing storage.
    async fn teardown(&self) -> Result<()>;
}

/// Sidecar metadata persisted next to each cached body.
#[derive(Debug, Serialize, Deserialize)]
struct SnapshotMeta {
    url: String,
    status: u16,
    content_type: String,
    cached_at: DateTime<Utc>,
}

/// Disk-backed cache store: one directory per generation, entries
/// addressed by the SHA-256 of their request key with a JSON metadata
/// sidecar and a raw body file.
pub struct DiskCacheStore {
    root: PathBuf,
}

impl DiskCacheStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn generation_dir(&self, generation: &str) -> PathBuf {
        self.root.join(generation)
    }

    fn entry_paths(&self, generation: &str, key: &str) -> (PathBuf, PathBuf) {
        let digest = Sha256::digest(key.as_bytes());
        let name = hex::encode(digest);
        let dir = self.generation_dir(generation);
        (dir.join(format!("{}.json", name)), dir.join(format!("{}.bin", name)))
    }
}

#[async_trait]
impl CacheStore for DiskCacheStore {
    async fn init(&self) -> Result<()> {
        fs::create_dir_all(&self.root).await?;
        debug!(root = %self.root.display(), "cache store initialized");
        Ok(())
    }

    async fn open_generation(&self, generation: &str) -> Result<()> {
        check_generation_name(generation)?;
        fs::create_dir_all(self.generation_dir(generation)).await?;
        Ok(())
    }

    async fn list_generations(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        let mut entries = match fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(names),
            Err(err) => return Err(err.into()),
        };
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_dir() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        Ok(names)
    }

    async fn drop_generation(&self, generation: &str) -> Result<bool> {
        check_generation_name(generation)?;
        match fs::remove_dir_all(self.generation_dir(generation)).await {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    async fn lookup(&self, generation: &str, key: &str) -> Result<Option<AssetSnapshot>> {
        let (meta_path, body_path) = self.entry_paths(generation, key);
        let raw_meta = match fs::read(&meta_path).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        let meta: SnapshotMeta = match serde_json::from_slice(&raw_meta) {
            Ok(meta) => meta,
            Err(err) => {
                warn!(path = %meta_path.display(), error = %err, "unreadable cache entry metadata");
                return Ok(None);
            }
        };
        let body = match fs::read(&body_path).await {
            Ok(body) => body,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        Ok(Some(AssetSnapshot {
            url: meta.url,
            status: meta.status,
            content_type: meta.content_type,
            cached_at: meta.cached_at,
            body,
        }))
    }

    async fn store(&self, generation: &str, key: &str, snapshot: AssetSnapshot) -> Result<()> {
        fs::create_dir_all(self.generation_dir(generation)).await?;
        let (meta_path, body_path) = self.entry_paths(generation, key);
        let meta = SnapshotMeta {
            url: snapshot.url,
            status: snapshot.status,
            content_type: snapshot.content_type,
            cached_at: snapshot.cached_at,
        };
        // Body first; the metadata sidecar makes the entry visible.
        fs::write(&body_path, &snapshot.body).await?;
        fs::write(&meta_path, serde_json::to_vec(&meta)?).await?;
        debug!(generation, key, bytes = snapshot.body.len(), "cached response");
        Ok(())
    }

    async fn stats(&self, generation: &str) -> Result<CacheStats> {
        let mut stats = CacheStats::default();
        let mut entries = match fs::read_dir(self.generation_dir(generation)).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(stats),
            Err(err) => return Err(err.into()),
        };
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            match path.extension().and_then(|e| e.to_str()) {
                Some("json") => stats.entries += 1,
                Some("bin") => stats.total_size += entry.metadata().await?.len(),
                _ => {}
            }
        }
        Ok(stats)
    }

    async fn teardown(&self) -> Result<()> {
        // Directories hold no open handles; nothing to release.
        Ok(())
    }
}

/// Guard against a generation name escaping the cache root.
fn check_generation_name(name: &str) -> Result<()> {
    let valid = !name.is_empty() && !name.contains(['/', '\\']) && name != "." && name != "..";
    if valid {
        Ok(())
    } else {
        Err(ProxyError::Cache(format!("invalid generation name: {:?}", name)))
    }
}

/// In-memory cache store for tests: same contract, no filesystem.
#[cfg(test)]
pub(crate) struct MemoryCacheStore {
    generations:
        tokio::sync::RwLock<std::collections::HashMap<String, std::collections::HashMap<String, AssetSnapshot>>>,
}

#[cfg(test)]
impl MemoryCacheStore {
    pub(crate) fn new() -> Self {
        Self {
            generations: tokio::sync::RwLock::new(std::collections::HashMap::new()),
        }
    }
}

#[cfg(test)]
#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn init(&self) -> Result<()> {
        Ok(())
    }

    async fn open_generation(&self, generation: &str) -> Result<()> {
        self.generations
            .write()
            .await
            .entry(generation.to_string())
            .or_default();
        Ok(())
    }

    async fn list_generations(&self) -> Result<Vec<String>> {
        Ok(self.generations.read().await.keys().cloned().collect())
    }

    async fn drop_generation(&self, generation: &str) -> Result<bool> {
        Ok(self.generations.write().await.remove(generation).is_some())
    }

    async fn lookup(&self, generation: &str, key: &str) -> Result<Option<AssetSnapshot>> {
        Ok(self
            .generations
            .read()
            .await
            .get(generation)
            .and_then(|entries| entries.get(key))
            .cloned())
    }

    async fn store(&self, generation: &str, key: &str, snapshot: AssetSnapshot) -> Result<()> {
        self.generations
            .write()
            .await
            .entry(generation.to_string())
            .or_default()
            .insert(key.to_string(), snapshot);
        Ok(())
    }

    async fn stats(&self, generation: &str) -> Result<CacheStats> {
        let generations = self.generations.read().await;
        let entries = generations.get(generation);
        Ok(CacheStats {
            entries: entries.map(|e| e.len()).unwrap_or(0),
            total_size: entries
                .map(|e| e.values().map(|s| s.body.len() as u64).sum())
                .unwrap_or(0),
            hits: 0,
            misses: 0,
        })
    }

    async fn teardown(&self) -> Result<()> {
        self.generations.write().await.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn snapshot(url: &str, body: &[u8]) -> AssetSnapshot {
        AssetSnapshot {
            url: url.to_string(),
            status: 200,
            content_type: "text/css".to_string(),
            cached_at: Utc::now(),
            body: body.to_vec(),
        }
    }

    #[tokio::test]
    async fn test_disk_store_roundtrip() {
        let dir = tempdir().unwrap();
        let store = DiskCacheStore::new(dir.path());
        store.init().await.unwrap();

        let key = "GET https://example.com/style.css";
        store
            .store("v1", key, snapshot("https://example.com/style.css", b"body { }"))
            .await
            .unwrap();

        let found = store.lookup("v1", key).await.unwrap().unwrap();
        assert_eq!(found.url, "https://example.com/style.css");
        assert_eq!(found.status, 200);
        assert_eq!(found.content_type, "text/css");
        assert_eq!(found.body, b"body { }");
    }

    #[tokio::test]
    async fn test_disk_store_missing_entry_is_none() {
        let dir = tempdir().unwrap();
        let store = DiskCacheStore::new(dir.path());
        store.init().await.unwrap();

        let found = store.lookup("v1", "GET https://example.com/nope").await.unwrap();
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn test_disk_store_overwrites_entry() {
        let dir = tempdir().unwrap();
        let store = DiskCacheStore::new(dir.path());
        store.init().await.unwrap();

        let key = "GET https://example.com/app.js";
        store
            .store("v1", key, snapshot("https://example.com/app.js", b"old"))
            .await
            .unwrap();
        store
            .store("v1", key, snapshot("https://example.com/app.js", b"new"))
            .await
            .unwrap();

        let found = store.lookup("v1", key).await.unwrap().unwrap();
        assert_eq!(found.body, b"new");
    }

    #[tokio::test]
    async fn test_disk_store_lists_and_drops_generations() {
        let dir = tempdir().unwrap();
        let store = DiskCacheStore::new(dir.path());
        store.init().await.unwrap();

        store.open_generation("v1").await.unwrap();
        store.open_generation("v2").await.unwrap();

        let mut names = store.list_generations().await.unwrap();
        names.sort();
        assert_eq!(names, vec!["v1", "v2"]);

        assert!(store.drop_generation("v1").await.unwrap());
        assert!(!store.drop_generation("v1").await.unwrap());
        assert_eq!(store.list_generations().await.unwrap(), vec!["v2"]);
    }

    #[tokio::test]
    async fn test_disk_store_stats() {
        let dir = tempdir().unwrap();
        let store = DiskCacheStore::new(dir.path());
        store.init().await.unwrap();

        store
            .store("v1", "GET https://example.com/a", snapshot("https://example.com/a", b"aaaa"))
            .await
            .unwrap();
        store
            .store("v1", "GET https://example.com/b", snapshot("https://example.com/b", b"bb"))
            .await
            .unwrap();

        let stats = store.stats("v1").await.unwrap();
        assert_eq!(stats.entries, 2);
        assert_eq!(stats.total_size, 6);
    }

    #[tokio::test]
    async fn test_disk_store_corrupt_metadata_is_a_miss() {
        let dir = tempdir().unwrap();
        let store = DiskCacheStore::new(dir.path());
        store.init().await.unwrap();

        let key = "GET https://example.com/style.css";
        store
            .store("v1", key, snapshot("https://example.com/style.css", b"body { }"))
            .await
            .unwrap();

        let (meta_path, _) = store.entry_paths("v1", key);
        fs::write(&meta_path, b"not json").await.unwrap();

        assert!(store.lookup("v1", key).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_memory_store_roundtrip_and_drop() {
        let store = MemoryCacheStore::new();
        store.init().await.unwrap();
        store.open_generation("v1").await.unwrap();

        let key = "GET https://example.com/style.css";
        store
            .store("v1", key, snapshot("https://example.com/style.css", b"body { }"))
            .await
            .unwrap();
        assert!(store.lookup("v1", key).await.unwrap().is_some());
        assert_eq!(store.stats("v1").await.unwrap().entries, 1);

        assert!(store.drop_generation("v1").await.unwrap());
        assert!(store.lookup("v1", key).await.unwrap().is_none());
    }

    #[test]
    fn test_generation_name_validation() {
        assert!(check_generation_name("tilevault-assets-v1").is_ok());
        assert!(check_generation_name("").is_err());
        assert!(check_generation_name("../escape").is_err());
        assert!(check_generation_name("..").is_err());
    }
}
