//! Persistent record store over an embedded sled database
//!
//! One sled tree per logical table, one record per filename. An insert is
//! not durable until the subsequent flush completes; `put` and `delete`
//! await both stages before resolving, so a caller that awaits a write and
//! then reads is guaranteed to observe the new value.

use crate::error::{Result, StoreError};
use crate::types::{BlobRecord, DeleteOutcome};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::task;
use tracing::{debug, warn};

/// Schema version pinned in the database meta key.
pub const SCHEMA_VERSION: u32 = 1;

/// Default table holding offline archive blobs.
pub const DEFAULT_TABLE: &str = "offline-pmtiles";

/// Reserved meta key in the default tree.
const SCHEMA_KEY: &[u8] = b"__tilevault_schema";

struct StoreInner {
    db: sled::Db,
    /// None for temporary (in-memory) databases.
    path: Option<PathBuf>,
}

/// Cloneable connection handle to an open record database.
///
/// Clones share the underlying database and each counts as an open
/// connection; [`RecordStore::delete_database`] is blocked while sibling
/// clones remain live. Each operation opens its own short-lived tree
/// handle rather than holding a long-lived transaction.
#[derive(Clone)]
pub struct RecordStore {
    inner: Arc<StoreInner>,
}

impl RecordStore {
    /// Open the database at `path`, creating it if absent.
    ///
    /// Fails with [`StoreError::Unavailable`] when the directory cannot be
    /// opened or the stored schema version does not match
    /// [`SCHEMA_VERSION`].
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let (db, path) = task::spawn_blocking(move || -> Result<(sled::Db, PathBuf)> {
            let db = sled::open(&path).map_err(|e| StoreError::Unavailable(e.to_string()))?;
            check_schema(&db)?;
            Ok((db, path))
        })
        .await
        .map_err(|e| StoreError::Unavailable(e.to_string()))??;

        debug!(path = %path.display(), "opened record database");
        Ok(Self {
            inner: Arc::new(StoreInner {
                db,
                path: Some(path),
            }),
        })
    }

    /// Open an in-memory database for tests and ephemeral use.
    ///
    /// Nothing persists; the contract is otherwise identical to [`open`].
    ///
    /// [`open`]: RecordStore::open
    pub fn temporary() -> Result<Self> {
        let db = sled::Config::default()
            .temporary(true)
            .open()
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        check_schema(&db)?;
        Ok(Self {
            inner: Arc::new(StoreInner { db, path: None }),
        })
    }

    /// Point lookup by filename. A missing record is `Ok(None)`, not an
    /// error.
    pub async fn get(&self, table: &str, key: &str) -> Result<Option<BlobRecord>> {
        let inner = self.inner.clone();
        let table = table.to_string();
        let key = key.to_string();
        task::spawn_blocking(move || {
            let tree = inner
                .db
                .open_tree(table.as_str())
                .map_err(|e| StoreError::Unavailable(e.to_string()))?;
            let value = tree
                .get(key.as_bytes())
                .map_err(|e| StoreError::Unavailable(e.to_string()))?;
            Ok(value.map(|payload| BlobRecord {
                filename: key,
                payload: payload.to_vec(),
            }))
        })
        .await
        .map_err(|e| StoreError::Unavailable(e.to_string()))?
    }

    /// Upsert by filename.
    ///
    /// Resolves only after the insert and its durability flush have both
    /// completed; either stage failing is [`StoreError::WriteFailed`].
    pub async fn put(&self, table: &str, record: BlobRecord) -> Result<()> {
        if record.filename.is_empty() {
            return Err(StoreError::InvalidRecord("empty filename".to_string()));
        }
        let filename = record.filename.clone();
        let bytes = record.payload.len();
        let tree = self.write_tree(table, move |tree| {
            tree.insert(record.filename.as_bytes(), record.payload)
                .map(|_| ())
        })
        .await?;
        tree.flush_async()
            .await
            .map_err(|e| StoreError::WriteFailed(e.to_string()))?;
        debug!(table, filename = %filename, bytes, "record written and flushed");
        Ok(())
    }

    /// Remove the record if present; succeeds for absent keys too.
    pub async fn delete(&self, table: &str, key: &str) -> Result<()> {
        let key_owned = key.to_string();
        let tree = self
            .write_tree(table, move |tree| {
                tree.remove(key_owned.as_bytes()).map(|_| ())
            })
            .await?;
        tree.flush_async()
            .await
            .map_err(|e| StoreError::WriteFailed(e.to_string()))?;
        debug!(table, key, "record deleted");
        Ok(())
    }

    /// Destroy the whole database, not just one record.
    ///
    /// Consumes this handle. While other clones remain open the deletion is
    /// blocked: nothing is removed and the outcome is
    /// [`DeleteOutcome::Blocked`], never success.
    pub async fn delete_database(self) -> Result<DeleteOutcome> {
        match Arc::try_unwrap(self.inner) {
            Ok(inner) => {
                let path = inner.path.clone();
                drop(inner);
                if let Some(path) = path {
                    tokio::fs::remove_dir_all(&path).await?;
                    debug!(path = %path.display(), "database deleted");
                }
                Ok(DeleteOutcome::Deleted)
            }
            Err(inner) => {
                warn!(
                    connections = Arc::strong_count(&inner) - 1,
                    "database deletion blocked; close other connections first"
                );
                Ok(DeleteOutcome::Blocked)
            }
        }
    }

    /// Number of live connection handles, including this one.
    pub fn connection_count(&self) -> usize {
        Arc::strong_count(&self.inner)
    }

    async fn write_tree<F>(&self, table: &str, op: F) -> Result<sled::Tree>
    where
        F: FnOnce(&sled::Tree) -> sled::Result<()> + Send + 'static,
    {
        let inner = self.inner.clone();
        let table = table.to_string();
        task::spawn_blocking(move || {
            let tree = inner
                .db
                .open_tree(table.as_str())
                .map_err(|e| StoreError::WriteFailed(e.to_string()))?;
            op(&tree).map_err(|e| StoreError::WriteFailed(e.to_string()))?;
            Ok(tree)
        })
        .await
        .map_err(|e| StoreError::WriteFailed(e.to_string()))?
    }
}

fn check_schema(db: &sled::Db) -> Result<()> {
    let stored = db
        .get(SCHEMA_KEY)
        .map_err(|e| StoreError::Unavailable(e.to_string()))?;
    match stored {
        Some(raw) => {
            let found = raw
                .as_ref()
                .try_into()
                .map(u32::from_be_bytes)
                .unwrap_or(0);
            if found != SCHEMA_VERSION {
                return Err(StoreError::Unavailable(format!(
                    "incompatible schema version {} (expected {})",
                    found, SCHEMA_VERSION
                )));
            }
        }
        None => {
            db.insert(SCHEMA_KEY, &SCHEMA_VERSION.to_be_bytes())
                .map_err(|e| StoreError::Unavailable(e.to_string()))?;
            db.flush()
                .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        }
    }
    Ok(())
}
