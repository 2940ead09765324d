//! Range-addressable blob source
//!
//! Synthesizes the byte-range contract on top of whole-record storage: the
//! record store reads whole records, not ranges, so the payload is
//! materialized here and sliced per request.

use crate::error::{Result, StoreError};
use crate::store::{RecordStore, DEFAULT_TABLE};
use crate::types::{BlobRecord, DeleteOutcome, RangeResponse};
use async_trait::async_trait;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Byte-range read contract consumed by the archive reader.
///
/// The reader treats this as its sole means of obtaining file bytes and
/// never assumes random-access memory mapping.
#[async_trait]
pub trait ByteSource: Send + Sync {
    /// Read the bytes in `[offset, offset + length)`, shortened at end of
    /// payload. Empty data means "no data", not an error.
    async fn get_bytes(
        &self,
        offset: u64,
        length: u64,
        signal: Option<&CancellationToken>,
        etag: Option<&str>,
    ) -> Result<RangeResponse>;

    /// Stable identity string used by the reader for its own caching.
    fn key(&self) -> String;
}

/// Blob source backed by a single [`RecordStore`] record.
///
/// Multiple sources may share one store handle under different filenames;
/// each operation runs in its own short-lived transaction.
pub struct StoredBlobSource {
    store: RecordStore,
    table: String,
    filename: String,
}

impl StoredBlobSource {
    /// Source bound to `filename` in the default table.
    pub fn new(store: RecordStore, filename: impl Into<String>) -> Self {
        Self::with_table(store, filename, DEFAULT_TABLE)
    }

    /// Source bound to `filename` in a caller-chosen table.
    pub fn with_table(
        store: RecordStore,
        filename: impl Into<String>,
        table: impl Into<String>,
    ) -> Self {
        Self {
            store,
            table: table.into(),
            filename: filename.into(),
        }
    }

    /// True iff a record with this source's filename is present.
    ///
    /// Lookup failures are swallowed to `false`; callers use this to skip
    /// redundant downloads, not to detect store health.
    pub async fn exists(&self) -> bool {
        match self.store.get(&self.table, &self.filename).await {
            Ok(record) => record.is_some(),
            Err(err) => {
                warn!(filename = %self.filename, error = %err, "existence check failed");
                false
            }
        }
    }

    /// Write or overwrite the archive record.
    ///
    /// Resolves only once the write is durably flushed, so a read issued
    /// after this completes observes the new payload.
    pub async fn set_source(&self, record: BlobRecord) -> Result<()> {
        self.store.put(&self.table, record).await
    }

    /// Remove this blob's record only.
    pub async fn delete_file(&self) -> Result<()> {
        self.store.delete(&self.table, &self.filename).await
    }

    /// Remove the entire backing database, all blobs included.
    ///
    /// Consumes the source and its connection; blocked while other sources
    /// hold the same connection open.
    pub async fn delete_database(self) -> Result<DeleteOutcome> {
        self.store.delete_database().await
    }

    async fn fetch_slice(&self, start: u64, end: u64) -> Option<Vec<u8>> {
        let started = Instant::now();
        match self.store.get(&self.table, &self.filename).await {
            Ok(Some(record)) => {
                let slice = slice_payload(&record.payload, start, end);
                debug!(
                    filename = %self.filename,
                    start,
                    end,
                    bytes = slice.len(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "retrieved and sliced blob"
                );
                Some(slice)
            }
            Ok(None) => {
                debug!(filename = %self.filename, start, end, "no blob found");
                None
            }
            Err(err) => {
                warn!(filename = %self.filename, error = %err, "blob lookup failed");
                None
            }
        }
    }
}

#[async_trait]
impl ByteSource for StoredBlobSource {
    /// Lookup and slice failures are recovered into an empty response; the
    /// archive reader treats short reads as its own integrity failure. Only
    /// a signal already cancelled before the read begins propagates, as
    /// [`StoreError::Aborted`], without touching the store.
    async fn get_bytes(
        &self,
        offset: u64,
        length: u64,
        signal: Option<&CancellationToken>,
        _etag: Option<&str>,
    ) -> Result<RangeResponse> {
        if signal.is_some_and(|token| token.is_cancelled()) {
            return Err(StoreError::Aborted);
        }
        let end = offset.saturating_add(length);
        let data = self.fetch_slice(offset, end).await.unwrap_or_default();
        Ok(RangeResponse { data })
    }

    fn key(&self) -> String {
        self.filename.clone()
    }
}

/// Slice `[start, end)` out of the payload, shortened at end of payload,
/// never zero-padded.
fn slice_payload(payload: &[u8], start: u64, end: u64) -> Vec<u8> {
    let len = payload.len() as u64;
    let start = start.min(len) as usize;
    let end = end.clamp(start as u64, len) as usize;
    payload[start..end].to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn source_with_payload(payload: &[u8]) -> StoredBlobSource {
        let store = RecordStore::temporary().unwrap();
        let source = StoredBlobSource::new(store, "firenze.pmtiles");
        source
            .set_source(BlobRecord::new("firenze.pmtiles", payload.to_vec()).unwrap())
            .await
            .unwrap();
        source
    }

    #[test]
    fn test_slice_payload_in_bounds() {
        assert_eq!(slice_payload(b"0123456789", 2, 6), b"2345");
    }

    #[test]
    fn test_slice_payload_overlapping_end_is_short_not_padded() {
        // Available bytes only, never zero-padding.
        assert_eq!(slice_payload(b"0123456789", 8, 16), b"89");
    }

    #[test]
    fn test_slice_payload_past_end_is_empty() {
        assert!(slice_payload(b"0123456789", 10, 14).is_empty());
        assert!(slice_payload(b"0123456789", 42, 50).is_empty());
    }

    #[test]
    fn test_slice_payload_zero_length() {
        assert!(slice_payload(b"0123456789", 3, 3).is_empty());
    }

    #[tokio::test]
    async fn test_get_bytes_roundtrip() {
        let payload = b"complete archive payload";
        let source = source_with_payload(payload).await;

        let response = source
            .get_bytes(0, payload.len() as u64, None, None)
            .await
            .unwrap();
        assert_eq!(response.data, payload);
    }

    #[tokio::test]
    async fn test_get_bytes_range_math() {
        let payload = b"0123456789";
        let source = source_with_payload(payload).await;

        for (offset, length, expected) in [
            (0u64, 4u64, &b"0123"[..]),
            (4, 4, b"4567"),
            (8, 100, b"89"),
            (10, 1, b""),
            (200, 10, b""),
        ] {
            let response = source.get_bytes(offset, length, None, None).await.unwrap();
            assert_eq!(response.data, expected, "offset={} length={}", offset, length);
        }
    }

    #[tokio::test]
    async fn test_get_bytes_missing_record_is_empty_not_error() {
        let store = RecordStore::temporary().unwrap();
        let source = StoredBlobSource::new(store, "never-written.pmtiles");

        let response = source.get_bytes(0, 1024, None, None).await.unwrap();
        assert!(response.data.is_empty());
    }

    #[tokio::test]
    async fn test_get_bytes_pre_aborted_signal() {
        let source = source_with_payload(b"payload").await;
        let token = CancellationToken::new();
        token.cancel();

        let result = source.get_bytes(0, 7, Some(&token), None).await;
        assert!(matches!(result, Err(StoreError::Aborted)));
    }

    #[tokio::test]
    async fn test_get_bytes_untripped_signal_reads_normally() {
        let source = source_with_payload(b"payload").await;
        let token = CancellationToken::new();

        let response = source.get_bytes(0, 7, Some(&token), None).await.unwrap();
        assert_eq!(response.data, b"payload");
    }

    #[tokio::test]
    async fn test_exists_lifecycle() {
        let store = RecordStore::temporary().unwrap();
        let source = StoredBlobSource::new(store, "firenze.pmtiles");
        assert!(!source.exists().await);

        source
            .set_source(BlobRecord::new("firenze.pmtiles", b"bytes".to_vec()).unwrap())
            .await
            .unwrap();
        assert!(source.exists().await);

        source.delete_file().await.unwrap();
        assert!(!source.exists().await);
    }

    #[tokio::test]
    async fn test_overwrite_leaves_no_residual_bytes() {
        let source = source_with_payload(b"the first, longer payload").await;
        source
            .set_source(BlobRecord::new("firenze.pmtiles", b"second".to_vec()).unwrap())
            .await
            .unwrap();

        // Read-after-write: the awaited set_source makes the new payload
        // visible, including its new length.
        let response = source.get_bytes(0, 1024, None, None).await.unwrap();
        assert_eq!(response.data, b"second");

        let past_new_end = source.get_bytes(6, 1024, None, None).await.unwrap();
        assert!(past_new_end.data.is_empty());
    }

    #[tokio::test]
    async fn test_sources_share_one_connection() {
        let store = RecordStore::temporary().unwrap();
        let a = StoredBlobSource::new(store.clone(), "a.pmtiles");
        let b = StoredBlobSource::new(store, "b.pmtiles");

        a.set_source(BlobRecord::new("a.pmtiles", b"aaaa".to_vec()).unwrap())
            .await
            .unwrap();
        b.set_source(BlobRecord::new("b.pmtiles", b"bb".to_vec()).unwrap())
            .await
            .unwrap();

        assert_eq!(a.get_bytes(0, 16, None, None).await.unwrap().data, b"aaaa");
        assert_eq!(b.get_bytes(0, 16, None, None).await.unwrap().data, b"bb");

        a.delete_file().await.unwrap();
        assert!(!a.exists().await);
        assert!(b.exists().await);
    }

    #[tokio::test]
    async fn test_delete_database_blocked_while_sibling_source_open() {
        let store = RecordStore::temporary().unwrap();
        let a = StoredBlobSource::new(store.clone(), "a.pmtiles");
        let _b = StoredBlobSource::new(store, "b.pmtiles");

        let outcome = a.delete_database().await.unwrap();
        assert_eq!(outcome, DeleteOutcome::Blocked);
    }

    #[tokio::test]
    async fn test_delete_database_with_sole_connection() {
        let store = RecordStore::temporary().unwrap();
        let source = StoredBlobSource::new(store, "a.pmtiles");
        let outcome = source.delete_database().await.unwrap();
        assert_eq!(outcome, DeleteOutcome::Deleted);
    }

    #[tokio::test]
    async fn test_key_is_filename() {
        let store = RecordStore::temporary().unwrap();
        let source = StoredBlobSource::new(store, "firenze.pmtiles");
        assert_eq!(source.key(), "firenze.pmtiles");
    }
}
