//! Record and range types for the tilevault store

use crate::error::{Result, StoreError};
use serde::{Deserialize, Serialize};

/// A named binary payload stored as a single record.
///
/// At most one record exists per filename; writing an existing filename
/// replaces the prior payload wholesale, never patching individual bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobRecord {
    pub filename: String,
    pub payload: Vec<u8>,
}

impl BlobRecord {
    /// Create a record, validating it at the storage boundary.
    pub fn new(filename: impl Into<String>, payload: Vec<u8>) -> Result<Self> {
        let filename = filename.into();
        if filename.is_empty() {
            return Err(StoreError::InvalidRecord("empty filename".to_string()));
        }
        Ok(Self { filename, payload })
    }
}

/// Bytes returned by a range read.
///
/// Empty data means "no data"; the archive reader distinguishes that from
/// an error by length alone.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RangeResponse {
    pub data: Vec<u8>,
}

/// Outcome of a whole-database deletion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    /// The database and its files are gone.
    Deleted,
    /// Other connections are still open; nothing was deleted.
    Blocked,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_new_accepts_filename() {
        let record = BlobRecord::new("firenze.pmtiles", vec![1, 2, 3]).unwrap();
        assert_eq!(record.filename, "firenze.pmtiles");
        assert_eq!(record.payload, vec![1, 2, 3]);
    }

    #[test]
    fn test_record_new_rejects_empty_filename() {
        let result = BlobRecord::new("", vec![1, 2, 3]);
        assert!(matches!(result, Err(StoreError::InvalidRecord(_))));
    }

    #[test]
    fn test_record_serialization() {
        let record = BlobRecord::new("firenze.pmtiles", vec![0, 255, 7]).unwrap();

        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains("firenze.pmtiles"));

        let deserialized: BlobRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized, record);
    }

    #[test]
    fn test_range_response_default_is_empty() {
        let response = RangeResponse::default();
        assert!(response.data.is_empty());
    }

    #[test]
    fn test_delete_outcome_blocked_is_not_deleted() {
        assert_ne!(DeleteOutcome::Blocked, DeleteOutcome::Deleted);
    }
}
