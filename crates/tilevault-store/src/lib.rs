//! Durable offline storage for PMTiles archives
//!
//! Stores a whole tiled-map archive as a single named blob in an embedded
//! key-value database and answers arbitrary byte-range reads against it,
//! satisfying the byte-source contract the PMTiles archive reader expects.
//! Once the archive is written, reads never touch the network.

pub mod error;
pub mod source;
pub mod store;
pub mod types;

pub use error::{Result, StoreError};
pub use source::{ByteSource, StoredBlobSource};
pub use store::{RecordStore, DEFAULT_TABLE, SCHEMA_VERSION};
pub use types::{BlobRecord, DeleteOutcome, RangeResponse};
