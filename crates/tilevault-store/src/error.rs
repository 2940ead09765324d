//! Error types for the tilevault store

use std::fmt;

#[derive(Debug)]
pub enum StoreError {
    /// The backing database could not be opened, or holds an incompatible
    /// schema version.
    Unavailable(String),
    /// A record write or its durability flush failed.
    WriteFailed(String),
    /// A range read was cancelled before any work began.
    Aborted,
    /// A record failed validation at the storage boundary.
    InvalidRecord(String),
    Io(Box<std::io::Error>),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Unavailable(msg) => write!(f, "Store unavailable: {}", msg),
            StoreError::WriteFailed(msg) => write!(f, "Write failed: {}", msg),
            StoreError::Aborted => write!(f, "Read aborted before start"),
            StoreError::InvalidRecord(msg) => write!(f, "Invalid record: {}", msg),
            StoreError::Io(err) => write!(f, "IO error: {}", err),
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StoreError::Io(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        StoreError::Io(Box::new(err))
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
