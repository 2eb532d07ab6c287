//! Error types for bowdb
//!
//! Provides a unified error type for the record layer and the engine below it.
//! `Error` is `Clone` so a bucket created in an error state can hand the same
//! error back from every operation.

use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

/// Result type alias using Error
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for bowdb operations
#[derive(Debug, Clone, Error)]
pub enum Error {
    // -------------------------------------------------------------------------
    // Record Layer Errors
    // -------------------------------------------------------------------------
    #[error("record doesn't exist")]
    NotFound,

    #[error("put and delete aren't allowed in read-only mode")]
    ReadOnly,

    #[error("reached maximum amount of buckets ({max})")]
    CapacityExceeded { max: u32 },

    #[error("{type_name} is not a valid key: {reason}")]
    KeyType {
        type_name: &'static str,
        reason: String,
    },

    #[error("invalid id: {0}")]
    InvalidId(String),

    // -------------------------------------------------------------------------
    // Serialization Errors
    // -------------------------------------------------------------------------
    #[error("codec error: {0}")]
    Codec(String),

    // -------------------------------------------------------------------------
    // Metadata Errors
    // -------------------------------------------------------------------------
    #[error("database version {found} is not supported (expected {expected})")]
    VersionMismatch { found: u32, expected: u32 },

    #[error("no database found at {0}")]
    Uninitialized(PathBuf),

    // -------------------------------------------------------------------------
    // Engine Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(Arc<std::io::Error>),

    #[error("WAL corruption detected: {0}")]
    WalCorruption(String),

    #[error("Storage error: {0}")]
    Storage(String),

    // -------------------------------------------------------------------------
    // Subscription Errors
    // -------------------------------------------------------------------------
    #[error("subscription closed")]
    Closed,
}

impl Error {
    /// True when the error means "absent", as opposed to a failure.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound)
    }

    pub(crate) fn key_type<T: ?Sized>(reason: impl Into<String>) -> Self {
        Error::KeyType {
            type_name: std::any::type_name::<T>(),
            reason: reason.into(),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(Arc::new(e))
    }
}

impl From<bincode::Error> for Error {
    fn from(e: bincode::Error) -> Self {
        Error::Codec(e.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Codec(e.to_string())
    }
}
