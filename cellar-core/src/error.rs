//! # Error Handling
//!
//! Error types for cellar operations. Transaction-state misuse is reported
//! through dedicated sentinel variants so callers can match on them.

use thiserror::Error;

/// Result type alias for cellar operations
pub type Result<T> = std::result::Result<T, Error>;

/// Primary error type for the cellar store
#[derive(Error, Debug)]
pub enum Error {
    // Transaction state
    #[error("transaction is not writable")]
    TxNotWritable,

    #[error("transaction is managed, commit and rollback are automatic")]
    TxIsManaged,

    #[error("transaction has already been committed or rolled back")]
    TxClosed,

    // Store lifecycle
    #[error("store is closed")]
    StoreClosed,

    // Recovery
    #[error("segment corruption in {path}: {reason}")]
    Corruption { path: String, reason: String },

    #[error("manifest references segment {seq} which is missing or invalid")]
    ManifestMismatch { seq: u64 },

    // System
    #[error("IO error: {message}")]
    Io {
        message: String,
        source: std::io::Error,
    },

    /// Application-level error, typically returned from a transaction
    /// callback to trigger rollback.
    #[error("{message}")]
    Other { message: String },
}

impl Error {
    pub fn other(message: impl Into<String>) -> Self {
        Error::Other {
            message: message.into(),
        }
    }
}

// Conversion from std::io::Error
impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io {
            message: err.to_string(),
            source: err,
        }
    }
}
