//! Error types for validator session cache operations.
//!
//! Callers must be able to tell "no cached session" apart from "the cache could
//! not answer", so storage failures are always surfaced as errors and never
//! folded into a miss.

use std::path::PathBuf;

/// Low-level failure underneath a [`CacheError::StorageUnavailable`].
#[derive(Debug, thiserror::Error)]
pub enum StorageFailure {
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// All errors that can occur in cache operations.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    // ─────────────────────────────────────────────────────────────────────
    // Input Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("Invalid validation context: {field} must not be empty")]
    InvalidContext { field: &'static str },

    // ─────────────────────────────────────────────────────────────────────
    // Storage Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("Session store unavailable: {context}: {source}")]
    StorageUnavailable {
        context: String,
        #[source]
        source: StorageFailure,
    },

    #[error("Corrupt validator session record {canonical_key}: {details}")]
    CorruptRecord {
        canonical_key: String,
        details: String,
    },

    // ─────────────────────────────────────────────────────────────────────
    // Configuration Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("Configuration file unreadable: {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Configuration file malformed: {path}: {details}")]
    ConfigMalformed { path: PathBuf, details: String },

    #[error("No default location for {0}; set it explicitly")]
    NoDefaultPath(&'static str),
}

impl CacheError {
    pub(crate) fn storage(context: impl Into<String>, source: impl Into<StorageFailure>) -> Self {
        CacheError::StorageUnavailable {
            context: context.into(),
            source: source.into(),
        }
    }

    /// True when the backing store could not be read or written.
    pub fn is_storage_unavailable(&self) -> bool {
        matches!(self, CacheError::StorageUnavailable { .. })
    }
}

/// Convenience type alias for Results using CacheError.
pub type Result<T> = std::result::Result<T, CacheError>;
