//! Error types for the paged file cache.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias using [`CacheError`].
pub type Result<T> = std::result::Result<T, CacheError>;

/// Error types produced by the cache, a mapping, or a cursor.
#[derive(Debug, Error)]
pub enum CacheError {
    /// Bad flag combination, an oversized file page, or a conflicting remap size.
    #[error("argument error: {0}")]
    Argument(String),

    /// Operation attempted on a closed cache, a closed mapping, or a mapping
    /// that still has open cursors.
    #[error("illegal state: {0}")]
    IllegalState(String),

    /// Underlying channel read/write/force/close failed.
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A frame's writeback failed during eviction. The frame stays dirty and
    /// is ineligible as a victim until its mapping is flushed or closed
    /// successfully.
    #[error("frame poisoned by a failed writeback for {path}, page {page_index}: {source}")]
    Poisoned {
        path: PathBuf,
        page_index: u64,
        #[source]
        source: std::io::Error,
    },

    /// No unpinned frame became available within the configured backoff bound.
    #[error("no frame available for eviction within the configured bound")]
    NoFrameAvailable,

    /// Aggregated failure from [`crate::Cache::close`], which attempts to
    /// close every mapping even after the first failure.
    #[error("{first} ({additional_failures} additional mapping(s) also failed to close)")]
    Aggregate {
        #[source]
        first: Box<CacheError>,
        additional_failures: usize,
    },
}

impl CacheError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        CacheError::Io {
            path: path.into(),
            source,
        }
    }
}
