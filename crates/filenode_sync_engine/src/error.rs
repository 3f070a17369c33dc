//! Error types for the sync engine.

use filenode_protocol::{Digest, ProtocolError, RelativePath};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur during sync operations.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Local disk unreadable or unwritable.
    #[error("io error at {}: {source}", path.display())]
    Io {
        /// Path being accessed.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Transport failure or non-success status from the central service.
    #[error("network error: {0}")]
    Network(String),

    /// Malformed response body.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Downloaded bytes did not hash to the expected digest.
    #[error("digest mismatch for {path}: expected {expected}, got {actual}")]
    Integrity {
        /// File being fetched.
        path: RelativePath,
        /// Digest from the inventory.
        expected: Digest,
        /// Digest of the received bytes.
        actual: Digest,
    },

    /// Sync requested before the cooldown elapsed.
    #[error("sync requested too frequently, retry in {}s", retry_after.as_secs().max(1))]
    TooFrequent {
        /// Time left until the next run may be admitted.
        retry_after: Duration,
    },

    /// A previously admitted run has not finished yet.
    #[error("a sync run is already in progress")]
    Busy,

    /// Path rejected because it resolves outside the managed root.
    #[error("invalid path: {0}")]
    InvalidPath(String),

    /// The run was cancelled.
    #[error("sync cancelled")]
    Cancelled,

    /// A request or the run deadline timed out.
    #[error("operation timed out")]
    Timeout,

    /// Invalid configuration.
    #[error("configuration error: {0}")]
    Config(String),
}

impl SyncError {
    /// Creates an I/O error for `path`.
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Creates a network error.
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network(message.into())
    }

    /// Returns true if a fetch attempt failing with this error may be retried.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SyncError::Io { .. }
                | SyncError::Network(_)
                | SyncError::Protocol(_)
                | SyncError::Integrity { .. }
                | SyncError::Timeout
        )
    }

    /// Returns true for admission rejections, which are not internal failures.
    pub fn is_rejection(&self) -> bool {
        matches!(self, SyncError::TooFrequent { .. } | SyncError::Busy)
    }
}

impl From<ProtocolError> for SyncError {
    fn from(err: ProtocolError) -> Self {
        match err {
            ProtocolError::InvalidPath { .. } => SyncError::InvalidPath(err.to_string()),
            other => SyncError::Protocol(other.to_string()),
        }
    }
}
