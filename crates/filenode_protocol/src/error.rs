//! Error types for protocol values.

use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors raised while validating or decoding protocol values.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// A digest string was not 64 hex characters.
    #[error("invalid digest {value:?}: {reason}")]
    InvalidDigest {
        /// The offending input.
        value: String,
        /// Why it was rejected.
        reason: String,
    },

    /// A relative path was empty, absolute or escaped the root.
    #[error("invalid path {path:?}: {reason}")]
    InvalidPath {
        /// The offending input.
        path: String,
        /// Why it was rejected.
        reason: &'static str,
    },

    /// A file payload was missing or not valid base64.
    #[error("invalid payload: {0}")]
    InvalidPayload(String),
}

impl ProtocolError {
    pub(crate) fn invalid_path(path: impl Into<String>, reason: &'static str) -> Self {
        Self::InvalidPath {
            path: path.into(),
            reason,
        }
    }
}
