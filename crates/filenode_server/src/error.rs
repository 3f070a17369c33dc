//! Error types for the node server.

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use filenode_protocol::ErrorBody;
use filenode_sync_engine::SyncError;
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;
use tracing::error;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors that can occur in the node server.
#[derive(Error, Debug)]
pub enum ServerError {
    /// Malformed request or a path outside the managed root.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// No such file.
    #[error("file not found: {0}")]
    NotFound(String),

    /// Method not supported on this path.
    #[error("method not allowed")]
    MethodNotAllowed,

    /// Sync requested inside the cooldown window.
    #[error("sync requested too frequently, retry in {}s", retry_after.as_secs().max(1))]
    TooFrequent {
        /// Time left until the next run may be admitted.
        retry_after: Duration,
    },

    /// A sync run is still in progress.
    #[error("a sync run is already in progress")]
    Busy,

    /// The listening socket could not be bound.
    #[error("cannot bind {addr}: {source}")]
    Bind {
        /// Requested address.
        addr: SocketAddr,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),

    /// I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ServerError {
    /// Returns true if this is a client error (4xx).
    pub fn is_client_error(&self) -> bool {
        self.status_code().is_client_error()
    }

    /// Returns true if this is a server error (5xx).
    pub fn is_server_error(&self) -> bool {
        self.status_code().is_server_error()
    }

    /// HTTP status reported for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ServerError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ServerError::NotFound(_) => StatusCode::NOT_FOUND,
            ServerError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            ServerError::TooFrequent { .. } => StatusCode::TOO_MANY_REQUESTS,
            ServerError::Busy => StatusCode::CONFLICT,
            ServerError::Bind { .. } | ServerError::Internal(_) | ServerError::Io(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl From<SyncError> for ServerError {
    fn from(err: SyncError) -> Self {
        match err {
            SyncError::InvalidPath(msg) => ServerError::InvalidRequest(msg),
            SyncError::TooFrequent { retry_after } => ServerError::TooFrequent { retry_after },
            SyncError::Busy => ServerError::Busy,
            SyncError::Io { path, source } if source.kind() == std::io::ErrorKind::NotFound => {
                ServerError::NotFound(path.display().to_string())
            }
            other => ServerError::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if self.is_server_error() {
            error!(error = %self, "request failed");
        }

        let body = ErrorBody {
            code: status.as_u16(),
            error: self.to_string(),
        };
        let mut response = (status, Json(body)).into_response();

        if let ServerError::TooFrequent { retry_after } = &self {
            let secs = retry_after.as_secs().max(1);
            if let Ok(value) = HeaderValue::from_str(&secs.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}
