//! # filenode protocol
//!
//! Pure data types shared by the filenode sync engine, the node HTTP API and
//! the command-line tools.
//!
//! This crate provides:
//! - `Digest`, the SHA-256 content hash identifying a file version
//! - `RelativePath`, a validated forward-slash path confined to the managed root
//! - `Inventory` and `DownloadTask`
//! - JSON messages exchanged with the central directory service and served by nodes
//!
//! This is a pure protocol crate with no I/O operations.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod digest;
mod error;
mod inventory;
mod messages;
mod path;

pub use digest::Digest;
pub use error::{ProtocolError, ProtocolResult};
pub use inventory::{DownloadTask, Inventory};
pub use messages::{
    ErrorBody, FileInfoResponse, FileListRequest, FileListResponse, FileRequest, FileResponse,
    ListResponse, RejectedEntry, RemoteFileEntry, SyncAccepted, FILE_GET_PATH, FILE_LIST_PATH,
    STATUS_OK,
};
pub use path::RelativePath;
