//! JSON messages.
//!
//! Two families live here: requests and responses exchanged with the central
//! directory service, and the bodies a node returns from its own HTTP API.

use crate::digest::Digest;
use crate::error::{ProtocolError, ProtocolResult};
use crate::inventory::Inventory;
use crate::path::RelativePath;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};

/// Path of the central service's inventory endpoint.
pub const FILE_LIST_PATH: &str = "/api/filelist";

/// Path of the central service's file endpoint.
pub const FILE_GET_PATH: &str = "/api/get";

/// Application-level success code carried in response bodies.
pub const STATUS_OK: u16 = 200;

/// Query parameters for an inventory read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileListRequest {
    /// Node identity the inventory is scoped to.
    pub node: String,
}

/// One `{filename, hash}` pair as sent by the central service.
///
/// Fields are kept as raw strings; validation happens when the list is
/// turned into an [`Inventory`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteFileEntry {
    /// Path relative to the node root.
    pub filename: String,
    /// Hex SHA-256 of the file content.
    pub hash: String,
}

/// An entry dropped while building an inventory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedEntry {
    /// The entry as received.
    pub entry: RemoteFileEntry,
    /// Why it was dropped.
    pub error: ProtocolError,
}

/// Inventory response from the central service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileListResponse {
    /// Application status code, when the service sends one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<u16>,
    /// File entries. A missing list means an empty inventory.
    #[serde(default)]
    pub data: Vec<RemoteFileEntry>,
    /// Human-readable message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub msg: Option<String>,
}

impl FileListResponse {
    /// Returns true unless the body carries a non-success code.
    pub fn is_success(&self) -> bool {
        self.code.map_or(true, |code| code == STATUS_OK)
    }

    /// Converts the entry list into an inventory.
    ///
    /// Entries with an unsafe path or malformed digest are returned separately
    /// rather than failing the whole list. When a path appears twice the later
    /// entry wins.
    pub fn into_inventory(self) -> (Inventory, Vec<RejectedEntry>) {
        let mut inventory = Inventory::new();
        let mut rejected = Vec::new();

        for entry in self.data {
            let parsed = RelativePath::new(&entry.filename)
                .and_then(|path| entry.hash.parse::<Digest>().map(|digest| (path, digest)));
            match parsed {
                Ok((path, digest)) => {
                    inventory.insert(path, digest);
                }
                Err(error) => rejected.push(RejectedEntry { entry, error }),
            }
        }

        (inventory, rejected)
    }
}

/// Query parameters for a file read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRequest {
    /// Path of the file relative to the node root.
    pub name: String,
    /// Expected digest, hex encoded.
    pub hash: String,
    /// Requesting node identity.
    pub node: String,
}

impl FileRequest {
    /// Builds the request for one file.
    pub fn new(path: &RelativePath, expected: &Digest, node: impl Into<String>) -> Self {
        Self {
            name: path.as_str().to_string(),
            hash: expected.to_hex(),
            node: node.into(),
        }
    }
}

/// File response from the central service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileResponse {
    /// Application status code; anything but 200 is a failure.
    pub code: u16,
    /// Base64 file content.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filedata: Option<String>,
    /// Human-readable message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub msg: Option<String>,
}

impl FileResponse {
    /// Builds a success response carrying `data`.
    pub fn success(data: &[u8]) -> Self {
        Self {
            code: STATUS_OK,
            filedata: Some(STANDARD.encode(data)),
            msg: None,
        }
    }

    /// Builds a failure response.
    pub fn error(code: u16, msg: impl Into<String>) -> Self {
        Self {
            code,
            filedata: None,
            msg: Some(msg.into()),
        }
    }

    /// Returns true if the code signals success.
    pub fn is_success(&self) -> bool {
        self.code == STATUS_OK
    }

    /// Decodes the base64 payload.
    pub fn decode_payload(&self) -> ProtocolResult<Vec<u8>> {
        let encoded = self
            .filedata
            .as_deref()
            .ok_or_else(|| ProtocolError::InvalidPayload("missing filedata".into()))?;
        STANDARD
            .decode(encoded.trim())
            .map_err(|e| ProtocolError::InvalidPayload(e.to_string()))
    }
}

/// Body of a node's `GET /api/list`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListResponse {
    /// Always 200.
    pub code: u16,
    /// Sorted relative paths of served files.
    pub files: Vec<String>,
    /// Node identity.
    pub node: String,
    /// Status message.
    pub msg: String,
}

/// Body of a node's `GET /api/info/{path}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileInfoResponse {
    /// Always 200.
    pub code: u16,
    /// Relative path of the file.
    pub filename: String,
    /// Hex digest of the file content.
    pub hash: String,
    /// Absolute URL the file can be downloaded from.
    pub download_url: String,
    /// Node identity.
    pub node: String,
    /// Status message.
    pub msg: String,
}

/// Body of an accepted `POST /api/sync`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncAccepted {
    /// Always 200.
    pub code: u16,
    /// Status message.
    pub msg: String,
    /// Node identity.
    pub node: String,
    /// Identifier of the admitted run.
    pub run_id: String,
}

/// Error body returned by node endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// HTTP status code.
    pub code: u16,
    /// Error description.
    pub error: String,
}
