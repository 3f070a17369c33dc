//! HTTP client for the central directory service.
//!
//! Two endpoints are used, both `GET` with query parameters and JSON bodies:
//! - `/api/filelist?node=...` returns `{"data": [{"filename", "hash"}, ...]}`
//! - `/api/get?name=...&hash=...&node=...` returns `{"code", "filedata"}` with
//!   the file content base64-encoded

use crate::config::{SyncConfig, DEFAULT_FILE_TIMEOUT, DEFAULT_INVENTORY_TIMEOUT};
use crate::error::{SyncError, SyncResult};
use crate::remote::RemoteSource;
use async_trait::async_trait;
use filenode_protocol::{
    DownloadTask, FileListRequest, FileListResponse, FileRequest, FileResponse, Inventory,
    FILE_GET_PATH, FILE_LIST_PATH,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, warn};

/// Remote source backed by the central service's HTTP API.
#[derive(Debug, Clone)]
pub struct HttpRemote {
    base_url: String,
    node_id: String,
    client: reqwest::Client,
    inventory_timeout: Duration,
    file_timeout: Duration,
}

impl HttpRemote {
    /// Creates a client for the service at `api_url`.
    pub fn new(api_url: &str, node_id: impl Into<String>) -> SyncResult<Self> {
        let parsed = url::Url::parse(api_url)
            .map_err(|e| SyncError::Config(format!("invalid api url {api_url:?}: {e}")))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(SyncError::Config(format!(
                "unsupported api url scheme {:?}",
                parsed.scheme()
            )));
        }

        let client = reqwest::Client::builder()
            .user_agent(concat!("filenode/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| SyncError::Config(format!("cannot build http client: {e}")))?;

        Ok(Self {
            base_url: api_url.trim_end_matches('/').to_string(),
            node_id: node_id.into(),
            client,
            inventory_timeout: DEFAULT_INVENTORY_TIMEOUT,
            file_timeout: DEFAULT_FILE_TIMEOUT,
        })
    }

    /// Creates a client from a sync configuration.
    pub fn from_config(config: &SyncConfig) -> SyncResult<Self> {
        Ok(Self::new(&config.api_url, config.node_id.clone())?
            .with_timeouts(config.inventory_timeout, config.file_timeout))
    }

    /// Sets the per-request timeouts.
    pub fn with_timeouts(mut self, inventory: Duration, file: Duration) -> Self {
        self.inventory_timeout = inventory;
        self.file_timeout = file;
        self
    }

    /// Returns the base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn get_json<Q, T>(&self, path: &str, query: &Q, timeout: Duration) -> SyncResult<T>
    where
        Q: Serialize + ?Sized + Sync,
        T: DeserializeOwned,
    {
        let url = format!("{}{}", self.base_url, path);
        debug!(%url, "GET");

        let response = self
            .client
            .get(&url)
            .query(query)
            .timeout(timeout)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(SyncError::network(format!("{path} returned HTTP {status}")));
        }

        let body = response.bytes().await.map_err(map_reqwest_error)?;
        serde_json::from_slice(&body)
            .map_err(|e| SyncError::Protocol(format!("invalid {path} response body: {e}")))
    }
}

fn map_reqwest_error(err: reqwest::Error) -> SyncError {
    if err.is_timeout() {
        SyncError::Timeout
    } else {
        SyncError::network(err.to_string())
    }
}

#[async_trait]
impl RemoteSource for HttpRemote {
    async fn fetch_inventory(&self) -> SyncResult<Inventory> {
        let request = FileListRequest {
            node: self.node_id.clone(),
        };
        let list: FileListResponse = self
            .get_json(FILE_LIST_PATH, &request, self.inventory_timeout)
            .await?;

        if !list.is_success() {
            return Err(SyncError::network(format!(
                "file list refused: {}",
                list.msg.as_deref().unwrap_or("no message")
            )));
        }

        let (inventory, rejected) = list.into_inventory();
        for rejected in &rejected {
            warn!(
                filename = %rejected.entry.filename,
                error = %rejected.error,
                "skipping invalid inventory entry"
            );
        }
        Ok(inventory)
    }

    async fn fetch_file(&self, task: &DownloadTask) -> SyncResult<Vec<u8>> {
        let request = FileRequest::new(&task.path, &task.expected, self.node_id.clone());
        let file: FileResponse = self
            .get_json(FILE_GET_PATH, &request, self.file_timeout)
            .await?;

        if !file.is_success() {
            return Err(SyncError::network(format!(
                "download of {} refused with code {}: {}",
                task.path,
                file.code,
                file.msg.as_deref().unwrap_or("no message")
            )));
        }
        Ok(file.decode_payload()?)
    }
}
