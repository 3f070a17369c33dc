//! Request handlers for the node API.

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::pages::{DOCS_HTML, INDEX_HTML};
use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, HeaderValue, Method, StatusCode, Uri};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use filenode_protocol::{FileInfoResponse, ListResponse, RelativePath, SyncAccepted, STATUS_OK};
use filenode_sync_engine::{
    hash_file_async, list_files, ManagedRoot, RemoteSource, SyncEngine, SyncReport, SyncState,
    SyncStats,
};
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::io::ReaderStream;
use tracing::{debug, info};

/// Characters escaped in a path segment of a download URL.
const SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// Shared state of all handlers.
pub struct HandlerContext<R: RemoteSource> {
    /// The node's sync engine, which also owns the managed root.
    pub engine: Arc<SyncEngine<R>>,
    /// Server configuration.
    pub config: Arc<ServerConfig>,
}

impl<R: RemoteSource> Clone for HandlerContext<R> {
    fn clone(&self) -> Self {
        Self {
            engine: Arc::clone(&self.engine),
            config: Arc::clone(&self.config),
        }
    }
}

impl<R: RemoteSource + 'static> HandlerContext<R> {
    /// Creates a new handler context.
    pub fn new(engine: Arc<SyncEngine<R>>, config: ServerConfig) -> Self {
        Self {
            engine,
            config: Arc::new(config),
        }
    }

    fn node_id(&self) -> String {
        self.engine.config().node_id.clone()
    }

    /// Resolves a request path to an existing regular file under the root.
    fn resolve_file(&self, raw: &str) -> ServerResult<(RelativePath, PathBuf)> {
        let rel = RelativePath::new(raw).map_err(|e| ServerError::InvalidRequest(e.to_string()))?;
        // In-flight downloads stay invisible until renamed into place
        if ManagedRoot::is_temp_name(rel.file_name()) {
            return Err(ServerError::NotFound(rel.to_string()));
        }
        let full = self.engine.root().resolve_existing(&rel)?;
        if !full.is_file() {
            return Err(ServerError::NotFound(rel.to_string()));
        }
        Ok((rel, full))
    }

    fn download_url(&self, headers: &HeaderMap, rel: &RelativePath) -> String {
        let base = match &self.config.public_url {
            Some(url) => url.clone(),
            None => {
                let host = headers
                    .get(header::HOST)
                    .and_then(|h| h.to_str().ok())
                    .unwrap_or("localhost");
                format!("http://{host}")
            }
        };
        let encoded: Vec<String> = rel
            .segments()
            .map(|s| utf8_percent_encode(s, SEGMENT).to_string())
            .collect();
        format!("{base}/{}", encoded.join("/"))
    }
}

/// Engine status reported by `GET /api/status`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    /// Always 200.
    pub code: u16,
    /// Node identifier.
    pub node: String,
    /// State of the last or current run.
    pub state: SyncState,
    /// Whether a run is in progress.
    pub busy: bool,
    /// Seconds until the cooldown admits another run.
    pub cooldown_remaining_secs: u64,
    /// Cumulative statistics.
    pub stats: SyncStats,
    /// Report of the last completed run.
    pub last_report: Option<SyncReport>,
}

/// Builds the node API router.
pub fn router<R: RemoteSource + 'static>(context: HandlerContext<R>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/docs", get(docs))
        .route("/api/list", get(list::<R>))
        .route("/api/info/*path", get(info::<R>))
        .route("/api/sync", post(sync::<R>))
        .route("/api/status", get(status::<R>))
        .fallback(download::<R>)
        .with_state(context)
}

async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

async fn docs() -> Html<&'static str> {
    Html(DOCS_HTML)
}

async fn list<R: RemoteSource + 'static>(
    State(ctx): State<HandlerContext<R>>,
) -> ServerResult<Json<ListResponse>> {
    let root = ctx.engine.root().clone();
    let files = tokio::task::spawn_blocking(move || list_files(&root))
        .await
        .map_err(|e| ServerError::Internal(e.to_string()))??;

    Ok(Json(ListResponse {
        code: STATUS_OK,
        files: files.into_iter().map(String::from).collect(),
        node: ctx.node_id(),
        msg: "success".into(),
    }))
}

async fn info<R: RemoteSource + 'static>(
    State(ctx): State<HandlerContext<R>>,
    Path(path): Path<String>,
    headers: HeaderMap,
) -> ServerResult<Json<FileInfoResponse>> {
    let (rel, full) = ctx.resolve_file(&path)?;
    let digest = hash_file_async(full).await?;

    Ok(Json(FileInfoResponse {
        code: STATUS_OK,
        download_url: ctx.download_url(&headers, &rel),
        filename: rel.to_string(),
        hash: digest.to_hex(),
        node: ctx.node_id(),
        msg: "success".into(),
    }))
}

async fn sync<R: RemoteSource + 'static>(
    State(ctx): State<HandlerContext<R>>,
) -> ServerResult<Json<SyncAccepted>> {
    let admission = ctx.engine.admit()?;
    let run_id = admission.run_id();
    info!(%run_id, "sync run accepted");

    let engine = Arc::clone(&ctx.engine);
    tokio::spawn(async move {
        // Outcome is recorded in the engine's state and stats.
        let _ = engine.run(admission).await;
    });

    Ok(Json(SyncAccepted {
        code: STATUS_OK,
        msg: "sync started".into(),
        node: ctx.node_id(),
        run_id: run_id.to_string(),
    }))
}

async fn status<R: RemoteSource + 'static>(
    State(ctx): State<HandlerContext<R>>,
) -> Json<StatusResponse> {
    let engine = &ctx.engine;
    Json(StatusResponse {
        code: STATUS_OK,
        node: ctx.node_id(),
        state: engine.state(),
        busy: engine.is_busy(),
        cooldown_remaining_secs: engine
            .cooldown_remaining()
            .map(|d| d.as_secs().max(1))
            .unwrap_or(0),
        stats: engine.stats(),
        last_report: engine.last_report(),
    })
}

/// Serves `GET /{path}` for every path no other route claims.
async fn download<R: RemoteSource + 'static>(
    State(ctx): State<HandlerContext<R>>,
    method: Method,
    uri: Uri,
) -> ServerResult<Response> {
    if method != Method::GET && method != Method::HEAD {
        return Err(ServerError::MethodNotAllowed);
    }

    let raw = percent_decode_str(uri.path().trim_start_matches('/'))
        .decode_utf8()
        .map_err(|_| ServerError::InvalidRequest("path is not valid UTF-8".into()))?;
    let (rel, full) = ctx.resolve_file(&raw)?;

    let file = tokio::fs::File::open(&full).await?;
    let len = file.metadata().await?.len();
    debug!(path = %rel, bytes = len, "serving file");

    let disposition = format!(
        "attachment; filename*=UTF-8''{}",
        utf8_percent_encode(rel.file_name(), SEGMENT)
    );
    let body = if method == Method::HEAD {
        Body::empty()
    } else {
        Body::from_stream(ReaderStream::new(file))
    };

    let mut response = (StatusCode::OK, body).into_response();
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/octet-stream"),
    );
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(len));
    if let Ok(value) = HeaderValue::from_str(&disposition) {
        headers.insert(header::CONTENT_DISPOSITION, value);
    }
    Ok(response)
}
