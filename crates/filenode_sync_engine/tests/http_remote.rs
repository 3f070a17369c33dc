//! End-to-end tests of `HttpRemote` against a mock central service.

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use filenode_protocol::{
    Digest, DownloadTask, FileListRequest, FileListResponse, FileRequest, FileResponse,
    RelativePath, RemoteFileEntry, FILE_GET_PATH, FILE_LIST_PATH,
};
use filenode_sync_engine::{
    HttpRemote, RemoteSource, RetryConfig, SyncConfig, SyncEngine, SyncError,
};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Default)]
struct Central {
    files: BTreeMap<String, Vec<u8>>,
    extra_entries: Vec<RemoteFileEntry>,
    slow_inventory: bool,
    broken_file: Option<String>,
    downloads: AtomicU32,
}

async fn file_list(
    State(central): State<Arc<Central>>,
    Query(request): Query<FileListRequest>,
) -> Result<Json<FileListResponse>, StatusCode> {
    if request.node.is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }
    if central.slow_inventory {
        tokio::time::sleep(Duration::from_secs(5)).await;
    }
    let mut data: Vec<RemoteFileEntry> = central
        .files
        .iter()
        .map(|(name, content)| RemoteFileEntry {
            filename: name.clone(),
            hash: Digest::of(content).to_hex(),
        })
        .collect();
    data.extend(central.extra_entries.iter().cloned());
    Ok(Json(FileListResponse {
        code: None,
        data,
        msg: None,
    }))
}

async fn get_file(
    State(central): State<Arc<Central>>,
    Query(request): Query<FileRequest>,
) -> Json<FileResponse> {
    central.downloads.fetch_add(1, Ordering::SeqCst);
    if central.broken_file.as_deref() == Some(request.name.as_str()) {
        return Json(FileResponse {
            code: 200,
            filedata: Some("%%% not base64 %%%".into()),
            msg: None,
        });
    }
    match central.files.get(&request.name) {
        Some(content) => Json(FileResponse::success(content)),
        None => Json(FileResponse::error(404, "file not found")),
    }
}

async fn spawn_central(central: Central) -> (String, Arc<Central>) {
    let central = Arc::new(central);
    let app = Router::new()
        .route(FILE_LIST_PATH, get(file_list))
        .route(FILE_GET_PATH, get(get_file))
        .with_state(Arc::clone(&central));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{addr}"), central)
}

fn central_with(files: &[(&str, &[u8])]) -> Central {
    Central {
        files: files
            .iter()
            .map(|(n, c)| (n.to_string(), c.to_vec()))
            .collect(),
        ..Central::default()
    }
}

#[tokio::test]
async fn fetches_inventory_and_files() {
    let (url, _central) = spawn_central(central_with(&[
        ("a.txt", b"alpha"),
        ("dir/b.txt", b"beta"),
    ]))
    .await;
    let remote = HttpRemote::new(&url, "node-a").unwrap();

    let inventory = remote.fetch_inventory().await.unwrap();
    assert_eq!(inventory.len(), 2);
    let b = RelativePath::new("dir/b.txt").unwrap();
    assert_eq!(inventory.get(&b), Some(&Digest::of(b"beta")));

    let data = remote
        .fetch_file(&DownloadTask::new(b, Digest::of(b"beta")))
        .await
        .unwrap();
    assert_eq!(data, b"beta");
}

#[tokio::test]
async fn skips_invalid_inventory_entries() {
    let mut central = central_with(&[("ok.txt", b"ok")]);
    central.extra_entries = vec![
        RemoteFileEntry {
            filename: "../escape.txt".into(),
            hash: Digest::of(b"x").to_hex(),
        },
        RemoteFileEntry {
            filename: "bad-hash.txt".into(),
            hash: "zzzz".into(),
        },
    ];
    let (url, _central) = spawn_central(central).await;
    let remote = HttpRemote::new(&url, "node-a").unwrap();

    let inventory = remote.fetch_inventory().await.unwrap();
    let paths: Vec<&str> = inventory.paths().map(|p| p.as_str()).collect();
    assert_eq!(paths, vec!["ok.txt"]);
}

#[tokio::test]
async fn slow_inventory_times_out() {
    let mut central = central_with(&[]);
    central.slow_inventory = true;
    let (url, _central) = spawn_central(central).await;
    let remote = HttpRemote::new(&url, "node-a")
        .unwrap()
        .with_timeouts(Duration::from_millis(200), Duration::from_secs(1));

    let err = remote.fetch_inventory().await.unwrap_err();
    assert!(matches!(err, SyncError::Timeout));
}

#[tokio::test]
async fn refused_download_is_network_error() {
    let (url, _central) = spawn_central(central_with(&[])).await;
    let remote = HttpRemote::new(&url, "node-a").unwrap();
    let task = DownloadTask::new(RelativePath::new("nope").unwrap(), Digest::of(b"n"));

    let err = remote.fetch_file(&task).await.unwrap_err();
    assert!(matches!(err, SyncError::Network(_)));
}

#[tokio::test]
async fn bad_payload_is_protocol_error() {
    let mut central = central_with(&[("a.bin", b"a")]);
    central.broken_file = Some("a.bin".into());
    let (url, _central) = spawn_central(central).await;
    let remote = HttpRemote::new(&url, "node-a").unwrap();
    let task = DownloadTask::new(RelativePath::new("a.bin").unwrap(), Digest::of(b"a"));

    let err = remote.fetch_file(&task).await.unwrap_err();
    assert!(matches!(err, SyncError::Protocol(_)));
}

#[tokio::test]
async fn full_sync_over_http() {
    let (url, central) = spawn_central(central_with(&[
        ("a.txt", b"alpha"),
        ("nested/deep/c.bin", &[0u8, 1, 2, 3, 255]),
    ]))
    .await;
    let dir = tempfile::tempdir().unwrap();
    let config = SyncConfig::new(dir.path().join("file"), "node-a", url)
        .with_cooldown(Duration::ZERO)
        .with_retry(RetryConfig::new(1))
        .with_concurrency(2);
    let remote = HttpRemote::from_config(&config).unwrap();
    let engine = SyncEngine::new(config, remote).unwrap();

    let report = engine.sync().await.unwrap();
    assert_eq!(report.succeeded, 2);
    assert_eq!(
        std::fs::read(engine.root().path().join("nested/deep/c.bin")).unwrap(),
        vec![0u8, 1, 2, 3, 255]
    );
    assert_eq!(central.downloads.load(Ordering::SeqCst), 2);

    let again = engine.sync().await.unwrap();
    assert_eq!(again.attempted, 0);
    assert_eq!(central.downloads.load(Ordering::SeqCst), 2);
}
