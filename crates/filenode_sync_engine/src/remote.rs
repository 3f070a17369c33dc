//! Remote source abstraction.

use crate::error::{SyncError, SyncResult};
use async_trait::async_trait;
use filenode_protocol::{Digest, DownloadTask, Inventory, RelativePath};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};

/// The central directory service as seen by the engine.
///
/// This trait abstracts the network layer so the orchestrator can run against
/// the HTTP client in production and an in-memory source in tests.
#[async_trait]
pub trait RemoteSource: Send + Sync {
    /// Fetches the authoritative inventory for this node.
    async fn fetch_inventory(&self) -> SyncResult<Inventory>;

    /// Fetches the content of one file. The bytes are not yet verified.
    async fn fetch_file(&self, task: &DownloadTask) -> SyncResult<Vec<u8>>;
}

/// Failure modes a `MemoryRemote` can inject into file fetches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// Fail with a network error.
    Network,
    /// Return bytes that do not match the advertised digest.
    Corrupt,
    /// Never answer.
    Hang,
}

#[derive(Debug, Clone, Copy)]
struct Injected {
    fault: Fault,
    remaining: Option<u32>,
}

#[derive(Debug, Default)]
struct MemoryState {
    files: BTreeMap<RelativePath, Vec<u8>>,
    advertised: BTreeMap<RelativePath, Digest>,
    inventory_error: Option<String>,
    faults: HashMap<RelativePath, Injected>,
    attempts: HashMap<RelativePath, u32>,
    inventory_requests: u32,
}

/// An in-memory remote source for testing.
#[derive(Debug, Default)]
pub struct MemoryRemote {
    state: Mutex<MemoryState>,
}

impl MemoryRemote {
    /// Creates an empty remote.
    pub fn new() -> Self {
        Self::default()
    }

    /// Publishes a file; its digest is derived from `data`.
    pub fn insert(&self, path: &str, data: impl Into<Vec<u8>>) -> SyncResult<RelativePath> {
        let path = RelativePath::new(path)?;
        let data = data.into();
        let mut state = self.state.lock();
        state.advertised.insert(path.clone(), Digest::of(&data));
        state.files.insert(path.clone(), data);
        Ok(path)
    }

    /// Lists a path with `digest` but serves no content for it.
    pub fn advertise(&self, path: RelativePath, digest: Digest) {
        let mut state = self.state.lock();
        state.files.remove(&path);
        state.advertised.insert(path, digest);
    }

    /// Makes inventory requests fail with a network error.
    pub fn fail_inventory(&self, message: impl Into<String>) {
        self.state.lock().inventory_error = Some(message.into());
    }

    /// Injects `fault` into the next `times` fetches of `path`, or every fetch
    /// when `times` is `None`.
    pub fn inject(&self, path: &RelativePath, fault: Fault, times: Option<u32>) {
        self.state.lock().faults.insert(
            path.clone(),
            Injected {
                fault,
                remaining: times,
            },
        );
    }

    /// Number of fetches made for `path` so far.
    pub fn attempts(&self, path: &RelativePath) -> u32 {
        self.state.lock().attempts.get(path).copied().unwrap_or(0)
    }

    /// Number of inventory requests made so far.
    pub fn inventory_requests(&self) -> u32 {
        self.state.lock().inventory_requests
    }

    fn take_fault(state: &mut MemoryState, path: &RelativePath) -> Option<Fault> {
        let injected = state.faults.get_mut(path)?;
        match injected.remaining {
            None => Some(injected.fault),
            Some(0) => None,
            Some(ref mut n) => {
                *n -= 1;
                Some(injected.fault)
            }
        }
    }
}

#[async_trait]
impl RemoteSource for MemoryRemote {
    async fn fetch_inventory(&self) -> SyncResult<Inventory> {
        let mut state = self.state.lock();
        state.inventory_requests += 1;
        if let Some(message) = &state.inventory_error {
            return Err(SyncError::network(message.clone()));
        }
        Ok(state
            .advertised
            .iter()
            .map(|(p, d)| (p.clone(), *d))
            .collect())
    }

    async fn fetch_file(&self, task: &DownloadTask) -> SyncResult<Vec<u8>> {
        let result = {
            let mut state = self.state.lock();
            *state.attempts.entry(task.path.clone()).or_insert(0) += 1;
            match Self::take_fault(&mut state, &task.path) {
                Some(Fault::Hang) => None,
                Some(Fault::Network) => Some(Err(SyncError::network(format!(
                    "injected failure for {}",
                    task.path
                )))),
                Some(Fault::Corrupt) => Some(Ok(b"corrupted payload".to_vec())),
                None => Some(state.files.get(&task.path).cloned().ok_or_else(|| {
                    SyncError::network(format!("file not found: {}", task.path))
                })),
            }
        };
        match result {
            Some(result) => result,
            None => std::future::pending().await,
        }
    }
}
