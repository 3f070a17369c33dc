//! Sync engine state machine.

use crate::admission::{Admission, Gate};
use crate::config::SyncConfig;
use crate::diff::diff;
use crate::error::{SyncError, SyncResult};
use crate::fetcher::{FetchOutcome, Fetcher};
use crate::pool::TaskPool;
use crate::remote::RemoteSource;
use crate::root::ManagedRoot;
use crate::scanner;
use filenode_protocol::{DownloadTask, Inventory, RelativePath};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

/// The current state of the sync engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncState {
    /// No run has happened yet.
    Idle,
    /// A run is in progress.
    Running,
    /// The last run finished. Individual files may still have failed.
    Completed,
    /// The last run aborted before or during its download phase.
    Failed,
}

impl SyncState {
    /// Returns true while a run is in progress.
    pub fn is_active(&self) -> bool {
        matches!(self, SyncState::Running)
    }

    /// Returns true if the state allows a new run to start.
    pub fn can_start_sync(&self) -> bool {
        !self.is_active()
    }
}

/// Statistics about sync operations.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStats {
    /// Runs that reached `Completed`.
    pub runs_completed: u64,
    /// Runs that ended in `Failed`.
    pub runs_failed: u64,
    /// Files downloaded and verified.
    pub files_downloaded: u64,
    /// Bytes written by verified downloads.
    pub bytes_downloaded: u64,
    /// Download tasks that exhausted their attempts.
    pub download_failures: u64,
    /// Sync requests rejected by the cooldown or the busy guard.
    pub rejected_requests: u64,
    /// Start of the last run, in seconds since the Unix epoch.
    pub last_run_at: Option<u64>,
    /// Error that ended the last failed run.
    pub last_error: Option<String>,
}

/// Summary of one completed run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    /// Identifier of the run.
    pub run_id: Uuid,
    /// Download tasks planned.
    pub attempted: usize,
    /// Tasks that ended with a verified file in place.
    pub succeeded: usize,
    /// Paths whose task failed, sorted.
    pub failures: Vec<RelativePath>,
    /// Bytes written.
    pub bytes_downloaded: u64,
    /// Wall-clock duration of the run.
    pub duration_ms: u64,
    /// Whether the run deadline cut off outstanding tasks.
    pub deadline_exceeded: bool,
}

impl SyncReport {
    /// Returns true if every planned task succeeded.
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// The sync engine keeps the managed root in line with the remote inventory.
///
/// A run fetches the remote inventory, scans the root, diffs the two and
/// downloads every missing or mismatched file. Runs are admitted one at a
/// time and no more often than the configured cooldown.
pub struct SyncEngine<R: RemoteSource> {
    config: SyncConfig,
    root: ManagedRoot,
    remote: Arc<R>,
    pool: TaskPool,
    gate: Gate,
    state: RwLock<SyncState>,
    stats: RwLock<SyncStats>,
    last_report: RwLock<Option<SyncReport>>,
    cancel: Mutex<CancellationToken>,
}

impl<R: RemoteSource + 'static> SyncEngine<R> {
    /// Creates a new sync engine, creating the root directory if needed.
    pub fn new(config: SyncConfig, remote: R) -> SyncResult<Self> {
        config.validate()?;
        let root = ManagedRoot::open(&config.root)?;
        Ok(Self {
            root,
            remote: Arc::new(remote),
            pool: TaskPool::new(config.concurrency),
            gate: Gate::new(config.cooldown),
            state: RwLock::new(SyncState::Idle),
            stats: RwLock::new(SyncStats::default()),
            last_report: RwLock::new(None),
            cancel: Mutex::new(CancellationToken::new()),
            config,
        })
    }

    /// Gets the current state.
    pub fn state(&self) -> SyncState {
        *self.state.read()
    }

    /// Gets the current stats.
    pub fn stats(&self) -> SyncStats {
        self.stats.read().clone()
    }

    /// Report of the last completed run.
    pub fn last_report(&self) -> Option<SyncReport> {
        self.last_report.read().clone()
    }

    /// The managed root.
    pub fn root(&self) -> &ManagedRoot {
        &self.root
    }

    /// The engine configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// The remote source.
    pub fn remote(&self) -> &R {
        &self.remote
    }

    /// Returns true while an admitted run has not finished.
    pub fn is_busy(&self) -> bool {
        self.gate.is_running()
    }

    /// Time until the cooldown admits another run.
    pub fn cooldown_remaining(&self) -> Option<Duration> {
        self.gate.cooldown_remaining()
    }

    /// Cancels the run in progress, if any.
    pub fn cancel(&self) {
        self.cancel.lock().cancel();
    }

    /// Admits a run without starting it.
    ///
    /// Fails with `TooFrequent` inside the cooldown window and with `Busy`
    /// while another run holds its admission. A rejected request changes
    /// nothing but the rejection counter. An admitted run already owns the
    /// cancellation token, so `cancel` reaches it before it starts.
    pub fn admit(&self) -> SyncResult<Admission> {
        match self.gate.admit() {
            Ok(admission) => {
                *self.cancel.lock() = CancellationToken::new();
                Ok(admission)
            }
            Err(e) => {
                self.stats.write().rejected_requests += 1;
                info!(error = %e, "sync request rejected");
                Err(e)
            }
        }
    }

    /// Admits and executes one run.
    pub async fn sync(&self) -> SyncResult<SyncReport> {
        let admission = self.admit()?;
        self.run(admission).await
    }

    /// Executes a previously admitted run.
    pub async fn run(&self, admission: Admission) -> SyncResult<SyncReport> {
        let span = info_span!("sync", run_id = %admission.run_id(), node = %self.config.node_id);
        self.execute(admission).instrument(span).await
    }

    /// Computes the download tasks a run would execute now, without
    /// downloading anything or touching the cooldown.
    pub async fn plan(&self) -> SyncResult<Vec<DownloadTask>> {
        let remote = self.fetch_remote_inventory(&CancellationToken::new()).await?;
        let local = scanner::scan(&self.root, &self.pool).await?;
        Ok(diff(&local, &remote))
    }

    /// Builds the local inventory.
    pub async fn scan(&self) -> SyncResult<Inventory> {
        scanner::scan(&self.root, &self.pool).await
    }

    async fn execute(&self, admission: Admission) -> SyncResult<SyncReport> {
        let start = Instant::now();
        let cancel = self.cancel.lock().clone();
        self.set_state(SyncState::Running);
        let _abandoned = AbandonGuard { engine: self };
        self.stats.write().last_run_at = Some(unix_now());
        info!("sync started");

        let remote = match self.fetch_remote_inventory(&cancel).await {
            Ok(inventory) => inventory,
            Err(e) => return Err(self.handle_error(e)),
        };
        let local = match scanner::scan(&self.root, &self.pool).await {
            Ok(inventory) => inventory,
            Err(e) => return Err(self.handle_error(e)),
        };

        let tasks = diff(&local, &remote);
        info!(
            remote_files = remote.len(),
            local_files = local.len(),
            tasks = tasks.len(),
            "inventories compared"
        );

        let deadline = self.config.run_deadline_for(tasks.len());
        let outcomes = self.download_all(tasks.clone(), &cancel, deadline).await;

        if cancel.is_cancelled() {
            return Err(self.handle_error(SyncError::Cancelled));
        }

        let mut report = SyncReport {
            run_id: admission.run_id(),
            attempted: tasks.len(),
            succeeded: 0,
            failures: Vec::new(),
            bytes_downloaded: 0,
            duration_ms: 0,
            deadline_exceeded: false,
        };
        for (task, slot) in tasks.iter().zip(outcomes) {
            match slot {
                Some((FetchOutcome::Downloaded { bytes, .. }, _)) => {
                    report.succeeded += 1;
                    report.bytes_downloaded += bytes;
                }
                Some((FetchOutcome::Failed { path, error, .. }, timed_out)) => {
                    report.deadline_exceeded |= timed_out;
                    error!(path = %path, error = %error, "download failed");
                    report.failures.push(path);
                }
                None => report.failures.push(task.path.clone()),
            }
        }
        report.failures.sort();
        report.duration_ms = start.elapsed().as_millis() as u64;

        {
            let mut stats = self.stats.write();
            stats.runs_completed += 1;
            stats.files_downloaded += report.succeeded as u64;
            stats.bytes_downloaded += report.bytes_downloaded;
            stats.download_failures += report.failures.len() as u64;
            stats.last_error = None;
        }
        self.set_state(SyncState::Completed);
        *self.last_report.write() = Some(report.clone());

        if report.deadline_exceeded {
            warn!(deadline_ms = deadline.as_millis() as u64, "run deadline exceeded");
        }
        info!(
            attempted = report.attempted,
            succeeded = report.succeeded,
            failed = report.failures.len(),
            duration_ms = report.duration_ms,
            "sync completed"
        );
        drop(admission);
        Ok(report)
    }

    async fn fetch_remote_inventory(&self, cancel: &CancellationToken) -> SyncResult<Inventory> {
        let inventory = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(SyncError::Cancelled),
            result = tokio::time::timeout(self.config.inventory_timeout, self.remote.fetch_inventory()) => {
                result.map_err(|_| SyncError::Timeout)?
            }
        }?;

        // The scanner never reports temporary names, so they could not converge
        Ok(inventory
            .into_iter()
            .filter(|(path, _)| {
                let reserved = ManagedRoot::is_temp_name(path.file_name());
                if reserved {
                    warn!(path = %path, "skipping remote entry with a temporary file name");
                }
                !reserved
            })
            .collect())
    }

    /// Runs every task on the pool; each slot carries the outcome and whether
    /// the run deadline cut it off.
    async fn download_all(
        &self,
        tasks: Vec<DownloadTask>,
        cancel: &CancellationToken,
        deadline: Duration,
    ) -> Vec<Option<(FetchOutcome, bool)>> {
        let fetcher = Fetcher::new(
            self.root.clone(),
            Arc::clone(&self.remote),
            self.config.retry.clone(),
            self.config.file_timeout,
        );
        let cancel = cancel.clone();
        let deadline = tokio::time::Instant::now() + deadline;

        self.pool
            .run_all(tasks, move |task| {
                let fetcher = fetcher.clone();
                let cancel = cancel.clone();
                async move {
                    tokio::select! {
                        biased;
                        outcome = fetcher.fetch(&task, &cancel) => (outcome, false),
                        _ = tokio::time::sleep_until(deadline) => (
                            FetchOutcome::Failed {
                                path: task.path.clone(),
                                attempts: 0,
                                error: SyncError::Timeout,
                            },
                            true,
                        ),
                    }
                }
            })
            .await
    }

    fn set_state(&self, state: SyncState) {
        *self.state.write() = state;
    }

    /// Moves to `Failed` and records the error.
    fn handle_error(&self, error: SyncError) -> SyncError {
        error!(error = %error, "sync failed");
        self.set_state(SyncState::Failed);
        let mut stats = self.stats.write();
        stats.runs_failed += 1;
        stats.last_error = Some(error.to_string());
        error
    }
}

/// Fails a run whose future is dropped while it is still `Running`.
struct AbandonGuard<'a, R: RemoteSource> {
    engine: &'a SyncEngine<R>,
}

impl<R: RemoteSource> Drop for AbandonGuard<'_, R> {
    fn drop(&mut self) {
        let mut state = self.engine.state.write();
        if *state != SyncState::Running {
            return;
        }
        *state = SyncState::Failed;
        drop(state);

        warn!("sync run dropped before it finished");
        let mut stats = self.engine.stats.write();
        stats.runs_failed += 1;
        stats.last_error = Some(SyncError::Cancelled.to_string());
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
