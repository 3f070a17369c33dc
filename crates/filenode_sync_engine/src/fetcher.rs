//! Verified, retried, atomic file downloads.

use crate::config::RetryConfig;
use crate::error::{SyncError, SyncResult};
use crate::remote::RemoteSource;
use crate::root::{ManagedRoot, TEMP_PREFIX, TEMP_SUFFIX};
use filenode_protocol::{Digest, DownloadTask, RelativePath};
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Outcome of one download task after all of its attempts.
#[derive(Debug)]
pub enum FetchOutcome {
    /// The file was verified and is now in place.
    Downloaded {
        /// Destination path.
        path: RelativePath,
        /// Bytes written.
        bytes: u64,
        /// Attempts used, including the successful one.
        attempts: u32,
    },
    /// Every attempt failed, or a non-retryable error stopped the task.
    Failed {
        /// Destination path.
        path: RelativePath,
        /// Attempts used.
        attempts: u32,
        /// The last error seen.
        error: SyncError,
    },
}

impl FetchOutcome {
    /// Destination path of the task.
    pub fn path(&self) -> &RelativePath {
        match self {
            FetchOutcome::Downloaded { path, .. } | FetchOutcome::Failed { path, .. } => path,
        }
    }

    /// Returns true if the file was downloaded.
    pub fn is_success(&self) -> bool {
        matches!(self, FetchOutcome::Downloaded { .. })
    }
}

/// Downloads files from a remote source into the managed root.
///
/// Received bytes are hashed before anything touches the destination, and a
/// verified file is written to a temporary sibling and renamed into place, so
/// a reader of the root never sees a partial or corrupt file.
#[derive(Debug)]
pub struct Fetcher<R> {
    root: ManagedRoot,
    remote: Arc<R>,
    retry: RetryConfig,
    attempt_timeout: Duration,
}

impl<R> Clone for Fetcher<R> {
    fn clone(&self) -> Self {
        Self {
            root: self.root.clone(),
            remote: Arc::clone(&self.remote),
            retry: self.retry.clone(),
            attempt_timeout: self.attempt_timeout,
        }
    }
}

impl<R: RemoteSource> Fetcher<R> {
    /// Creates a fetcher writing into `root`.
    pub fn new(
        root: ManagedRoot,
        remote: Arc<R>,
        retry: RetryConfig,
        attempt_timeout: Duration,
    ) -> Self {
        Self {
            root,
            remote,
            retry,
            attempt_timeout,
        }
    }

    /// Runs one task to completion.
    ///
    /// Makes at most `max_retries + 1` attempts. Transport, timeout and
    /// integrity failures are retried; anything else fails the task at once.
    pub async fn fetch(&self, task: &DownloadTask, cancel: &CancellationToken) -> FetchOutcome {
        let max_attempts = self.retry.attempts();
        let mut attempt = 0;

        loop {
            let delay = self.retry.delay_for_attempt(attempt);
            attempt += 1;

            if !delay.is_zero() {
                tokio::select! {
                    _ = cancel.cancelled() => return failed(task, attempt - 1, SyncError::Cancelled),
                    _ = tokio::time::sleep(delay) => {}
                }
            }

            match self.attempt(task, cancel).await {
                Ok(bytes) => {
                    debug!(path = %task.path, bytes, attempt, "downloaded");
                    return FetchOutcome::Downloaded {
                        path: task.path.clone(),
                        bytes,
                        attempts: attempt,
                    };
                }
                Err(error) => {
                    match &error {
                        SyncError::Integrity {
                            expected, actual, ..
                        } => warn!(
                            path = %task.path,
                            attempt,
                            %expected,
                            %actual,
                            "digest mismatch, discarding download"
                        ),
                        _ => warn!(path = %task.path, attempt, error = %error, "download attempt failed"),
                    }
                    if !error.is_retryable() || attempt >= max_attempts {
                        return failed(task, attempt, error);
                    }
                }
            }
        }
    }

    async fn attempt(&self, task: &DownloadTask, cancel: &CancellationToken) -> SyncResult<u64> {
        let data = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(SyncError::Cancelled),
            result = tokio::time::timeout(self.attempt_timeout, self.remote.fetch_file(task)) => {
                result.map_err(|_| SyncError::Timeout)??
            }
        };

        let root = self.root.clone();
        let task = task.clone();
        tokio::task::spawn_blocking(move || verify_and_write(&root, &task, &data))
            .await
            .map_err(|e| SyncError::io(self.root.path(), std::io::Error::other(e)))?
    }
}

fn failed(task: &DownloadTask, attempts: u32, error: SyncError) -> FetchOutcome {
    FetchOutcome::Failed {
        path: task.path.clone(),
        attempts,
        error,
    }
}

fn verify_and_write(root: &ManagedRoot, task: &DownloadTask, data: &[u8]) -> SyncResult<u64> {
    let actual = Digest::of(data);
    if actual != task.expected {
        return Err(SyncError::Integrity {
            path: task.path.clone(),
            expected: task.expected,
            actual,
        });
    }
    write_atomic(root, &task.path, data)?;
    Ok(data.len() as u64)
}

/// Writes `data` to `path` under the root, replacing any existing file.
///
/// The bytes go to a temporary file in the destination directory, are synced,
/// and the temporary file is renamed over the destination. On failure the
/// temporary file is removed and the destination is untouched.
pub fn write_atomic(root: &ManagedRoot, path: &RelativePath, data: &[u8]) -> SyncResult<()> {
    let dest = root.prepare_write(path)?;
    let parent = dest
        .parent()
        .ok_or_else(|| SyncError::InvalidPath(format!("{path} has no parent directory")))?;

    let mut tmp = tempfile::Builder::new()
        .prefix(TEMP_PREFIX)
        .suffix(TEMP_SUFFIX)
        .tempfile_in(parent)
        .map_err(|e| SyncError::io(parent, e))?;

    tmp.write_all(data)
        .map_err(|e| SyncError::io(tmp.path(), e))?;
    tmp.as_file()
        .sync_all()
        .map_err(|e| SyncError::io(tmp.path(), e))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tmp.as_file()
            .set_permissions(std::fs::Permissions::from_mode(0o644))
            .map_err(|e| SyncError::io(tmp.path(), e))?;
    }

    tmp.persist(&dest)
        .map_err(|e| SyncError::io(&dest, e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::{Fault, MemoryRemote};
    use std::fs;

    struct Fixture {
        _dir: tempfile::TempDir,
        root: ManagedRoot,
        remote: Arc<MemoryRemote>,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let root = ManagedRoot::open(dir.path()).unwrap();
        Fixture {
            _dir: dir,
            root,
            remote: Arc::new(MemoryRemote::new()),
        }
    }

    fn fetcher(f: &Fixture, max_retries: u32) -> Fetcher<MemoryRemote> {
        Fetcher::new(
            f.root.clone(),
            Arc::clone(&f.remote),
            RetryConfig::new(max_retries),
            Duration::from_millis(200),
        )
    }

    fn leftover_temp_files(root: &ManagedRoot) -> usize {
        walkdir::WalkDir::new(root.path())
            .into_iter()
            .filter_map(Result::ok)
            .filter(|e| {
                e.file_name()
                    .to_str()
                    .is_some_and(ManagedRoot::is_temp_name)
            })
            .count()
    }

    #[tokio::test]
    async fn downloads_into_nested_directory() {
        let f = fixture();
        let path = f.remote.insert("a/b/c.txt", b"content".to_vec()).unwrap();
        let task = DownloadTask::new(path.clone(), Digest::of(b"content"));

        let outcome = fetcher(&f, 3).fetch(&task, &CancellationToken::new()).await;
        assert!(outcome.is_success());
        assert_eq!(fs::read(f.root.path().join("a/b/c.txt")).unwrap(), b"content");
        assert_eq!(f.remote.attempts(&path), 1);
    }

    #[tokio::test]
    async fn network_failure_is_retried_to_the_bound() {
        let f = fixture();
        let path = f.remote.insert("c.txt", b"c".to_vec()).unwrap();
        f.remote.inject(&path, Fault::Network, None);
        let task = DownloadTask::new(path.clone(), Digest::of(b"c"));

        let outcome = fetcher(&f, 3).fetch(&task, &CancellationToken::new()).await;
        match outcome {
            FetchOutcome::Failed {
                attempts, error, ..
            } => {
                assert_eq!(attempts, 4);
                assert!(matches!(error, SyncError::Network(_)));
            }
            other => panic!("expected failure, got {other:?}"),
        }
        assert_eq!(f.remote.attempts(&path), 4);
        assert!(!f.root.path().join("c.txt").exists());
    }

    #[tokio::test]
    async fn zero_retries_means_one_attempt() {
        let f = fixture();
        let path = f.remote.insert("x", b"x".to_vec()).unwrap();
        f.remote.inject(&path, Fault::Network, None);
        let task = DownloadTask::new(path.clone(), Digest::of(b"x"));

        let outcome = fetcher(&f, 0).fetch(&task, &CancellationToken::new()).await;
        assert!(!outcome.is_success());
        assert_eq!(f.remote.attempts(&path), 1);
    }

    #[tokio::test]
    async fn corrupt_payload_is_retried() {
        let f = fixture();
        let path = f.remote.insert("a.txt", b"good".to_vec()).unwrap();
        f.remote.inject(&path, Fault::Corrupt, Some(1));
        let task = DownloadTask::new(path.clone(), Digest::of(b"good"));

        let outcome = fetcher(&f, 3).fetch(&task, &CancellationToken::new()).await;
        match outcome {
            FetchOutcome::Downloaded { attempts, bytes, .. } => {
                assert_eq!(attempts, 2);
                assert_eq!(bytes, 4);
            }
            other => panic!("expected success, got {other:?}"),
        }
        assert_eq!(fs::read(f.root.path().join("a.txt")).unwrap(), b"good");
    }

    #[tokio::test]
    async fn integrity_failure_leaves_existing_file() {
        let f = fixture();
        fs::write(f.root.path().join("a.txt"), b"old").unwrap();
        let path = f.remote.insert("a.txt", b"new".to_vec()).unwrap();
        f.remote.inject(&path, Fault::Corrupt, None);
        let task = DownloadTask::new(path.clone(), Digest::of(b"new"));

        let outcome = fetcher(&f, 2).fetch(&task, &CancellationToken::new()).await;
        match outcome {
            FetchOutcome::Failed { error, attempts, .. } => {
                assert_eq!(attempts, 3);
                assert!(matches!(error, SyncError::Integrity { .. }));
            }
            other => panic!("expected failure, got {other:?}"),
        }
        assert_eq!(fs::read(f.root.path().join("a.txt")).unwrap(), b"old");
        assert_eq!(leftover_temp_files(&f.root), 0);
    }

    #[tokio::test]
    async fn hanging_remote_times_out() {
        let f = fixture();
        let path = f.remote.insert("slow", b"s".to_vec()).unwrap();
        f.remote.inject(&path, Fault::Hang, Some(1));
        let task = DownloadTask::new(path.clone(), Digest::of(b"s"));

        let outcome = fetcher(&f, 1).fetch(&task, &CancellationToken::new()).await;
        assert!(outcome.is_success());
        assert_eq!(f.remote.attempts(&path), 2);
    }

    #[tokio::test]
    async fn cancellation_stops_the_task() {
        let f = fixture();
        let path = f.remote.insert("slow", b"s".to_vec()).unwrap();
        f.remote.inject(&path, Fault::Hang, None);
        let task = DownloadTask::new(path.clone(), Digest::of(b"s"));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let outcome = fetcher(&f, 3).fetch(&task, &cancel).await;
        match outcome {
            FetchOutcome::Failed { error, .. } => assert!(matches!(error, SyncError::Cancelled)),
            other => panic!("expected cancellation, got {other:?}"),
        }
    }

    #[test]
    fn write_atomic_replaces_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let root = ManagedRoot::open(dir.path()).unwrap();
        let path = RelativePath::new("d/f.bin").unwrap();

        write_atomic(&root, &path, b"one").unwrap();
        write_atomic(&root, &path, b"two").unwrap();

        assert_eq!(fs::read(root.path().join("d/f.bin")).unwrap(), b"two");
        assert_eq!(leftover_temp_files(&root), 0);
    }

    // Windows refuses to replace a file another handle has open
    #[cfg(unix)]
    #[test]
    fn readers_never_see_a_torn_file() {
        use std::sync::atomic::{AtomicBool, Ordering};

        let dir = tempfile::tempdir().unwrap();
        let root = ManagedRoot::open(dir.path()).unwrap();
        let path = RelativePath::new("big.bin").unwrap();
        let old = vec![b'o'; 256 * 1024];
        let new = vec![b'n'; 384 * 1024];
        write_atomic(&root, &path, &old).unwrap();

        let done = Arc::new(AtomicBool::new(false));
        let reader = {
            let done = Arc::clone(&done);
            let dest = root.path().join("big.bin");
            let (old, new) = (old.clone(), new.clone());
            std::thread::spawn(move || {
                let mut reads = 0;
                while !done.load(Ordering::Acquire) || reads == 0 {
                    let content = fs::read(&dest).unwrap();
                    assert!(content == old || content == new, "torn read of {} bytes", content.len());
                    reads += 1;
                }
                reads
            })
        };

        for i in 0..50 {
            let data = if i % 2 == 0 { &new } else { &old };
            write_atomic(&root, &path, data).unwrap();
        }
        done.store(true, Ordering::Release);

        assert!(reader.join().unwrap() > 0);
        assert_eq!(leftover_temp_files(&root), 0);
    }

    #[cfg(unix)]
    #[test]
    fn written_files_are_world_readable() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let root = ManagedRoot::open(dir.path()).unwrap();
        write_atomic(&root, &RelativePath::new("p").unwrap(), b"x").unwrap();

        let mode = fs::metadata(root.path().join("p")).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o644);
    }
}
