//! The managed root directory.

use crate::error::{SyncError, SyncResult};
use filenode_protocol::RelativePath;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing::{info, warn};
use walkdir::WalkDir;

/// Prefix of temporary files written next to their final destination.
pub(crate) const TEMP_PREFIX: &str = ".filenode-";

/// Suffix of temporary files written next to their final destination.
pub(crate) const TEMP_SUFFIX: &str = ".part";

/// Temporary files untouched for this long were orphaned by an interrupted
/// process and are removed when the root is opened.
pub const STALE_TEMP_AGE: Duration = Duration::from_secs(600);

/// The single directory tree a node owns, serves and syncs.
///
/// Every relative path is resolved against the canonical root. Symlinks are
/// never traversed on the write path, and on the read path a target whose
/// canonical location lies outside the root is rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagedRoot {
    path: PathBuf,
}

impl ManagedRoot {
    /// Opens the root, creating the directory if it does not exist yet.
    ///
    /// Temporary files older than [`STALE_TEMP_AGE`] are swept.
    pub fn open(path: impl AsRef<Path>) -> SyncResult<Self> {
        let path = path.as_ref();
        fs::create_dir_all(path).map_err(|e| SyncError::io(path, e))?;
        let canonical = fs::canonicalize(path).map_err(|e| SyncError::io(path, e))?;
        if !canonical.is_dir() {
            return Err(SyncError::io(
                &canonical,
                std::io::Error::other("managed root is not a directory"),
            ));
        }
        let root = Self { path: canonical };
        root.sweep_temp_files(STALE_TEMP_AGE);
        Ok(root)
    }

    /// Removes temporary files last modified at least `min_age` ago and
    /// returns how many were removed. Failures are logged and skipped.
    pub fn sweep_temp_files(&self, min_age: Duration) -> usize {
        let now = SystemTime::now();
        let mut removed = 0;
        for entry in WalkDir::new(&self.path).follow_links(false).min_depth(1) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(error = %e, "skipping unreadable entry during temp sweep");
                    continue;
                }
            };
            let is_temp = entry.file_type().is_file()
                && entry.file_name().to_str().is_some_and(Self::is_temp_name);
            if !is_temp {
                continue;
            }
            let stale = entry
                .metadata()
                .ok()
                .and_then(|meta| meta.modified().ok())
                .and_then(|modified| now.duration_since(modified).ok())
                .is_some_and(|age| age >= min_age);
            if !stale {
                continue;
            }
            match fs::remove_file(entry.path()) {
                Ok(()) => removed += 1,
                Err(e) => warn!(
                    path = %entry.path().display(),
                    error = %e,
                    "failed to remove stale temp file"
                ),
            }
        }
        if removed > 0 {
            info!(removed, root = %self.path.display(), "removed stale temp files");
        }
        removed
    }

    /// Canonical path of the root.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Lexically resolves `rel` under the root.
    pub fn join(&self, rel: &RelativePath) -> PathBuf {
        rel.to_fs_path(&self.path)
    }

    /// Resolves an existing file for reading.
    ///
    /// Fails with `InvalidPath` if the file's canonical location (after
    /// following symlinks) is outside the root.
    pub fn resolve_existing(&self, rel: &RelativePath) -> SyncResult<PathBuf> {
        let joined = self.join(rel);
        let canonical = fs::canonicalize(&joined).map_err(|e| SyncError::io(&joined, e))?;
        if !canonical.starts_with(&self.path) {
            return Err(SyncError::InvalidPath(format!(
                "{rel} resolves outside the managed root"
            )));
        }
        Ok(canonical)
    }

    /// Creates the parent directories of `rel` and returns its destination.
    ///
    /// Directories are created one segment at a time; an existing segment that
    /// is a symlink or a regular file aborts with `InvalidPath` before anything
    /// is created beneath it.
    pub fn prepare_write(&self, rel: &RelativePath) -> SyncResult<PathBuf> {
        let segments: Vec<&str> = rel.segments().collect();
        let (file_name, parents) = segments
            .split_last()
            .ok_or_else(|| SyncError::InvalidPath("empty path".into()))?;

        let mut dir = self.path.clone();
        for segment in parents {
            dir.push(segment);
            match fs::symlink_metadata(&dir) {
                Ok(meta) if meta.file_type().is_symlink() => {
                    return Err(SyncError::InvalidPath(format!(
                        "{rel} passes through symlink {}",
                        dir.display()
                    )));
                }
                Ok(meta) if meta.is_dir() => {}
                Ok(_) => {
                    return Err(SyncError::InvalidPath(format!(
                        "{rel} passes through non-directory {}",
                        dir.display()
                    )));
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    match fs::create_dir(&dir) {
                        Ok(()) => {}
                        // Another task created it first
                        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists && dir.is_dir() => {}
                        Err(e) => return Err(SyncError::io(&dir, e)),
                    }
                }
                Err(e) => return Err(SyncError::io(&dir, e)),
            }
        }

        Ok(dir.join(file_name))
    }

    /// Returns true for names of in-flight temporary files.
    pub fn is_temp_name(name: &str) -> bool {
        name.starts_with(TEMP_PREFIX) && name.ends_with(TEMP_SUFFIX)
    }
}
