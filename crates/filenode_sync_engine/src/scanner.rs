//! Local inventory scanner.

use crate::error::{SyncError, SyncResult};
use crate::hasher::hash_file_async;
use crate::pool::TaskPool;
use crate::root::ManagedRoot;
use filenode_protocol::{Inventory, RelativePath};
use std::fs;
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Lists every regular file under the root, sorted by path.
///
/// Symlinks are not followed and not listed. Temporary files of in-flight
/// downloads are skipped. Only an unreadable root fails the listing; an
/// unreadable subdirectory is logged and left out.
pub fn list_files(root: &ManagedRoot) -> SyncResult<Vec<RelativePath>> {
    fs::read_dir(root.path()).map_err(|e| SyncError::io(root.path(), e))?;

    let mut files = Vec::new();
    let walker = WalkDir::new(root.path())
        .follow_links(false)
        .min_depth(1)
        .sort_by_file_name();

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!(error = %e, "skipping unreadable entry");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        if entry
            .file_name()
            .to_str()
            .is_some_and(ManagedRoot::is_temp_name)
        {
            continue;
        }
        match RelativePath::from_fs_path(root.path(), entry.path()) {
            Ok(rel) => files.push(rel),
            Err(e) => warn!(path = %entry.path().display(), error = %e, "skipping file"),
        }
    }

    files.sort();
    Ok(files)
}

/// Builds the local inventory by hashing every listed file on `pool`.
///
/// A file that fails to hash (removed mid-scan, permission denied) is logged
/// and excluded instead of failing the whole scan.
pub async fn scan(root: &ManagedRoot, pool: &TaskPool) -> SyncResult<Inventory> {
    let listing_root = root.clone();
    let files = tokio::task::spawn_blocking(move || list_files(&listing_root))
        .await
        .map_err(|e| SyncError::io(root.path(), std::io::Error::other(e)))??;

    let base = root.clone();
    let digests = pool
        .run_all(files.clone(), move |rel| {
            let full = base.join(&rel);
            async move { hash_file_async(full).await }
        })
        .await;

    let mut inventory = Inventory::new();
    for (rel, digest) in files.into_iter().zip(digests) {
        match digest {
            Some(Ok(digest)) => {
                inventory.insert(rel, digest);
            }
            Some(Err(e)) => warn!(path = %rel, error = %e, "excluding unreadable file from inventory"),
            None => warn!(path = %rel, "excluding file whose hash task failed"),
        }
    }

    debug!(files = inventory.len(), "scanned local inventory");
    Ok(inventory)
}
