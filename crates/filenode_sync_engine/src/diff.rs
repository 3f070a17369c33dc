//! Inventory diffing.

use filenode_protocol::{DownloadTask, Inventory};

/// Computes the files that must be downloaded to bring `local` up to `remote`.
///
/// A remote path is included when it is missing locally or recorded with a
/// different digest. Paths that exist only locally never produce a task; sync
/// does not delete. Tasks come out sorted by path.
pub fn diff(local: &Inventory, remote: &Inventory) -> Vec<DownloadTask> {
    remote
        .iter()
        .filter(|(path, digest)| local.get(path) != Some(*digest))
        .map(|(path, digest)| DownloadTask::new(path.clone(), *digest))
        .collect()
}
