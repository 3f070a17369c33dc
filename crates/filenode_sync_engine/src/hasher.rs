//! Streaming content hashing.

use crate::error::{SyncError, SyncResult};
use filenode_protocol::Digest;
use sha2::{Digest as _, Sha256};
use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

/// Bytes read per chunk while hashing.
pub const CHUNK_SIZE: usize = 64 * 1024;

/// Hashes everything `reader` yields, one chunk at a time.
pub fn hash_reader<R: Read>(mut reader: R) -> io::Result<Digest> {
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; CHUNK_SIZE];
    loop {
        match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => hasher.update(&buf[..n]),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(Digest::from_bytes(hasher.finalize().into()))
}

/// Hashes the file at `path`.
pub fn hash_file(path: &Path) -> SyncResult<Digest> {
    let file = File::open(path).map_err(|e| SyncError::io(path, e))?;
    hash_reader(file).map_err(|e| SyncError::io(path, e))
}

/// Hashes the file at `path` on the blocking thread pool.
pub async fn hash_file_async(path: PathBuf) -> SyncResult<Digest> {
    let display = path.clone();
    tokio::task::spawn_blocking(move || hash_file(&path))
        .await
        .map_err(|e| SyncError::io(display, io::Error::other(e)))?
}
