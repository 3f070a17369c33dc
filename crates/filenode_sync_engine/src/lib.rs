//! # filenode Sync Engine
//!
//! Keeps a node's managed directory identical, file for file, to the
//! inventory published by the central directory service.
//!
//! This crate provides:
//! - Streaming SHA-256 hashing of local files
//! - The local inventory scanner and the inventory diff
//! - A remote source abstraction with an HTTP client and an in-memory double
//! - A verified fetcher with per-file retry and atomic replacement
//! - The sync state machine (idle → running → completed / failed)
//!
//! ## Architecture
//!
//! One run proceeds in a fixed order:
//! 1. Fetch the remote inventory (the central service is authoritative)
//! 2. Scan and hash the managed root
//! 3. Diff the two into download tasks
//! 4. Fetch every task concurrently on a bounded pool
//!
//! ## Key Invariants
//!
//! - A file is only replaced by bytes whose digest matches the inventory
//! - Replacement is atomic; readers never see a partial file
//! - Nothing is ever written outside the managed root
//! - Local files absent from the remote inventory are left alone
//! - At most one run is in progress, and runs start no more often than the cooldown

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod admission;
mod config;
mod diff;
mod error;
mod fetcher;
mod hasher;
mod http;
mod pool;
mod remote;
mod root;
mod scanner;
mod state;

pub use admission::Admission;
pub use config::{
    default_concurrency, RetryConfig, SyncConfig, DEFAULT_COOLDOWN, DEFAULT_FILE_TIMEOUT,
    DEFAULT_INVENTORY_TIMEOUT, DEFAULT_MAX_RETRY,
};
pub use diff::diff;
pub use error::{SyncError, SyncResult};
pub use fetcher::{write_atomic, FetchOutcome, Fetcher};
pub use hasher::{hash_file, hash_file_async, hash_reader, CHUNK_SIZE};
pub use http::HttpRemote;
pub use pool::TaskPool;
pub use remote::{Fault, MemoryRemote, RemoteSource};
pub use root::{ManagedRoot, STALE_TEMP_AGE};
pub use scanner::{list_files, scan};
pub use state::{SyncEngine, SyncReport, SyncState, SyncStats};
