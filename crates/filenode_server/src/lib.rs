//! # filenode Server
//!
//! HTTP API of a filenode.
//!
//! This crate provides:
//! - File listing, file information and streamed downloads from the managed root
//! - Sync triggering with cooldown (429) and busy (409) rejections
//! - Engine status reporting
//! - An optional scheduler requesting sync runs periodically
//!
//! # Endpoints
//!
//! | Method | Path               | Response                                         |
//! |--------|--------------------|--------------------------------------------------|
//! | GET    | `/`                | HTML file browser                                |
//! | GET    | `/docs`            | API usage guide                                  |
//! | GET    | `/api/list`        | `{code, files, node, msg}`                       |
//! | GET    | `/api/info/{path}` | `{code, filename, hash, downloadUrl, node, msg}` |
//! | POST   | `/api/sync`        | `{code, msg, node, runId}`                       |
//! | GET    | `/api/status`      | state, statistics and the last run report        |
//! | GET    | `/{path}`          | file content                                     |
//!
//! Errors are returned as `{code, error}` with the matching HTTP status.

#![deny(unsafe_code)]
#![warn(missing_docs)]
// Production code MUST NOT use panic!/unwrap()/expect()
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod config;
mod error;
mod handler;
mod pages;
mod scheduler;
mod server;

pub use config::{ServerConfig, DEFAULT_PORT};
pub use error::{ServerError, ServerResult};
pub use handler::{router, HandlerContext, StatusResponse};
pub use scheduler::spawn_scheduler;
pub use server::NodeServer;
