//! Server configuration.

use std::net::SocketAddr;
use std::time::Duration;

/// Port the node API listens on by default.
pub const DEFAULT_PORT: u16 = 5000;

/// Configuration for the node HTTP server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to.
    pub bind_addr: SocketAddr,
    /// Period of scheduled sync runs; `None` disables the scheduler.
    pub sync_interval: Option<Duration>,
    /// Base URL advertised in `downloadUrl`; derived from the `Host` header when unset.
    pub public_url: Option<String>,
}

impl ServerConfig {
    /// Creates a new server configuration.
    pub fn new(bind_addr: SocketAddr) -> Self {
        Self {
            bind_addr,
            sync_interval: None,
            public_url: None,
        }
    }

    /// Enables scheduled sync runs every `interval`. A zero interval disables them.
    pub fn with_sync_interval(mut self, interval: Duration) -> Self {
        self.sync_interval = (!interval.is_zero()).then_some(interval);
        self
    }

    /// Sets the base URL used to build download links.
    pub fn with_public_url(mut self, url: impl Into<String>) -> Self {
        self.public_url = Some(url.into().trim_end_matches('/').to_string());
        self
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new(SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)))
    }
}
