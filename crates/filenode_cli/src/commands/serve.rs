//! Serve command implementation.

use filenode_server::{NodeServer, ServerConfig};
use filenode_sync_engine::{HttpRemote, SyncConfig, SyncEngine};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

/// Runs the node server until Ctrl-C.
pub async fn run(
    config: SyncConfig,
    bind_addr: SocketAddr,
    sync_interval: Duration,
    public_url: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let remote = HttpRemote::from_config(&config)?;
    let engine = Arc::new(SyncEngine::new(config, remote)?);

    let mut server_config = ServerConfig::new(bind_addr).with_sync_interval(sync_interval);
    if let Some(url) = public_url {
        server_config = server_config.with_public_url(url);
    }

    NodeServer::new(server_config, engine).serve().await?;
    Ok(())
}
