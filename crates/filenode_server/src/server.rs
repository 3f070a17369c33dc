//! Main node server.

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::handler::{router, HandlerContext};
use crate::scheduler::spawn_scheduler;
use axum::Router;
use filenode_sync_engine::{RemoteSource, SyncEngine};
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// The node server.
///
/// Serves the managed root over HTTP, accepts sync triggers and, when a sync
/// interval is configured, runs the sync scheduler alongside the listener.
///
/// # Example
///
/// ```no_run
/// use filenode_server::{NodeServer, ServerConfig};
/// use filenode_sync_engine::{HttpRemote, SyncConfig, SyncEngine};
/// use std::sync::Arc;
///
/// # async fn run() -> Result<(), Box<dyn std::error::Error>> {
/// let config = SyncConfig::new("file", "node-1", "https://central.example.com");
/// let remote = HttpRemote::from_config(&config)?;
/// let engine = Arc::new(SyncEngine::new(config, remote)?);
///
/// NodeServer::new(ServerConfig::default(), engine).serve().await?;
/// # Ok(())
/// # }
/// ```
pub struct NodeServer<R: RemoteSource> {
    config: ServerConfig,
    engine: Arc<SyncEngine<R>>,
}

impl<R: RemoteSource + 'static> NodeServer<R> {
    /// Creates a new node server.
    pub fn new(config: ServerConfig, engine: Arc<SyncEngine<R>>) -> Self {
        Self { config, engine }
    }

    /// The sync engine behind the server.
    pub fn engine(&self) -> &Arc<SyncEngine<R>> {
        &self.engine
    }

    /// Builds the HTTP router without binding a socket.
    pub fn router(&self) -> Router {
        router(HandlerContext::new(
            Arc::clone(&self.engine),
            self.config.clone(),
        ))
    }

    /// Serves on the configured address until Ctrl-C.
    pub async fn serve(self) -> ServerResult<()> {
        self.serve_until(shutdown_signal()).await
    }

    /// Serves on the configured address until `shutdown` resolves.
    pub async fn serve_until<F>(self, shutdown: F) -> ServerResult<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = self.config.bind_addr;
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ServerError::Bind { addr, source })?;
        self.serve_on(listener, shutdown).await
    }

    /// Serves on an already bound listener until `shutdown` resolves.
    pub async fn serve_on<F>(self, listener: TcpListener, shutdown: F) -> ServerResult<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = listener.local_addr()?;
        info!(
            %addr,
            node = %self.engine.config().node_id,
            root = %self.engine.root().path().display(),
            "node server listening"
        );

        let stop = CancellationToken::new();
        let scheduler = self
            .config
            .sync_interval
            .map(|interval| spawn_scheduler(Arc::clone(&self.engine), interval, stop.clone()));

        let app = self.router();
        let result = axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await;

        stop.cancel();
        self.engine.cancel();
        if let Some(handle) = scheduler {
            if let Err(e) = handle.await {
                error!(error = %e, "sync scheduler did not stop cleanly");
            }
        }
        info!("node server stopped");
        result.map_err(ServerError::from)
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "cannot listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}
