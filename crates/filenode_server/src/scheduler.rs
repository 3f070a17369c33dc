//! Periodic sync trigger.

use filenode_sync_engine::{RemoteSource, SyncEngine};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Spawns a task that requests a sync run every `interval` until `shutdown`.
///
/// The first run is requested immediately. Requests go through the same
/// admission as `POST /api/sync`, so a rejection here is routine.
pub fn spawn_scheduler<R: RemoteSource + 'static>(
    engine: Arc<SyncEngine<R>>,
    interval: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(interval_secs = interval.as_secs(), "sync scheduler started");
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }

            match engine.sync().await {
                Ok(report) => debug!(run_id = %report.run_id, "scheduled sync finished"),
                Err(e) if e.is_rejection() => debug!(error = %e, "scheduled sync skipped"),
                Err(e) => warn!(error = %e, "scheduled sync failed"),
            }
        }
        info!("sync scheduler stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use filenode_sync_engine::{MemoryRemote, SyncConfig};

    #[tokio::test]
    async fn runs_until_shutdown() {
        let dir = tempfile::tempdir().unwrap();
        let config = SyncConfig::new(dir.path(), "node", "http://127.0.0.1:9")
            .with_cooldown(Duration::ZERO);
        let remote = MemoryRemote::new();
        remote.insert("a.txt", b"a".to_vec()).unwrap();
        let engine = Arc::new(SyncEngine::new(config, remote).unwrap());

        let shutdown = CancellationToken::new();
        let handle = spawn_scheduler(
            Arc::clone(&engine),
            Duration::from_millis(20),
            shutdown.clone(),
        );

        while engine.stats().runs_completed < 2 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        shutdown.cancel();
        handle.await.unwrap();

        assert!(dir.path().join("a.txt").exists());
        assert_eq!(engine.stats().files_downloaded, 1);
    }
}
