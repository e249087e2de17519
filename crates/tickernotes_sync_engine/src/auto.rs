//! Periodic background sync.

use crate::engine::SyncEngine;
use std::sync::Arc;
use std::time::Duration;
use tickernotes_storage::RemoteLogStore;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Runs [`SyncEngine::full_sync`] on a fixed interval.
///
/// Ticks are skipped while the engine is disconnected or already syncing.
/// Failures are logged and never stop the loop. Dropping the handle stops
/// the task.
pub struct AutoSync<S: RemoteLogStore + 'static> {
    engine: Arc<SyncEngine<S>>,
    handle: JoinHandle<()>,
}

impl<S: RemoteLogStore + 'static> AutoSync<S> {
    /// Default interval between syncs.
    pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(15 * 60);

    /// Spawns the auto-sync task on the current tokio runtime.
    ///
    /// The first sync runs one `interval` after spawning.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    pub fn spawn(engine: Arc<SyncEngine<S>>, interval: Duration) -> Self {
        engine.set_auto_sync_enabled(true);
        tracing::info!(interval_secs = interval.as_secs(), "auto-sync enabled");

        let task_engine = Arc::clone(&engine);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            ticker.tick().await;

            loop {
                ticker.tick().await;
                if !task_engine.is_connected() {
                    tracing::debug!("auto-sync skipped: disconnected");
                    continue;
                }
                if task_engine.is_syncing() {
                    tracing::debug!("auto-sync skipped: sync in flight");
                    continue;
                }

                tracing::debug!("auto-sync triggered");
                let engine = Arc::clone(&task_engine);
                match tokio::task::spawn_blocking(move || engine.full_sync()).await {
                    Ok(Ok(_)) => {}
                    Ok(Err(e)) => tracing::warn!(error = %e, "auto-sync failed"),
                    Err(e) => tracing::error!(error = %e, "auto-sync task panicked"),
                }
            }
        });

        Self { engine, handle }
    }

    /// Spawns with the engine's configured interval, or the default.
    pub fn spawn_configured(engine: Arc<SyncEngine<S>>) -> Self {
        let interval = engine
            .config()
            .sync_interval
            .unwrap_or(Self::DEFAULT_INTERVAL);
        Self::spawn(engine, interval)
    }

    /// Returns the engine being driven.
    pub fn engine(&self) -> &Arc<SyncEngine<S>> {
        &self.engine
    }

    /// Stops the task.
    pub fn stop(self) {
        drop(self);
    }
}

impl<S: RemoteLogStore + 'static> Drop for AutoSync<S> {
    fn drop(&mut self) {
        self.handle.abort();
        self.engine.set_auto_sync_enabled(false);
        tracing::info!("auto-sync disabled");
    }
}
