//! The sync engine.

use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::snapshot::SnapshotManager;
use crate::state::{PullResult, PushResult, SyncCycleResult, SyncState, SyncStats, SyncStatus};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tickernotes_core::LocalStore;
use tickernotes_protocol::{
    append_operations, sort_for_apply, Operation, Runlog, Snapshot, Timestamp,
};
use tickernotes_storage::{RemoteLogStore, WriteOutcome};

/// Synchronizes a [`LocalStore`] with a remote runlog.
///
/// A full sync pulls first (download the runlog, apply unseen operations in
/// deterministic order), then pushes (append unsynced local operations under
/// compare-and-swap), then optionally uploads a snapshot.
///
/// At most one sync runs per engine; a concurrent call fails with
/// [`SyncError::AlreadyInProgress`] instead of waiting. All methods block;
/// use [`AutoSync`](crate::AutoSync) or `spawn_blocking` from async code.
pub struct SyncEngine<S: RemoteLogStore> {
    config: SyncConfig,
    store: Arc<LocalStore>,
    remote: S,
    snapshots: SnapshotManager,
    state: RwLock<SyncState>,
    stats: RwLock<SyncStats>,
    syncing: AtomicBool,
    connected: AtomicBool,
    auto_sync: AtomicBool,
}

/// Clears the in-flight flag and returns the engine to idle when dropped.
struct InFlight<'a, S: RemoteLogStore> {
    engine: &'a SyncEngine<S>,
}

impl<S: RemoteLogStore> Drop for InFlight<'_, S> {
    fn drop(&mut self) {
        self.engine.set_state(SyncState::Idle);
        self.engine.syncing.store(false, Ordering::SeqCst);
    }
}

impl<S: RemoteLogStore> SyncEngine<S> {
    /// Creates a new sync engine.
    ///
    /// # Errors
    ///
    /// Returns `DeviceMismatch` if `config.device_id` is not the store's.
    pub fn new(config: SyncConfig, store: Arc<LocalStore>, remote: S) -> SyncResult<Self> {
        let device = store.device_id();
        if config.device_id != device {
            return Err(SyncError::DeviceMismatch {
                config: config.device_id,
                store: device,
            });
        }
        Ok(Self::build(config, store, remote))
    }

    /// Creates an engine with the default configuration for the store's device.
    pub fn with_defaults(store: Arc<LocalStore>, remote: S) -> Self {
        let config = SyncConfig::new(store.device_id());
        Self::build(config, store, remote)
    }

    /// Starts disconnected if an earlier process lost authorization.
    fn build(config: SyncConfig, store: Arc<LocalStore>, remote: S) -> Self {
        let snapshots = SnapshotManager::new(config.snapshot.clone());
        let connected = !store.sync_metadata().disconnected;
        if !connected {
            tracing::warn!("remote storage needs to be re-linked before syncing");
        }
        Self {
            config,
            store,
            remote,
            snapshots,
            state: RwLock::new(SyncState::Idle),
            stats: RwLock::new(SyncStats::default()),
            syncing: AtomicBool::new(false),
            connected: AtomicBool::new(connected),
            auto_sync: AtomicBool::new(false),
        }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Returns the local store.
    pub fn store(&self) -> &Arc<LocalStore> {
        &self.store
    }

    /// Returns the remote store.
    pub fn remote(&self) -> &S {
        &self.remote
    }

    /// Gets the current state.
    pub fn state(&self) -> SyncState {
        *self.state.read()
    }

    /// Gets the current stats.
    pub fn stats(&self) -> SyncStats {
        self.stats.read().clone()
    }

    /// Returns true if a sync is in flight.
    pub fn is_syncing(&self) -> bool {
        self.syncing.load(Ordering::SeqCst)
    }

    /// Returns true if the engine may talk to remote storage.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Stops all syncing until [`reconnect`](Self::reconnect) is called.
    ///
    /// The state is persisted in the local store, so engines opened later on
    /// the same store start disconnected too.
    pub fn disconnect(&self) {
        if self.connected.swap(false, Ordering::SeqCst) {
            tracing::info!("disconnected from remote storage");
        }
        self.persist_connection(false);
    }

    /// Allows syncing again, e.g. after the user re-linked the account.
    pub fn reconnect(&self) {
        if !self.connected.swap(true, Ordering::SeqCst) {
            tracing::info!("reconnected to remote storage");
        }
        self.persist_connection(true);
    }

    fn persist_connection(&self, connected: bool) {
        if self.store.sync_metadata().disconnected == !connected {
            return;
        }
        if let Err(e) = self.store.set_disconnected(!connected) {
            tracing::warn!(error = %e, "failed to persist connection state");
        }
    }

    pub(crate) fn set_auto_sync_enabled(&self, enabled: bool) {
        self.auto_sync.store(enabled, Ordering::SeqCst);
    }

    fn set_state(&self, state: SyncState) {
        *self.state.write() = state;
    }

    /// Claims the in-flight flag.
    fn begin(&self) -> SyncResult<InFlight<'_, S>> {
        if !self.is_connected() {
            return Err(SyncError::NotConnected);
        }
        if self
            .syncing
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(SyncError::AlreadyInProgress);
        }
        Ok(InFlight { engine: self })
    }

    /// Records a failure; authentication failures disconnect the engine.
    fn handle_error(&self, error: &SyncError) {
        self.stats.write().last_error = Some(error.to_string());
        if error.is_auth_failure() {
            tracing::error!(error = %error, "remote storage rejected credentials");
            self.disconnect();
        }
    }

    fn track<T>(&self, result: SyncResult<T>) -> SyncResult<T> {
        if let Err(e) = &result {
            self.handle_error(e);
        }
        result
    }

    // ----- Sync cycle -----

    /// Pulls, pushes, and uploads a snapshot when due.
    ///
    /// # Errors
    ///
    /// Fails fast with `AlreadyInProgress` or `NotConnected`. A pull or push
    /// failure aborts the sync. A snapshot failure is logged and does not.
    pub fn full_sync(&self) -> SyncResult<SyncCycleResult> {
        let _guard = self.begin()?;
        let start = Instant::now();
        tracing::info!(device = %self.config.device_id, "starting full sync");

        let result = self.track(self.full_sync_inner(start));
        match &result {
            Ok(cycle) => {
                let mut stats = self.stats.write();
                stats.cycles_completed += 1;
                stats.last_sync_time = Some(Instant::now());
                stats.last_error = None;
                if cycle.snapshot_created {
                    stats.snapshots_created += 1;
                }
                tracing::info!(
                    pulled = cycle.pulled,
                    pushed = cycle.pushed,
                    snapshot = cycle.snapshot_created,
                    duration_ms = cycle.duration.as_millis() as u64,
                    "sync complete"
                );
            }
            Err(e) => tracing::error!(error = %e, "sync failed"),
        }
        result
    }

    fn full_sync_inner(&self, start: Instant) -> SyncResult<SyncCycleResult> {
        let pull = self.pull_inner()?;
        let push = self.push_inner()?;
        self.store.set_last_sync_timestamp(Timestamp::now())?;

        let mut snapshot_created = false;
        if self.config.snapshots_enabled && self.snapshots.should_snapshot(&self.store) {
            self.set_state(SyncState::Snapshotting);
            match self.snapshots.create_snapshot(&self.store, &self.remote) {
                Ok(_) => snapshot_created = true,
                Err(e) if e.is_auth_failure() => return Err(e),
                Err(e) => tracing::warn!(error = %e, "snapshot failed"),
            }
        }

        Ok(SyncCycleResult {
            pulled: pull.applied,
            pushed: push.uploaded,
            snapshot_created,
            success: true,
            duration: start.elapsed(),
        })
    }

    /// Downloads the remote runlog and applies unseen operations.
    ///
    /// # Errors
    ///
    /// Fails if remote storage or the local store fails. Failures of single
    /// operations are logged and counted in the result.
    pub fn pull(&self) -> SyncResult<PullResult> {
        let _guard = self.begin()?;
        self.track(self.pull_inner())
    }

    fn pull_inner(&self) -> SyncResult<PullResult> {
        self.set_state(SyncState::Pulling);
        let metadata = self.store.sync_metadata();
        let mut result = PullResult::default();

        let mut cutoff: Option<Snapshot> = None;
        if metadata.is_cold_start() {
            tracing::info!("first sync, checking for snapshot");
            match self.snapshots.load_snapshot(&self.store, &self.remote) {
                Ok(loaded) => cutoff = loaded,
                Err(e) if e.is_auth_failure() => return Err(e),
                Err(e) => {
                    tracing::warn!(error = %e, "failed to load snapshot, replaying full runlog");
                }
            }
            result.snapshot_loaded = cutoff.is_some();
        }

        let content = self.remote.read_log()?;
        let runlog = Runlog::decode(&content);
        result.downloaded = runlog.len();
        result.malformed = runlog.skipped();

        let mut covered = Vec::new();
        let mut new_ops: Vec<Operation> = Vec::new();
        for op in runlog.into_operations() {
            let id = op.id();
            if metadata.has_seen(&id) {
                result.duplicates += 1;
            } else if cutoff.as_ref().is_some_and(|s| s.covers(&id)) {
                covered.push(id);
            } else {
                tracing::trace!(
                    op = %id,
                    kind = op.op_name(),
                    entity = op.kind.entity(),
                    "new operation"
                );
                new_ops.push(op);
            }
        }
        result.covered_by_snapshot = covered.len();
        if !covered.is_empty() {
            self.store.mark_seen(covered)?;
        }

        sort_for_apply(&mut new_ops);
        self.set_state(SyncState::Applying);
        let report = self.store.apply_remote(&new_ops)?;

        result.applied = report.applied;
        result.skipped = report.skipped;
        result.ignored = report.ignored;
        result.failed = report.failed;
        result.duplicates += report.duplicates;

        self.stats.write().operations_pulled += report.applied as u64;
        tracing::info!(
            downloaded = result.downloaded,
            applied = result.applied,
            skipped = result.skipped,
            failed = result.failed,
            covered = result.covered_by_snapshot,
            "pull complete"
        );
        Ok(result)
    }

    /// Uploads unsynced local operations.
    ///
    /// # Errors
    ///
    /// Returns `RetriesExhausted` if every append attempt failed; nothing is
    /// marked synced in that case.
    pub fn push(&self) -> SyncResult<PushResult> {
        let _guard = self.begin()?;
        self.track(self.push_inner())
    }

    fn push_inner(&self) -> SyncResult<PushResult> {
        self.set_state(SyncState::Pushing);
        let pending = self.store.list_unsynced();
        if pending.is_empty() {
            tracing::debug!("nothing to push");
            return Ok(PushResult::default());
        }

        let result = self.append_with_retry(&pending)?;
        let ids: Vec<_> = pending.iter().map(Operation::id).collect();
        self.store.mark_synced(&ids)?;

        self.stats.write().operations_pushed += result.uploaded as u64;
        tracing::info!(
            uploaded = result.uploaded,
            already_present = result.already_present,
            attempts = result.attempts,
            "push complete"
        );
        Ok(result)
    }

    /// Appends operations to the remote runlog under compare-and-swap.
    ///
    /// Each attempt re-reads the runlog, drops operations already present,
    /// and writes only if the runlog is still at the version it read. On a
    /// conflict the attempt is repeated after an exponential backoff. Other
    /// storage errors are retried within the same budget, except
    /// authentication failures, which abort at once.
    ///
    /// # Errors
    ///
    /// Returns `RetriesExhausted` once `max_attempts` attempts failed.
    pub fn append_with_retry(&self, ops: &[Operation]) -> SyncResult<PushResult> {
        let retry = &self.config.retry;
        let max_attempts = retry.max_attempts.max(1);
        let mut last_error = None;

        for attempt in 0..max_attempts {
            if attempt > 0 {
                let delay = retry.delay_for_attempt(attempt - 1);
                tracing::debug!(attempt, delay_ms = delay.as_millis() as u64, "retrying append");
                std::thread::sleep(delay);
                self.stats.write().retries += 1;
            }

            match self.try_append(ops) {
                Ok(Some(mut result)) => {
                    result.attempts = attempt + 1;
                    return Ok(result);
                }
                Ok(None) => {
                    self.stats.write().conflicts_encountered += 1;
                    tracing::warn!(attempt = attempt + 1, "runlog changed during append");
                }
                Err(e) if e.is_auth_failure() => return Err(e),
                Err(e) => {
                    tracing::warn!(attempt = attempt + 1, error = %e, "append attempt failed");
                    last_error = Some(e.to_string());
                }
            }
        }

        Err(SyncError::RetriesExhausted {
            attempts: max_attempts,
            last_error,
        })
    }

    /// One append attempt; `None` means the version check failed.
    fn try_append(&self, ops: &[Operation]) -> SyncResult<Option<PushResult>> {
        let current = self.remote.read_log_with_version()?;
        let runlog = Runlog::decode(&current.content);
        let missing = runlog.missing(ops);
        let already_present = ops.len() - missing.len();

        if missing.is_empty() {
            tracing::debug!(count = ops.len(), "all operations already in runlog");
            return Ok(Some(PushResult {
                uploaded: 0,
                already_present,
                attempts: 0,
            }));
        }

        let content = append_operations(&current.content, &missing)?;
        match self
            .remote
            .write_if_version_matches(&content, current.version.as_ref())?
        {
            WriteOutcome::Written(version) => {
                tracing::debug!(%version, appended = missing.len(), "runlog written");
                Ok(Some(PushResult {
                    uploaded: missing.len(),
                    already_present,
                    attempts: 0,
                }))
            }
            WriteOutcome::Conflict => Ok(None),
        }
    }

    // ----- Snapshots and administration -----

    /// Returns true if the snapshot policy says a snapshot is due.
    pub fn should_snapshot(&self) -> bool {
        self.snapshots.should_snapshot(&self.store)
    }

    /// Uploads a snapshot of the local tables now.
    ///
    /// # Errors
    ///
    /// Fails if a sync is in flight or remote storage fails.
    pub fn create_snapshot(&self) -> SyncResult<Snapshot> {
        let _guard = self.begin()?;
        self.set_state(SyncState::Snapshotting);
        let snapshot = self.track(self.snapshots.create_snapshot(&self.store, &self.remote))?;
        self.stats.write().snapshots_created += 1;
        Ok(snapshot)
    }

    /// Number of operations in the remote runlog, or `0` on any failure.
    pub fn runlog_count(&self) -> usize {
        if !self.is_connected() {
            return 0;
        }
        match self.remote.read_log() {
            Ok(content) => Runlog::decode(&content).len(),
            Err(e) => {
                let e = SyncError::from(e);
                tracing::warn!(error = %e, "failed to count runlog operations");
                self.handle_error(&e);
                0
            }
        }
    }

    /// Compacts the remote runlog into a snapshot.
    ///
    /// Uploads a snapshot of the local tables, deletes the remote runlog and
    /// forgets the local seen set. Every device must have synced first;
    /// operations a device has not pulled yet are lost.
    ///
    /// # Errors
    ///
    /// Fails if a sync is in flight or remote storage fails.
    pub fn reset_runlog(&self) -> SyncResult<Snapshot> {
        let _guard = self.begin()?;
        tracing::warn!("resetting runlog");
        self.track(self.reset_runlog_inner())
    }

    fn reset_runlog_inner(&self) -> SyncResult<Snapshot> {
        self.set_state(SyncState::Snapshotting);
        let snapshot = self.snapshots.create_snapshot(&self.store, &self.remote)?;
        self.remote.delete_log()?;
        self.store.clear_seen_operations()?;
        tracing::info!("runlog reset complete");
        Ok(snapshot)
    }

    /// Returns a status summary.
    pub fn status(&self) -> SyncStatus {
        SyncStatus {
            device_id: self.config.device_id.clone(),
            connected: self.is_connected(),
            syncing: self.is_syncing(),
            state: self.state(),
            last_sync: self.store.sync_metadata().last_sync_timestamp,
            pending_operations: self.store.pending_count(),
            auto_sync_enabled: self.auto_sync.load(Ordering::SeqCst),
        }
    }
}

impl<S: RemoteLogStore> std::fmt::Debug for SyncEngine<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEngine")
            .field("device_id", &self.config.device_id)
            .field("state", &self.state())
            .field("connected", &self.is_connected())
            .finish()
    }
}
