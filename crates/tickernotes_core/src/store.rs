//! The local datastore.

use crate::applier::{apply, ApplyOutcome};
use crate::config::Config;
use crate::dir::StoreDir;
use crate::error::{ApplyError, CoreError, CoreResult};
use crate::metadata::SyncMetadata;
use crate::oplog::LocalOplog;
use crate::tables::EntityTables;
use chrono::Utc;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tickernotes_protocol::{
    DeviceId, Operation, OperationId, OperationKind, Snapshot, SnapshotData, Timestamp,
};

/// Version of the STATE file layout.
const STATE_FORMAT_VERSION: u32 = 1;

/// Everything a local store persists.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct StoreState {
    pub(crate) tables: EntityTables,
    pub(crate) oplog: LocalOplog,
    pub(crate) metadata: SyncMetadata,
}

impl StoreState {
    fn new(device_id: DeviceId) -> Self {
        Self {
            tables: EntityTables::new(),
            oplog: LocalOplog::new(device_id.clone()),
            metadata: SyncMetadata::new(device_id),
        }
    }
}

#[derive(Serialize)]
struct StateFileRef<'a> {
    format_version: u32,
    state: &'a StoreState,
}

#[derive(Deserialize)]
struct StateFile {
    format_version: u32,
    state: StoreState,
}

/// Counts from applying a batch of pulled operations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplyReport {
    /// Operations that changed (or confirmed) local state.
    pub applied: usize,
    /// Operations whose target or referenced record no longer existed.
    pub skipped: usize,
    /// Operations of an unknown kind.
    pub ignored: usize,
    /// Operations already in the seen set.
    pub duplicates: usize,
    /// Operations that failed to apply; they stay unseen.
    pub failed: usize,
}

impl ApplyReport {
    /// Operations folded in and added to the seen set.
    #[must_use]
    pub fn seen(&self) -> usize {
        self.applied + self.skipped + self.ignored
    }
}

/// A device's local datastore.
///
/// `LocalStore` owns the entity tables, the local operation log and the sync
/// metadata. Every mutation goes through the operation applier, and every
/// committed change is written to disk (for directory-backed stores) before
/// the call returns.
///
/// # Thread Safety
///
/// All methods take `&self`; the state sits behind one lock so a pulled
/// batch is applied without interleaving local mutations.
///
/// # Example
///
/// ```rust
/// use tickernotes_core::LocalStore;
/// use tickernotes_protocol::DeviceId;
///
/// let store = LocalStore::in_memory(DeviceId::new("device-a"));
/// let sec = store.add_security("AAPL", None).unwrap();
/// store.add_note(&sec.id, "Watch earnings").unwrap();
/// assert_eq!(store.pending_count(), 2);
/// ```
pub struct LocalStore {
    state: RwLock<StoreState>,
    dir: Option<StoreDir>,
    config: Config,
}

impl LocalStore {
    /// Opens or creates a store in a directory.
    ///
    /// A new store gets a fresh random device id. The sequence counter is
    /// seeded from the stored operations.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseLocked` if another process holds the directory, or an
    /// error if the state file cannot be read.
    pub fn open(path: &Path, config: Config) -> CoreResult<Self> {
        let dir = StoreDir::open(path, config.create_if_missing)?;
        let (mut state, created) = match dir.load_state::<StateFile>()? {
            Some(file) if file.format_version == STATE_FORMAT_VERSION => (file.state, false),
            Some(file) => {
                return Err(CoreError::invalid_format(format!(
                    "unsupported STATE version {}",
                    file.format_version
                )))
            }
            None => (StoreState::new(DeviceId::generate()), true),
        };
        state.oplog.init_sequence_counter();

        let store = Self {
            state: RwLock::new(state),
            dir: Some(dir),
            config,
        };
        if created {
            store.persist(&store.state.read())?;
        }

        tracing::info!(
            path = %path.display(),
            device = %store.device_id(),
            created,
            "opened local store"
        );
        Ok(store)
    }

    /// Creates an ephemeral store.
    pub fn in_memory(device_id: DeviceId) -> Self {
        let mut state = StoreState::new(device_id);
        state.oplog.init_sequence_counter();
        Self {
            state: RwLock::new(state),
            dir: None,
            config: Config::default(),
        }
    }

    /// Returns this device's id.
    #[must_use]
    pub fn device_id(&self) -> DeviceId {
        self.state.read().metadata.device_id.clone()
    }

    /// Returns the store directory, if any.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.dir.as_ref().map(StoreDir::path)
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    fn persist(&self, state: &StoreState) -> CoreResult<()> {
        if let Some(dir) = &self.dir {
            let file = StateFileRef {
                format_version: STATE_FORMAT_VERSION,
                state,
            };
            dir.save_state(&file, self.config.sync_on_write)?;
        }
        Ok(())
    }

    /// Runs `f` under the write lock and persists the result.
    pub(crate) fn write<R>(
        &self,
        f: impl FnOnce(&mut StoreState) -> CoreResult<R>,
    ) -> CoreResult<R> {
        let mut state = self.state.write();
        let result = f(&mut state)?;
        self.persist(&state)?;
        Ok(result)
    }

    pub(crate) fn read<R>(&self, f: impl FnOnce(&StoreState) -> R) -> R {
        f(&self.state.read())
    }

    // ----- Local operation log -----

    /// Records an operation without applying it.
    ///
    /// # Errors
    ///
    /// Returns an error if the state cannot be persisted.
    pub fn record(&self, kind: OperationKind) -> CoreResult<Operation> {
        self.write(|state| {
            let op = state.oplog.record(kind, Timestamp::now())?;
            tracing::debug!(op = %op.id(), kind = op.op_name(), "operation recorded");
            Ok(op)
        })
    }

    /// Applies a mutation locally and records it for sync.
    ///
    /// The operation is only recorded if it applies cleanly. An operation
    /// whose target is missing is still recorded, like on any other device.
    ///
    /// # Errors
    ///
    /// Returns an error if the operation cannot be applied or persisted.
    pub fn execute(&self, kind: OperationKind) -> CoreResult<Operation> {
        self.write(|state| {
            let op = state.oplog.prepare(kind, Timestamp::now())?;
            let outcome = apply(&mut state.tables, &op)?;
            state.oplog.commit(op.clone())?;
            tracing::debug!(
                op = %op.id(),
                kind = op.op_name(),
                outcome = ?outcome,
                "mutation executed"
            );
            Ok(op)
        })
    }

    /// Returns unsynced local operations in sequence order.
    #[must_use]
    pub fn list_unsynced(&self) -> Vec<Operation> {
        self.read(|state| state.oplog.list_unsynced())
    }

    /// Marks pushed operations synced and adds them to the seen set.
    ///
    /// Both changes are committed together.
    ///
    /// # Errors
    ///
    /// Returns an error if the state cannot be persisted.
    pub fn mark_synced(&self, ids: &[OperationId]) -> CoreResult<usize> {
        let now = Timestamp::now();
        self.write(|state| {
            let flipped = state.oplog.mark_synced(ids, &now);
            for id in ids {
                state.metadata.mark_seen(id.clone());
            }
            Ok(flipped)
        })
    }

    /// Number of local operations awaiting upload.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.read(|state| state.oplog.pending_count())
    }

    /// Number of local operations recorded after `since`.
    #[must_use]
    pub fn operations_since(&self, since: &Timestamp) -> usize {
        self.read(|state| state.oplog.created_since(since))
    }

    /// Deletes synced local operations synced more than `older_than` ago.
    ///
    /// # Errors
    ///
    /// Returns an error if the state cannot be persisted.
    pub fn prune_synced(&self, older_than: chrono::Duration) -> CoreResult<usize> {
        let cutoff = Timestamp::from_datetime(Utc::now() - older_than);
        let deleted = self.write(|state| Ok(state.oplog.prune_synced(&cutoff)))?;
        if deleted > 0 {
            tracing::info!(deleted, cutoff = %cutoff, "pruned synced operations");
        }
        Ok(deleted)
    }

    /// Returns every stored local operation in sequence order.
    #[must_use]
    pub fn local_operations(&self) -> Vec<Operation> {
        self.read(|state| state.oplog.iter().cloned().collect())
    }

    // ----- Sync metadata -----

    /// Returns a copy of the sync metadata.
    #[must_use]
    pub fn sync_metadata(&self) -> SyncMetadata {
        self.read(|state| state.metadata.clone())
    }

    /// Adds ids to the seen set without applying anything.
    ///
    /// # Errors
    ///
    /// Returns an error if the state cannot be persisted.
    pub fn mark_seen<I>(&self, ids: I) -> CoreResult<usize>
    where
        I: IntoIterator<Item = OperationId>,
    {
        self.write(|state| {
            Ok(ids
                .into_iter()
                .filter(|id| state.metadata.mark_seen(id.clone()))
                .count())
        })
    }

    /// Stamps the completion time of a full sync.
    ///
    /// # Errors
    ///
    /// Returns an error if the state cannot be persisted.
    pub fn set_last_sync_timestamp(&self, ts: Timestamp) -> CoreResult<()> {
        self.write(|state| {
            state.metadata.last_sync_timestamp = Some(ts);
            Ok(())
        })
    }

    /// Stamps the time of the last snapshot.
    ///
    /// # Errors
    ///
    /// Returns an error if the state cannot be persisted.
    pub fn set_last_snapshot_timestamp(&self, ts: Timestamp) -> CoreResult<()> {
        self.write(|state| {
            state.metadata.last_snapshot_timestamp = Some(ts);
            Ok(())
        })
    }

    /// Forgets every seen operation, keeping the last sync time.
    ///
    /// Used after the remote log has been deleted.
    ///
    /// # Errors
    ///
    /// Returns an error if the state cannot be persisted.
    pub fn clear_seen_operations(&self) -> CoreResult<()> {
        self.write(|state| {
            state.metadata.last_seen_operations.clear();
            state.metadata.unapplied_operations.clear();
            Ok(())
        })
    }

    /// Persists whether remote storage must be re-linked before syncing.
    ///
    /// # Errors
    ///
    /// Returns an error if the state cannot be persisted.
    pub fn set_disconnected(&self, disconnected: bool) -> CoreResult<()> {
        self.write(|state| {
            state.metadata.disconnected = disconnected;
            Ok(())
        })
    }

    /// Resets sync state so the next pull replays the whole remote log.
    ///
    /// # Errors
    ///
    /// Returns an error if the state cannot be persisted.
    pub fn reset_sync_state(&self) -> CoreResult<()> {
        self.write(|state| {
            state.metadata.reset();
            Ok(())
        })?;
        tracing::info!("sync state reset");
        Ok(())
    }

    // ----- Remote application -----

    /// Applies pulled operations in the given order.
    ///
    /// Operations already seen are skipped. A failure never aborts the batch.
    /// An operation whose referenced record does not exist yet is retried once
    /// after the rest of the batch; if the record is still missing the
    /// operation is skipped. Applied and skipped operations join the seen
    /// set. Failed ones stay unseen, are recorded as unapplied, and are
    /// retried on the next pull. The whole batch commits as one write.
    ///
    /// # Errors
    ///
    /// Returns an error only if the state cannot be persisted.
    pub fn apply_remote(&self, ops: &[Operation]) -> CoreResult<ApplyReport> {
        self.write(|state| {
            let mut report = ApplyReport::default();
            let mut deferred = Vec::new();

            for op in ops {
                let id = op.id();
                if state.metadata.has_seen(&id) {
                    report.duplicates += 1;
                    continue;
                }
                match apply(&mut state.tables, op) {
                    Ok(outcome) => record_outcome(state, &mut report, id, outcome),
                    Err(e) if e.is_missing_reference() => deferred.push(op),
                    Err(e) => record_failure(state, &mut report, id, &e),
                }
            }

            for op in deferred {
                let id = op.id();
                match apply(&mut state.tables, op) {
                    Ok(outcome) => record_outcome(state, &mut report, id, outcome),
                    Err(e) if e.is_missing_reference() => {
                        tracing::debug!(op = %id, error = %e, "reference still missing, skipped");
                        record_outcome(state, &mut report, id, ApplyOutcome::Skipped);
                    }
                    Err(e) => record_failure(state, &mut report, id, &e),
                }
            }

            Ok(report)
        })
    }

    /// Replaces the entity tables with a snapshot.
    ///
    /// Local operations the snapshot does not cover are re-applied on top so
    /// mutations made on this device survive. Returns how many were
    /// re-applied.
    ///
    /// # Errors
    ///
    /// Returns an error if the state cannot be persisted.
    pub fn load_snapshot(&self, snapshot: &Snapshot) -> CoreResult<usize> {
        self.write(|state| {
            state.tables = EntityTables::from_snapshot_data(&snapshot.data);
            state.metadata.last_snapshot_timestamp = Some(snapshot.created_at.clone());

            let mut reapplied = 0;
            for op in state.oplog.iter() {
                if snapshot.covers(&op.id()) {
                    continue;
                }
                match apply(&mut state.tables, op) {
                    Ok(_) => reapplied += 1,
                    Err(e) => {
                        tracing::warn!(
                            op = %op.id(),
                            error = %e,
                            "failed to re-apply local operation"
                        );
                    }
                }
            }

            tracing::info!(
                snapshot_device = %snapshot.device_id,
                created_at = %snapshot.created_at,
                securities = state.tables.securities.len(),
                notes = state.tables.notes.len(),
                groups = state.tables.groups.len(),
                reapplied,
                "snapshot loaded"
            );
            Ok(reapplied)
        })
    }

    // ----- Queries -----

    /// Returns a copy of all entity tables.
    #[must_use]
    pub fn tables(&self) -> EntityTables {
        self.read(|state| state.tables.clone())
    }

    /// Captures the tables as snapshot data.
    #[must_use]
    pub fn snapshot_data(&self) -> SnapshotData {
        self.read(|state| state.tables.to_snapshot_data())
    }
}

fn record_outcome(
    state: &mut StoreState,
    report: &mut ApplyReport,
    id: OperationId,
    outcome: ApplyOutcome,
) {
    match outcome {
        ApplyOutcome::Applied => report.applied += 1,
        ApplyOutcome::Skipped => report.skipped += 1,
        ApplyOutcome::Ignored => report.ignored += 1,
    }
    state.metadata.mark_seen(id);
}

fn record_failure(
    state: &mut StoreState,
    report: &mut ApplyReport,
    id: OperationId,
    error: &ApplyError,
) {
    report.failed += 1;
    tracing::warn!(op = %id, error = %error, "failed to apply operation");
    state.metadata.mark_unapplied(id);
}

impl std::fmt::Debug for LocalStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.read();
        f.debug_struct("LocalStore")
            .field("device_id", &state.metadata.device_id)
            .field("path", &self.path())
            .field("operations", &state.oplog.len())
            .field("securities", &state.tables.securities.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use tempfile::tempdir;
    use serde_json::{json, Map};
    use tickernotes_protocol::{EntityPatch, EntityRef, Group, Note, Security};

    fn remote_op(device: &str, seq: u64, ts: &str, kind: OperationKind) -> Operation {
        Operation::new(DeviceId::new(device), seq, Timestamp::from_raw(ts), kind)
    }

    #[test]
    fn execute_applies_and_records() {
        let store = LocalStore::in_memory(DeviceId::new("me"));
        let op = store
            .execute(OperationKind::AddSecurity(Security::new("sec-1", "AAPL")))
            .unwrap();

        assert_eq!(op.seq, 0);
        assert!(store.tables().securities.contains_key("sec-1"));
        assert_eq!(store.list_unsynced().len(), 1);
    }

    #[test]
    fn failed_execute_records_nothing() {
        let store = LocalStore::in_memory(DeviceId::new("me"));
        let result = store.execute(OperationKind::AddNote(Note::new("note-1", "sec-404", "x")));
        assert!(matches!(result, Err(CoreError::Apply(_))));
        assert_eq!(store.pending_count(), 0);

        let op = store
            .execute(OperationKind::AddSecurity(Security::new("sec-1", "AAPL")))
            .unwrap();
        assert_eq!(op.seq, 0);
    }

    #[test]
    fn mark_synced_updates_seen_set() {
        let store = LocalStore::in_memory(DeviceId::new("me"));
        let op = store
            .execute(OperationKind::AddSecurity(Security::new("sec-1", "AAPL")))
            .unwrap();
        assert_eq!(store.mark_synced(&[op.id()]).unwrap(), 1);

        assert_eq!(store.pending_count(), 0);
        assert!(store.sync_metadata().has_seen(&op.id()));
    }

    #[test]
    fn apply_remote_dedups_and_defers() {
        let store = LocalStore::in_memory(DeviceId::new("me"));
        let note = remote_op(
            "other",
            1,
            "2024-01-01T00:00:00.000Z",
            OperationKind::AddNote(Note::new("note-1", "sec-1", "early clock")),
        );
        let security = remote_op(
            "third",
            0,
            "2024-01-01T00:00:05.000Z",
            OperationKind::AddSecurity(Security::new("sec-1", "AAPL")),
        );

        let report = store.apply_remote(&[note.clone(), security.clone()]).unwrap();
        assert_eq!(report.applied, 2);
        assert_eq!(report.failed, 0);
        assert_eq!(store.tables().notes.len(), 1);

        let again = store.apply_remote(&[note, security]).unwrap();
        assert_eq!(again.duplicates, 2);
        assert_eq!(again.seen(), 0);
    }

    #[test]
    fn note_for_missing_security_is_skipped_and_seen() {
        let store = LocalStore::in_memory(DeviceId::new("me"));
        let orphan = remote_op(
            "other",
            0,
            "2024-01-01T00:00:00.000Z",
            OperationKind::AddNote(Note::new("note-1", "sec-gone", "x")),
        );
        let delete = remote_op(
            "other",
            1,
            "2024-01-01T00:00:01.000Z",
            OperationKind::DeleteNote(EntityRef::new("note-7")),
        );

        let report = store.apply_remote(&[orphan.clone(), delete.clone()]).unwrap();
        assert_eq!(report.failed, 0);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.applied, 1);
        assert!(store.tables().notes.is_empty());

        let meta = store.sync_metadata();
        assert!(meta.has_seen(&orphan.id()));
        assert!(meta.has_seen(&delete.id()));
        assert!(meta.unapplied_operations.is_empty());
    }

    #[test]
    fn apply_remote_failures_stay_unseen() {
        let store = LocalStore::in_memory(DeviceId::new("me"));
        store
            .execute(OperationKind::AddGroup(Group::new("grp-1", "Tech")))
            .unwrap();
        let mut fields = Map::new();
        fields.insert("name".into(), json!(["not", "a", "name"]));
        let bad = remote_op(
            "other",
            0,
            "2024-01-01T00:00:00.000Z",
            OperationKind::UpdateGroup(EntityPatch::new("grp-1", fields)),
        );

        let report = store.apply_remote(std::slice::from_ref(&bad)).unwrap();
        assert_eq!(report.failed, 1);

        let meta = store.sync_metadata();
        assert!(!meta.has_seen(&bad.id()));
        assert!(meta.unapplied_operations.contains(&bad.id()));

        let again = store.apply_remote(std::slice::from_ref(&bad)).unwrap();
        assert_eq!(again.failed, 1);
        assert_eq!(store.tables().groups["grp-1"].name, "Tech");
    }

    #[test]
    fn load_snapshot_keeps_uncovered_local_ops() {
        let store = LocalStore::in_memory(DeviceId::new("me"));
        store
            .execute(OperationKind::AddSecurity(Security::new("sec-local", "TSLA")))
            .unwrap();

        let mut data = SnapshotData::default();
        data.securities.push(Security::new("sec-remote", "AAPL"));
        let mut sequences = BTreeMap::new();
        sequences.insert(DeviceId::new("other"), 4);
        let snapshot = Snapshot::new(
            DeviceId::new("other"),
            Timestamp::from_raw("2024-01-01T00:00:00.000Z"),
            sequences,
            data,
        );

        assert_eq!(store.load_snapshot(&snapshot).unwrap(), 1);
        let tables = store.tables();
        assert!(tables.securities.contains_key("sec-remote"));
        assert!(tables.securities.contains_key("sec-local"));
        assert_eq!(
            store.sync_metadata().last_snapshot_timestamp,
            Some(snapshot.created_at)
        );
    }

    #[test]
    fn reopen_restores_state_and_counter() {
        let dir = tempdir().unwrap();
        let device = {
            let store = LocalStore::open(dir.path(), Config::default()).unwrap();
            store
                .execute(OperationKind::AddSecurity(Security::new("sec-1", "AAPL")))
                .unwrap();
            store
                .execute(OperationKind::AddNote(Note::new("note-1", "sec-1", "hi")))
                .unwrap();
            store.device_id()
        };

        let store = LocalStore::open(dir.path(), Config::default()).unwrap();
        assert_eq!(store.device_id(), device);
        assert_eq!(store.tables().notes["note-1"].content, "hi");
        let op = store
            .execute(OperationKind::DeleteNote(EntityRef::new("note-1")))
            .unwrap();
        assert_eq!(op.seq, 2);
    }

    #[test]
    fn open_twice_is_locked() {
        let dir = tempdir().unwrap();
        let _store = LocalStore::open(dir.path(), Config::default()).unwrap();
        let second = LocalStore::open(dir.path(), Config::default());
        assert!(matches!(second, Err(CoreError::DatabaseLocked)));
    }

    #[test]
    fn disconnected_flag_survives_reopen() {
        let dir = tempdir().unwrap();
        {
            let store = LocalStore::open(dir.path(), Config::default()).unwrap();
            assert!(!store.sync_metadata().disconnected);
            store.set_disconnected(true).unwrap();
        }
        let store = LocalStore::open(dir.path(), Config::default()).unwrap();
        assert!(store.sync_metadata().disconnected);
    }

    #[test]
    fn reset_sync_state_empties_seen_set() {
        let store = LocalStore::in_memory(DeviceId::new("me"));
        store
            .mark_seen([OperationId::new(DeviceId::new("x"), 1)])
            .unwrap();
        store.set_last_sync_timestamp(Timestamp::now()).unwrap();
        store.reset_sync_state().unwrap();

        let meta = store.sync_metadata();
        assert!(meta.is_cold_start());
        assert!(meta.last_sync_timestamp.is_none());
    }
}
