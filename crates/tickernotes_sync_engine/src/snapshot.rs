//! Snapshot manager.
//!
//! A snapshot is a full copy of the entity tables uploaded next to the
//! runlog. It never truncates the runlog; it only lets a brand-new device
//! skip the history the snapshot already covers.

use crate::config::SnapshotPolicy;
use crate::error::SyncResult;
use chrono::{DateTime, Utc};
use tickernotes_core::LocalStore;
use tickernotes_protocol::{Snapshot, Timestamp};
use tickernotes_storage::RemoteLogStore;

/// Decides when to snapshot, and uploads or loads snapshots.
#[derive(Debug, Clone, Default)]
pub struct SnapshotManager {
    policy: SnapshotPolicy,
}

impl SnapshotManager {
    /// Creates a manager with the given policy.
    pub fn new(policy: SnapshotPolicy) -> Self {
        Self { policy }
    }

    /// Returns the policy.
    pub fn policy(&self) -> &SnapshotPolicy {
        &self.policy
    }

    /// Returns true if a snapshot should be taken now.
    pub fn should_snapshot(&self, store: &LocalStore) -> bool {
        self.should_snapshot_at(store, Utc::now())
    }

    /// Returns true if a snapshot should be taken at `now`.
    ///
    /// True when there is no previous snapshot, when the last one is at least
    /// `max_age` old, or when `max_operations` local operations were recorded
    /// after it. An unreadable timestamp counts as no snapshot.
    pub fn should_snapshot_at(&self, store: &LocalStore, now: DateTime<Utc>) -> bool {
        let Some(last) = store.sync_metadata().last_snapshot_timestamp else {
            tracing::debug!("no snapshot yet");
            return true;
        };

        let taken = match last.to_datetime() {
            Ok(taken) => taken,
            Err(e) => {
                tracing::warn!(timestamp = %last, error = %e, "unreadable snapshot timestamp");
                return true;
            }
        };

        let age = (now - taken).to_std().unwrap_or_default();
        if age >= self.policy.max_age {
            tracing::debug!(age_secs = age.as_secs(), "snapshot is stale");
            return true;
        }

        let since = store.operations_since(&last);
        if since >= self.policy.max_operations {
            tracing::debug!(operations = since, "operations since last snapshot");
            return true;
        }

        false
    }

    /// Captures the local tables and uploads them as the remote snapshot.
    ///
    /// The snapshot covers, per device, the highest sequence number in the
    /// seen set, except pulled operations that failed to apply.
    pub fn create_snapshot<S>(&self, store: &LocalStore, remote: &S) -> SyncResult<Snapshot>
    where
        S: RemoteLogStore + ?Sized,
    {
        let metadata = store.sync_metadata();
        let created_at = Timestamp::now();
        let snapshot = Snapshot::new(
            store.device_id(),
            created_at.clone(),
            metadata.sequence_frontier(),
            store.snapshot_data(),
        )
        .with_excluded(metadata.unapplied_operations);

        remote.write_snapshot(&snapshot.encode()?)?;
        store.set_last_snapshot_timestamp(created_at)?;

        tracing::info!(
            securities = snapshot.data.securities.len(),
            notes = snapshot.data.notes.len(),
            groups = snapshot.data.groups.len(),
            devices = snapshot.sequences.len(),
            excluded = snapshot.excluded.len(),
            last_sequence = snapshot.last_sequence,
            "snapshot uploaded"
        );
        Ok(snapshot)
    }

    /// Downloads the remote snapshot, if any.
    pub fn fetch_snapshot<S>(&self, remote: &S) -> SyncResult<Option<Snapshot>>
    where
        S: RemoteLogStore + ?Sized,
    {
        match remote.read_snapshot()? {
            Some(bytes) => Ok(Some(Snapshot::decode(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Downloads the remote snapshot and replaces the local tables with it.
    ///
    /// Returns `None` if no snapshot exists.
    pub fn load_snapshot<S>(&self, store: &LocalStore, remote: &S) -> SyncResult<Option<Snapshot>>
    where
        S: RemoteLogStore + ?Sized,
    {
        let Some(snapshot) = self.fetch_snapshot(remote)? else {
            tracing::info!("no remote snapshot");
            return Ok(None);
        };
        store.load_snapshot(&snapshot)?;
        Ok(Some(snapshot))
    }
}
