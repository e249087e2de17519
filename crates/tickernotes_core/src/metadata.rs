//! Per-device sync metadata.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tickernotes_protocol::{DeviceId, OperationId, Timestamp};

/// Sync bookkeeping for one device.
///
/// `last_seen_operations` is the de-duplication frontier: an id is in it if
/// and only if the operation was applied locally by a pull or originated
/// here and was pushed. It only shrinks through [`reset`](Self::reset).
///
/// `unapplied_operations` holds pulled operations that failed to apply. They
/// are retried on every pull until they apply, and a snapshot never claims
/// to cover them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncMetadata {
    /// This device.
    pub device_id: DeviceId,
    /// Completion time of the last full sync.
    #[serde(default)]
    pub last_sync_timestamp: Option<Timestamp>,
    /// Ids of operations folded into local state.
    #[serde(default)]
    pub last_seen_operations: BTreeSet<OperationId>,
    /// Time of the last snapshot created or loaded here.
    #[serde(default)]
    pub last_snapshot_timestamp: Option<Timestamp>,
    /// Pulled operations that failed to apply.
    #[serde(default)]
    pub unapplied_operations: BTreeSet<OperationId>,
    /// Set when remote storage rejected our credentials.
    #[serde(default)]
    pub disconnected: bool,
}

impl SyncMetadata {
    /// Creates empty metadata for a device.
    pub fn new(device_id: DeviceId) -> Self {
        Self {
            device_id,
            last_sync_timestamp: None,
            last_seen_operations: BTreeSet::new(),
            last_snapshot_timestamp: None,
            unapplied_operations: BTreeSet::new(),
            disconnected: false,
        }
    }

    /// Returns true if no operation has ever been seen.
    #[must_use]
    pub fn is_cold_start(&self) -> bool {
        self.last_seen_operations.is_empty()
    }

    /// Returns true if this operation is already folded in.
    #[must_use]
    pub fn has_seen(&self, id: &OperationId) -> bool {
        self.last_seen_operations.contains(id)
    }

    /// Adds an id to the seen set.
    pub fn mark_seen(&mut self, id: OperationId) -> bool {
        self.unapplied_operations.remove(&id);
        self.last_seen_operations.insert(id)
    }

    /// Records a pulled operation that failed to apply.
    pub fn mark_unapplied(&mut self, id: OperationId) {
        if !self.last_seen_operations.contains(&id) {
            self.unapplied_operations.insert(id);
        }
    }

    /// Highest seen sequence per device.
    #[must_use]
    pub fn sequence_frontier(&self) -> BTreeMap<DeviceId, u64> {
        let mut frontier = BTreeMap::new();
        for id in &self.last_seen_operations {
            let max = frontier.entry(id.device.clone()).or_insert(id.seq);
            *max = (*max).max(id.seq);
        }
        frontier
    }

    /// Forgets every seen id and the last sync time.
    ///
    /// The next pull will re-apply the whole remote log.
    pub fn reset(&mut self) {
        self.last_seen_operations.clear();
        self.unapplied_operations.clear();
        self.last_sync_timestamp = None;
    }
}
