//! Snapshot checkpoint record.

use crate::entity::{Group, Note, Security, Setting};
use crate::error::ProtocolResult;
use crate::id::{DeviceId, OperationId, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Format version written into new snapshots.
pub const SNAPSHOT_FORMAT_VERSION: &str = "1.0";

/// Full entity tables captured by a snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SnapshotData {
    /// All securities.
    #[serde(default)]
    pub securities: Vec<Security>,
    /// All notes.
    #[serde(default)]
    pub notes: Vec<Note>,
    /// All groups.
    #[serde(default)]
    pub groups: Vec<Group>,
    /// All settings.
    #[serde(default)]
    pub settings: Vec<Setting>,
}

/// A full-state checkpoint of the entity tables.
///
/// A snapshot states that every operation it [`covers`](Self::covers) is
/// already folded into `data`. New snapshots record the highest sequence seen
/// per device in `sequences`. Snapshots written without that map only carry
/// the global `last_sequence`, which is compared against every device's
/// sequence numbers. Operations listed in `excluded` sit below the frontier
/// but were never folded in, so they are not covered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Format version.
    #[serde(default = "default_version")]
    pub version: String,
    /// When the snapshot was taken.
    pub created_at: Timestamp,
    /// Device that took the snapshot.
    pub device_id: DeviceId,
    /// Highest sequence number seen across all devices.
    #[serde(default)]
    pub last_sequence: u64,
    /// Highest sequence number seen per device.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub sequences: BTreeMap<DeviceId, u64>,
    /// Operations below the frontier that are not part of `data`.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub excluded: BTreeSet<OperationId>,
    /// Entity tables.
    #[serde(default)]
    pub data: SnapshotData,
}

fn default_version() -> String {
    SNAPSHOT_FORMAT_VERSION.to_string()
}

impl Snapshot {
    /// Creates a snapshot from a per-device sequence frontier.
    pub fn new(
        device_id: DeviceId,
        created_at: Timestamp,
        sequences: BTreeMap<DeviceId, u64>,
        data: SnapshotData,
    ) -> Self {
        let last_sequence = sequences.values().copied().max().unwrap_or(0);
        Self {
            version: default_version(),
            created_at,
            device_id,
            last_sequence,
            sequences,
            excluded: BTreeSet::new(),
            data,
        }
    }

    /// Marks operations below the frontier as not folded in.
    #[must_use]
    pub fn with_excluded(mut self, excluded: BTreeSet<OperationId>) -> Self {
        self.excluded = excluded;
        self
    }

    /// Returns true if the operation is already folded into this snapshot.
    #[must_use]
    pub fn covers(&self, id: &OperationId) -> bool {
        if self.excluded.contains(id) {
            return false;
        }
        if self.sequences.is_empty() {
            return self.last_sequence > 0 && id.seq <= self.last_sequence;
        }
        self.sequences
            .get(&id.device)
            .is_some_and(|&max| id.seq <= max)
    }

    /// Encodes as JSON.
    pub fn encode(&self) -> ProtocolResult<Vec<u8>> {
        Ok(serde_json::to_vec_pretty(self)?)
    }

    /// Decodes from JSON.
    pub fn decode(bytes: &[u8]) -> ProtocolResult<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}
