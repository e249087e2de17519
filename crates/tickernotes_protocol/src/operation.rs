//! Operation records.

use crate::error::ProtocolError;
use crate::id::{DeviceId, OperationId, Timestamp};
use crate::kind::{OperationKind, PayloadRef};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;
use std::cmp::Ordering;

/// A single recorded mutation.
///
/// `Operation` is the unit of replication. It is created exactly once, by
/// the device that records it, and is immutable afterwards apart from the
/// local `synced` bookkeeping.
///
/// # Wire format
///
/// One JSON object:
///
/// ```text
/// {"seq":0,"ts":"…","device":"…","op":"add_security","data":{…},
///  "synced":false,"created_at":"…","synced_at":"…"}
/// ```
///
/// `synced_at` is omitted while unset. Older records without `created_at`
/// fall back to `ts`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "OperationRecord")]
pub struct Operation {
    /// Device that recorded this operation.
    pub device: DeviceId,
    /// Per-device sequence number.
    pub seq: u64,
    /// Time the operation was recorded.
    pub ts: Timestamp,
    /// What the operation does.
    pub kind: OperationKind,
    /// Whether this operation has been uploaded to the remote log.
    pub synced: bool,
    /// Time the record was created in the local log.
    pub created_at: Timestamp,
    /// Time the record was marked synced.
    pub synced_at: Option<Timestamp>,
}

impl Operation {
    /// Creates an unsynced operation.
    pub fn new(device: DeviceId, seq: u64, ts: Timestamp, kind: OperationKind) -> Self {
        Self {
            device,
            seq,
            created_at: ts.clone(),
            ts,
            kind,
            synced: false,
            synced_at: None,
        }
    }

    /// Returns the globally unique `(device, seq)` identity.
    #[must_use]
    pub fn id(&self) -> OperationId {
        OperationId::new(self.device.clone(), self.seq)
    }

    /// Returns the wire type tag.
    #[must_use]
    pub fn op_name(&self) -> &str {
        self.kind.name()
    }

    /// Marks this record as uploaded.
    pub fn mark_synced(&mut self, at: Timestamp) {
        self.synced = true;
        self.synced_at = Some(at);
    }

    /// Compares two operations in apply order: `(ts, device, seq)`.
    pub fn apply_order(&self, other: &Self) -> Ordering {
        self.ts
            .cmp(&other.ts)
            .then_with(|| self.device.cmp(&other.device))
            .then_with(|| self.seq.cmp(&other.seq))
    }

    /// Encodes as a single JSON line (no trailing newline).
    pub fn to_json(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decodes from a single JSON line.
    pub fn from_json(line: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(line)?)
    }
}

/// Sorts operations into deterministic apply order.
///
/// Timestamp is the primary key; device id and then sequence break ties so
/// every device observing the same set applies it in the same order.
pub fn sort_for_apply(ops: &mut [Operation]) {
    ops.sort_by(Operation::apply_order);
}

#[derive(Serialize)]
struct WireRef<'a> {
    seq: u64,
    ts: &'a Timestamp,
    device: &'a DeviceId,
    op: &'a str,
    data: PayloadRef<'a>,
    synced: bool,
    created_at: &'a Timestamp,
    #[serde(skip_serializing_if = "Option::is_none")]
    synced_at: Option<&'a Timestamp>,
}

impl Serialize for Operation {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        WireRef {
            seq: self.seq,
            ts: &self.ts,
            device: &self.device,
            op: self.kind.name(),
            data: PayloadRef(&self.kind),
            synced: self.synced,
            created_at: &self.created_at,
            synced_at: self.synced_at.as_ref(),
        }
        .serialize(serializer)
    }
}

#[derive(Deserialize)]
struct OperationRecord {
    seq: u64,
    ts: Timestamp,
    device: DeviceId,
    op: String,
    #[serde(default)]
    data: Value,
    #[serde(default)]
    synced: bool,
    #[serde(default)]
    created_at: Option<Timestamp>,
    #[serde(default)]
    synced_at: Option<Timestamp>,
}

impl TryFrom<OperationRecord> for Operation {
    type Error = ProtocolError;

    fn try_from(record: OperationRecord) -> Result<Self, Self::Error> {
        let kind = OperationKind::decode(&record.op, record.data)?;
        Ok(Self {
            device: record.device,
            seq: record.seq,
            created_at: record.created_at.unwrap_or_else(|| record.ts.clone()),
            ts: record.ts,
            kind,
            synced: record.synced,
            synced_at: record.synced_at,
        })
    }
}
