//! Local operation log.

use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tickernotes_protocol::{DeviceId, Operation, OperationId, OperationKind, Timestamp};

/// The append-only log of operations recorded on this device.
///
/// Entries are keyed by sequence number. Sequence numbers are allocated from
/// an in-memory counter that must be seeded with
/// [`init_sequence_counter`](Self::init_sequence_counter) before the first
/// [`record`](Self::record).
///
/// # Invariants
///
/// - Sequence numbers are strictly increasing and never reused
/// - Only the `synced`/`synced_at` fields of an entry ever change
/// - Pruning removes entries but never lowers the counter
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalOplog {
    device: DeviceId,
    entries: BTreeMap<u64, Operation>,
    /// Lowest sequence the counter may be seeded with; survives pruning.
    #[serde(default)]
    sequence_floor: u64,
    #[serde(skip)]
    next_seq: Option<u64>,
}

impl LocalOplog {
    /// Creates an empty log for a device. The counter starts uninitialized.
    pub fn new(device: DeviceId) -> Self {
        Self {
            device,
            entries: BTreeMap::new(),
            sequence_floor: 0,
            next_seq: None,
        }
    }

    /// Returns the owning device.
    #[must_use]
    pub fn device(&self) -> &DeviceId {
        &self.device
    }

    /// Seeds the sequence counter from the stored entries.
    ///
    /// Sets it to `max(existing seq) + 1`, or `0` for an empty log, never
    /// below the highest sequence ever allocated.
    pub fn init_sequence_counter(&mut self) -> u64 {
        let next = self
            .entries
            .keys()
            .next_back()
            .map_or(0, |max| max + 1)
            .max(self.sequence_floor);
        self.next_seq = Some(next);
        tracing::debug!(device = %self.device, next_seq = next, "sequence counter initialized");
        next
    }

    /// Builds the next operation without storing it.
    ///
    /// # Errors
    ///
    /// Returns an error if the sequence counter was never initialized.
    pub fn prepare(&self, kind: OperationKind, ts: Timestamp) -> CoreResult<Operation> {
        let seq = self.next_seq.ok_or_else(|| {
            CoreError::invalid_operation("sequence counter not initialized")
        })?;
        Ok(Operation::new(self.device.clone(), seq, ts, kind))
    }

    /// Stores an operation built by [`prepare`](Self::prepare).
    ///
    /// # Errors
    ///
    /// Returns an error if the operation does not carry the next sequence
    /// number of this device.
    pub fn commit(&mut self, op: Operation) -> CoreResult<()> {
        if op.device != self.device || Some(op.seq) != self.next_seq {
            return Err(CoreError::invalid_operation(format!(
                "out-of-order commit of {}",
                op.id()
            )));
        }
        let next = op.seq + 1;
        self.entries.insert(op.seq, op);
        self.next_seq = Some(next);
        self.sequence_floor = next;
        Ok(())
    }

    /// Records a new operation stamped `ts` with `synced = false`.
    ///
    /// # Errors
    ///
    /// Returns an error if the sequence counter was never initialized.
    pub fn record(&mut self, kind: OperationKind, ts: Timestamp) -> CoreResult<Operation> {
        let op = self.prepare(kind, ts)?;
        self.commit(op.clone())?;
        Ok(op)
    }

    /// Returns unsynced operations in sequence order.
    #[must_use]
    pub fn list_unsynced(&self) -> Vec<Operation> {
        self.entries.values().filter(|op| !op.synced).cloned().collect()
    }

    /// Marks the given operations synced, stamping `at`.
    ///
    /// Ids of other devices and unknown sequences are ignored. Returns the
    /// number of entries flipped.
    pub fn mark_synced(&mut self, ids: &[OperationId], at: &Timestamp) -> usize {
        let mut flipped = 0;
        for id in ids.iter().filter(|id| id.device == self.device) {
            if let Some(op) = self.entries.get_mut(&id.seq) {
                if !op.synced {
                    op.mark_synced(at.clone());
                    flipped += 1;
                }
            }
        }
        flipped
    }

    /// Number of operations awaiting upload.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.entries.values().filter(|op| !op.synced).count()
    }

    /// Number of operations recorded after `since`.
    #[must_use]
    pub fn created_since(&self, since: &Timestamp) -> usize {
        self.entries
            .values()
            .filter(|op| &op.created_at > since)
            .count()
    }

    /// Deletes synced operations whose `synced_at` is before `cutoff`.
    ///
    /// Returns the number of entries deleted.
    pub fn prune_synced(&mut self, cutoff: &Timestamp) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, op| match (op.synced, &op.synced_at) {
            (true, Some(at)) => at >= cutoff,
            _ => true,
        });
        before - self.entries.len()
    }

    /// Returns all stored operations in sequence order.
    pub fn iter(&self) -> impl Iterator<Item = &Operation> {
        self.entries.values()
    }

    /// Returns the operation with this sequence number.
    #[must_use]
    pub fn get(&self, seq: u64) -> Option<&Operation> {
        self.entries.get(&seq)
    }

    /// Number of stored operations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if no operations are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
