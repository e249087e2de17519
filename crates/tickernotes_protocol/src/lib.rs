//! # TickerNotes Sync Protocol
//!
//! Operation log model and wire codecs for TickerNotes sync.
//!
//! This crate provides:
//! - [`Operation`] records and their `(device, seq)` identity
//! - [`OperationKind`], the closed set of mutations with typed payloads
//! - Entity records mutated by operations ([`Security`], [`Note`], [`Group`], [`Setting`])
//! - The runlog codec (one JSON object per line)
//! - The [`Snapshot`] checkpoint record
//!
//! This is a pure protocol crate with no I/O operations.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod entity;
mod error;
mod id;
mod kind;
mod operation;
mod runlog;
mod snapshot;

pub use entity::{merge_fields, Group, Note, Security, Setting};
pub use error::{ProtocolError, ProtocolResult};
pub use id::{DeviceId, OperationId, Timestamp};
pub use kind::{
    BulkDelete, BulkMove, EntityPatch, EntityRef, GroupMove, OperationKind, PurchaseUpdate,
    ToggleActive, TogglePrimary,
};
pub use operation::{sort_for_apply, Operation};
pub use runlog::{append_operations, encode_line, Runlog};
pub use snapshot::{Snapshot, SnapshotData, SNAPSHOT_FORMAT_VERSION};
