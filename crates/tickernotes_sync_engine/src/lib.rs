//! # TickerNotes Sync Engine
//!
//! Reconciles a device's local store with a shared remote runlog.
//!
//! This crate provides:
//! - Sync state machine (idle → pulling → applying → pushing → snapshotting)
//! - Deduplicated, deterministically ordered pull
//! - Append-with-retry under optimistic concurrency
//! - Snapshot creation and cold-start fast-forward
//! - Periodic auto-sync on a tokio runtime
//!
//! ## Architecture
//!
//! Every sync **pulls before it pushes**:
//! 1. Download the whole runlog and apply operations not in the seen set,
//!    sorted by `(ts, device, seq)`
//! 2. Append unsynced local operations, compare-and-swap on the runlog
//!    version, retrying with backoff on conflict
//! 3. Upload a snapshot when the policy says one is due
//!
//! ## Key Invariants
//!
//! - The remote store's conditional write is the only cross-device lock
//! - An operation id in the seen set is never applied again
//! - Nothing is marked synced unless the append succeeded
//! - At most one sync is in flight per engine

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod auto;
mod config;
mod engine;
mod error;
mod snapshot;
mod state;

pub use auto::AutoSync;
pub use config::{RetryConfig, SnapshotPolicy, SyncConfig};
pub use engine::SyncEngine;
pub use error::{SyncError, SyncResult};
pub use snapshot::SnapshotManager;
pub use state::{PullResult, PushResult, SyncCycleResult, SyncState, SyncStats, SyncStatus};
