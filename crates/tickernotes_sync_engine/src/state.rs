//! Sync state and reporting types.

use std::time::{Duration, Instant};
use tickernotes_protocol::{DeviceId, Timestamp};

/// The current state of the sync engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// Not syncing.
    Idle,
    /// Downloading the remote runlog (and snapshot on cold start).
    Pulling,
    /// Applying pulled operations locally.
    Applying,
    /// Appending local operations to the remote runlog.
    Pushing,
    /// Uploading a snapshot.
    Snapshotting,
}

impl SyncState {
    /// Returns true if a sync step is running.
    pub fn is_active(&self) -> bool {
        !matches!(self, SyncState::Idle)
    }
}

/// Statistics about sync operations.
#[derive(Debug, Clone, Default)]
pub struct SyncStats {
    /// Total number of full syncs completed.
    pub cycles_completed: u64,
    /// Total number of operations applied from the remote runlog.
    pub operations_pulled: u64,
    /// Total number of operations appended to the remote runlog.
    pub operations_pushed: u64,
    /// Total number of runlog version conflicts.
    pub conflicts_encountered: u64,
    /// Total number of append retries.
    pub retries: u64,
    /// Total number of snapshots uploaded.
    pub snapshots_created: u64,
    /// Last successful full sync.
    pub last_sync_time: Option<Instant>,
    /// Last error message.
    pub last_error: Option<String>,
}

/// Result of a pull.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PullResult {
    /// Operations decoded from the remote runlog.
    pub downloaded: usize,
    /// Runlog lines skipped as malformed.
    pub malformed: usize,
    /// Whether a snapshot was loaded first.
    pub snapshot_loaded: bool,
    /// Operations already folded into the loaded snapshot.
    pub covered_by_snapshot: usize,
    /// Operations already seen.
    pub duplicates: usize,
    /// Operations applied.
    pub applied: usize,
    /// Operations whose target no longer existed.
    pub skipped: usize,
    /// Operations of an unknown kind.
    pub ignored: usize,
    /// Operations that failed to apply.
    pub failed: usize,
}

/// Result of a push.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PushResult {
    /// Operations appended to the remote runlog.
    pub uploaded: usize,
    /// Operations that were already present remotely.
    pub already_present: usize,
    /// Append attempts used.
    pub attempts: u32,
}

/// Result of a full sync.
#[derive(Debug, Clone)]
pub struct SyncCycleResult {
    /// Number of operations applied from the remote runlog.
    pub pulled: usize,
    /// Number of operations appended to the remote runlog.
    pub pushed: usize,
    /// Whether a snapshot was uploaded.
    pub snapshot_created: bool,
    /// Whether the sync was successful.
    pub success: bool,
    /// Duration of the sync.
    pub duration: Duration,
}

/// Point-in-time view of the engine for display.
#[derive(Debug, Clone)]
pub struct SyncStatus {
    /// This device.
    pub device_id: DeviceId,
    /// Whether the engine is connected to remote storage.
    pub connected: bool,
    /// Whether a sync is in flight.
    pub syncing: bool,
    /// Current state.
    pub state: SyncState,
    /// Completion time of the last full sync.
    pub last_sync: Option<Timestamp>,
    /// Local operations awaiting upload.
    pub pending_operations: usize,
    /// Whether an auto-sync task is running.
    pub auto_sync_enabled: bool,
}
