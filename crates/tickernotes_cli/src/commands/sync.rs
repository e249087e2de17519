//! Sync commands.

use super::{open_engine, open_store, CommandResult};
use std::path::Path;
use tickernotes_sync_engine::SyncError;

fn report(error: SyncError) -> Box<dyn std::error::Error> {
    tracing::error!(error = %error, "sync command failed");
    error.user_message().into()
}

/// Runs a full sync.
pub fn run(path: &Path, remote: Option<&Path>) -> CommandResult {
    let engine = open_engine(path, remote)?;
    let result = engine.full_sync().map_err(report)?;
    println!(
        "Synced in {:.2}s: pulled {}, pushed {}{}",
        result.duration.as_secs_f64(),
        result.pulled,
        result.pushed,
        if result.snapshot_created {
            ", snapshot uploaded"
        } else {
            ""
        }
    );
    Ok(())
}

/// Prints sync status.
pub fn status(path: &Path, remote: Option<&Path>) -> CommandResult {
    let engine = open_engine(path, remote)?;
    let status = engine.status();
    let metadata = engine.store().sync_metadata();

    println!("Sync Status");
    println!("===========");
    println!("Device ID:        {}", status.device_id);
    println!("Connected:        {}", status.connected);
    println!(
        "Last sync:        {}",
        status
            .last_sync
            .as_ref()
            .map_or("never".to_string(), ToString::to_string)
    );
    println!(
        "Last snapshot:    {}",
        metadata
            .last_snapshot_timestamp
            .as_ref()
            .map_or("never".to_string(), ToString::to_string)
    );
    println!("Pending ops:      {}", status.pending_operations);
    println!("Seen ops:         {}", metadata.last_seen_operations.len());
    println!("Remote ops:       {}", engine.runlog_count());
    println!("Snapshot due:     {}", engine.should_snapshot());
    Ok(())
}

/// Clears a persisted authorization failure.
pub fn reconnect(path: &Path, remote: Option<&Path>) -> CommandResult {
    let engine = open_engine(path, remote)?;
    if engine.is_connected() {
        println!("Already connected.");
    } else {
        engine.reconnect();
        println!("Reconnected. Run `sync` to resume.");
    }
    Ok(())
}

/// Uploads a snapshot now.
pub fn snapshot(path: &Path, remote: Option<&Path>) -> CommandResult {
    let engine = open_engine(path, remote)?;
    let snapshot = engine.create_snapshot().map_err(report)?;
    println!(
        "Snapshot uploaded: {} securities, {} notes, {} groups",
        snapshot.data.securities.len(),
        snapshot.data.notes.len(),
        snapshot.data.groups.len()
    );
    Ok(())
}

/// Compacts the remote runlog.
pub fn reset_runlog(path: &Path, remote: Option<&Path>) -> CommandResult {
    let engine = open_engine(path, remote)?;
    engine.reset_runlog().map_err(report)?;
    println!("Runlog reset. Other devices will start from the new snapshot.");
    Ok(())
}

/// Deletes synced local operations older than `days`.
pub fn prune(path: &Path, days: i64) -> CommandResult {
    let store = open_store(path)?;
    let deleted = store.prune_synced(chrono::Duration::days(days))?;
    println!("Pruned {deleted} synced operations");
    Ok(())
}
