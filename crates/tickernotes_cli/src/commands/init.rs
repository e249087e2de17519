//! Init command implementation.

use super::CommandResult;
use std::path::Path;
use tickernotes_core::{Config, LocalStore};

/// Runs the init command.
pub fn run(path: &Path) -> CommandResult {
    let store = LocalStore::open(path, Config::default())?;
    println!("Local store: {}", path.display());
    println!("Device ID:   {}", store.device_id());
    println!("Pending:     {}", store.pending_count());
    Ok(())
}
