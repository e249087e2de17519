//! CLI command implementations.

pub mod dump_oplog;
pub mod entities;
pub mod init;
pub mod list;
pub mod sync;
pub mod watch;

use std::path::Path;
use std::sync::Arc;
use tickernotes_core::{Config, LocalStore};
use tickernotes_storage::DirRemoteStore;
use tickernotes_sync_engine::SyncEngine;

/// Result type for commands.
pub type CommandResult<T = ()> = Result<T, Box<dyn std::error::Error>>;

/// Opens an existing local store.
pub fn open_store(path: &Path) -> CommandResult<LocalStore> {
    Ok(LocalStore::open(path, Config::default().create_if_missing(false))?)
}

/// Opens the local store and a sync engine over the remote directory.
///
/// The engine starts disconnected if an earlier run hit an authorization
/// failure; `reconnect` clears that.
pub fn open_engine(
    path: &Path,
    remote: Option<&Path>,
) -> CommandResult<SyncEngine<DirRemoteStore>> {
    let remote = remote.ok_or("remote directory required (--remote)")?;
    let store = Arc::new(open_store(path)?);
    let remote = DirRemoteStore::open(remote)?;
    Ok(SyncEngine::with_defaults(store, remote))
}
