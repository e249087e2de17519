//! Watch command implementation.

use super::{open_engine, CommandResult};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tickernotes_sync_engine::AutoSync;

/// Syncs once, then every `interval_secs` (or the default) until Ctrl-C.
pub fn run(path: &Path, remote: Option<&Path>, interval_secs: Option<u64>) -> CommandResult {
    let engine = Arc::new(open_engine(path, remote)?);
    let runtime = tokio::runtime::Runtime::new()?;

    runtime.block_on(async move {
        let first = Arc::clone(&engine);
        match tokio::task::spawn_blocking(move || first.full_sync()).await? {
            Ok(result) => println!("Synced: pulled {}, pushed {}", result.pulled, result.pushed),
            Err(e) => eprintln!("{}", e.user_message()),
        }

        let auto = match interval_secs {
            Some(secs) => AutoSync::spawn(Arc::clone(&engine), Duration::from_secs(secs)),
            None => AutoSync::spawn_configured(Arc::clone(&engine)),
        };
        println!("Watching. Press Ctrl-C to stop.");
        tokio::signal::ctrl_c().await?;
        auto.stop();
        Ok::<_, Box<dyn std::error::Error>>(())
    })?;

    Ok(())
}
