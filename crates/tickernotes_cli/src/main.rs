//! TickerNotes CLI
//!
//! Records mutations in a local store and syncs them through a shared
//! directory.
//!
//! # Commands
//!
//! - `init` - Create a local store
//! - `add-security`, `add-note`, `add-group` - Record new entities
//! - `delete-security`, `delete-group`, `move`, `set` - Record changes
//! - `list` - Show securities, notes and groups
//! - `sync` - Pull then push
//! - `status` - Show sync status
//! - `reconnect` - Re-enable syncing after an authorization failure
//! - `dump-oplog` - Dump the local or remote operation log
//! - `snapshot` - Upload a snapshot now
//! - `reset-runlog` - Compact the remote log into a snapshot
//! - `prune` - Delete old synced local operations
//! - `watch` - Sync periodically until interrupted

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// TickerNotes command-line client.
#[derive(Parser)]
#[command(name = "tickernotes")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the local store directory
    #[arg(global = true, short, long)]
    path: Option<PathBuf>,

    /// Path to the shared remote directory
    #[arg(global = true, short, long)]
    remote: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a local store and print its device id
    Init,

    /// Add a security
    AddSecurity {
        /// Ticker symbol
        symbol: String,

        /// Display name
        #[arg(short, long)]
        name: Option<String>,

        /// Group to place the security in
        #[arg(short, long)]
        group: Option<String>,
    },

    /// Add a note to a security
    AddNote {
        /// Security id
        security_id: String,

        /// Note text
        content: String,
    },

    /// Add a group
    AddGroup {
        /// Group name
        name: String,
    },

    /// Delete a security and its notes
    DeleteSecurity {
        /// Security id
        id: String,
    },

    /// Delete a group; its securities become ungrouped
    DeleteGroup {
        /// Group id
        id: String,
    },

    /// Move a security into a group, or out of any group
    Move {
        /// Security id
        security_id: String,

        /// Target group id; omit to ungroup
        group_id: Option<String>,
    },

    /// Set an application setting to a JSON value
    Set {
        /// Setting key
        key: String,

        /// Value (parsed as JSON, falling back to a string)
        value: String,
    },

    /// List securities, notes and groups
    List {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Pull remote operations, then push local ones
    Sync,

    /// Show sync status
    Status,

    /// Re-enable syncing after remote storage rejected the credentials
    Reconnect,

    /// Dump operation records for debugging
    DumpOplog {
        /// Dump the remote runlog instead of the local log
        #[arg(long)]
        remote_log: bool,

        /// Maximum number of records to dump
        #[arg(short, long)]
        limit: Option<usize>,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Upload a snapshot of the local tables
    Snapshot,

    /// Replace the remote runlog with a snapshot (all devices must sync first)
    ResetRunlog {
        /// Confirm the reset
        #[arg(long)]
        yes: bool,
    },

    /// Delete synced local operations older than a number of days
    Prune {
        /// Age in days
        #[arg(short, long, default_value = "30")]
        days: i64,
    },

    /// Sync periodically until interrupted
    Watch {
        /// Interval in seconds (default: 15 minutes)
        #[arg(short, long)]
        interval: Option<u64>,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let default = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    if let Commands::Version = cli.command {
        println!("TickerNotes CLI v{}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let path = cli.path.ok_or("local store path required (--path)")?;
    let remote = cli.remote;

    match cli.command {
        Commands::Init => commands::init::run(&path)?,
        Commands::AddSecurity {
            symbol,
            name,
            group,
        } => commands::entities::add_security(&path, &symbol, name.as_deref(), group.as_deref())?,
        Commands::AddNote {
            security_id,
            content,
        } => commands::entities::add_note(&path, &security_id, &content)?,
        Commands::AddGroup { name } => commands::entities::add_group(&path, &name)?,
        Commands::DeleteSecurity { id } => commands::entities::delete_security(&path, &id)?,
        Commands::DeleteGroup { id } => commands::entities::delete_group(&path, &id)?,
        Commands::Move {
            security_id,
            group_id,
        } => commands::entities::move_security(&path, &security_id, group_id.as_deref())?,
        Commands::Set { key, value } => commands::entities::set(&path, &key, &value)?,
        Commands::List { format } => commands::list::run(&path, &format)?,
        Commands::Sync => commands::sync::run(&path, remote.as_deref())?,
        Commands::Status => commands::sync::status(&path, remote.as_deref())?,
        Commands::Reconnect => commands::sync::reconnect(&path, remote.as_deref())?,
        Commands::DumpOplog {
            remote_log,
            limit,
            format,
        } => {
            let source = if remote_log {
                let remote = remote.ok_or("remote directory required (--remote)")?;
                commands::dump_oplog::Source::Remote(remote)
            } else {
                commands::dump_oplog::Source::Local(path)
            };
            commands::dump_oplog::run(&source, limit, &format)?;
        }
        Commands::Snapshot => commands::sync::snapshot(&path, remote.as_deref())?,
        Commands::ResetRunlog { yes } => {
            if !yes {
                return Err("reset-runlog discards the remote log; pass --yes to confirm".into());
            }
            commands::sync::reset_runlog(&path, remote.as_deref())?;
        }
        Commands::Prune { days } => commands::sync::prune(&path, days)?,
        Commands::Watch { interval } => commands::watch::run(&path, remote.as_deref(), interval)?,
        Commands::Version => {}
    }

    Ok(())
}
