//! # TickerNotes Core
//!
//! Local datastore for TickerNotes.
//!
//! This crate provides:
//! - Entity tables for securities, notes, groups and settings
//! - The local operation log with per-device sequence numbers
//! - Per-device sync metadata (the seen-operation frontier)
//! - The operation applier, the only code that mutates entities
//! - [`LocalStore`], tying the above together with on-disk persistence

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod applier;
mod config;
mod dir;
mod error;
mod metadata;
mod mutations;
mod oplog;
mod store;
mod tables;

pub use applier::{apply, ApplyOutcome};
pub use config::Config;
pub use error::{ApplyError, CoreError, CoreResult};
pub use metadata::SyncMetadata;
pub use mutations::generate_id;
pub use oplog::LocalOplog;
pub use store::{ApplyReport, LocalStore};
pub use tables::EntityTables;
