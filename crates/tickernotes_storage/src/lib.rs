//! # TickerNotes Storage
//!
//! Remote log store contract and providers for TickerNotes sync.
//!
//! A remote log store holds two files: the runlog (an append-only log of
//! operation records) and a full-state snapshot. Stores are **opaque byte
//! stores**. They do not parse either file.
//!
//! ## Design Principles
//!
//! - The only concurrency primitive is [`RemoteLogStore::write_if_version_matches`],
//!   a compare-and-swap on the whole runlog keyed by a [`VersionToken`]
//! - A version mismatch is an ordinary outcome ([`WriteOutcome::Conflict`]),
//!   not an error
//! - Stores must be `Send + Sync` so one store can back several engines
//!
//! ## Available Stores
//!
//! - [`InMemoryRemoteStore`] - For testing and loopback
//! - [`DirRemoteStore`] - A local or desktop-synced directory
//! - [`HttpRemoteStore`] - A file API reached through an [`HttpClient`]
//!
//! ## Example
//!
//! ```rust
//! use tickernotes_storage::{InMemoryRemoteStore, RemoteLogStore, WriteOutcome};
//!
//! let store = InMemoryRemoteStore::new();
//! let current = store.read_log_with_version().unwrap();
//! let outcome = store
//!     .write_if_version_matches(b"line\n", current.version.as_ref())
//!     .unwrap();
//! assert!(matches!(outcome, WriteOutcome::Written(_)));
//!
//! // The old token is now stale.
//! let stale = store
//!     .write_if_version_matches(b"other\n", current.version.as_ref())
//!     .unwrap();
//! assert!(stale.is_conflict());
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod dir;
mod error;
mod http;
mod memory;
mod store;

pub use dir::DirRemoteStore;
pub use error::{StorageError, StorageResult};
pub use http::{HttpClient, HttpRemoteStore, HttpRequest, HttpResponse};
pub use memory::InMemoryRemoteStore;
pub use store::{
    RemoteLogStore, VersionToken, VersionedLog, WriteOutcome, LOG_FILE_NAME, SNAPSHOT_FILE_NAME,
};
