//! Remote log store contract.

use crate::error::StorageResult;
use std::fmt;
use std::sync::Arc;

/// File name of the runlog within a store.
pub const LOG_FILE_NAME: &str = "tickernotes_runlog.jsonl";

/// File name of the snapshot within a store.
pub const SNAPSHOT_FILE_NAME: &str = "tickernotes_snapshot.json";

/// Opaque version tag of the runlog (an ETag, a content hash, a counter).
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct VersionToken(String);

impl VersionToken {
    /// Wraps a provider version string.
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Returns the raw token.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for VersionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VersionToken({})", self.0)
    }
}

impl fmt::Display for VersionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Runlog content together with the version it was read at.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VersionedLog {
    /// Full runlog bytes. Empty if the log does not exist.
    pub content: Vec<u8>,
    /// Version of `content`; `None` if the log does not exist yet.
    pub version: Option<VersionToken>,
}

/// Result of a conditional write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The write was applied; the log is now at this version.
    Written(VersionToken),
    /// The log changed since the expected version was read.
    Conflict,
}

impl WriteOutcome {
    /// Returns true if the precondition failed.
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict)
    }
}

/// A version-tagged file store holding a runlog and a snapshot.
///
/// Stores are **opaque byte stores**. The sync engine owns the runlog and
/// snapshot formats.
///
/// # Invariants
///
/// - `write_if_version_matches` is atomic: it either replaces the runlog and
///   returns a fresh version, or changes nothing and returns `Conflict`
/// - `expected = None` matches only a runlog that does not exist
/// - A missing runlog reads as empty content with no version
/// - Stores must be `Send + Sync`
pub trait RemoteLogStore: Send + Sync {
    /// Reads the full runlog.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be reached.
    fn read_log(&self) -> StorageResult<Vec<u8>> {
        Ok(self.read_log_with_version()?.content)
    }

    /// Reads the full runlog and its current version.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be reached.
    fn read_log_with_version(&self) -> StorageResult<VersionedLog>;

    /// Replaces the runlog if its version still equals `expected`.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be reached. A version mismatch
    /// is reported as [`WriteOutcome::Conflict`], not as an error.
    fn write_if_version_matches(
        &self,
        content: &[u8],
        expected: Option<&VersionToken>,
    ) -> StorageResult<WriteOutcome>;

    /// Reads the snapshot, if one exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be reached.
    fn read_snapshot(&self) -> StorageResult<Option<Vec<u8>>>;

    /// Replaces the snapshot unconditionally.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be reached.
    fn write_snapshot(&self, content: &[u8]) -> StorageResult<()>;

    /// Deletes the runlog. Deleting a missing runlog succeeds.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be reached.
    fn delete_log(&self) -> StorageResult<()>;

    /// Deletes the snapshot. Deleting a missing snapshot succeeds.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be reached.
    fn delete_snapshot(&self) -> StorageResult<()>;
}

impl<S: RemoteLogStore + ?Sized> RemoteLogStore for Arc<S> {
    fn read_log(&self) -> StorageResult<Vec<u8>> {
        (**self).read_log()
    }

    fn read_log_with_version(&self) -> StorageResult<VersionedLog> {
        (**self).read_log_with_version()
    }

    fn write_if_version_matches(
        &self,
        content: &[u8],
        expected: Option<&VersionToken>,
    ) -> StorageResult<WriteOutcome> {
        (**self).write_if_version_matches(content, expected)
    }

    fn read_snapshot(&self) -> StorageResult<Option<Vec<u8>>> {
        (**self).read_snapshot()
    }

    fn write_snapshot(&self, content: &[u8]) -> StorageResult<()> {
        (**self).write_snapshot(content)
    }

    fn delete_log(&self) -> StorageResult<()> {
        (**self).delete_log()
    }

    fn delete_snapshot(&self) -> StorageResult<()> {
        (**self).delete_snapshot()
    }
}

impl<S: RemoteLogStore + ?Sized> RemoteLogStore for Box<S> {
    fn read_log(&self) -> StorageResult<Vec<u8>> {
        (**self).read_log()
    }

    fn read_log_with_version(&self) -> StorageResult<VersionedLog> {
        (**self).read_log_with_version()
    }

    fn write_if_version_matches(
        &self,
        content: &[u8],
        expected: Option<&VersionToken>,
    ) -> StorageResult<WriteOutcome> {
        (**self).write_if_version_matches(content, expected)
    }

    fn read_snapshot(&self) -> StorageResult<Option<Vec<u8>>> {
        (**self).read_snapshot()
    }

    fn write_snapshot(&self, content: &[u8]) -> StorageResult<()> {
        (**self).write_snapshot(content)
    }

    fn delete_log(&self) -> StorageResult<()> {
        (**self).delete_log()
    }

    fn delete_snapshot(&self) -> StorageResult<()> {
        (**self).delete_snapshot()
    }
}
