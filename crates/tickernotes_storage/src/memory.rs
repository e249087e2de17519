//! In-memory remote store for testing.

use crate::error::StorageResult;
use crate::store::{RemoteLogStore, VersionToken, VersionedLog, WriteOutcome};
use parking_lot::RwLock;

#[derive(Debug, Default)]
struct MemoryState {
    log: Option<Vec<u8>>,
    generation: u64,
    snapshot: Option<Vec<u8>>,
    writes: u64,
    conflicts: u64,
}

impl MemoryState {
    fn version(&self) -> Option<VersionToken> {
        self.log
            .as_ref()
            .map(|_| VersionToken::new(format!("v{}", self.generation)))
    }
}

/// An in-memory remote log store.
///
/// Versions are a generation counter bumped on every accepted write. The
/// whole compare-and-swap runs under one write lock.
///
/// This store is suitable for:
/// - Unit tests
/// - Integration tests with several engines sharing one store
/// - Loopback sync within a single process
///
/// # Thread Safety
///
/// This store is thread-safe and can be shared across threads.
///
/// # Example
///
/// ```rust
/// use tickernotes_storage::{InMemoryRemoteStore, RemoteLogStore};
///
/// let store = InMemoryRemoteStore::with_log(b"existing".to_vec());
/// assert_eq!(store.read_log().unwrap(), b"existing");
/// ```
#[derive(Debug, Default)]
pub struct InMemoryRemoteStore {
    state: RwLock<MemoryState>,
}

impl InMemoryRemoteStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store whose runlog already holds `content`.
    #[must_use]
    pub fn with_log(content: Vec<u8>) -> Self {
        Self {
            state: RwLock::new(MemoryState {
                log: Some(content),
                generation: 1,
                ..MemoryState::default()
            }),
        }
    }

    /// Returns a copy of the runlog, if it exists.
    #[must_use]
    pub fn log(&self) -> Option<Vec<u8>> {
        self.state.read().log.clone()
    }

    /// Returns a copy of the snapshot, if it exists.
    #[must_use]
    pub fn snapshot(&self) -> Option<Vec<u8>> {
        self.state.read().snapshot.clone()
    }

    /// Number of accepted conditional writes.
    #[must_use]
    pub fn write_count(&self) -> u64 {
        self.state.read().writes
    }

    /// Number of conditional writes rejected as conflicts.
    #[must_use]
    pub fn conflict_count(&self) -> u64 {
        self.state.read().conflicts
    }
}

impl RemoteLogStore for InMemoryRemoteStore {
    fn read_log_with_version(&self) -> StorageResult<VersionedLog> {
        let state = self.state.read();
        Ok(VersionedLog {
            content: state.log.clone().unwrap_or_default(),
            version: state.version(),
        })
    }

    fn write_if_version_matches(
        &self,
        content: &[u8],
        expected: Option<&VersionToken>,
    ) -> StorageResult<WriteOutcome> {
        let mut state = self.state.write();
        if state.version().as_ref() != expected {
            state.conflicts += 1;
            return Ok(WriteOutcome::Conflict);
        }

        state.log = Some(content.to_vec());
        state.generation += 1;
        state.writes += 1;
        let version = state
            .version()
            .unwrap_or_else(|| VersionToken::new(format!("v{}", state.generation)));
        Ok(WriteOutcome::Written(version))
    }

    fn read_snapshot(&self) -> StorageResult<Option<Vec<u8>>> {
        Ok(self.state.read().snapshot.clone())
    }

    fn write_snapshot(&self, content: &[u8]) -> StorageResult<()> {
        self.state.write().snapshot = Some(content.to_vec());
        Ok(())
    }

    fn delete_log(&self) -> StorageResult<()> {
        let mut state = self.state.write();
        state.log = None;
        state.generation += 1;
        Ok(())
    }

    fn delete_snapshot(&self) -> StorageResult<()> {
        self.state.write().snapshot = None;
        Ok(())
    }
}
