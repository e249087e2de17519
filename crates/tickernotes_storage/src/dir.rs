//! Directory-backed remote store.
//!
//! Layout:
//!
//! ```text
//! <root>/
//! ├─ tickernotes_runlog.jsonl   # Runlog
//! ├─ tickernotes_snapshot.json  # Snapshot
//! └─ .tickernotes.lock          # Advisory lock serializing compare-and-swap
//! ```
//!
//! The directory may be a folder replicated by a desktop file-sync client.
//! The version token of the runlog is the hex SHA-256 of its content.

use crate::error::StorageResult;
use crate::store::{
    RemoteLogStore, VersionToken, VersionedLog, WriteOutcome, LOG_FILE_NAME, SNAPSHOT_FILE_NAME,
};
use fs2::FileExt;
use sha2::{Digest, Sha256};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

const LOCK_FILE: &str = ".tickernotes.lock";

/// A remote store kept in a plain directory.
///
/// Writers on different processes are serialized by an exclusive `fs2`
/// lock held for the duration of the compare-and-swap. Files are replaced
/// with write-to-temp, fsync, rename.
#[derive(Debug, Clone)]
pub struct DirRemoteStore {
    root: PathBuf,
}

impl DirRemoteStore {
    /// Opens a store rooted at `root`, creating the directory if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn open(root: impl AsRef<Path>) -> StorageResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    /// Returns the root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns the path of the runlog file.
    #[must_use]
    pub fn log_path(&self) -> PathBuf {
        self.root.join(LOG_FILE_NAME)
    }

    /// Returns the path of the snapshot file.
    #[must_use]
    pub fn snapshot_path(&self) -> PathBuf {
        self.root.join(SNAPSHOT_FILE_NAME)
    }

    fn lock(&self, exclusive: bool) -> StorageResult<File> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(self.root.join(LOCK_FILE))?;
        if exclusive {
            file.lock_exclusive()?;
        } else {
            file.lock_shared()?;
        }
        Ok(file)
    }

    fn read_optional(path: &Path) -> StorageResult<Option<Vec<u8>>> {
        match fs::read(path) {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn remove_optional(path: &Path) -> StorageResult<()> {
        match fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Replaces `path` atomically: write temp, sync, rename, sync directory.
    fn replace(&self, path: &Path, content: &[u8]) -> StorageResult<()> {
        let mut temp_name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
        temp_name.push(".tmp");
        let temp_path = self.root.join(temp_name);

        let mut file = File::create(&temp_path)?;
        file.write_all(content)?;
        file.sync_all()?;
        drop(file);

        fs::rename(&temp_path, path)?;
        self.sync_directory()
    }

    #[cfg(unix)]
    fn sync_directory(&self) -> StorageResult<()> {
        File::open(&self.root)?.sync_all()?;
        Ok(())
    }

    #[cfg(not(unix))]
    fn sync_directory(&self) -> StorageResult<()> {
        Ok(())
    }
}

fn content_version(content: &[u8]) -> VersionToken {
    let digest = Sha256::digest(content);
    let hex: String = digest.iter().map(|b| format!("{b:02x}")).collect();
    VersionToken::new(hex)
}

impl RemoteLogStore for DirRemoteStore {
    fn read_log_with_version(&self) -> StorageResult<VersionedLog> {
        let _lock = self.lock(false)?;
        Ok(match Self::read_optional(&self.log_path())? {
            Some(content) => VersionedLog {
                version: Some(content_version(&content)),
                content,
            },
            None => VersionedLog::default(),
        })
    }

    fn write_if_version_matches(
        &self,
        content: &[u8],
        expected: Option<&VersionToken>,
    ) -> StorageResult<WriteOutcome> {
        let _lock = self.lock(true)?;
        let current = Self::read_optional(&self.log_path())?.map(|c| content_version(&c));
        if current.as_ref() != expected {
            tracing::debug!(
                root = %self.root.display(),
                expected = ?expected,
                current = ?current,
                "runlog version mismatch"
            );
            return Ok(WriteOutcome::Conflict);
        }

        self.replace(&self.log_path(), content)?;
        Ok(WriteOutcome::Written(content_version(content)))
    }

    fn read_snapshot(&self) -> StorageResult<Option<Vec<u8>>> {
        let _lock = self.lock(false)?;
        Self::read_optional(&self.snapshot_path())
    }

    fn write_snapshot(&self, content: &[u8]) -> StorageResult<()> {
        let _lock = self.lock(true)?;
        self.replace(&self.snapshot_path(), content)
    }

    fn delete_log(&self) -> StorageResult<()> {
        let _lock = self.lock(true)?;
        Self::remove_optional(&self.log_path())
    }

    fn delete_snapshot(&self) -> StorageResult<()> {
        let _lock = self.lock(true)?;
        Self::remove_optional(&self.snapshot_path())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn dir_missing_log_reads_empty() {
        let dir = tempdir().unwrap();
        let store = DirRemoteStore::open(dir.path().join("remote")).unwrap();

        let log = store.read_log_with_version().unwrap();
        assert!(log.content.is_empty());
        assert!(log.version.is_none());
        assert!(store.read_snapshot().unwrap().is_none());
    }

    #[test]
    fn dir_version_is_content_hash() {
        let dir = tempdir().unwrap();
        let store = DirRemoteStore::open(dir.path()).unwrap();

        let WriteOutcome::Written(version) = store.write_if_version_matches(b"abc", None).unwrap()
        else {
            panic!("expected write");
        };
        assert_eq!(
            version.as_str(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(store.read_log_with_version().unwrap().version, Some(version));
        assert_eq!(fs::read(store.log_path()).unwrap(), b"abc");
    }

    #[test]
    fn dir_stale_write_conflicts() {
        let dir = tempdir().unwrap();
        let store = DirRemoteStore::open(dir.path()).unwrap();
        store.write_if_version_matches(b"one\n", None).unwrap();

        let seen = store.read_log_with_version().unwrap();
        let other = DirRemoteStore::open(dir.path()).unwrap();
        assert!(!other
            .write_if_version_matches(b"one\ntwo\n", seen.version.as_ref())
            .unwrap()
            .is_conflict());

        let outcome = store
            .write_if_version_matches(b"one\nthree\n", seen.version.as_ref())
            .unwrap();
        assert!(outcome.is_conflict());
        assert_eq!(store.read_log().unwrap(), b"one\ntwo\n");
    }

    #[test]
    fn dir_create_only_if_absent() {
        let dir = tempdir().unwrap();
        let store = DirRemoteStore::open(dir.path()).unwrap();
        store.write_if_version_matches(b"x", None).unwrap();
        assert!(store.write_if_version_matches(b"y", None).unwrap().is_conflict());
    }

    #[test]
    fn dir_snapshot_and_deletes() {
        let dir = tempdir().unwrap();
        let store = DirRemoteStore::open(dir.path()).unwrap();

        store.write_snapshot(b"{\"v\":1}").unwrap();
        store.write_snapshot(b"{\"v\":2}").unwrap();
        assert_eq!(store.read_snapshot().unwrap().unwrap(), b"{\"v\":2}");

        store.write_if_version_matches(b"x", None).unwrap();
        store.delete_log().unwrap();
        store.delete_log().unwrap();
        store.delete_snapshot().unwrap();

        assert!(!store.log_path().exists());
        assert!(store.read_snapshot().unwrap().is_none());
        assert!(!dir.path().join("tickernotes_snapshot.json.tmp").exists());
    }
}
