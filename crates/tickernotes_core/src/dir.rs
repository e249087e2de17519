//! Store directory management.
//!
//! ```text
//! <store_path>/
//! ├─ STATE       # CBOR: entity tables, local operation log, sync metadata
//! └─ LOCK        # Advisory lock for single-process access
//! ```

use crate::error::{CoreError, CoreResult};
use fs2::FileExt;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

const STATE_FILE: &str = "STATE";
const STATE_TEMP: &str = "STATE.tmp";
const LOCK_FILE: &str = "LOCK";

/// The on-disk home of a local store. Holds the exclusive lock while alive.
#[derive(Debug)]
pub(crate) struct StoreDir {
    path: PathBuf,
    _lock_file: File,
}

impl StoreDir {
    /// Opens or creates a store directory and takes its lock.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseLocked` if another process holds the lock.
    pub(crate) fn open(path: &Path, create_if_missing: bool) -> CoreResult<Self> {
        if !path.exists() {
            if create_if_missing {
                fs::create_dir_all(path)?;
            } else {
                return Err(CoreError::invalid_format(format!(
                    "store directory does not exist: {}",
                    path.display()
                )));
            }
        }
        if !path.is_dir() {
            return Err(CoreError::invalid_format(format!(
                "path is not a directory: {}",
                path.display()
            )));
        }

        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path.join(LOCK_FILE))?;
        if lock_file.try_lock_exclusive().is_err() {
            return Err(CoreError::DatabaseLocked);
        }

        Ok(Self {
            path: path.to_path_buf(),
            _lock_file: lock_file,
        })
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    fn state_path(&self) -> PathBuf {
        self.path.join(STATE_FILE)
    }

    /// Loads the state file. Returns `None` for a new store.
    pub(crate) fn load_state<T: DeserializeOwned>(&self) -> CoreResult<Option<T>> {
        let data = match fs::read(self.state_path()) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        if data.is_empty() {
            return Ok(None);
        }
        ciborium::from_reader(data.as_slice())
            .map(Some)
            .map_err(|e| CoreError::invalid_format(format!("cannot decode STATE: {e}")))
    }

    /// Saves the state file atomically: write temp, sync, rename, sync dir.
    pub(crate) fn save_state<T: Serialize>(&self, state: &T, sync: bool) -> CoreResult<()> {
        let mut data = Vec::new();
        ciborium::into_writer(state, &mut data)
            .map_err(|e| CoreError::invalid_format(format!("cannot encode STATE: {e}")))?;

        let temp_path = self.path.join(STATE_TEMP);
        let mut file = File::create(&temp_path)?;
        file.write_all(&data)?;
        if sync {
            file.sync_all()?;
        }
        drop(file);

        fs::rename(&temp_path, self.state_path())?;
        if sync {
            self.sync_directory()?;
        }
        Ok(())
    }

    #[cfg(unix)]
    fn sync_directory(&self) -> CoreResult<()> {
        File::open(&self.path)?.sync_all()?;
        Ok(())
    }

    #[cfg(not(unix))]
    fn sync_directory(&self) -> CoreResult<()> {
        Ok(())
    }
}
