//! Error types for the sync engine.

use thiserror::Error;
use tickernotes_core::CoreError;
use tickernotes_protocol::{DeviceId, ProtocolError};
use tickernotes_storage::StorageError;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur during sync operations.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Another sync is running on this device.
    #[error("sync already in progress")]
    AlreadyInProgress,

    /// The engine is disconnected from remote storage.
    #[error("not connected to remote storage")]
    NotConnected,

    /// Remote storage rejected our credentials.
    ///
    /// The engine disconnects itself when this is returned.
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Every append attempt failed.
    ///
    /// Nothing was marked synced.
    #[error("runlog append failed after {attempts} attempts")]
    RetriesExhausted {
        /// Attempts made.
        attempts: u32,
        /// Last non-conflict error, if any.
        last_error: Option<String>,
    },

    /// The configured device id differs from the local store's.
    #[error("device id mismatch: config={config}, store={store}")]
    DeviceMismatch {
        /// Device id in the sync configuration.
        config: DeviceId,
        /// Device id of the local store.
        store: DeviceId,
    },

    /// Remote storage error.
    #[error("remote storage error: {0}")]
    Storage(#[source] StorageError),

    /// Local store error.
    #[error("local store error: {0}")]
    Core(#[from] CoreError),

    /// Record encoding error.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

impl From<StorageError> for SyncError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::Unauthorized(message) => Self::AuthenticationFailed(message),
            other => Self::Storage(other),
        }
    }
}

impl SyncError {
    /// Returns true if trying again later may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::AlreadyInProgress | SyncError::RetriesExhausted { .. } => true,
            SyncError::Storage(e) => !matches!(e, StorageError::Corrupted(_)),
            _ => false,
        }
    }

    /// Returns true if the device must be re-linked to remote storage.
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, SyncError::AuthenticationFailed(_))
    }

    /// Returns a message suitable for showing to the user.
    pub fn user_message(&self) -> String {
        match self {
            SyncError::AlreadyInProgress => "A sync is already running.".into(),
            SyncError::NotConnected => {
                "Not connected to cloud storage. Reconnect to resume syncing.".into()
            }
            SyncError::AuthenticationFailed(_) => {
                "Cloud storage access expired. Please reconnect your account.".into()
            }
            SyncError::RetriesExhausted { .. } => {
                "Could not upload changes because other devices were syncing. Try again later."
                    .into()
            }
            SyncError::Storage(_) => "Cloud storage is unreachable. Try again later.".into(),
            other => format!("Sync failed: {other}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unauthorized_maps_to_auth_failure() {
        let err: SyncError = StorageError::Unauthorized("token expired".into()).into();
        assert!(err.is_auth_failure());
        assert!(!err.is_retryable());
        assert!(err.user_message().contains("reconnect"));

        let err: SyncError = StorageError::Transport("reset".into()).into();
        assert!(matches!(err, SyncError::Storage(_)));
        assert!(err.is_retryable());
    }

    #[test]
    fn retryable_errors() {
        assert!(SyncError::RetriesExhausted {
            attempts: 5,
            last_error: None
        }
        .is_retryable());
        assert!(SyncError::AlreadyInProgress.is_retryable());
        assert!(!SyncError::NotConnected.is_retryable());
        assert!(!SyncError::Storage(StorageError::Corrupted("bad".into())).is_retryable());
    }

    #[test]
    fn error_display() {
        let err = SyncError::RetriesExhausted {
            attempts: 5,
            last_error: None,
        };
        assert_eq!(err.to_string(), "runlog append failed after 5 attempts");
        assert_eq!(SyncError::NotConnected.to_string(), "not connected to remote storage");
    }
}
