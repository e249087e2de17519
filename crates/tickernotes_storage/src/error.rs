//! Error types for remote store operations.

use std::io;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur while talking to a remote log store.
///
/// A failed compare-and-swap is not an error; see
/// [`WriteOutcome::Conflict`](crate::WriteOutcome::Conflict).
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The store rejected our credentials.
    ///
    /// The device must be re-linked before syncing again.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// The store answered with an unexpected HTTP status.
    #[error("HTTP {status}: {message}")]
    Http {
        /// Response status code.
        status: u16,
        /// Response body or reason.
        message: String,
    },

    /// The request never produced a response.
    #[error("transport error: {0}")]
    Transport(String),

    /// Stored data could not be read back.
    #[error("storage corrupted: {0}")]
    Corrupted(String),
}

impl StorageError {
    /// Returns true if this error means the credentials are no longer valid.
    #[must_use]
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized(_))
    }
}
