//! Error types for the local datastore.

use std::io;
use thiserror::Error;
use tickernotes_protocol::ProtocolError;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in local datastore operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Protocol encoding or decoding error.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// An operation could not be applied.
    #[error("apply error: {0}")]
    Apply(#[from] ApplyError),

    /// The store directory is held by another process.
    #[error("database locked: another process has exclusive access")]
    DatabaseLocked,

    /// The persisted state could not be read or written.
    #[error("invalid state file: {message}")]
    InvalidFormat {
        /// Description of the format issue.
        message: String,
    },

    /// A referenced entity does not exist.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// Entity table.
        entity: &'static str,
        /// Entity id.
        id: String,
    },

    /// Operation not permitted in current state.
    #[error("invalid operation: {message}")]
    InvalidOperation {
        /// Description of why operation is invalid.
        message: String,
    },
}

impl CoreError {
    /// Creates an invalid format error.
    pub fn invalid_format(message: impl Into<String>) -> Self {
        Self::InvalidFormat {
            message: message.into(),
        }
    }

    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }

    /// Creates a not found error.
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }
}

/// Errors raised while applying a single operation.
///
/// An apply error never aborts a batch; the caller logs it and moves on.
#[derive(Debug, Error)]
pub enum ApplyError {
    /// The patch could not be merged into the stored record.
    #[error("cannot merge {op} into {entity} {id}: {source}")]
    Merge {
        /// Operation type tag.
        op: String,
        /// Entity table.
        entity: &'static str,
        /// Target id.
        id: String,
        /// Underlying decode error.
        #[source]
        source: serde_json::Error,
    },

    /// The operation references a record that does not exist.
    #[error("{op} references missing {entity} {id}")]
    MissingReference {
        /// Operation type tag.
        op: String,
        /// Referenced entity table.
        entity: &'static str,
        /// Referenced id.
        id: String,
    },

    /// The operation would violate a table invariant.
    #[error("{op} rejected: {message}")]
    Rejected {
        /// Operation type tag.
        op: String,
        /// What went wrong.
        message: String,
    },
}

impl ApplyError {
    /// Returns true if the operation may succeed once its reference exists.
    #[must_use]
    pub fn is_missing_reference(&self) -> bool {
        matches!(self, Self::MissingReference { .. })
    }
}
