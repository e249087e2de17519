//! Error types for protocol encoding and decoding.

use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors that can occur while encoding or decoding protocol records.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// JSON encoding or decoding failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// An operation id string was not of the form `{device}-{seq}`.
    #[error("invalid operation id: {0}")]
    InvalidOperationId(String),

    /// A known operation kind carried a payload of the wrong shape.
    #[error("invalid payload for {op}: {message}")]
    InvalidPayload {
        /// Operation type tag.
        op: String,
        /// What was wrong with the payload.
        message: String,
    },

    /// A timestamp was not valid ISO-8601.
    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(String),
}

impl ProtocolError {
    /// Creates an invalid payload error.
    pub fn invalid_payload(op: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidPayload {
            op: op.into(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = ProtocolError::invalid_payload("add_note", "missing security_id");
        assert_eq!(
            err.to_string(),
            "invalid payload for add_note: missing security_id"
        );

        let err = ProtocolError::InvalidOperationId("nodash".into());
        assert!(err.to_string().contains("nodash"));
    }
}
