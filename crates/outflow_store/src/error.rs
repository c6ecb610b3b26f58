//! Error types for store operations.

use outflow_protocol::ProtocolError;
use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// SQLite reported an error.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// A stored row payload could not be encoded or decoded.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// A stored record could not be interpreted.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// A written value lacks the configured key column.
    #[error("value is missing key column {column:?}")]
    MissingKey {
        /// The configured key column.
        column: String,
    },

    /// A configured table or column name is not a plain SQL identifier.
    #[error("invalid identifier: {0:?}")]
    InvalidIdentifier(String),

    /// The store is not accepting operations.
    #[error("store unavailable")]
    Unavailable,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = StoreError::MissingKey {
            column: "pub_key".into(),
        };
        assert_eq!(err.to_string(), "value is missing key column \"pub_key\"");

        let err = StoreError::InvalidIdentifier("users; DROP".into());
        assert!(err.to_string().contains("users; DROP"));
    }
}
