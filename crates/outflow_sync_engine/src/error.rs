//! Error types for the sync engine.

use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur during sync operations.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Network or transport error.
    #[error("transport error: {message}")]
    Transport {
        /// Error message.
        message: String,
        /// Whether the operation can be retried.
        retryable: bool,
    },

    /// The request did not complete within the configured timeout.
    #[error("operation timed out")]
    Timeout,

    /// The request was aborted by `stop()`.
    #[error("sync cancelled")]
    Cancelled,

    /// Local change log error.
    #[error("store error: {0}")]
    Store(#[from] outflow_store::StoreError),

    /// Batch encoding error.
    #[error("protocol error: {0}")]
    Protocol(#[from] outflow_protocol::ProtocolError),

    /// `start()` was called on a running synchronizer.
    #[error("synchronizer already started")]
    AlreadyStarted,

    /// `start()` was called after `stop()`.
    #[error("synchronizer stopped")]
    Stopped,

    /// `start()` was called outside a Tokio runtime.
    #[error("no tokio runtime available")]
    NoRuntime,

    /// Invalid configuration.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl SyncError {
    /// Creates a retryable transport error.
    pub fn transport_retryable(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a non-retryable transport error.
    pub fn transport_fatal(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: false,
        }
    }

    /// Returns true if this error can be retried.
    ///
    /// The synchronizer retries every failed send regardless; this is for
    /// callers of a transport outside the synchronizer.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Transport { retryable, .. } => *retryable,
            SyncError::Timeout | SyncError::Cancelled | SyncError::Store(_) => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_errors() {
        assert!(SyncError::transport_retryable("connection lost").is_retryable());
        assert!(!SyncError::transport_fatal("invalid certificate").is_retryable());
        assert!(SyncError::Timeout.is_retryable());
        assert!(SyncError::Cancelled.is_retryable());
        assert!(SyncError::Store(outflow_store::StoreError::Unavailable).is_retryable());
        assert!(!SyncError::AlreadyStarted.is_retryable());
        assert!(!SyncError::Config("x".into()).is_retryable());
    }

    #[test]
    fn error_display() {
        let err = SyncError::Cancelled;
        assert_eq!(err.to_string(), "sync cancelled");

        let err = SyncError::transport_retryable("connection refused");
        assert_eq!(err.to_string(), "transport error: connection refused");
    }
}
