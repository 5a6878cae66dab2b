//! Sync layer error types.

use dispatch_types::RecordStatus;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur in the data access and sync layer.
///
/// Every variant is inspectable by the caller; the core never renders
/// user-facing messages and never swallows a failure.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Malformed or missing fields, caught before any network call.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Uniqueness-constraint violation. Not transient, never retried.
    #[error("uniqueness conflict: {0}")]
    Conflict(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// Transient connectivity failure or request timeout.
    #[error("network error: {message}")]
    Network {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("invalid status transition: {from} -> {to}")]
    InvalidTransition {
        from: RecordStatus,
        to: RecordStatus,
    },

    /// The change stream for a table exceeded its reconnection budget.
    #[error("change stream lost for table {table} after {attempts} reconnect attempts")]
    SyncLost { table: String, attempts: u32 },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("offline queue full (capacity {capacity})")]
    QueueFull { capacity: usize },

    #[error("internal channel closed")]
    ChannelClosed,
}

impl SyncError {
    /// A network error with no underlying cause (timeouts, offline).
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
            source: None,
        }
    }

    /// Transient errors are the only ones the layer retries on its own.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Network { .. })
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        Self::Network {
            message: err.to_string(),
            source: Some(Box::new(err)),
        }
    }
}
