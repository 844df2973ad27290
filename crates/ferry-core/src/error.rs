//! Error types for the upload queue
//!
//! The queue models exactly one domain failure: a batch that does not fit into the
//! remaining capacity. Everything else here is infrastructure (a dropped actor, bad
//! configuration, record log persistence).
//!
//! # Example
//!
//! ```
//! use ferry_core::QueueError;
//!
//! fn describe(err: &QueueError) -> &'static str {
//!     if err.is_rejection() {
//!         "nothing was queued, try fewer files"
//!     } else {
//!         "queue unavailable"
//!     }
//! }
//!
//! let err = QueueError::CapacityExceeded { requested: 11, available: 10, capacity: 10 };
//! assert_eq!(describe(&err), "nothing was queued, try fewer files");
//! ```

use std::borrow::Cow;
use thiserror::Error;

/// Errors that can occur in queue operations
#[derive(Debug, Error, Clone, PartialEq)]
pub enum QueueError {
    // ============ Admission Errors ============
    /// Enqueue would overflow the batch; nothing was admitted
    #[error("Capacity exceeded: {requested} requested, {available} of {capacity} slots free")]
    CapacityExceeded {
        /// Number of files in the rejected request
        requested: usize,
        /// Free slots at the time of the request
        available: usize,
        /// Configured batch capacity
        capacity: usize,
    },

    // ============ Lifecycle Errors ============
    /// The queue actor or record writer has shut down
    #[error("Queue closed")]
    Closed,

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(Cow<'static, str>),

    // ============ Record Log Errors ============
    /// File I/O error
    #[error("File I/O error: {0}")]
    Io(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(Cow<'static, str>),
}

impl QueueError {
    /// Returns true if the request was rejected by queue policy and no state changed
    #[must_use]
    pub fn is_rejection(&self) -> bool {
        matches!(self, QueueError::CapacityExceeded { .. })
    }

    /// Returns true if retrying the same call cannot succeed
    #[must_use]
    pub fn is_permanent(&self) -> bool {
        matches!(self, QueueError::Closed | QueueError::InvalidConfig(_))
    }

    /// Create an invalid configuration error with static context (zero allocation)
    #[must_use]
    pub const fn invalid_config(context: &'static str) -> Self {
        QueueError::InvalidConfig(Cow::Borrowed(context))
    }
}

impl From<std::io::Error> for QueueError {
    fn from(err: std::io::Error) -> Self {
        QueueError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for QueueError {
    fn from(err: serde_json::Error) -> Self {
        QueueError::Serialization(Cow::Owned(err.to_string()))
    }
}

/// Result type for queue operations
pub type Result<T> = std::result::Result<T, QueueError>;
