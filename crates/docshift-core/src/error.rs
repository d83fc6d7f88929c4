//! Error types for docshift
//!
//! Provides the error taxonomy of a migration run:
//! - Invocation validation failures (raised before any I/O)
//! - Task resolution and queue failures
//! - Document store failures
//!
//! An empty fetch is not an error; it surfaces as `Ok(None)`.

use crate::types::TaskId;

/// Main migration error type
#[derive(Debug, thiserror::Error)]
pub enum MigrationError {
    /// Malformed invocation parameters
    #[error("invalid invocation: {0}")]
    Validation(#[from] ValidationError),

    /// Template resolution or queue failure
    #[error("task resolution failed: {0}")]
    TaskResolution(#[from] TaskError),

    /// Bulk write, explain, find or close failure reported by the store
    #[error("document store failure: {0}")]
    Store(#[from] StoreError),
}

impl MigrationError {
    /// Check if error was raised by parameter validation
    #[inline]
    #[must_use]
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Check if error came from the document store
    #[inline]
    #[must_use]
    pub fn is_store(&self) -> bool {
        matches!(self, Self::Store(_))
    }

    /// Check if a worker panicked
    #[inline]
    #[must_use]
    pub fn is_panic(&self) -> bool {
        matches!(self, Self::TaskResolution(TaskError::Panicked(_)))
    }

    /// Migrations are never retried automatically
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        false
    }
}

/// Invocation validation errors
///
/// Every variant carries a distinct message so callers can tell which
/// parameter was rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// Job envelope is missing or has no handler
    #[error("Missing params. Quitting now")]
    MissingParams,

    /// Job names a handler that does not exist
    #[error("No valid handler found: {0}")]
    UnknownHandler(String),

    /// Connection object absent or not an object
    #[error("A connection object must exist.")]
    MissingConnection,

    /// Database handle absent or empty
    #[error("A database must exist and be of type Object")]
    MissingDatabase,

    /// Collection handle absent or empty
    #[error("A collection must exist and be of type Object")]
    MissingCollection,

    /// Invocation parameters are not an object
    #[error("Params are not valid, should be of type Object")]
    InvalidParams,

    /// `options` is absent or not an object
    #[error("Options is not valid, should be of type Object")]
    InvalidOptions,

    /// `options.writeMode` is absent or not a boolean
    #[error("<options>.writeMode is not valid, should be of type Boolean")]
    InvalidWriteMode,

    /// `options.verbose` is absent or not a boolean
    #[error("<options>.verbose is not valid, should be of type Boolean")]
    InvalidVerbose,

    /// `data` is not a non-empty object
    #[error("Data is not valid, should be a non-empty Object")]
    InvalidData,
}

/// Mutation task and queue errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum TaskError {
    /// A resolver rejected a task
    #[error("task {task_id} could not be resolved: {reason}")]
    Resolution {
        /// Task that failed
        task_id: TaskId,
        /// Resolver message
        reason: String,
    },

    /// A worker panicked while resolving
    #[error("worker panicked: {0}")]
    Panicked(String),

    /// Task was aborted after another task failed
    #[error("task aborted")]
    Aborted,

    /// Push attempted after the queue was killed or drained
    #[error("There was an error adding fields to the update queue: queue is closed")]
    QueueClosed,
}

impl TaskError {
    /// Create a resolution error for a task
    #[inline]
    pub fn resolution(task_id: TaskId, reason: impl Into<String>) -> Self {
        Self::Resolution {
            task_id,
            reason: reason.into(),
        }
    }
}

/// Document store errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    /// Namespace does not exist in the store
    #[error("collection not found: {0}")]
    CollectionNotFound(String),

    /// Filter or update uses an operator the store does not know
    #[error("unsupported operator: {0}")]
    UnsupportedOperator(String),

    /// Update document is malformed
    #[error("invalid update: {0}")]
    InvalidUpdate(String),

    /// Field path cannot be written through a scalar
    #[error("cannot create field '{field}' in element {{{path}: ...}}")]
    PathConflict {
        /// Full path being written
        path: String,
        /// Segment that conflicted
        field: String,
    },

    /// A bulk write entry failed
    #[error("bulk write failed at operation {index}: {reason}")]
    BulkWrite {
        /// Position of the failing operation
        index: usize,
        /// Underlying message
        reason: String,
    },

    /// Explain request failed
    #[error("A query plan could not be retrieved: {0}")]
    Explain(String),

    /// Connection-level failure
    #[error("connection error: {0}")]
    Connection(String),

    /// Backing file could not be read or written
    #[error("io error: {0}")]
    Io(String),
}
