//! Error types for tally operations

use std::fmt;
use thiserror::Error;

/// Stable error kinds exposed to the HTTP boundary.
///
/// Every [`TallyError`] maps onto exactly one kind. The boundary layer decides
/// status codes; this crate only classifies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    StoreNotFound,
    InvalidStoreName,
    InvalidProperty,
    InvalidTimeFormat,
    InvalidTimeRange,
    InvalidInterval,
    InvalidJson,
    StoreBusy,
    InsertFailed,
    DeleteFailed,
    InternalError,
}

impl ErrorKind {
    /// Whether the error was caused by the request rather than by the server.
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            ErrorKind::StoreNotFound
                | ErrorKind::InvalidStoreName
                | ErrorKind::InvalidProperty
                | ErrorKind::InvalidTimeFormat
                | ErrorKind::InvalidTimeRange
                | ErrorKind::InvalidInterval
                | ErrorKind::InvalidJson
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Request validation errors. Always detected before a store is checked out.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Invalid store name {name:?}: {reason}")]
    InvalidStoreName { name: String, reason: String },

    #[error("Property {property:?} cannot be queried")]
    InvalidProperty { property: String },

    #[error("Invalid time {value:?}: {reason}")]
    InvalidTimeFormat { value: String, reason: String },

    #[error("Time range end {end} is before start {start}")]
    InvalidTimeRange { start: String, end: String },

    #[error("Invalid interval {value:?}: {reason}")]
    InvalidInterval { value: String, reason: String },

    #[error("Invalid JSON payload: {reason}")]
    InvalidJson { reason: String },
}

/// Storage layer errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("Store not found: {name}")]
    NotFound { name: String },

    #[error("Store {name} is busy, gave up after {waited_ms}ms")]
    Busy { name: String, waited_ms: u64 },

    #[error("Insert failed for store {name}: {reason}")]
    InsertFailed { name: String, reason: String },

    #[error("Delete failed for store {name}: {reason}")]
    DeleteFailed { name: String, reason: String },

    #[error("Storage backend error: {reason}")]
    Backend { reason: String },

    #[error("Storage lock poisoned")]
    LockPoisoned,
}

/// Master error type for all tally errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TallyError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Internal error: {reason}")]
    Internal { reason: String },
}

impl TallyError {
    /// Create an internal error from anything displayable.
    pub fn internal(reason: impl fmt::Display) -> Self {
        TallyError::Internal {
            reason: reason.to_string(),
        }
    }

    /// Classify this error into its stable kind.
    pub fn kind(&self) -> ErrorKind {
        match self {
            TallyError::Validation(e) => match e {
                ValidationError::InvalidStoreName { .. } => ErrorKind::InvalidStoreName,
                ValidationError::InvalidProperty { .. } => ErrorKind::InvalidProperty,
                ValidationError::InvalidTimeFormat { .. } => ErrorKind::InvalidTimeFormat,
                ValidationError::InvalidTimeRange { .. } => ErrorKind::InvalidTimeRange,
                ValidationError::InvalidInterval { .. } => ErrorKind::InvalidInterval,
                ValidationError::InvalidJson { .. } => ErrorKind::InvalidJson,
            },
            TallyError::Storage(e) => match e {
                StorageError::NotFound { .. } => ErrorKind::StoreNotFound,
                StorageError::Busy { .. } => ErrorKind::StoreBusy,
                StorageError::InsertFailed { .. } => ErrorKind::InsertFailed,
                StorageError::DeleteFailed { .. } => ErrorKind::DeleteFailed,
                StorageError::Backend { .. } | StorageError::LockPoisoned => {
                    ErrorKind::InternalError
                }
            },
            TallyError::Internal { .. } => ErrorKind::InternalError,
        }
    }

    /// Whether the error was caused by the request rather than by the server.
    pub fn is_user_error(&self) -> bool {
        self.kind().is_user_error()
    }
}

/// Result type alias for tally operations.
pub type TallyResult<T> = Result<T, TallyError>;

// =============================================================================
// TESTS
// =============================================================================
