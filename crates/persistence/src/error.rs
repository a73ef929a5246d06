//! Error types for the coordination layer.
//!
//! This module defines all error types used throughout the crate, following a
//! hierarchy that separates input validation, uniqueness violations,
//! concurrency conflicts, document state, inventory rules, transaction state
//! and backend failures.
//!
//! Every error can be classified into an [`ErrorKind`], which is what callers
//! use to decide how a failure is reported and whether a read may be retried.

// Error enum variant fields are self-documenting via their #[error(...)] messages
#![allow(missing_docs)]

use std::fmt;

use thiserror::Error;

use crate::compensation::RollbackReport;
use crate::types::TransactionState;

/// The primary error type for all coordination and storage operations.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Bad input, detected before any resource was touched.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// A uniqueness constraint matched an existing resource.
    #[error(transparent)]
    Duplicate(#[from] DuplicateError),

    /// Concurrent writers collided.
    #[error(transparent)]
    Concurrency(#[from] ConcurrencyError),

    /// Document state errors.
    #[error(transparent)]
    Resource(#[from] ResourceError),

    /// Finite-resource (ticket inventory) rule violations.
    #[error(transparent)]
    Inventory(#[from] InventoryError),

    /// Transaction context errors.
    #[error(transparent)]
    Transaction(#[from] TransactionError),

    /// Backend-specific errors.
    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// Errors related to request validation.
#[derive(Error, Debug, Clone)]
pub enum ValidationError {
    /// A required request field is missing or blank.
    #[error("missing required field: {field}")]
    MissingRequiredField { field: String },

    /// A field is present but unusable.
    #[error("invalid field {field}: {message}")]
    InvalidField { field: String, message: String },

    /// The requested ticket quantity is outside the allowed range.
    #[error("invalid quantity {requested}: must be between 1 and {max}")]
    InvalidQuantity { requested: i64, max: u32 },

    /// The requested time-to-live is zero or above the configured maximum.
    #[error("invalid transaction ttl {ttl_ms}ms: must be between 1ms and {max_ms}ms")]
    InvalidTtl { ttl_ms: u64, max_ms: u64 },
}

/// A uniqueness constraint matched an existing resource.
///
/// Carries the identifier of the conflicting resource so that callers can
/// surface it without retrying.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("duplicate {field} '{value}' in {scope}: already used by {existing_id}")]
pub struct DuplicateError {
    /// The collection the constraint is scoped to.
    pub scope: String,
    /// The constrained field (`id` for document identity).
    pub field: String,
    /// The value that collided.
    pub value: String,
    /// Identifier of the resource that already holds the value.
    pub existing_id: String,
}

/// Errors related to concurrency control.
#[derive(Error, Debug, Clone)]
pub enum ConcurrencyError {
    /// Optimistic version check failed.
    #[error("version conflict on {collection}/{id}: expected version {expected_version}, found {}", display_version(.actual_version))]
    VersionConflict {
        collection: String,
        id: String,
        expected_version: u64,
        actual_version: Option<u64>,
    },

    /// A concurrent writer changed data this transaction depended on.
    #[error("commit conflict on {collection}/{id}: {message}")]
    Conflict {
        collection: String,
        id: String,
        message: String,
    },
}

fn display_version(version: &Option<u64>) -> String {
    match version {
        Some(v) => v.to_string(),
        None => "none".to_string(),
    }
}

/// Errors related to document state.
#[derive(Error, Debug, Clone)]
pub enum ResourceError {
    /// The requested document was not found.
    #[error("document not found: {collection}/{id}")]
    NotFound { collection: String, id: String },

    /// A document with the given ID already exists.
    #[error("document already exists: {collection}/{id}")]
    AlreadyExists { collection: String, id: String },
}

/// Errors raised by ticket inventory rules.
#[derive(Error, Debug, Clone)]
pub enum InventoryError {
    /// The event does not offer the requested ticket type.
    #[error("ticket type '{ticket_type}' is not available for event {event_id}")]
    TicketTypeUnavailable { event_id: String, ticket_type: String },

    /// Fewer tickets remain than were requested.
    #[error("insufficient tickets for {event_id}/{ticket_type}: requested {requested}, available {available}")]
    InsufficientTickets {
        event_id: String,
        ticket_type: String,
        requested: u32,
        available: u32,
    },
}

/// Errors related to transaction contexts.
#[derive(Error, Debug, Clone)]
pub enum TransactionError {
    /// The context outlived its time-to-live and was rolled back.
    #[error("transaction {transaction_id} timed out after {ttl_ms}ms")]
    Timeout { transaction_id: String, ttl_ms: u64 },

    /// The context is terminal and accepts no further calls.
    #[error("transaction {transaction_id} is {state}")]
    InvalidState {
        transaction_id: String,
        state: TransactionState,
    },

    /// Object uploads must precede document staging.
    #[error("transaction {transaction_id} already staged documents; uploads must come first")]
    UploadAfterStaging { transaction_id: String },

    /// The caller aborted the operation.
    #[error("transaction {transaction_id} cancelled: {reason}")]
    Cancelled {
        transaction_id: String,
        reason: String,
    },
}

/// Errors originating from a storage backend.
#[derive(Error, Debug)]
pub enum BackendError {
    /// The backend is currently unavailable.
    #[error("backend unavailable: {backend_name}: {message}")]
    Unavailable {
        backend_name: String,
        message: String,
    },

    /// Connection to the backend failed.
    #[error("connection failed to {backend_name}: {message}")]
    ConnectionFailed {
        backend_name: String,
        message: String,
    },

    /// The requested capability is not supported by this backend.
    #[error("capability '{capability}' not supported by {backend_name}")]
    UnsupportedCapability {
        backend_name: String,
        capability: String,
    },

    /// The backend refused the operation.
    #[error("permission denied by {backend_name}: {message}")]
    PermissionDenied {
        backend_name: String,
        message: String,
    },

    /// An object storage call failed.
    #[error("object storage error for {bucket}/{key}: {message}")]
    ObjectStore {
        bucket: String,
        key: String,
        message: String,
    },

    /// Internal backend error.
    #[error("internal error in {backend_name}: {message}")]
    Internal {
        backend_name: String,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Query execution error.
    #[error("query execution failed: {message}")]
    QueryError { message: String },

    /// Serialization/deserialization error.
    #[error("serialization error: {message}")]
    SerializationError { message: String },
}

/// Coarse classification of a [`StorageError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Bad input; no side effects happened.
    Validation,
    /// Uniqueness violation.
    Duplicate,
    /// Concurrent-writer collision or exhausted finite resource.
    Conflict,
    /// A referenced document does not exist.
    NotFound,
    /// The backend refused the operation.
    Permission,
    /// Transient storage or database failure.
    Resource,
    /// The transaction outlived its time-to-live.
    Timeout,
    /// Anything unclassified.
    Internal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Validation => "validation",
            ErrorKind::Duplicate => "duplicate",
            ErrorKind::Conflict => "conflict",
            ErrorKind::NotFound => "not-found",
            ErrorKind::Permission => "permission",
            ErrorKind::Resource => "resource",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Internal => "internal",
        };
        write!(f, "{}", name)
    }
}

impl StorageError {
    /// Classifies this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            StorageError::Validation(_) => ErrorKind::Validation,
            StorageError::Duplicate(_) => ErrorKind::Duplicate,
            StorageError::Concurrency(_) => ErrorKind::Conflict,
            StorageError::Inventory(_) => ErrorKind::Conflict,
            StorageError::Resource(ResourceError::NotFound { .. }) => ErrorKind::NotFound,
            StorageError::Resource(ResourceError::AlreadyExists { .. }) => ErrorKind::Duplicate,
            StorageError::Transaction(TransactionError::Timeout { .. }) => ErrorKind::Timeout,
            StorageError::Transaction(_) => ErrorKind::Internal,
            StorageError::Backend(BackendError::PermissionDenied { .. }) => ErrorKind::Permission,
            StorageError::Backend(
                BackendError::Unavailable { .. }
                | BackendError::ConnectionFailed { .. }
                | BackendError::ObjectStore { .. }
                | BackendError::QueryError { .. },
            ) => ErrorKind::Resource,
            StorageError::Backend(_) => ErrorKind::Internal,
        }
    }

    /// Returns whether a read that failed with this error may be retried.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            StorageError::Backend(
                BackendError::Unavailable { .. } | BackendError::ConnectionFailed { .. }
            )
        )
    }

    /// Returns the duplicate details if this is a uniqueness violation.
    pub fn as_duplicate(&self) -> Option<&DuplicateError> {
        match self {
            StorageError::Duplicate(dup) => Some(dup),
            _ => None,
        }
    }
}

/// A coordinator failure together with the compensation it triggered.
///
/// `rollback` is `None` only when the failure happened before anything could
/// have been applied (for example a call against a terminal context).
#[derive(Error, Debug)]
#[error("{error}")]
pub struct TransactionFailure {
    /// The error that caused the failure.
    #[source]
    pub error: StorageError,
    /// The compensation report, when compensation ran.
    pub rollback: Option<RollbackReport>,
}

impl TransactionFailure {
    /// Creates a failure that ran compensation.
    pub fn with_rollback(error: StorageError, rollback: RollbackReport) -> Self {
        Self {
            error,
            rollback: Some(rollback),
        }
    }

    /// Returns the classification of the underlying error.
    pub fn kind(&self) -> ErrorKind {
        self.error.kind()
    }

    /// Returns whether some compensation step failed and needs manual cleanup.
    pub fn requires_manual_intervention(&self) -> bool {
        self.rollback
            .as_ref()
            .map(|report| !report.is_complete())
            .unwrap_or(false)
    }
}

impl From<StorageError> for TransactionFailure {
    fn from(error: StorageError) -> Self {
        Self {
            error,
            rollback: None,
        }
    }
}

/// Result type alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Result type alias for coordinator operations that may compensate.
pub type TransactionResult<T> = Result<T, TransactionFailure>;

// Implement conversions from common error types

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Backend(BackendError::SerializationError {
            message: err.to_string(),
        })
    }
}

impl From<object_store::Error> for StorageError {
    fn from(err: object_store::Error) -> Self {
        StorageError::Backend(BackendError::Internal {
            backend_name: "object_store".to_string(),
            message: err.to_string(),
            source: Some(Box::new(err)),
        })
    }
}

#[cfg(feature = "sqlite")]
impl From<rusqlite::Error> for StorageError {
    fn from(err: rusqlite::Error) -> Self {
        StorageError::Backend(BackendError::Internal {
            backend_name: "sqlite".to_string(),
            message: err.to_string(),
            source: Some(Box::new(err)),
        })
    }
}

#[cfg(feature = "sqlite")]
impl From<r2d2::Error> for StorageError {
    fn from(err: r2d2::Error) -> Self {
        StorageError::Backend(BackendError::ConnectionFailed {
            backend_name: "sqlite".to_string(),
            message: err.to_string(),
        })
    }
}
