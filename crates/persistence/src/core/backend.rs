//! Backend identification and capability declarations.
//!
//! Capabilities are declared statically by each store. The coordinator reads
//! them once at construction to choose between native and fallback execution.

use std::fmt;

/// Identifies the type of document store backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    /// In-process store.
    Memory,
    /// SQLite database (file-based or in-memory).
    Sqlite,
    /// Custom or unknown backend.
    Custom(&'static str),
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Memory => write!(f, "memory"),
            BackendKind::Sqlite => write!(f, "sqlite"),
            BackendKind::Custom(name) => write!(f, "{}", name),
        }
    }
}

/// Capabilities that a document store may support.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendCapability {
    /// Basic CRUD operations.
    Crud,
    /// Lookup of a document by a top-level field value.
    FieldLookup,
    /// Versioned writes guarded by an expected version.
    OptimisticLocking,
    /// Staged writes committed atomically with conflict detection.
    NativeTransactions,
}

impl fmt::Display for BackendCapability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendCapability::Crud => write!(f, "crud"),
            BackendCapability::FieldLookup => write!(f, "field-lookup"),
            BackendCapability::OptimisticLocking => write!(f, "optimistic-locking"),
            BackendCapability::NativeTransactions => write!(f, "native-transactions"),
        }
    }
}
