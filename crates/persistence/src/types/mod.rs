//! Core types for the coordination layer.
//!
//! - [`Document`] - A JSON document with version and timestamps
//! - [`DocumentWrite`], [`StagedOperation`] - Writes before and after staging
//! - [`ResourceRef`], [`ResourceHandle`], [`ObjectHandle`] - Resource identity
//! - [`UniquenessConstraint`] - Values that must be unique within a collection
//! - [`TransactionId`], [`TransactionState`], [`ExecutionMode`], [`Phase`]
//! - [`TicketCategory`], [`TicketInventory`] - Structured inventory records
//!
//! # Examples
//!
//! ```
//! use tandem_persistence::types::{DocumentWrite, OperationKind, UniquenessConstraint};
//! use serde_json::json;
//!
//! let write = DocumentWrite::create("users", "u1", json!({"email": "a@example.com"}))
//!     .with_constraint(UniquenessConstraint::field("users", "email", "a@example.com"))
//!     .with_constraint(UniquenessConstraint::document_id("users", "u1"));
//!
//! assert_eq!(write.kind(), OperationKind::Create);
//! assert_eq!(write.constraints().len(), 2);
//! assert_eq!(write.target().to_string(), "document:users/u1");
//! ```

mod document;
mod inventory;
mod operation;
mod transaction;

pub use document::Document;
pub(crate) use document::field_value_matches;
pub use inventory::{TICKET_CATEGORIES_FIELD, TicketCategory, TicketInventory};
pub use operation::{
    ConstraintField, DocumentWrite, HandleStatus, ObjectHandle, OperationKind, ResourceHandle,
    ResourceKind, ResourceRef, StagedOperation, UniquenessConstraint,
};
pub use transaction::{ExecutionMode, Phase, TransactionId, TransactionState};
