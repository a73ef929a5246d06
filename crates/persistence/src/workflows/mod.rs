//! Business workflows built on the coordinator.
//!
//! - [`SignupWorkflow`] - uploads profile media, then creates a unique user
//! - [`BookingWorkflow`] - reserves tickets, records the payment and the order
//!
//! Each workflow validates its request before opening a context, so a
//! validation failure has no side effects. Every later failure goes through
//! the coordinator, which compensates before the error is returned. The whole
//! pipeline is bounded by the context's time-to-live.

mod booking;
mod signup;

use thiserror::Error;

use crate::error::{
    BackendError, DuplicateError, InventoryError, ResourceError, StorageError, TransactionFailure,
    ValidationError,
};
use crate::response::ErrorCode;

pub use booking::{BookingOutcome, BookingRequest, BookingWorkflow};
pub use signup::{SignupOutcome, SignupRequest, SignupWorkflow};

/// Collection holding user documents.
pub const USERS: &str = "users";
/// Collection holding event documents.
pub const EVENTS: &str = "events";
/// Collection holding order documents.
pub const ORDERS: &str = "orders";
/// Collection holding payment transaction documents.
pub const TRANSACTIONS: &str = "transactions";

/// A failed workflow: the user-visible code plus the underlying failure.
#[derive(Debug, Error)]
#[error("{code}: {failure}")]
pub struct WorkflowFailure {
    pub code: ErrorCode,
    #[source]
    pub failure: TransactionFailure,
}

impl WorkflowFailure {
    /// Returns whether compensation left a resource behind.
    pub fn requires_manual_intervention(&self) -> bool {
        self.failure.requires_manual_intervention()
    }
}

/// Maps failures of one workflow to error codes.
///
/// `generic` covers anything unclassified; `duplicate` names the code for
/// each uniqueness constraint the workflow declares.
pub(crate) struct CodeMap {
    generic: ErrorCode,
    duplicate: fn(&DuplicateError) -> ErrorCode,
}

impl CodeMap {
    pub(crate) fn classify(&self, error: &StorageError) -> ErrorCode {
        match error {
            StorageError::Validation(ValidationError::InvalidQuantity { .. }) => {
                ErrorCode::InvalidQuantity
            }
            StorageError::Validation(_) => ErrorCode::ValidationError,
            StorageError::Duplicate(dup) => (self.duplicate)(dup),
            StorageError::Inventory(InventoryError::TicketTypeUnavailable { .. }) => {
                ErrorCode::TicketTypeUnavailable
            }
            StorageError::Inventory(InventoryError::InsufficientTickets { .. }) => {
                ErrorCode::InsufficientTickets
            }
            StorageError::Concurrency(_)
            | StorageError::Resource(ResourceError::AlreadyExists { .. }) => {
                ErrorCode::ConflictError
            }
            StorageError::Resource(ResourceError::NotFound { .. }) => ErrorCode::NotFoundError,
            StorageError::Backend(BackendError::PermissionDenied { .. }) => {
                ErrorCode::PermissionError
            }
            _ => self.generic,
        }
    }

    pub(crate) fn fail(&self, failure: TransactionFailure) -> WorkflowFailure {
        WorkflowFailure {
            code: self.classify(&failure.error),
            failure,
        }
    }

    pub(crate) fn reject(&self, error: StorageError) -> WorkflowFailure {
        self.fail(TransactionFailure::from(error))
    }
}

/// Returns a required request field, trimmed.
pub(crate) fn required(field: &str, value: Option<&str>) -> Result<String, StorageError> {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v.to_string()),
        _ => Err(ValidationError::MissingRequiredField {
            field: field.to_string(),
        }
        .into()),
    }
}

/// Decodes an optional base64 upload.
pub(crate) fn decode_upload(field: &str, value: Option<&str>) -> Result<Option<Vec<u8>>, StorageError> {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;

    let Some(encoded) = value.map(str::trim).filter(|v| !v.is_empty()) else {
        return Ok(None);
    };
    STANDARD.decode(encoded).map(Some).map_err(|e| {
        ValidationError::InvalidField {
            field: field.to_string(),
            message: format!("not valid base64: {}", e),
        }
        .into()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn codes() -> CodeMap {
        CodeMap {
            generic: ErrorCode::SignupError,
            duplicate: |_| ErrorCode::DuplicateUser,
        }
    }

    #[test]
    fn test_required_trims_and_rejects_blank() {
        assert_eq!(required("email", Some("  a@b.c ")).unwrap(), "a@b.c");
        assert!(matches!(
            required("email", Some("   ")),
            Err(StorageError::Validation(ValidationError::MissingRequiredField { .. }))
        ));
        assert!(required("email", None).is_err());
    }

    #[test]
    fn test_decode_upload() {
        assert_eq!(decode_upload("avatar", None).unwrap(), None);
        assert_eq!(decode_upload("avatar", Some("AQID")).unwrap(), Some(vec![1, 2, 3]));
        assert!(decode_upload("avatar", Some("***")).is_err());
    }

    #[test]
    fn test_classify() {
        let codes = codes();
        let not_found: StorageError = ResourceError::NotFound {
            collection: "events".into(),
            id: "e1".into(),
        }
        .into();
        assert_eq!(codes.classify(&not_found), ErrorCode::NotFoundError);

        let quantity: StorageError = ValidationError::InvalidQuantity {
            requested: 0,
            max: 10,
        }
        .into();
        assert_eq!(codes.classify(&quantity), ErrorCode::InvalidQuantity);

        let internal: StorageError = BackendError::QueryError {
            message: "boom".into(),
        }
        .into();
        assert_eq!(codes.classify(&internal), ErrorCode::SignupError);
    }
}
