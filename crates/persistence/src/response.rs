//! Caller-facing response envelope.
//!
//! Every workflow answers with an [`OperationResponse`]:
//!
//! ```json
//! { "success": false,
//!   "error": { "message": "...", "conflictingId": "u0" },
//!   "code": "DUPLICATE_EMAIL",
//!   "rollbackStatus": { "object:avatars/users/u1/...": "success" } }
//! ```
//!
//! `rollbackStatus` is present whenever compensation ran. A resource marked
//! `failed` there was left behind and needs manual cleanup.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use serde_json::Value;

use crate::compensation::RollbackStatus;
use crate::workflows::WorkflowFailure;

/// User-visible error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    ValidationError,
    InvalidQuantity,
    DuplicateUser,
    DuplicateEmail,
    DuplicatePayment,
    InsufficientTickets,
    TicketTypeUnavailable,
    ConflictError,
    NotFoundError,
    PermissionError,
    SignupError,
    BookingError,
}

impl ErrorCode {
    /// Returns the wire representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::ValidationError => "VALIDATION_ERROR",
            ErrorCode::InvalidQuantity => "INVALID_QUANTITY",
            ErrorCode::DuplicateUser => "DUPLICATE_USER",
            ErrorCode::DuplicateEmail => "DUPLICATE_EMAIL",
            ErrorCode::DuplicatePayment => "DUPLICATE_PAYMENT",
            ErrorCode::InsufficientTickets => "INSUFFICIENT_TICKETS",
            ErrorCode::TicketTypeUnavailable => "TICKET_TYPE_UNAVAILABLE",
            ErrorCode::ConflictError => "CONFLICT_ERROR",
            ErrorCode::NotFoundError => "NOT_FOUND_ERROR",
            ErrorCode::PermissionError => "PERMISSION_ERROR",
            ErrorCode::SignupError => "SIGNUP_ERROR",
            ErrorCode::BookingError => "BOOKING_ERROR",
        }
    }

    /// Returns the HTTP status code this error maps to.
    pub fn status_code(&self) -> u16 {
        match self {
            ErrorCode::ValidationError | ErrorCode::InvalidQuantity => 400,
            ErrorCode::PermissionError => 403,
            ErrorCode::NotFoundError => 404,
            ErrorCode::DuplicateUser
            | ErrorCode::DuplicateEmail
            | ErrorCode::DuplicatePayment
            | ErrorCode::InsufficientTickets
            | ErrorCode::TicketTypeUnavailable
            | ErrorCode::ConflictError => 409,
            ErrorCode::SignupError | ErrorCode::BookingError => 500,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error body of a failed response.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub message: String,
    /// Id of the existing resource a duplicate collided with.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conflicting_id: Option<String>,
}

/// The response envelope.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<ErrorCode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rollback_status: Option<BTreeMap<String, RollbackStatus>>,
}

impl OperationResponse {
    /// A successful response carrying `data`.
    pub fn ok(data: Value) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            code: None,
            rollback_status: None,
        }
    }

    /// A failed response that touched nothing.
    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(ErrorBody {
                message: message.into(),
                conflicting_id: None,
            }),
            code: Some(code),
            rollback_status: None,
        }
    }

    /// Returns the HTTP status code for this response.
    pub fn status_code(&self) -> u16 {
        match self.code {
            Some(code) if !self.success => code.status_code(),
            _ => 200,
        }
    }
}

impl From<&WorkflowFailure> for OperationResponse {
    fn from(failure: &WorkflowFailure) -> Self {
        let error = &failure.failure.error;
        Self {
            success: false,
            data: None,
            error: Some(ErrorBody {
                message: error.to_string(),
                conflicting_id: error.as_duplicate().map(|d| d.existing_id.clone()),
            }),
            code: Some(failure.code),
            rollback_status: failure
                .failure
                .rollback
                .as_ref()
                .map(|report| report.status_map()),
        }
    }
}

impl From<WorkflowFailure> for OperationResponse {
    fn from(failure: WorkflowFailure) -> Self {
        Self::from(&failure)
    }
}
