//! Error types for the Tandem HTTP API.
//!
//! Every error is answered with the [`OperationResponse`] envelope, so a
//! client sees the same shape whether the body was malformed or a workflow
//! rolled back.
//!
//! # Error Mapping
//!
//! | Error | HTTP Status | Code |
//! |-------|-------------|------|
//! | InvalidBody | 400 | `VALIDATION_ERROR` |
//! | Workflow | from the code | the workflow's code |
//! | Internal | 500 | `SIGNUP_ERROR` / `BOOKING_ERROR` |

use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use tandem_persistence::response::{ErrorCode, OperationResponse};
use tandem_persistence::workflows::WorkflowFailure;
use thiserror::Error;
use tracing::{error, warn};

/// The primary error type for REST API operations.
#[derive(Debug, Error)]
pub enum RestError {
    /// The request body could not be read as the expected JSON (HTTP 400).
    #[error("Invalid request body: {message}")]
    InvalidBody {
        /// Rejection details.
        message: String,
    },

    /// A workflow failed; compensation may have run.
    #[error(transparent)]
    Workflow(#[from] WorkflowFailure),

    /// The workflow succeeded but its result could not be rendered (HTTP 500).
    #[error("Internal error: {message}")]
    Internal {
        /// The workflow's generic code.
        code: ErrorCode,
        /// Error message.
        message: String,
    },
}

impl RestError {
    /// Returns the envelope this error is answered with.
    pub fn to_response(&self) -> OperationResponse {
        match self {
            RestError::InvalidBody { message } => {
                OperationResponse::error(ErrorCode::ValidationError, message.clone())
            }
            RestError::Workflow(failure) => OperationResponse::from(failure),
            RestError::Internal { code, message } => {
                OperationResponse::error(*code, message.clone())
            }
        }
    }
}

impl From<JsonRejection> for RestError {
    fn from(rejection: JsonRejection) -> Self {
        RestError::InvalidBody {
            message: rejection.body_text(),
        }
    }
}

impl IntoResponse for RestError {
    fn into_response(self) -> Response {
        match &self {
            RestError::Workflow(failure) if failure.requires_manual_intervention() => {
                error!(code = %failure.code, error = %failure, "Rollback left resources behind");
            }
            RestError::Workflow(failure) => {
                warn!(code = %failure.code, error = %failure, "Workflow failed");
            }
            RestError::Internal { message, .. } => {
                error!(error = %message, "Internal error");
            }
            RestError::InvalidBody { .. } => {}
        }

        let body = self.to_response();
        let status = StatusCode::from_u16(body.status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(body)).into_response()
    }
}

/// Result type for REST operations.
pub type RestResult<T> = Result<T, RestError>;
