//! Signup handler.

use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use tandem_persistence::response::{ErrorCode, OperationResponse};
use tandem_persistence::workflows::SignupRequest;
use tracing::{debug, info};

use crate::error::{RestError, RestResult};
use crate::state::AppState;

/// Handler for user signup.
///
/// # HTTP Request
///
/// `POST [base]/signup`
///
/// ```json
/// { "userId": "u1", "email": "ada@example.com", "displayName": "Ada",
///   "avatar": "<base64>", "qrCode": "<base64>" }
/// ```
///
/// # Response
///
/// - `201 Created` - The user and their media were stored
/// - `400 Bad Request` - `VALIDATION_ERROR`
/// - `409 Conflict` - `DUPLICATE_EMAIL` or `DUPLICATE_USER`
/// - `500 Internal Server Error` - `SIGNUP_ERROR`
pub async fn signup_handler(
    State(state): State<AppState>,
    payload: Result<Json<SignupRequest>, JsonRejection>,
) -> RestResult<Response> {
    let Json(request) = payload?;
    debug!(user_id = ?request.user_id, "Processing signup request");

    let outcome = state.signup().execute(&request).await?;
    info!(
        user_id = %outcome.user_id,
        transaction_id = %outcome.transaction_id,
        "User signed up"
    );

    let data = serde_json::to_value(&outcome).map_err(|e| RestError::Internal {
        code: ErrorCode::SignupError,
        message: e.to_string(),
    })?;
    Ok((StatusCode::CREATED, Json(OperationResponse::ok(data))).into_response())
}
