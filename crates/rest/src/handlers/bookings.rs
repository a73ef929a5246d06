//! Booking handler.

use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use tandem_persistence::response::{ErrorCode, OperationResponse};
use tandem_persistence::workflows::BookingRequest;
use tracing::{debug, info};

use crate::error::{RestError, RestResult};
use crate::state::AppState;

/// Handler for ticket bookings.
///
/// # HTTP Request
///
/// `POST [base]/bookings`
///
/// ```json
/// { "userId": "u1", "eventId": "e1", "ticketType": "general",
///   "quantity": 2, "paymentId": "pay-1", "ticketQr": "<base64>" }
/// ```
///
/// # Response
///
/// - `201 Created` - Order, payment record and inventory update committed
/// - `400 Bad Request` - `VALIDATION_ERROR` or `INVALID_QUANTITY`
/// - `404 Not Found` - `NOT_FOUND_ERROR` for an unknown user or event
/// - `409 Conflict` - `DUPLICATE_PAYMENT`, `INSUFFICIENT_TICKETS`,
///   `TICKET_TYPE_UNAVAILABLE` or `CONFLICT_ERROR`
/// - `500 Internal Server Error` - `BOOKING_ERROR`
pub async fn booking_handler(
    State(state): State<AppState>,
    payload: Result<Json<BookingRequest>, JsonRejection>,
) -> RestResult<Response> {
    let Json(request) = payload?;
    debug!(
        user_id = ?request.user_id,
        event_id = ?request.event_id,
        "Processing booking request"
    );

    let outcome = state.booking().execute(&request).await?;
    info!(
        order_id = %outcome.order_id,
        event_id = %outcome.event_id,
        quantity = outcome.quantity,
        transaction_id = %outcome.transaction_id,
        "Booking committed"
    );

    let data = serde_json::to_value(&outcome).map_err(|e| RestError::Internal {
        code: ErrorCode::BookingError,
        message: e.to_string(),
    })?;
    Ok((StatusCode::CREATED, Json(OperationResponse::ok(data))).into_response())
}
