//! Route table.

use axum::{
    Router,
    routing::{get, post},
};

use crate::handlers;
use crate::state::AppState;

/// Creates all API routes.
///
/// # Routes
///
/// - `POST /signup` - User signup
/// - `POST /bookings` - Ticket booking
/// - `GET /health` - Health check
/// - `GET /_liveness` - Liveness probe
pub fn create_routes(state: AppState) -> Router {
    Router::new()
        .route("/signup", post(handlers::signup_handler))
        .route("/bookings", post(handlers::booking_handler))
        .route("/health", get(handlers::health_handler))
        .route("/_liveness", get(handlers::liveness_handler))
        .with_state(state)
}
