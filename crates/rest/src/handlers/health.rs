//! Health check endpoint handlers.
//!
//! Provides health and liveness endpoints for monitoring and load balancers.

use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use tracing::{debug, warn};

use crate::state::AppState;

/// Handler for the health check endpoint.
///
/// Probes the document store and reports the coordinator's execution mode.
///
/// # HTTP Request
///
/// `GET [base]/health`
///
/// # Response
///
/// - `200 OK` - The document store answered
/// - `503 Service Unavailable` - The document store did not answer
pub async fn health_handler(State(state): State<AppState>) -> Response {
    debug!("Processing health check request");

    let coordinator = state.coordinator();
    let (status, label) = match coordinator.documents().health_check().await {
        Ok(()) => (StatusCode::OK, "healthy"),
        Err(e) => {
            warn!(error = %e, "Document store health check failed");
            (StatusCode::SERVICE_UNAVAILABLE, "unhealthy")
        }
    };

    let health_response = serde_json::json!({
        "status": label,
        "mode": coordinator.mode(),
        "documentStore": coordinator.documents().backend_name(),
        "objectStore": coordinator.objects().backend_name(),
        "timestamp": chrono::Utc::now().to_rfc3339()
    });

    (status, Json(health_response)).into_response()
}

/// Handler for a liveness probe.
///
/// # HTTP Request
///
/// `GET [base]/_liveness`
pub async fn liveness_handler() -> impl IntoResponse {
    StatusCode::OK
}
