//! # tandem-rest - HTTP API for Tandem workflows
//!
//! This crate exposes the signup and booking workflows of
//! [`tandem_persistence`] over HTTP. Each request runs one workflow inside a
//! transaction context; the response is the workflow's
//! [`OperationResponse`](tandem_persistence::OperationResponse) envelope, which
//! carries a per-resource `rollbackStatus` whenever compensation ran.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tandem_persistence::TransactionCoordinator;
//! use tandem_persistence::backends::memory::MemoryDocumentStore;
//! use tandem_persistence::backends::objects::ObjectStoreAdapter;
//! use tandem_rest::{ServerConfig, create_app_with_config};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ServerConfig::default();
//! let coordinator_config = config.coordinator_config();
//! let objects = ObjectStoreAdapter::in_memory(&coordinator_config.buckets.names());
//! let coordinator = TransactionCoordinator::new(
//!     coordinator_config,
//!     Arc::new(objects),
//!     Arc::new(MemoryDocumentStore::new()),
//! )?;
//!
//! let app = create_app_with_config(coordinator, config.clone());
//! let listener = tokio::net::TcpListener::bind(config.socket_addr()).await?;
//! axum::serve(listener, app).await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## API Endpoints
//!
//! | Operation | HTTP Method | URL Pattern |
//! |-----------|-------------|-------------|
//! | signup | POST | `/signup` |
//! | booking | POST | `/bookings` |
//! | health | GET | `/health` |
//! | liveness | GET | `/_liveness` |
//!
//! ## Error Handling
//!
//! Errors are answered with the same envelope as successes, with
//! `success: false`, an error `code`, and the HTTP status that code maps to
//! (400, 403, 404, 409 or 500). A body that is not valid JSON for the
//! operation is a `VALIDATION_ERROR`.
//!
//! ## Architecture
//!
//! - [`error`] - Error type and envelope rendering
//! - [`config`] - Server configuration
//! - [`state`] - Application state (coordinator, workflows, configuration)
//! - [`handlers`] - HTTP request handlers
//! - [`routing`] - Route configuration

// Enforce documentation
#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod config;
pub mod error;
pub mod handlers;
pub mod routing;
pub mod state;

// Re-export commonly used types
pub use config::{DocumentStoreKind, ServerConfig};
pub use error::{RestError, RestResult};
pub use state::AppState;

use std::time::Duration;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::http::StatusCode;
use tandem_persistence::TransactionCoordinator;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::info;

/// Creates the Axum application with default configuration.
///
/// For more control, use [`create_app_with_config`].
pub fn create_app(coordinator: TransactionCoordinator) -> Router {
    create_app_with_config(coordinator, ServerConfig::default())
}

/// Creates the Axum application with custom configuration.
///
/// Sets up the routes, the request body limit, tracing, the request timeout,
/// request IDs and CORS as configured.
pub fn create_app_with_config(coordinator: TransactionCoordinator, config: ServerConfig) -> Router {
    info!(
        mode = %coordinator.mode(),
        documents = coordinator.documents().backend_name(),
        objects = coordinator.objects().backend_name(),
        "Creating REST API server"
    );

    let state = AppState::new(coordinator, config.clone());
    let router = routing::create_routes(state).layer(DefaultBodyLimit::max(config.max_body_size));

    let service_builder = ServiceBuilder::new()
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(config.request_timeout),
        ));

    let router = if config.enable_request_id {
        router
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
    } else {
        router
    };

    // Add CORS if enabled
    let router = if config.enable_cors {
        router.layer(build_cors_layer(&config))
    } else {
        router
    };

    router.layer(service_builder)
}

/// Builds the CORS layer based on configuration.
fn build_cors_layer(config: &ServerConfig) -> CorsLayer {
    let mut cors = CorsLayer::new();

    if config.cors_origins == "*" {
        cors = cors.allow_origin(Any);
    } else {
        let origins: Vec<_> = config
            .cors_origins
            .split(',')
            .filter_map(|s| s.trim().parse().ok())
            .collect();
        cors = cors.allow_origin(origins);
    }

    if config.cors_methods == "*" {
        cors = cors.allow_methods(Any);
    } else {
        let methods: Vec<_> = config
            .cors_methods
            .split(',')
            .filter_map(|s| s.trim().parse().ok())
            .collect();
        cors = cors.allow_methods(methods);
    }

    if config.cors_headers == "*" {
        cors = cors.allow_headers(Any);
    } else {
        let headers: Vec<_> = config
            .cors_headers
            .split(',')
            .filter_map(|s| s.trim().parse().ok())
            .collect();
        cors = cors.allow_headers(headers);
    }

    cors
}

/// Initializes the tracing subscriber for logging.
///
/// `RUST_LOG` takes precedence; otherwise `level` applies to the Tandem
/// crates. This should be called once at application startup.
pub fn init_logging(level: &str) {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "tandem_rest={level},tandem_persistence={level},tower_http=debug"
        ))
    });

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();
}
