//! Tandem server
//!
//! Serves the signup and booking workflows over HTTP.

use std::sync::Arc;

use clap::Parser;
use tandem_persistence::TransactionCoordinator;
use tandem_persistence::backends::memory::MemoryDocumentStore;
use tandem_persistence::backends::objects::ObjectStoreAdapter;
use tandem_persistence::core::DocumentStore;
use tandem_rest::{DocumentStoreKind, ServerConfig, create_app_with_config, init_logging};
use tracing::info;

#[cfg(feature = "sqlite")]
use tandem_persistence::backends::sqlite::SqliteDocumentStore;

/// Creates and initializes a SQLite document store from the server configuration.
#[cfg(feature = "sqlite")]
fn create_sqlite_store(config: &ServerConfig) -> anyhow::Result<Arc<dyn DocumentStore>> {
    let db_path = config.database_path();
    info!(database = %db_path, "Initializing SQLite document store");

    let store = if db_path == ":memory:" {
        SqliteDocumentStore::in_memory()?
    } else {
        SqliteDocumentStore::open(db_path)?
    };

    Ok(Arc::new(store))
}

/// Fallback when sqlite feature is not enabled.
#[cfg(not(feature = "sqlite"))]
fn create_sqlite_store(_config: &ServerConfig) -> anyhow::Result<Arc<dyn DocumentStore>> {
    anyhow::bail!(
        "The sqlite document store requires the 'sqlite' feature. \
         Build with: cargo build -p tandem-server --features sqlite"
    )
}

/// Builds the coordinator over the configured adapters.
fn create_coordinator(config: &ServerConfig) -> anyhow::Result<TransactionCoordinator> {
    let documents: Arc<dyn DocumentStore> = match config.document_store {
        DocumentStoreKind::Sqlite => create_sqlite_store(config)?,
        DocumentStoreKind::Memory => {
            info!("Initializing in-memory document store");
            Arc::new(MemoryDocumentStore::new())
        }
    };

    let coordinator_config = config.coordinator_config();
    let objects = ObjectStoreAdapter::from_config(
        &config.object_store_config(),
        &coordinator_config.buckets.names(),
    )?;
    info!(buckets = ?objects.buckets(), "Object storage ready");

    Ok(TransactionCoordinator::new(
        coordinator_config,
        Arc::new(objects),
        documents,
    )?)
}

/// Starts the Axum HTTP server.
async fn serve(app: axum::Router, config: &ServerConfig) -> anyhow::Result<()> {
    let addr = config.socket_addr();
    info!(address = %addr, "Server listening");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("Shutdown signal received");
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ServerConfig::parse();
    init_logging(&config.log_level);

    if let Err(errors) = config.validate() {
        for error in &errors {
            eprintln!("Configuration error: {}", error);
        }
        std::process::exit(1);
    }

    info!(
        port = config.port,
        host = %config.host,
        document_store = %config.document_store,
        mode = ?config.mode,
        "Starting Tandem server"
    );

    let coordinator = create_coordinator(&config)?;
    let app = create_app_with_config(coordinator, config.clone());
    serve(app, &config).await
}
