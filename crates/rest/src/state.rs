//! Application state for the Tandem HTTP API.
//!
//! This module defines the shared application state that is available to all
//! request handlers: the transaction coordinator, the workflows built on it,
//! and the server configuration.

use std::sync::Arc;

use tandem_persistence::TransactionCoordinator;
use tandem_persistence::workflows::{BookingWorkflow, SignupWorkflow};

use crate::config::ServerConfig;

/// Shared application state for the REST API.
///
/// Cloning is cheap; the coordinator and workflows share their adapters.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use tandem_persistence::TransactionCoordinator;
/// use tandem_persistence::backends::memory::MemoryDocumentStore;
/// use tandem_persistence::backends::objects::ObjectStoreAdapter;
/// use tandem_rest::{AppState, ServerConfig};
///
/// let config = ServerConfig::for_testing();
/// let coordinator_config = config.coordinator_config();
/// let objects = ObjectStoreAdapter::in_memory(&coordinator_config.buckets.names());
/// let coordinator = TransactionCoordinator::new(
///     coordinator_config,
///     Arc::new(objects),
///     Arc::new(MemoryDocumentStore::new()),
/// )
/// .unwrap();
///
/// let state = AppState::new(coordinator, config);
/// assert_eq!(state.coordinator().mode().to_string(), "native");
/// ```
#[derive(Debug, Clone)]
pub struct AppState {
    /// The transaction coordinator.
    coordinator: TransactionCoordinator,

    signup: SignupWorkflow,

    booking: BookingWorkflow,

    /// Server configuration.
    config: Arc<ServerConfig>,
}

impl AppState {
    /// Creates a new AppState around the given coordinator.
    pub fn new(coordinator: TransactionCoordinator, config: ServerConfig) -> Self {
        Self {
            signup: SignupWorkflow::new(coordinator.clone()),
            booking: BookingWorkflow::new(coordinator.clone()),
            coordinator,
            config: Arc::new(config),
        }
    }

    /// Returns the transaction coordinator.
    pub fn coordinator(&self) -> &TransactionCoordinator {
        &self.coordinator
    }

    /// Returns the signup workflow.
    pub fn signup(&self) -> &SignupWorkflow {
        &self.signup
    }

    /// Returns the booking workflow.
    pub fn booking(&self) -> &BookingWorkflow {
        &self.booking
    }

    /// Returns a reference to the server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}
