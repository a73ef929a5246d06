//! Tandem Persistence Layer
//!
//! This crate coordinates operations that span object storage and a document
//! store so that they either fully succeed or leave no trace. Object storage
//! has no transactions, so uploads are compensated; documents are staged and
//! committed natively when the store supports it, and applied one by one with
//! recorded inverses when it does not.
//!
//! # Features
//!
//! - **Two execution modes**: native document transactions or an ordered
//!   fallback, chosen once from configuration and backend capabilities
//! - **Uniqueness constraints**: checked before staging and, without native
//!   transactions, again immediately before each write
//! - **Compensation**: reverse-order, best-effort, with a per-resource report
//! - **Time-to-live**: an expired context is rolled back like any failure
//! - **Workflows**: user signup and ticket booking
//!
//! # Backend Features
//!
//! ```toml
//! [dependencies]
//! tandem-persistence = { version = "0.1", features = ["s3"] }
//! ```
//!
//! - `sqlite` (default) - SQLite document store with in-memory and file modes
//! - `s3` - AWS S3 object storage
//!
//! # Architecture
//!
//! - [`error`] - Error hierarchy and the failure type carrying rollback reports
//! - [`config`] - Coordinator configuration
//! - [`types`] - Documents, staged operations, resource handles, inventory
//! - [`core`] - Document store and object adapter traits
//! - [`backends`] - In-memory, SQLite and `object_store` implementations
//! - [`conflict`] - Uniqueness checks
//! - [`compensation`] - Compensation log, engine and rollback reports
//! - [`coordinator`] - Transaction contexts and the coordinator
//! - [`workflows`] - Signup and booking
//! - [`response`] - The caller-facing response envelope
//!
//! # Quick Start
//!
//! ```
//! use std::sync::Arc;
//! use tandem_persistence::backends::memory::MemoryDocumentStore;
//! use tandem_persistence::backends::objects::ObjectStoreAdapter;
//! use tandem_persistence::config::CoordinatorConfig;
//! use tandem_persistence::coordinator::TransactionCoordinator;
//! use tandem_persistence::response::{ErrorCode, OperationResponse};
//! use tandem_persistence::workflows::{SignupRequest, SignupWorkflow};
//!
//! # tokio::runtime::Builder::new_current_thread().enable_time().build().unwrap().block_on(async {
//! let config = CoordinatorConfig::default();
//! let objects = ObjectStoreAdapter::in_memory(&config.buckets.names());
//! let coordinator = TransactionCoordinator::new(
//!     config,
//!     Arc::new(objects),
//!     Arc::new(MemoryDocumentStore::new()),
//! )
//! .unwrap();
//!
//! let signup = SignupWorkflow::new(coordinator);
//! let request = SignupRequest {
//!     user_id: Some("u1".into()),
//!     email: Some("ada@example.com".into()),
//!     display_name: Some("Ada".into()),
//!     ..Default::default()
//! };
//!
//! let outcome = signup.execute(&request).await.unwrap();
//! assert_eq!(outcome.user_id, "u1");
//!
//! // The same request again collides on the email
//! let failure = signup.execute(&request).await.unwrap_err();
//! let response = OperationResponse::from(failure);
//! assert_eq!(response.code, Some(ErrorCode::DuplicateEmail));
//! # });
//! ```

#![warn(rustdoc::missing_crate_level_docs)]

pub mod backends;
pub mod compensation;
pub mod config;
pub mod conflict;
pub mod coordinator;
pub mod core;
pub mod error;
pub mod response;
pub mod types;
pub mod workflows;

// Re-export commonly used types at crate root
pub use config::CoordinatorConfig;
pub use coordinator::{CommitReceipt, TransactionContext, TransactionCoordinator};
pub use error::{StorageError, StorageResult, TransactionFailure, TransactionResult};
pub use response::{ErrorCode, OperationResponse};

// Re-export core traits
pub use core::{BackendCapability, BackendKind, DocumentStore, DocumentTransaction, ObjectAdapter};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name.
pub const NAME: &str = env!("CARGO_PKG_NAME");
