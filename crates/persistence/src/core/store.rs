//! Document store traits.
//!
//! [`DocumentStore`] performs writes that are immediately externally visible.
//! Stores declaring [`BackendCapability::NativeTransactions`] also hand out
//! [`DocumentTransaction`]s, whose writes stay private until commit.

use std::fmt::Debug;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{BackendError, StorageError, StorageResult};
use crate::types::Document;

use super::{BackendCapability, BackendKind};

/// Core trait for document stores.
///
/// # Versioning
///
/// Every write bumps the document version by one. `update` and `delete` accept
/// the version the caller observed; when it no longer matches the stored
/// version the write fails with a version conflict.
///
/// # Example
///
/// ```
/// use tandem_persistence::backends::memory::MemoryDocumentStore;
/// use tandem_persistence::core::DocumentStore;
/// use serde_json::json;
///
/// # tokio_test_block_on(async {
/// let store = MemoryDocumentStore::new();
/// let created = store.create("users", "u1", json!({"email": "a@example.com"})).await?;
/// assert_eq!(created.version(), 1);
///
/// let found = store.find_by_field("users", "email", "a@example.com").await?;
/// assert_eq!(found.map(|d| d.id().to_string()), Some("u1".to_string()));
///
/// let updated = store.update("users", "u1", json!({"email": "b@example.com"}), Some(1)).await?;
/// assert_eq!(updated.version(), 2);
/// # Ok::<(), tandem_persistence::error::StorageError>(())
/// # }).unwrap();
/// # fn tokio_test_block_on<F: std::future::Future>(f: F) -> F::Output {
/// #     tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(f)
/// # }
/// ```
#[async_trait]
pub trait DocumentStore: Send + Sync + Debug {
    /// Returns a short name used in errors and logs.
    fn backend_name(&self) -> &'static str;

    /// Returns the backend kind.
    fn kind(&self) -> BackendKind;

    /// Returns the capabilities this store declares.
    fn capabilities(&self) -> Vec<BackendCapability>;

    /// Returns whether a capability is declared.
    fn supports(&self, capability: BackendCapability) -> bool {
        self.capabilities().contains(&capability)
    }

    /// Verifies that the store is reachable.
    async fn health_check(&self) -> StorageResult<()>;

    /// Reads a document by id.
    async fn read(&self, collection: &str, id: &str) -> StorageResult<Option<Document>>;

    /// Returns a document whose top-level `field` equals `value`, if any.
    async fn find_by_field(
        &self,
        collection: &str,
        field: &str,
        value: &str,
    ) -> StorageResult<Option<Document>>;

    /// Creates a document. Fails with `AlreadyExists` when the id is taken.
    async fn create(&self, collection: &str, id: &str, data: Value) -> StorageResult<Document>;

    /// Replaces a document's payload. Fails with `NotFound` when absent.
    async fn update(
        &self,
        collection: &str,
        id: &str,
        data: Value,
        expected_version: Option<u64>,
    ) -> StorageResult<Document>;

    /// Deletes a document. Fails with `NotFound` when absent.
    async fn delete(
        &self,
        collection: &str,
        id: &str,
        expected_version: Option<u64>,
    ) -> StorageResult<()>;

    /// Counts the documents in a collection.
    async fn count(&self, collection: &str) -> StorageResult<u64>;

    /// Begins a native transaction.
    ///
    /// Stores without [`BackendCapability::NativeTransactions`] keep the
    /// default, which reports the capability as unsupported.
    async fn begin_transaction(&self) -> StorageResult<Box<dyn DocumentTransaction>> {
        Err(StorageError::Backend(BackendError::UnsupportedCapability {
            backend_name: self.backend_name().to_string(),
            capability: BackendCapability::NativeTransactions.to_string(),
        }))
    }
}

/// A native document transaction.
///
/// Reads observe this transaction's own staged writes. Nothing becomes
/// externally visible until [`commit`](DocumentTransaction::commit), which
/// fails with a conflict when a concurrent writer changed anything this
/// transaction read, looked up, or wrote. At most one of two transactions
/// racing on the same key commits.
#[async_trait]
pub trait DocumentTransaction: Send + Sync {
    /// Reads a document, observing staged writes.
    async fn read(&mut self, collection: &str, id: &str) -> StorageResult<Option<Document>>;

    /// Field lookup, observing staged writes.
    async fn find_by_field(
        &mut self,
        collection: &str,
        field: &str,
        value: &str,
    ) -> StorageResult<Option<Document>>;

    /// Stages a create.
    async fn create(&mut self, collection: &str, id: &str, data: Value)
    -> StorageResult<Document>;

    /// Stages an update.
    async fn update(
        &mut self,
        collection: &str,
        id: &str,
        data: Value,
        expected_version: Option<u64>,
    ) -> StorageResult<Document>;

    /// Stages a delete.
    async fn delete(
        &mut self,
        collection: &str,
        id: &str,
        expected_version: Option<u64>,
    ) -> StorageResult<()>;

    /// Returns the number of staged writes.
    fn pending_writes(&self) -> usize;

    /// Validates and applies every staged write atomically.
    ///
    /// After calling this, the transaction is consumed and cannot be used again.
    async fn commit(self: Box<Self>) -> StorageResult<()>;

    /// Discards every staged write.
    ///
    /// After calling this, the transaction is consumed and cannot be used again.
    async fn rollback(self: Box<Self>) -> StorageResult<()>;
}
