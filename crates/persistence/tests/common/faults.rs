//! Fault-injecting adapters.
//!
//! Each wrapper delegates to a real in-process adapter and fails selected
//! calls on demand.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;

use tandem_persistence::backends::memory::MemoryDocumentStore;
use tandem_persistence::backends::objects::ObjectStoreAdapter;
use tandem_persistence::core::{
    BackendCapability, BackendKind, DocumentStore, DocumentTransaction, ObjectAdapter,
};
use tandem_persistence::error::{BackendError, StorageError, StorageResult};
use tandem_persistence::types::{Document, ObjectHandle};

fn injected(backend_name: &str, what: &str) -> StorageError {
    StorageError::Backend(BackendError::Internal {
        backend_name: backend_name.to_string(),
        message: format!("injected failure: {}", what),
        source: None,
    })
}

fn unavailable(backend_name: &str) -> StorageError {
    StorageError::Backend(BackendError::Unavailable {
        backend_name: backend_name.to_string(),
        message: "injected transient failure".to_string(),
    })
}

/// Object adapter that fails puts after a count and deletes of chosen keys.
#[derive(Debug)]
pub struct FaultyObjects {
    inner: ObjectStoreAdapter,
    puts: AtomicUsize,
    fail_put_after: Option<usize>,
    fail_deletes: Mutex<HashSet<String>>,
}

impl FaultyObjects {
    pub fn new(inner: ObjectStoreAdapter) -> Self {
        Self {
            inner,
            puts: AtomicUsize::new(0),
            fail_put_after: None,
            fail_deletes: Mutex::new(HashSet::new()),
        }
    }

    /// Lets `count` puts succeed and fails every later one.
    pub fn fail_put_after(mut self, count: usize) -> Self {
        self.fail_put_after = Some(count);
        self
    }

    /// Fails every delete of `key`.
    pub fn fail_delete(&self, key: impl Into<String>) {
        self.fail_deletes.lock().insert(key.into());
    }

    pub fn inner(&self) -> &ObjectStoreAdapter {
        &self.inner
    }
}

#[async_trait]
impl ObjectAdapter for FaultyObjects {
    fn backend_name(&self) -> &'static str {
        "faulty-objects"
    }

    async fn put(&self, bucket: &str, key: &str, bytes: Vec<u8>) -> StorageResult<ObjectHandle> {
        let n = self.puts.fetch_add(1, Ordering::SeqCst);
        if self.fail_put_after.is_some_and(|limit| n >= limit) {
            return Err(injected(self.backend_name(), "put"));
        }
        self.inner.put(bucket, key, bytes).await
    }

    async fn delete(&self, bucket: &str, key: &str) -> StorageResult<()> {
        if self.fail_deletes.lock().contains(key) {
            return Err(injected(self.backend_name(), "delete"));
        }
        self.inner.delete(bucket, key).await
    }

    async fn exists(&self, bucket: &str, key: &str) -> StorageResult<bool> {
        self.inner.exists(bucket, key).await
    }

    async fn get(&self, bucket: &str, key: &str) -> StorageResult<Option<Vec<u8>>> {
        self.inner.get(bucket, key).await
    }

    async fn list(&self, bucket: &str, prefix: Option<&str>) -> StorageResult<Vec<String>> {
        self.inner.list(bucket, prefix).await
    }
}

/// Document store that fails chosen deletes and creates, fails a number of
/// field lookups transiently, and can slow reads down.
///
/// It never declares native transactions, so coordinators over it run in
/// fallback mode.
#[derive(Debug)]
pub struct FaultyDocuments {
    inner: MemoryDocumentStore,
    fail_deletes: Mutex<HashSet<(String, String)>>,
    fail_creates: Mutex<HashSet<(String, String)>>,
    transient_lookups: AtomicU32,
    read_delay: Mutex<Option<Duration>>,
}

impl FaultyDocuments {
    pub fn new(inner: MemoryDocumentStore) -> Self {
        Self {
            inner,
            fail_deletes: Mutex::new(HashSet::new()),
            fail_creates: Mutex::new(HashSet::new()),
            transient_lookups: AtomicU32::new(0),
            read_delay: Mutex::new(None),
        }
    }

    pub fn fail_delete(&self, collection: &str, id: &str) {
        self.fail_deletes
            .lock()
            .insert((collection.to_string(), id.to_string()));
    }

    pub fn fail_create(&self, collection: &str, id: &str) {
        self.fail_creates
            .lock()
            .insert((collection.to_string(), id.to_string()));
    }

    /// Makes the next `count` field lookups fail with a transient error.
    pub fn flaky_lookups(&self, count: u32) {
        self.transient_lookups.store(count, Ordering::SeqCst);
    }

    /// Delays every read by `delay`.
    pub fn slow_reads(&self, delay: Duration) {
        *self.read_delay.lock() = Some(delay);
    }

    pub fn inner(&self) -> &MemoryDocumentStore {
        &self.inner
    }

    fn key(collection: &str, id: &str) -> (String, String) {
        (collection.to_string(), id.to_string())
    }
}

#[async_trait]
impl DocumentStore for FaultyDocuments {
    fn backend_name(&self) -> &'static str {
        "faulty-documents"
    }

    fn kind(&self) -> BackendKind {
        BackendKind::Custom("faulty-documents")
    }

    fn capabilities(&self) -> Vec<BackendCapability> {
        vec![
            BackendCapability::Crud,
            BackendCapability::FieldLookup,
            BackendCapability::OptimisticLocking,
        ]
    }

    async fn health_check(&self) -> StorageResult<()> {
        self.inner.health_check().await
    }

    async fn read(&self, collection: &str, id: &str) -> StorageResult<Option<Document>> {
        let delay = *self.read_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.inner.read(collection, id).await
    }

    async fn find_by_field(
        &self,
        collection: &str,
        field: &str,
        value: &str,
    ) -> StorageResult<Option<Document>> {
        let remaining = self.transient_lookups.load(Ordering::SeqCst);
        if remaining > 0 {
            self.transient_lookups.store(remaining - 1, Ordering::SeqCst);
            return Err(unavailable(self.backend_name()));
        }
        self.inner.find_by_field(collection, field, value).await
    }

    async fn create(&self, collection: &str, id: &str, data: Value) -> StorageResult<Document> {
        if self.fail_creates.lock().contains(&Self::key(collection, id)) {
            return Err(injected(self.backend_name(), "create"));
        }
        self.inner.create(collection, id, data).await
    }

    async fn update(
        &self,
        collection: &str,
        id: &str,
        data: Value,
        expected_version: Option<u64>,
    ) -> StorageResult<Document> {
        self.inner
            .update(collection, id, data, expected_version)
            .await
    }

    async fn delete(
        &self,
        collection: &str,
        id: &str,
        expected_version: Option<u64>,
    ) -> StorageResult<()> {
        if self.fail_deletes.lock().contains(&Self::key(collection, id)) {
            return Err(injected(self.backend_name(), "delete"));
        }
        self.inner.delete(collection, id, expected_version).await
    }

    async fn count(&self, collection: &str) -> StorageResult<u64> {
        self.inner.count(collection).await
    }

    async fn begin_transaction(&self) -> StorageResult<Box<dyn DocumentTransaction>> {
        Err(StorageError::Backend(BackendError::UnsupportedCapability {
            backend_name: self.backend_name().to_string(),
            capability: BackendCapability::NativeTransactions.to_string(),
        }))
    }
}
