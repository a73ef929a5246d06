//! In-process document store.
//!
//! Documents live in a map guarded by a single `RwLock`. Native transactions
//! buffer their writes and validate them under the write lock at commit, so
//! the first committer wins.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;

use crate::core::optimistic::{
    BufferedWrite, CommitBackend, CommitPlan, OptimisticTransaction, check_version,
};
use crate::core::{BackendCapability, BackendKind, DocumentStore, DocumentTransaction};
use crate::error::{BackendError, ResourceError, StorageError, StorageResult};
use crate::types::Document;

type Collections = HashMap<String, BTreeMap<String, Document>>;

/// An in-memory [`DocumentStore`].
///
/// Clones share the same data.
#[derive(Debug, Clone)]
pub struct MemoryDocumentStore {
    collections: Arc<RwLock<Collections>>,
    transactions: bool,
}

impl Default for MemoryDocumentStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryDocumentStore {
    /// Creates an empty store with native transaction support.
    pub fn new() -> Self {
        Self {
            collections: Arc::new(RwLock::new(HashMap::new())),
            transactions: true,
        }
    }

    /// Creates an empty store that lacks the staged-commit capability.
    ///
    /// Coordinators in `auto` mode run in fallback mode against it.
    pub fn without_transactions() -> Self {
        Self {
            transactions: false,
            ..Self::new()
        }
    }

    /// Returns every document of a collection, ordered by id.
    pub fn snapshot(&self, collection: &str) -> Vec<Document> {
        self.collections
            .read()
            .get(collection)
            .map(|docs| docs.values().cloned().collect())
            .unwrap_or_default()
    }

    fn lookup(collections: &Collections, collection: &str, id: &str) -> Option<Document> {
        collections.get(collection).and_then(|docs| docs.get(id)).cloned()
    }

    fn lookup_by_field(
        collections: &Collections,
        collection: &str,
        field: &str,
        value: &str,
    ) -> Option<Document> {
        collections
            .get(collection)
            .and_then(|docs| docs.values().find(|d| d.field_matches(field, value)))
            .cloned()
    }

    fn all_by_field(
        collections: &Collections,
        collection: &str,
        field: &str,
        value: &str,
    ) -> Vec<Document> {
        collections
            .get(collection)
            .map(|docs| {
                docs.values()
                    .filter(|d| d.field_matches(field, value))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    fn not_found(collection: &str, id: &str) -> StorageError {
        StorageError::Resource(ResourceError::NotFound {
            collection: collection.to_string(),
            id: id.to_string(),
        })
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    fn kind(&self) -> BackendKind {
        BackendKind::Memory
    }

    fn capabilities(&self) -> Vec<BackendCapability> {
        let mut caps = vec![
            BackendCapability::Crud,
            BackendCapability::FieldLookup,
            BackendCapability::OptimisticLocking,
        ];
        if self.transactions {
            caps.push(BackendCapability::NativeTransactions);
        }
        caps
    }

    async fn health_check(&self) -> StorageResult<()> {
        Ok(())
    }

    async fn read(&self, collection: &str, id: &str) -> StorageResult<Option<Document>> {
        Ok(Self::lookup(&self.collections.read(), collection, id))
    }

    async fn find_by_field(
        &self,
        collection: &str,
        field: &str,
        value: &str,
    ) -> StorageResult<Option<Document>> {
        Ok(Self::lookup_by_field(
            &self.collections.read(),
            collection,
            field,
            value,
        ))
    }

    async fn create(&self, collection: &str, id: &str, data: Value) -> StorageResult<Document> {
        let mut collections = self.collections.write();
        let docs = collections.entry(collection.to_string()).or_default();
        if docs.contains_key(id) {
            return Err(StorageError::Resource(ResourceError::AlreadyExists {
                collection: collection.to_string(),
                id: id.to_string(),
            }));
        }

        let doc = Document::new(collection, id, data);
        docs.insert(id.to_string(), doc.clone());
        Ok(doc)
    }

    async fn update(
        &self,
        collection: &str,
        id: &str,
        data: Value,
        expected_version: Option<u64>,
    ) -> StorageResult<Document> {
        let mut collections = self.collections.write();
        let current = collections
            .get_mut(collection)
            .and_then(|docs| docs.get_mut(id))
            .ok_or_else(|| Self::not_found(collection, id))?;
        check_version(current, expected_version)?;

        let next = current.next_version(data);
        *current = next.clone();
        Ok(next)
    }

    async fn delete(
        &self,
        collection: &str,
        id: &str,
        expected_version: Option<u64>,
    ) -> StorageResult<()> {
        let mut collections = self.collections.write();
        let docs = collections
            .get_mut(collection)
            .ok_or_else(|| Self::not_found(collection, id))?;
        let current = docs.get(id).ok_or_else(|| Self::not_found(collection, id))?;
        check_version(current, expected_version)?;

        docs.remove(id);
        Ok(())
    }

    async fn count(&self, collection: &str) -> StorageResult<u64> {
        Ok(self
            .collections
            .read()
            .get(collection)
            .map(|docs| docs.len() as u64)
            .unwrap_or(0))
    }

    async fn begin_transaction(&self) -> StorageResult<Box<dyn DocumentTransaction>> {
        if !self.transactions {
            return Err(StorageError::Backend(BackendError::UnsupportedCapability {
                backend_name: "memory".to_string(),
                capability: BackendCapability::NativeTransactions.to_string(),
            }));
        }
        Ok(Box::new(OptimisticTransaction::new(self.clone())))
    }
}

#[async_trait]
impl CommitBackend for MemoryDocumentStore {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    async fn fetch(&self, collection: &str, id: &str) -> StorageResult<Option<Document>> {
        Ok(Self::lookup(&self.collections.read(), collection, id))
    }

    async fn fetch_all_by_field(
        &self,
        collection: &str,
        field: &str,
        value: &str,
    ) -> StorageResult<Vec<Document>> {
        Ok(Self::all_by_field(
            &self.collections.read(),
            collection,
            field,
            value,
        ))
    }

    async fn apply(&self, plan: CommitPlan) -> StorageResult<()> {
        let mut collections = self.collections.write();

        {
            let view: &Collections = &collections;
            plan.validate(
                |collection, id| Ok(Self::lookup(view, collection, id).map(|d| d.version())),
                |collection, field, value| {
                    Ok(Self::all_by_field(view, collection, field, value)
                        .iter()
                        .map(|d| d.id().to_string())
                        .collect())
                },
            )?;
        }

        for write in plan.writes {
            match write {
                BufferedWrite::Put(doc) => {
                    collections
                        .entry(doc.collection().to_string())
                        .or_default()
                        .insert(doc.id().to_string(), doc);
                }
                BufferedWrite::Remove { collection, id } => {
                    if let Some(docs) = collections.get_mut(&collection) {
                        docs.remove(&id);
                    }
                }
            }
        }
        Ok(())
    }
}
