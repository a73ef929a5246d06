//! Buffered optimistic transactions shared by the document stores.
//!
//! Writes are kept in a private overlay until commit. Every committed value
//! the transaction observed (by id or by field lookup) is recorded, and the
//! backend re-validates all of them under its own write lock before applying
//! the buffered writes. A mismatch means a concurrent writer got there first
//! and the commit fails with a conflict.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::error::{ConcurrencyError, ResourceError, StorageError, StorageResult};
use crate::types::Document;

use super::DocumentTransaction;

/// A committed version observed by id. `None` means the document was absent.
#[derive(Debug, Clone)]
pub(crate) struct ReadRecord {
    pub collection: String,
    pub id: String,
    pub version: Option<u64>,
}

/// A committed field lookup and every id it matched, in id order.
#[derive(Debug, Clone)]
pub(crate) struct LookupRecord {
    pub collection: String,
    pub field: String,
    pub value: String,
    pub matched: Vec<String>,
}

/// A write to apply at commit.
#[derive(Debug, Clone)]
pub(crate) enum BufferedWrite {
    Put(Document),
    Remove { collection: String, id: String },
}

/// Everything a backend needs to validate and apply a commit.
#[derive(Debug, Clone, Default)]
pub(crate) struct CommitPlan {
    pub reads: Vec<ReadRecord>,
    pub lookups: Vec<LookupRecord>,
    pub writes: Vec<BufferedWrite>,
}

impl CommitPlan {
    /// Re-checks every observation against the current committed state.
    ///
    /// Backends call this while holding their write lock.
    pub fn validate<V, M>(&self, mut current_version: V, mut current_match: M) -> StorageResult<()>
    where
        V: FnMut(&str, &str) -> StorageResult<Option<u64>>,
        M: FnMut(&str, &str, &str) -> StorageResult<Vec<String>>,
    {
        for read in &self.reads {
            let now = current_version(&read.collection, &read.id)?;
            if now != read.version {
                return Err(StorageError::Concurrency(ConcurrencyError::Conflict {
                    collection: read.collection.clone(),
                    id: read.id.clone(),
                    message: "document changed since it was read".to_string(),
                }));
            }
        }

        for lookup in &self.lookups {
            let now = current_match(&lookup.collection, &lookup.field, &lookup.value)?;
            if now != lookup.matched {
                return Err(StorageError::Concurrency(ConcurrencyError::Conflict {
                    collection: lookup.collection.clone(),
                    id: lookup.value.clone(),
                    message: format!("lookup on '{}' changed since it was read", lookup.field),
                }));
            }
        }

        Ok(())
    }
}

/// Committed-state access a backend provides to [`OptimisticTransaction`].
#[async_trait]
pub(crate) trait CommitBackend: Send + Sync + 'static {
    fn backend_name(&self) -> &'static str;

    async fn fetch(&self, collection: &str, id: &str) -> StorageResult<Option<Document>>;

    /// Every committed document whose `field` equals `value`, in id order.
    async fn fetch_all_by_field(
        &self,
        collection: &str,
        field: &str,
        value: &str,
    ) -> StorageResult<Vec<Document>>;

    /// Validates the plan and applies its writes atomically.
    async fn apply(&self, plan: CommitPlan) -> StorageResult<()>;
}

type Key = (String, String);

/// A native transaction over any [`CommitBackend`].
pub(crate) struct OptimisticTransaction<B: CommitBackend> {
    backend: B,
    overlay: HashMap<Key, Option<Document>>,
    observed: HashMap<Key, Option<u64>>,
    plan: CommitPlan,
}

impl<B: CommitBackend> OptimisticTransaction<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            overlay: HashMap::new(),
            observed: HashMap::new(),
            plan: CommitPlan::default(),
        }
    }

    fn key(collection: &str, id: &str) -> Key {
        (collection.to_string(), id.to_string())
    }

    async fn current(&mut self, collection: &str, id: &str) -> StorageResult<Option<Document>> {
        let key = Self::key(collection, id);
        if let Some(staged) = self.overlay.get(&key) {
            return Ok(staged.clone());
        }

        let committed = self.backend.fetch(collection, id).await?;
        let version = committed.as_ref().map(Document::version);
        if !self.observed.contains_key(&key) {
            self.observed.insert(key, version);
            self.plan.reads.push(ReadRecord {
                collection: collection.to_string(),
                id: id.to_string(),
                version,
            });
        }
        Ok(committed)
    }

    fn stage(&mut self, collection: &str, id: &str, doc: Option<Document>) {
        let write = match &doc {
            Some(doc) => BufferedWrite::Put(doc.clone()),
            None => BufferedWrite::Remove {
                collection: collection.to_string(),
                id: id.to_string(),
            },
        };
        self.overlay.insert(Self::key(collection, id), doc);
        self.plan.writes.push(write);
    }
}

#[async_trait]
impl<B: CommitBackend> DocumentTransaction for OptimisticTransaction<B> {
    async fn read(&mut self, collection: &str, id: &str) -> StorageResult<Option<Document>> {
        self.current(collection, id).await
    }

    async fn find_by_field(
        &mut self,
        collection: &str,
        field: &str,
        value: &str,
    ) -> StorageResult<Option<Document>> {
        let staged = self
            .overlay
            .iter()
            .filter(|((c, _), _)| c == collection)
            .find_map(|(_, doc)| doc.as_ref().filter(|d| d.field_matches(field, value)));
        if let Some(doc) = staged {
            return Ok(Some(doc.clone()));
        }

        let committed = self
            .backend
            .fetch_all_by_field(collection, field, value)
            .await?;
        self.plan.lookups.push(LookupRecord {
            collection: collection.to_string(),
            field: field.to_string(),
            value: value.to_string(),
            matched: committed.iter().map(|d| d.id().to_string()).collect(),
        });

        // Committed hits this transaction rewrote are answered by the overlay above
        Ok(committed
            .into_iter()
            .find(|d| !self.overlay.contains_key(&Self::key(collection, d.id()))))
    }

    async fn create(
        &mut self,
        collection: &str,
        id: &str,
        data: Value,
    ) -> StorageResult<Document> {
        if self.current(collection, id).await?.is_some() {
            return Err(StorageError::Resource(ResourceError::AlreadyExists {
                collection: collection.to_string(),
                id: id.to_string(),
            }));
        }

        let doc = Document::new(collection, id, data);
        self.stage(collection, id, Some(doc.clone()));
        Ok(doc)
    }

    async fn update(
        &mut self,
        collection: &str,
        id: &str,
        data: Value,
        expected_version: Option<u64>,
    ) -> StorageResult<Document> {
        let current = self.current(collection, id).await?.ok_or_else(|| {
            StorageError::Resource(ResourceError::NotFound {
                collection: collection.to_string(),
                id: id.to_string(),
            })
        })?;
        check_version(&current, expected_version)?;

        let doc = current.next_version(data);
        self.stage(collection, id, Some(doc.clone()));
        Ok(doc)
    }

    async fn delete(
        &mut self,
        collection: &str,
        id: &str,
        expected_version: Option<u64>,
    ) -> StorageResult<()> {
        let current = self.current(collection, id).await?.ok_or_else(|| {
            StorageError::Resource(ResourceError::NotFound {
                collection: collection.to_string(),
                id: id.to_string(),
            })
        })?;
        check_version(&current, expected_version)?;

        self.stage(collection, id, None);
        Ok(())
    }

    fn pending_writes(&self) -> usize {
        self.plan.writes.len()
    }

    async fn commit(self: Box<Self>) -> StorageResult<()> {
        let this = *self;
        debug!(
            backend = this.backend.backend_name(),
            reads = this.plan.reads.len(),
            lookups = this.plan.lookups.len(),
            writes = this.plan.writes.len(),
            "Committing native transaction"
        );
        this.backend.apply(this.plan).await
    }

    async fn rollback(self: Box<Self>) -> StorageResult<()> {
        debug!(
            backend = self.backend.backend_name(),
            discarded = self.plan.writes.len(),
            "Discarding native transaction"
        );
        Ok(())
    }
}

/// Checks an optimistic version guard against the current document.
pub(crate) fn check_version(current: &Document, expected: Option<u64>) -> StorageResult<()> {
    match expected {
        Some(expected) if expected != current.version() => {
            Err(StorageError::Concurrency(ConcurrencyError::VersionConflict {
                collection: current.collection().to_string(),
                id: current.id().to_string(),
                expected_version: expected,
                actual_version: Some(current.version()),
            }))
        }
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_validate_detects_changed_read() {
        let plan = CommitPlan {
            reads: vec![ReadRecord {
                collection: "events".to_string(),
                id: "e1".to_string(),
                version: Some(1),
            }],
            ..Default::default()
        };

        assert!(plan.validate(|_, _| Ok(Some(1)), |_, _, _| Ok(Vec::new())).is_ok());
        let err = plan
            .validate(|_, _| Ok(Some(2)), |_, _, _| Ok(Vec::new()))
            .unwrap_err();
        assert!(matches!(
            err,
            StorageError::Concurrency(ConcurrencyError::Conflict { .. })
        ));
    }

    #[test]
    fn test_validate_detects_new_lookup_match() {
        let plan = CommitPlan {
            lookups: vec![LookupRecord {
                collection: "users".to_string(),
                field: "email".to_string(),
                value: "a@example.com".to_string(),
                matched: Vec::new(),
            }],
            ..Default::default()
        };

        let err = plan
            .validate(|_, _| Ok(None), |_, _, _| Ok(vec!["u2".to_string()]))
            .unwrap_err();
        assert!(err.to_string().contains("lookup on 'email'"));
    }

    #[test]
    fn test_check_version() {
        let doc = Document::new("events", "e1", json!({}));
        assert!(check_version(&doc, None).is_ok());
        assert!(check_version(&doc, Some(1)).is_ok());
        assert!(check_version(&doc, Some(2)).is_err());
    }
}
