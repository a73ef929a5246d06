//! Reverse-order, best-effort compensation.
//!
//! A [`CompensationLog`] records one inverse action per resource that was
//! actually applied to a backend, in application order. The
//! [`CompensationEngine`] walks it backwards and attempts every action even
//! when earlier ones fail. The resulting [`RollbackReport`] lists each
//! resource with its outcome; any failure there needs manual cleanup.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use serde::Serialize;
use tracing::{error, info, warn};

use crate::core::{DocumentStore, ObjectAdapter};
use crate::error::{ResourceError, StorageError, StorageResult};
use crate::types::{Document, ResourceRef, TransactionId};

/// The inverse of one applied write.
#[derive(Debug, Clone, PartialEq)]
pub enum CompensationAction {
    /// Undo an upload.
    DeleteObject { bucket: String, key: String },
    /// Undo a create. Guarded by the version the create produced.
    DeleteDocument {
        collection: String,
        id: String,
        applied_version: u64,
    },
    /// Undo an update by writing the prior payload back.
    RestoreDocument {
        snapshot: Document,
        applied_version: u64,
    },
    /// Undo a delete by recreating the prior payload.
    RecreateDocument { snapshot: Document },
}

impl CompensationAction {
    /// Returns the resource this action targets.
    pub fn resource(&self) -> ResourceRef {
        match self {
            CompensationAction::DeleteObject { bucket, key } => {
                ResourceRef::object(bucket.clone(), key.clone())
            }
            CompensationAction::DeleteDocument { collection, id, .. } => {
                ResourceRef::document(collection.clone(), id.clone())
            }
            CompensationAction::RestoreDocument { snapshot, .. }
            | CompensationAction::RecreateDocument { snapshot } => {
                ResourceRef::document(snapshot.collection(), snapshot.id())
            }
        }
    }

    /// Short name used in reports and logs.
    pub fn name(&self) -> &'static str {
        match self {
            CompensationAction::DeleteObject { .. } | CompensationAction::DeleteDocument { .. } => {
                "delete"
            }
            CompensationAction::RestoreDocument { .. } => "restore",
            CompensationAction::RecreateDocument { .. } => "recreate",
        }
    }
}

/// Ordered list of applied resources and their inverse actions.
#[derive(Debug, Clone, Default)]
pub struct CompensationLog {
    actions: Vec<CompensationAction>,
}

impl CompensationLog {
    /// Creates an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an applied resource.
    pub fn push(&mut self, action: CompensationAction) {
        self.actions.push(action);
    }

    /// Returns the number of recorded resources.
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    /// Returns whether nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Iterates actions in application order.
    pub fn iter(&self) -> impl Iterator<Item = &CompensationAction> {
        self.actions.iter()
    }

    /// Moves the recorded actions out, leaving the log empty.
    pub fn take(&mut self) -> CompensationLog {
        std::mem::take(self)
    }
}

/// Per-resource cleanup outcome as exposed to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RollbackStatus {
    /// The resource was cleaned up.
    Success,
    /// Cleanup failed; manual intervention is required.
    Failed,
}

/// Outcome of one compensation step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum RollbackOutcome {
    /// The step succeeded.
    Success,
    /// The step failed.
    Failed {
        /// Why it failed.
        reason: String,
    },
}

/// One line of a [`RollbackReport`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RollbackEntry {
    /// The resource that was cleaned up.
    pub resource: ResourceRef,
    /// What was attempted (`delete`, `restore`, `recreate`, `discard`).
    pub action: String,
    /// How it went.
    pub outcome: RollbackOutcome,
}

impl RollbackEntry {
    /// Returns whether this step failed.
    pub fn is_failed(&self) -> bool {
        matches!(self.outcome, RollbackOutcome::Failed { .. })
    }
}

/// Result of a rollback, listing entries in the order they were attempted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RollbackReport {
    /// The rolled-back context.
    pub transaction_id: TransactionId,
    /// Attempted steps in execution order.
    pub entries: Vec<RollbackEntry>,
}

impl RollbackReport {
    /// Creates an empty report.
    pub fn new(transaction_id: TransactionId) -> Self {
        Self {
            transaction_id,
            entries: Vec::new(),
        }
    }

    /// Appends a step.
    pub fn record(
        &mut self,
        resource: ResourceRef,
        action: impl Into<String>,
        outcome: RollbackOutcome,
    ) {
        self.entries.push(RollbackEntry {
            resource,
            action: action.into(),
            outcome,
        });
    }

    /// Returns whether every step succeeded.
    pub fn is_complete(&self) -> bool {
        self.entries.iter().all(|e| !e.is_failed())
    }

    /// Returns the failed steps.
    pub fn failures(&self) -> Vec<&RollbackEntry> {
        self.entries.iter().filter(|e| e.is_failed()).collect()
    }

    /// Returns the number of attempted steps.
    pub fn attempted(&self) -> usize {
        self.entries.len()
    }

    /// Maps each touched resource to its status.
    ///
    /// A resource touched more than once is `failed` if any step on it failed.
    pub fn status_map(&self) -> BTreeMap<String, RollbackStatus> {
        let mut map = BTreeMap::new();
        for entry in &self.entries {
            let status = if entry.is_failed() {
                RollbackStatus::Failed
            } else {
                RollbackStatus::Success
            };
            map.entry(entry.resource.to_string())
                .and_modify(|current| {
                    if status == RollbackStatus::Failed {
                        *current = RollbackStatus::Failed;
                    }
                })
                .or_insert(status);
        }
        map
    }
}

/// Executes compensation logs against the adapters.
#[derive(Debug, Clone)]
pub struct CompensationEngine {
    objects: Arc<dyn ObjectAdapter>,
    documents: Arc<dyn DocumentStore>,
}

impl CompensationEngine {
    /// Creates an engine over the given adapters.
    pub fn new(objects: Arc<dyn ObjectAdapter>, documents: Arc<dyn DocumentStore>) -> Self {
        Self { objects, documents }
    }

    /// Compensates `log` in reverse order and returns a fresh report.
    pub async fn compensate(
        &self,
        transaction_id: TransactionId,
        log: CompensationLog,
    ) -> RollbackReport {
        let mut report = RollbackReport::new(transaction_id);
        self.compensate_into(&mut report, log).await;
        report
    }

    /// Compensates `log` in reverse order, appending to `report`.
    pub async fn compensate_into(&self, report: &mut RollbackReport, log: CompensationLog) {
        let transaction_id = report.transaction_id;
        let total = log.len();

        // Version each document was left at by an earlier step of this walk;
        // `None` means the step removed it. Later steps on the same document
        // are guarded by this instead of their forward-write version.
        let mut left_at: HashMap<ResourceRef, Option<u64>> = HashMap::new();

        for action in log.actions.into_iter().rev() {
            let resource = action.resource();
            let guard = left_at.get(&resource).copied().flatten();
            let outcome = match self.apply(&action, guard).await {
                Ok(version) => {
                    left_at.insert(resource.clone(), version);
                    RollbackOutcome::Success
                }
                Err(e) => {
                    warn!(
                        transaction_id = %transaction_id,
                        resource = %resource,
                        action = action.name(),
                        error = %e,
                        "Compensation step failed, continuing"
                    );
                    RollbackOutcome::Failed {
                        reason: e.to_string(),
                    }
                }
            };
            report.record(resource, action.name(), outcome);
        }

        let failures = report.failures();
        if failures.is_empty() {
            info!(transaction_id = %transaction_id, compensated = total, "Compensation complete");
        } else {
            for entry in failures {
                error!(
                    transaction_id = %transaction_id,
                    resource = %entry.resource,
                    "Compensation failed; resource requires manual cleanup"
                );
            }
        }
    }

    /// Runs one inverse action and returns the version the document was
    /// left at (`None` once it is gone, or for objects).
    ///
    /// `guard` overrides the recorded version when an earlier step of the
    /// same walk already rewrote the document.
    async fn apply(
        &self,
        action: &CompensationAction,
        guard: Option<u64>,
    ) -> StorageResult<Option<u64>> {
        match action {
            CompensationAction::DeleteObject { bucket, key } => {
                self.objects.delete(bucket, key).await.map(|_| None)
            }
            CompensationAction::DeleteDocument {
                collection,
                id,
                applied_version,
            } => match self
                .documents
                .delete(collection, id, Some(guard.unwrap_or(*applied_version)))
                .await
            {
                Ok(()) | Err(StorageError::Resource(ResourceError::NotFound { .. })) => Ok(None),
                Err(e) => Err(e),
            },
            CompensationAction::RestoreDocument {
                snapshot,
                applied_version,
            } => self
                .documents
                .update(
                    snapshot.collection(),
                    snapshot.id(),
                    snapshot.data().clone(),
                    Some(guard.unwrap_or(*applied_version)),
                )
                .await
                .map(|doc| Some(doc.version())),
            CompensationAction::RecreateDocument { snapshot } => self
                .documents
                .create(snapshot.collection(), snapshot.id(), snapshot.data().clone())
                .await
                .map(|doc| Some(doc.version())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::memory::MemoryDocumentStore;
    use crate::backends::objects::ObjectStoreAdapter;
    use serde_json::json;

    fn engine(store: &MemoryDocumentStore, objects: &ObjectStoreAdapter) -> CompensationEngine {
        CompensationEngine::new(Arc::new(objects.clone()), Arc::new(store.clone()))
    }

    #[tokio::test]
    async fn test_compensates_in_reverse_order() {
        let store = MemoryDocumentStore::new();
        let objects = ObjectStoreAdapter::in_memory(&["avatars"]);
        objects.put("avatars", "a.png", vec![1]).await.unwrap();
        let user = store.create("users", "u1", json!({})).await.unwrap();

        let mut log = CompensationLog::new();
        log.push(CompensationAction::DeleteObject {
            bucket: "avatars".to_string(),
            key: "a.png".to_string(),
        });
        log.push(CompensationAction::DeleteDocument {
            collection: "users".to_string(),
            id: "u1".to_string(),
            applied_version: user.version(),
        });

        let report = engine(&store, &objects)
            .compensate(TransactionId::new(), log)
            .await;
        assert!(report.is_complete());
        assert_eq!(report.attempted(), 2);
        assert_eq!(report.entries[0].resource.to_string(), "document:users/u1");
        assert_eq!(report.entries[1].resource.to_string(), "object:avatars/a.png");
        assert!(store.read("users", "u1").await.unwrap().is_none());
        assert!(!objects.exists("avatars", "a.png").await.unwrap());
    }

    #[tokio::test]
    async fn test_restore_and_recreate() {
        let store = MemoryDocumentStore::new();
        let objects = ObjectStoreAdapter::in_memory(&["avatars"]);
        let original = store.create("events", "e1", json!({"left": 5})).await.unwrap();
        let applied = store
            .update("events", "e1", json!({"left": 4}), Some(1))
            .await
            .unwrap();
        let doomed = store.create("orders", "o1", json!({"n": 1})).await.unwrap();
        store.delete("orders", "o1", None).await.unwrap();

        let mut log = CompensationLog::new();
        log.push(CompensationAction::RestoreDocument {
            snapshot: original,
            applied_version: applied.version(),
        });
        log.push(CompensationAction::RecreateDocument { snapshot: doomed });

        let report = engine(&store, &objects)
            .compensate(TransactionId::new(), log)
            .await;
        assert!(report.is_complete());
        let event = store.read("events", "e1").await.unwrap().unwrap();
        assert_eq!(event.data()["left"], 5);
        assert_eq!(event.version(), 3);
        assert!(store.read("orders", "o1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_failed_step_does_not_halt_walk() {
        let store = MemoryDocumentStore::new();
        let objects = ObjectStoreAdapter::in_memory(&["avatars"]);
        let original = store.create("events", "e1", json!({"left": 5})).await.unwrap();
        // Someone else wrote after us; restoring would clobber their write
        store.update("events", "e1", json!({"left": 1}), None).await.unwrap();
        store.update("events", "e1", json!({"left": 0}), None).await.unwrap();
        objects.put("avatars", "a.png", vec![1]).await.unwrap();

        let mut log = CompensationLog::new();
        log.push(CompensationAction::DeleteObject {
            bucket: "avatars".to_string(),
            key: "a.png".to_string(),
        });
        log.push(CompensationAction::RestoreDocument {
            snapshot: original,
            applied_version: 2,
        });

        let report = engine(&store, &objects)
            .compensate(TransactionId::new(), log)
            .await;
        assert!(!report.is_complete());
        assert_eq!(report.failures().len(), 1);
        let statuses = report.status_map();
        assert_eq!(statuses["document:events/e1"], RollbackStatus::Failed);
        assert_eq!(statuses["object:avatars/a.png"], RollbackStatus::Success);
        assert!(!objects.exists("avatars", "a.png").await.unwrap());
    }

    #[tokio::test]
    async fn test_repeated_writes_to_one_document_unwind() {
        let store = MemoryDocumentStore::new();
        let objects = ObjectStoreAdapter::in_memory(&["avatars"]);
        let created = store.create("users", "u1", json!({"n": 0})).await.unwrap();
        let first = store
            .update("users", "u1", json!({"n": 1}), Some(created.version()))
            .await
            .unwrap();
        let second = store
            .update("users", "u1", json!({"n": 2}), Some(first.version()))
            .await
            .unwrap();

        let mut log = CompensationLog::new();
        log.push(CompensationAction::DeleteDocument {
            collection: "users".to_string(),
            id: "u1".to_string(),
            applied_version: created.version(),
        });
        log.push(CompensationAction::RestoreDocument {
            snapshot: created.clone(),
            applied_version: first.version(),
        });
        log.push(CompensationAction::RestoreDocument {
            snapshot: first,
            applied_version: second.version(),
        });

        let report = engine(&store, &objects)
            .compensate(TransactionId::new(), log)
            .await;
        assert!(report.is_complete(), "{:?}", report.failures());
        assert_eq!(report.attempted(), 3);
        assert!(store.read("users", "u1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_recreate_then_restore_uses_recreated_version() {
        let store = MemoryDocumentStore::new();
        let objects = ObjectStoreAdapter::in_memory(&["avatars"]);
        let original = store.create("events", "e1", json!({"left": 5})).await.unwrap();
        let updated = store
            .update("events", "e1", json!({"left": 4}), Some(original.version()))
            .await
            .unwrap();
        store.delete("events", "e1", Some(updated.version())).await.unwrap();

        let mut log = CompensationLog::new();
        log.push(CompensationAction::RestoreDocument {
            snapshot: original,
            applied_version: updated.version(),
        });
        log.push(CompensationAction::RecreateDocument { snapshot: updated });

        let report = engine(&store, &objects)
            .compensate(TransactionId::new(), log)
            .await;
        assert!(report.is_complete(), "{:?}", report.failures());
        let event = store.read("events", "e1").await.unwrap().unwrap();
        assert_eq!(event.data()["left"], 5);
    }

    #[test]
    fn test_status_map_failure_wins() {
        let mut report = RollbackReport::new(TransactionId::new());
        let doc = ResourceRef::document("users", "u1");
        report.record(doc.clone(), "discard", RollbackOutcome::Success);
        report.record(
            doc,
            "delete",
            RollbackOutcome::Failed {
                reason: "boom".to_string(),
            },
        );
        assert_eq!(report.status_map()["document:users/u1"], RollbackStatus::Failed);
    }
}
