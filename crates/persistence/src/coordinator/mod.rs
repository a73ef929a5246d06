//! Transaction coordination across object storage and the document store.
//!
//! The coordinator implements a two-phase protocol. Objects are uploaded
//! first, since object storage has no staged-transaction concept, and every
//! successful upload is recorded for compensation. Document operations are
//! then staged:
//!
//! - **Native mode**: operations go through a [`DocumentTransaction`]; reads
//!   observe staged writes and uniqueness lookups run inside the transaction,
//!   so the store itself rejects the commit when a concurrent writer wins.
//! - **Fallback mode**: operations are only logged while staging. At commit
//!   they are applied one by one in staging order, each guarded by its
//!   observed version and, for constrained creates, a second uniqueness check
//!   immediately before the write. Each applied write records its inverse.
//!
//! Any failure after a context opens rolls it back before the error is
//! returned: native writes are discarded and the compensation log is walked
//! in reverse. The returned [`TransactionFailure`] carries the
//! [`RollbackReport`].
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use tandem_persistence::backends::memory::MemoryDocumentStore;
//! use tandem_persistence::backends::objects::ObjectStoreAdapter;
//! use tandem_persistence::config::CoordinatorConfig;
//! use tandem_persistence::coordinator::TransactionCoordinator;
//! use tandem_persistence::types::{DocumentWrite, TransactionState, UniquenessConstraint};
//! use serde_json::json;
//!
//! # tokio::runtime::Builder::new_current_thread().enable_time().build().unwrap().block_on(async {
//! let coordinator = TransactionCoordinator::new(
//!     CoordinatorConfig::default(),
//!     Arc::new(ObjectStoreAdapter::in_memory(&["avatars"])),
//!     Arc::new(MemoryDocumentStore::new()),
//! )?;
//!
//! let mut ctx = coordinator.begin(None).await?;
//! coordinator.upload(&mut ctx, "avatars", "users/u1/avatar.png", vec![0x89, 0x50]).await?;
//! coordinator
//!     .stage(
//!         &mut ctx,
//!         DocumentWrite::create("users", "u1", json!({"email": "a@example.com"}))
//!             .with_constraint(UniquenessConstraint::field("users", "email", "a@example.com")),
//!     )
//!     .await?;
//! coordinator.commit(&mut ctx).await?;
//! assert_eq!(ctx.state(), TransactionState::Committed);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! # }).unwrap();
//! ```

mod context;

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use crate::compensation::{
    CompensationAction, CompensationEngine, RollbackOutcome, RollbackReport,
};
use crate::config::{CoordinatorConfig, ModePreference};
use crate::conflict::ConflictDetector;
use crate::core::{BackendCapability, DocumentStore, DocumentTransaction, ObjectAdapter};
use crate::error::{
    BackendError, ConcurrencyError, ResourceError, StorageError, StorageResult, TransactionError,
    TransactionFailure, TransactionResult, ValidationError,
};
use crate::types::{
    Document, DocumentWrite, ExecutionMode, HandleStatus, ObjectHandle, OperationKind, Phase,
    ResourceKind, ResourceRef, StagedOperation, TransactionId, TransactionState,
};

pub use context::TransactionContext;

/// Summary of a committed transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitReceipt {
    /// The committed context.
    pub transaction_id: TransactionId,
    /// How it was committed.
    pub mode: ExecutionMode,
    /// Every resource that is now committed, in staging order.
    pub resources: Vec<ResourceRef>,
}

/// Drives transaction contexts from `begin` to a terminal state.
///
/// The execution mode is resolved once, at construction, from the
/// configuration and the document store's declared capabilities. Clones share
/// the same adapters.
#[derive(Debug, Clone)]
pub struct TransactionCoordinator {
    config: Arc<CoordinatorConfig>,
    objects: Arc<dyn ObjectAdapter>,
    documents: Arc<dyn DocumentStore>,
    mode: ExecutionMode,
    detector: ConflictDetector,
    engine: CompensationEngine,
}

impl TransactionCoordinator {
    /// Creates a coordinator.
    ///
    /// # Errors
    ///
    /// Returns a validation error for an invalid configuration and
    /// `BackendUnavailable` when native mode is required but the document
    /// store does not declare native transactions.
    pub fn new(
        config: CoordinatorConfig,
        objects: Arc<dyn ObjectAdapter>,
        documents: Arc<dyn DocumentStore>,
    ) -> StorageResult<Self> {
        config.validate().map_err(|e| {
            StorageError::Validation(ValidationError::InvalidField {
                field: "coordinator".to_string(),
                message: e.to_string(),
            })
        })?;

        let native = documents.supports(BackendCapability::NativeTransactions);
        let mode = match config.mode {
            ModePreference::Auto if native => ExecutionMode::Native,
            ModePreference::Auto | ModePreference::Fallback => ExecutionMode::Fallback,
            ModePreference::Native if native => ExecutionMode::Native,
            ModePreference::Native => {
                return Err(StorageError::Backend(BackendError::Unavailable {
                    backend_name: documents.backend_name().to_string(),
                    message: "native transactions were required but are not supported"
                        .to_string(),
                }));
            }
        };

        info!(
            mode = %mode,
            documents = documents.backend_name(),
            objects = objects.backend_name(),
            database_id = %config.database_id,
            "Transaction coordinator ready"
        );

        Ok(Self {
            detector: ConflictDetector::new(config.conflict_retry.clone()),
            engine: CompensationEngine::new(objects.clone(), documents.clone()),
            config: Arc::new(config),
            objects,
            documents,
            mode,
        })
    }

    /// Returns the execution mode every context will use.
    pub fn mode(&self) -> ExecutionMode {
        self.mode
    }

    /// Returns the configuration.
    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    /// Returns the document store.
    pub fn documents(&self) -> &Arc<dyn DocumentStore> {
        &self.documents
    }

    /// Returns the object adapter.
    pub fn objects(&self) -> &Arc<dyn ObjectAdapter> {
        &self.objects
    }

    /// Opens a context.
    ///
    /// `ttl` defaults to the configured default and may not exceed the
    /// configured maximum.
    pub async fn begin(&self, ttl: Option<Duration>) -> StorageResult<TransactionContext> {
        let ttl = ttl.unwrap_or(self.config.default_ttl);
        if ttl.is_zero() || ttl > self.config.max_ttl {
            return Err(StorageError::Validation(ValidationError::InvalidTtl {
                ttl_ms: ttl.as_millis() as u64,
                max_ms: self.config.max_ttl.as_millis() as u64,
            }));
        }

        self.documents.health_check().await.map_err(|e| {
            StorageError::Backend(BackendError::Unavailable {
                backend_name: self.documents.backend_name().to_string(),
                message: e.to_string(),
            })
        })?;

        let ctx = TransactionContext::new(self.mode, ttl, self.engine.clone());
        debug!(
            transaction_id = %ctx.id(),
            mode = %self.mode,
            ttl_ms = ttl.as_millis() as u64,
            "Transaction opened"
        );
        Ok(ctx)
    }

    /// Uploads an object and records it for compensation.
    ///
    /// Uploads must happen before any document is read or staged.
    pub async fn upload(
        &self,
        ctx: &mut TransactionContext,
        bucket: &str,
        key: &str,
        bytes: Vec<u8>,
    ) -> TransactionResult<ObjectHandle> {
        self.ensure_open(ctx).await?;
        if !ctx.phase.accepts_uploads() {
            let err = TransactionError::UploadAfterStaging {
                transaction_id: ctx.id.to_string(),
            };
            return Err(self.fail(ctx, err.into()).await);
        }

        ctx.phase = Phase::Uploading;
        let size = bytes.len();
        match self.objects.put(bucket, key, bytes).await {
            Ok(handle) => {
                ctx.append(
                    OperationKind::Create,
                    handle.resource(),
                    json!({ "size": size }),
                    None,
                    Vec::new(),
                );
                ctx.record_applied(CompensationAction::DeleteObject {
                    bucket: bucket.to_string(),
                    key: key.to_string(),
                });
                debug!(transaction_id = %ctx.id, bucket, key, size, "Object uploaded");
                Ok(handle)
            }
            Err(e) => Err(self.fail(ctx, e).await),
        }
    }

    /// Reads a document within the context.
    ///
    /// In native mode the read goes through the transaction and observes
    /// its staged writes; the store also fails the commit if the document
    /// changes before then. In fallback mode the read is direct.
    pub async fn read(
        &self,
        ctx: &mut TransactionContext,
        collection: &str,
        id: &str,
    ) -> TransactionResult<Option<Document>> {
        self.ensure_open(ctx).await?;
        ctx.phase = Phase::Staging;

        let result = match ctx.mode {
            ExecutionMode::Native => match self.native_txn(ctx).await {
                Ok(txn) => txn.read(collection, id).await,
                Err(e) => Err(e),
            },
            ExecutionMode::Fallback => self.documents.read(collection, id).await,
        };

        match result {
            Ok(doc) => Ok(doc),
            Err(e) => Err(self.fail(ctx, e).await),
        }
    }

    /// Appends a document operation to the context's log.
    ///
    /// Constrained creates pass through the conflict detector first; a match
    /// rolls the context back and returns a duplicate error carrying the
    /// existing resource's id.
    pub async fn stage(
        &self,
        ctx: &mut TransactionContext,
        write: DocumentWrite,
    ) -> TransactionResult<StagedOperation> {
        self.ensure_open(ctx).await?;

        let kind = write.kind();
        let target = write.target();
        let result = match ctx.mode {
            ExecutionMode::Native => self.stage_native(ctx, &write).await,
            ExecutionMode::Fallback => self.stage_fallback(ctx, &write).await,
        };
        if let Err(e) = result {
            return Err(self.fail(ctx, e).await);
        }

        let (payload, expected_version, constraints) = match write {
            DocumentWrite::Create {
                data, constraints, ..
            } => (data, None, constraints),
            DocumentWrite::Update {
                data,
                expected_version,
                ..
            } => (data, expected_version, Vec::new()),
            DocumentWrite::Delete {
                expected_version, ..
            } => (Value::Null, expected_version, Vec::new()),
        };

        ctx.phase = Phase::Staging;
        let operation = ctx.append(kind, target, payload, expected_version, constraints);
        debug!(
            transaction_id = %ctx.id,
            sequence = operation.sequence,
            kind = %operation.kind,
            resource = %operation.target,
            "Operation staged"
        );
        Ok(operation)
    }

    /// Commits the context.
    ///
    /// Native mode delegates the atomic apply to the store. Fallback mode
    /// applies each staged document operation in order and compensates
    /// everything applied so far, uploads included, on the first failure.
    pub async fn commit(&self, ctx: &mut TransactionContext) -> TransactionResult<CommitReceipt> {
        self.ensure_open(ctx).await?;
        ctx.phase = Phase::Committing;

        let result = match ctx.mode {
            ExecutionMode::Native => match ctx.native.take() {
                Some(txn) => txn.commit().await,
                None => Ok(()),
            },
            ExecutionMode::Fallback => self.apply_fallback(ctx).await,
        };
        if let Err(e) = result {
            return Err(self.fail(ctx, e).await);
        }

        // Applied resources are now permanent
        ctx.compensations.take();
        ctx.settle(
            TransactionState::Committed,
            Phase::Committed,
            HandleStatus::Committed,
        );
        let resources: Vec<ResourceRef> =
            ctx.operations.iter().map(|op| op.target.clone()).collect();
        info!(
            transaction_id = %ctx.id,
            mode = %ctx.mode,
            resources = resources.len(),
            "Transaction committed"
        );

        Ok(CommitReceipt {
            transaction_id: ctx.id,
            mode: ctx.mode,
            resources,
        })
    }

    /// Rolls the context back at the caller's request.
    ///
    /// Native writes are discarded and every upload is deleted. In fallback
    /// mode nothing else has been applied before commit, so the report lists
    /// the uploads only.
    pub async fn rollback(&self, ctx: &mut TransactionContext) -> TransactionResult<RollbackReport> {
        self.ensure_open(ctx).await?;
        Ok(self.roll_back(ctx, TransactionState::RolledBack).await)
    }

    /// Rolls the context back because of `cause` and wraps both together.
    ///
    /// Used by callers that detect a failure of their own (a missing
    /// document, an exhausted inventory) after the context opened. A context
    /// that is already terminal is left alone.
    pub async fn abort(&self, ctx: &mut TransactionContext, cause: StorageError) -> TransactionFailure {
        if ctx.state.is_terminal() {
            return TransactionFailure::from(cause);
        }
        self.fail(ctx, cause).await
    }

    /// Expires the context: compensates it and returns a timeout failure.
    ///
    /// Called when a caller's deadline elapses; every call against an open
    /// context past its time-to-live lands here too.
    pub async fn expire(&self, ctx: &mut TransactionContext) -> TransactionFailure {
        if ctx.state.is_terminal() {
            return self.invalid_state(ctx).into();
        }

        warn!(
            transaction_id = %ctx.id,
            ttl_ms = ctx.ttl.as_millis() as u64,
            "Transaction expired"
        );
        let report = self.roll_back(ctx, TransactionState::Expired).await;
        TransactionFailure::with_rollback(
            StorageError::Transaction(TransactionError::Timeout {
                transaction_id: ctx.id.to_string(),
                ttl_ms: ctx.ttl.as_millis() as u64,
            }),
            report,
        )
    }

    async fn ensure_open(&self, ctx: &mut TransactionContext) -> TransactionResult<()> {
        if ctx.state.is_terminal() {
            return Err(self.invalid_state(ctx).into());
        }
        if ctx.is_past_deadline() {
            return Err(self.expire(ctx).await);
        }
        Ok(())
    }

    fn invalid_state(&self, ctx: &TransactionContext) -> StorageError {
        StorageError::Transaction(TransactionError::InvalidState {
            transaction_id: ctx.id.to_string(),
            state: ctx.state,
        })
    }

    async fn fail(&self, ctx: &mut TransactionContext, error: StorageError) -> TransactionFailure {
        warn!(
            transaction_id = %ctx.id,
            mode = %ctx.mode,
            phase = %ctx.phase,
            kind = %error.kind(),
            error = %error,
            "Transaction failed, rolling back"
        );
        let report = self.roll_back(ctx, TransactionState::RolledBack).await;
        TransactionFailure::with_rollback(error, report)
    }

    async fn roll_back(
        &self,
        ctx: &mut TransactionContext,
        terminal: TransactionState,
    ) -> RollbackReport {
        ctx.phase = Phase::RollingBack;
        let mut report = RollbackReport::new(ctx.id);

        if ctx.mode == ExecutionMode::Native {
            // A failed commit already consumed the transaction without applying anything
            let outcome = match ctx.native.take() {
                Some(txn) => match txn.rollback().await {
                    Ok(()) => RollbackOutcome::Success,
                    Err(e) => RollbackOutcome::Failed {
                        reason: e.to_string(),
                    },
                },
                None => RollbackOutcome::Success,
            };
            for resource in ctx.staged_documents_rev() {
                report.record(resource, "discard", outcome.clone());
            }
        }

        let log = ctx.compensations.take();
        ctx.engine().compensate_into(&mut report, log).await;

        ctx.settle(terminal, Phase::RolledBack, HandleStatus::Deleted);
        info!(
            transaction_id = %ctx.id,
            state = %terminal,
            compensated = report.attempted(),
            complete = report.is_complete(),
            "Transaction rolled back"
        );
        report
    }

    async fn native_txn<'a>(
        &self,
        ctx: &'a mut TransactionContext,
    ) -> StorageResult<&'a mut Box<dyn DocumentTransaction>> {
        if ctx.native.is_none() {
            let txn = self.documents.begin_transaction().await?;
            debug!(transaction_id = %ctx.id, "Native document transaction opened");
            ctx.native = Some(txn);
        }
        ctx.native.as_mut().ok_or_else(|| {
            StorageError::Backend(BackendError::Internal {
                backend_name: self.documents.backend_name().to_string(),
                message: "native transaction is not open".to_string(),
                source: None,
            })
        })
    }

    async fn stage_native(
        &self,
        ctx: &mut TransactionContext,
        write: &DocumentWrite,
    ) -> StorageResult<()> {
        if !write.constraints().is_empty() {
            ctx.phase = Phase::ConflictChecking;
        }
        let detector = self.detector.clone();
        let txn = self.native_txn(ctx).await?;

        match write {
            DocumentWrite::Create {
                collection,
                id,
                data,
                constraints,
            } => {
                detector
                    .check_in_transaction(txn.as_mut(), constraints)
                    .await?;
                txn.create(collection, id, data.clone()).await?;
            }
            DocumentWrite::Update {
                collection,
                id,
                data,
                expected_version,
            } => {
                txn.update(collection, id, data.clone(), *expected_version)
                    .await?;
            }
            DocumentWrite::Delete {
                collection,
                id,
                expected_version,
            } => {
                txn.delete(collection, id, *expected_version).await?;
            }
        }
        Ok(())
    }

    async fn stage_fallback(
        &self,
        ctx: &mut TransactionContext,
        write: &DocumentWrite,
    ) -> StorageResult<()> {
        if !write.constraints().is_empty() {
            ctx.phase = Phase::ConflictChecking;
            self.detector
                .check_direct(self.documents.as_ref(), write.constraints())
                .await?;
        }
        Ok(())
    }

    async fn apply_fallback(&self, ctx: &mut TransactionContext) -> StorageResult<()> {
        let operations: Vec<StagedOperation> = ctx
            .operations
            .iter()
            .filter(|op| op.resource_kind() == ResourceKind::Document)
            .cloned()
            .collect();

        for op in operations {
            let action = self.apply_direct(&op).await?;
            ctx.record_applied(action);
            debug!(
                transaction_id = %ctx.id,
                sequence = op.sequence,
                resource = %op.target,
                "Operation applied"
            );
        }
        Ok(())
    }

    /// Applies one staged document operation and returns its inverse.
    async fn apply_direct(&self, op: &StagedOperation) -> StorageResult<CompensationAction> {
        let (collection, id) = match &op.target {
            ResourceRef::Document { collection, id } => (collection.as_str(), id.as_str()),
            ResourceRef::Object { .. } => {
                return Err(StorageError::Backend(BackendError::Internal {
                    backend_name: self.documents.backend_name().to_string(),
                    message: format!("{} is not a document operation", op.target),
                    source: None,
                }));
            }
        };

        match op.kind {
            OperationKind::Create => {
                if !op.constraints.is_empty() {
                    self.detector
                        .check_direct(self.documents.as_ref(), &op.constraints)
                        .await?;
                }
                let created = self
                    .documents
                    .create(collection, id, op.payload.clone())
                    .await?;
                Ok(CompensationAction::DeleteDocument {
                    collection: collection.to_string(),
                    id: id.to_string(),
                    applied_version: created.version(),
                })
            }
            OperationKind::Update => {
                let snapshot = self.snapshot(collection, id, op.expected_version).await?;
                let updated = self
                    .documents
                    .update(collection, id, op.payload.clone(), Some(snapshot.version()))
                    .await?;
                Ok(CompensationAction::RestoreDocument {
                    snapshot,
                    applied_version: updated.version(),
                })
            }
            OperationKind::Delete => {
                let snapshot = self.snapshot(collection, id, op.expected_version).await?;
                self.documents
                    .delete(collection, id, Some(snapshot.version()))
                    .await?;
                Ok(CompensationAction::RecreateDocument { snapshot })
            }
        }
    }

    /// Reads the current document and checks it against the staged version.
    async fn snapshot(
        &self,
        collection: &str,
        id: &str,
        expected_version: Option<u64>,
    ) -> StorageResult<Document> {
        let current = self.documents.read(collection, id).await?.ok_or_else(|| {
            StorageError::Resource(ResourceError::NotFound {
                collection: collection.to_string(),
                id: id.to_string(),
            })
        })?;

        if let Some(expected) = expected_version {
            if expected != current.version() {
                return Err(StorageError::Concurrency(ConcurrencyError::VersionConflict {
                    collection: collection.to_string(),
                    id: id.to_string(),
                    expected_version: expected,
                    actual_version: Some(current.version()),
                }));
            }
        }
        Ok(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::memory::MemoryDocumentStore;
    use crate::backends::objects::ObjectStoreAdapter;
    use crate::error::ErrorKind;
    use crate::types::UniquenessConstraint;

    struct Harness {
        coordinator: TransactionCoordinator,
        objects: Arc<ObjectStoreAdapter>,
        documents: Arc<MemoryDocumentStore>,
    }

    fn harness(documents: MemoryDocumentStore) -> Harness {
        let objects = Arc::new(ObjectStoreAdapter::in_memory(&["avatars"]));
        let documents = Arc::new(documents);
        let coordinator = TransactionCoordinator::new(
            CoordinatorConfig::default(),
            objects.clone(),
            documents.clone(),
        )
        .unwrap();
        Harness {
            coordinator,
            objects,
            documents,
        }
    }

    fn user(id: &str, email: &str) -> DocumentWrite {
        DocumentWrite::create("users", id, json!({ "email": email }))
            .with_constraint(UniquenessConstraint::field("users", "email", email))
            .with_constraint(UniquenessConstraint::document_id("users", id))
    }

    #[tokio::test]
    async fn test_mode_follows_capabilities() {
        assert_eq!(
            harness(MemoryDocumentStore::new()).coordinator.mode(),
            ExecutionMode::Native
        );
        assert_eq!(
            harness(MemoryDocumentStore::without_transactions())
                .coordinator
                .mode(),
            ExecutionMode::Fallback
        );
    }

    #[tokio::test]
    async fn test_native_required_without_support() {
        let config = CoordinatorConfig {
            mode: ModePreference::Native,
            ..Default::default()
        };
        let err = TransactionCoordinator::new(
            config,
            Arc::new(ObjectStoreAdapter::in_memory(&["avatars"])),
            Arc::new(MemoryDocumentStore::without_transactions()),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            StorageError::Backend(BackendError::Unavailable { .. })
        ));
    }

    #[tokio::test]
    async fn test_ttl_above_max_is_rejected() {
        let h = harness(MemoryDocumentStore::new());
        let err = h
            .coordinator
            .begin(Some(Duration::from_secs(3600)))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    async fn commit_upload_and_create(h: &Harness) {
        let mut ctx = h.coordinator.begin(None).await.unwrap();
        h.coordinator
            .upload(&mut ctx, "avatars", "users/u1/a.png", vec![1, 2, 3])
            .await
            .unwrap();
        h.coordinator
            .stage(&mut ctx, user("u1", "a@example.com"))
            .await
            .unwrap();
        let receipt = h.coordinator.commit(&mut ctx).await.unwrap();

        assert_eq!(ctx.state(), TransactionState::Committed);
        assert_eq!(ctx.phase(), Phase::Committed);
        assert_eq!(ctx.applied(), 0);
        assert!(
            ctx.handles()
                .iter()
                .all(|h| h.status == HandleStatus::Committed)
        );
        assert_eq!(
            receipt.resources,
            vec![
                ResourceRef::object("avatars", "users/u1/a.png"),
                ResourceRef::document("users", "u1"),
            ]
        );
        assert!(h.objects.exists("avatars", "users/u1/a.png").await.unwrap());
        assert_eq!(h.documents.snapshot("users").len(), 1);
    }

    #[tokio::test]
    async fn test_native_commit() {
        commit_upload_and_create(&harness(MemoryDocumentStore::new())).await;
    }

    #[tokio::test]
    async fn test_fallback_commit() {
        commit_upload_and_create(&harness(MemoryDocumentStore::without_transactions())).await;
    }

    #[tokio::test]
    async fn test_duplicate_rolls_back_uploads() {
        for store in [
            MemoryDocumentStore::new(),
            MemoryDocumentStore::without_transactions(),
        ] {
            let h = harness(store);
            h.documents
                .create("users", "u0", json!({ "email": "a@example.com" }))
                .await
                .unwrap();

            let mut ctx = h.coordinator.begin(None).await.unwrap();
            h.coordinator
                .upload(&mut ctx, "avatars", "users/u1/a.png", vec![1])
                .await
                .unwrap();
            let failure = h
                .coordinator
                .stage(&mut ctx, user("u1", "a@example.com"))
                .await
                .unwrap_err();

            let dup = failure.error.as_duplicate().unwrap();
            assert_eq!(dup.existing_id, "u0");
            let report = failure.rollback.unwrap();
            assert!(report.is_complete());
            assert_eq!(
                report.entries[0].resource,
                ResourceRef::object("avatars", "users/u1/a.png")
            );
            assert_eq!(ctx.state(), TransactionState::RolledBack);
            assert!(!h.objects.exists("avatars", "users/u1/a.png").await.unwrap());
        }
    }

    #[tokio::test]
    async fn test_upload_after_staging_fails() {
        let h = harness(MemoryDocumentStore::new());
        let mut ctx = h.coordinator.begin(None).await.unwrap();
        h.coordinator
            .stage(&mut ctx, user("u1", "a@example.com"))
            .await
            .unwrap();
        let failure = h
            .coordinator
            .upload(&mut ctx, "avatars", "late.png", vec![1])
            .await
            .unwrap_err();

        assert!(matches!(
            failure.error,
            StorageError::Transaction(TransactionError::UploadAfterStaging { .. })
        ));
        assert_eq!(ctx.state(), TransactionState::RolledBack);
        assert!(h.documents.snapshot("users").is_empty());
    }

    #[tokio::test]
    async fn test_terminal_context_rejects_calls() {
        let h = harness(MemoryDocumentStore::new());
        let mut ctx = h.coordinator.begin(None).await.unwrap();
        h.coordinator.commit(&mut ctx).await.unwrap();

        let failure = h.coordinator.commit(&mut ctx).await.unwrap_err();
        assert!(matches!(
            failure.error,
            StorageError::Transaction(TransactionError::InvalidState {
                state: TransactionState::Committed,
                ..
            })
        ));
        assert!(failure.rollback.is_none());
    }

    #[tokio::test]
    async fn test_explicit_rollback_reports_discards() {
        let h = harness(MemoryDocumentStore::new());
        let mut ctx = h.coordinator.begin(None).await.unwrap();
        h.coordinator
            .upload(&mut ctx, "avatars", "a.png", vec![1])
            .await
            .unwrap();
        h.coordinator
            .stage(&mut ctx, user("u1", "a@example.com"))
            .await
            .unwrap();

        let report = h.coordinator.rollback(&mut ctx).await.unwrap();
        let actions: Vec<&str> = report.entries.iter().map(|e| e.action.as_str()).collect();
        assert_eq!(actions, vec!["discard", "delete"]);
        assert!(h.documents.snapshot("users").is_empty());
        assert!(!h.objects.exists("avatars", "a.png").await.unwrap());
        assert!(
            ctx.handles()
                .iter()
                .all(|h| h.status == HandleStatus::Deleted)
        );
    }

    #[tokio::test]
    async fn test_fallback_stale_update_compensates_applied_create() {
        let h = harness(MemoryDocumentStore::without_transactions());
        h.documents
            .create("events", "e1", json!({ "name": "launch" }))
            .await
            .unwrap();

        let mut ctx = h.coordinator.begin(None).await.unwrap();
        h.coordinator
            .stage(&mut ctx, DocumentWrite::create("orders", "o1", json!({})))
            .await
            .unwrap();
        h.coordinator
            .stage(
                &mut ctx,
                DocumentWrite::update("events", "e1", json!({ "name": "changed" }))
                    .expecting_version(1),
            )
            .await
            .unwrap();

        // A concurrent writer bumps the event before commit
        h.documents
            .update("events", "e1", json!({ "name": "other" }), Some(1))
            .await
            .unwrap();

        let failure = h.coordinator.commit(&mut ctx).await.unwrap_err();
        assert_eq!(failure.kind(), ErrorKind::Conflict);
        let report = failure.rollback.unwrap();
        assert_eq!(report.entries.len(), 1);
        assert_eq!(
            report.entries[0].resource,
            ResourceRef::document("orders", "o1")
        );
        assert!(h.documents.snapshot("orders").is_empty());
    }

    #[tokio::test]
    async fn test_native_race_only_one_commits() {
        let h = harness(MemoryDocumentStore::new());
        let mut first = h.coordinator.begin(None).await.unwrap();
        let mut second = h.coordinator.begin(None).await.unwrap();

        h.coordinator
            .stage(&mut first, user("u1", "a@example.com"))
            .await
            .unwrap();
        h.coordinator
            .stage(&mut second, user("u2", "a@example.com"))
            .await
            .unwrap();

        h.coordinator.commit(&mut first).await.unwrap();
        let failure = h.coordinator.commit(&mut second).await.unwrap_err();
        assert_eq!(failure.kind(), ErrorKind::Conflict);
        assert_eq!(h.documents.snapshot("users").len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_context_compensates() {
        let h = harness(MemoryDocumentStore::new());
        let mut ctx = h
            .coordinator
            .begin(Some(Duration::from_secs(1)))
            .await
            .unwrap();
        h.coordinator
            .upload(&mut ctx, "avatars", "a.png", vec![1])
            .await
            .unwrap();

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(ctx.state(), TransactionState::Expired);

        let failure = h
            .coordinator
            .stage(&mut ctx, user("u1", "a@example.com"))
            .await
            .unwrap_err();
        assert_eq!(failure.kind(), ErrorKind::Timeout);
        assert!(failure.rollback.unwrap().is_complete());
        assert!(!h.objects.exists("avatars", "a.png").await.unwrap());
        assert!(h.documents.snapshot("users").is_empty());
    }

    #[tokio::test]
    async fn test_abort_wraps_cause() {
        let h = harness(MemoryDocumentStore::new());
        let mut ctx = h.coordinator.begin(None).await.unwrap();
        h.coordinator
            .upload(&mut ctx, "avatars", "a.png", vec![1])
            .await
            .unwrap();

        let failure = h
            .coordinator
            .abort(
                &mut ctx,
                ResourceError::NotFound {
                    collection: "events".into(),
                    id: "e9".into(),
                }
                .into(),
            )
            .await;
        assert_eq!(failure.kind(), ErrorKind::NotFound);
        assert_eq!(failure.rollback.unwrap().attempted(), 1);
        assert_eq!(ctx.state(), TransactionState::RolledBack);
    }
}
