//! Uniqueness checks for constrained creates.
//!
//! Inside a native transaction the lookup goes through the transaction, so the
//! store records it and fails the commit if a concurrent writer claims the
//! value first. Without one, the lookup is a direct read retried on transient
//! errors; it is repeated immediately before the write to narrow the race.

use tracing::{debug, warn};

use crate::config::RetryConfig;
use crate::core::{DocumentStore, DocumentTransaction};
use crate::error::{DuplicateError, StorageError, StorageResult};
use crate::types::{ConstraintField, Document, UniquenessConstraint};

/// Evaluates [`UniquenessConstraint`]s.
#[derive(Debug, Clone)]
pub struct ConflictDetector {
    retry: RetryConfig,
}

impl ConflictDetector {
    /// Creates a detector with the given retry policy for direct reads.
    pub fn new(retry: RetryConfig) -> Self {
        Self { retry }
    }

    /// Checks constraints through a native transaction.
    ///
    /// Constraints are checked in order; the first hit is returned.
    pub async fn check_in_transaction(
        &self,
        txn: &mut dyn DocumentTransaction,
        constraints: &[UniquenessConstraint],
    ) -> StorageResult<()> {
        for constraint in constraints {
            let existing = match &constraint.field {
                ConstraintField::DocumentId => txn.read(&constraint.scope, &constraint.value).await?,
                ConstraintField::Attribute(field) => {
                    txn.find_by_field(&constraint.scope, field, &constraint.value)
                        .await?
                }
            };
            if let Some(doc) = existing {
                return Err(duplicate(constraint, &doc));
            }
        }
        Ok(())
    }

    /// Checks constraints with direct reads outside any transaction.
    ///
    /// Transient read errors are retried up to `max_retries` times with a
    /// fixed backoff; other errors are returned immediately.
    pub async fn check_direct(
        &self,
        store: &dyn DocumentStore,
        constraints: &[UniquenessConstraint],
    ) -> StorageResult<()> {
        for constraint in constraints {
            if let Some(doc) = self.lookup_with_retry(store, constraint).await? {
                return Err(duplicate(constraint, &doc));
            }
        }
        Ok(())
    }

    async fn lookup_with_retry(
        &self,
        store: &dyn DocumentStore,
        constraint: &UniquenessConstraint,
    ) -> StorageResult<Option<Document>> {
        let mut attempt = 0u32;
        loop {
            let result = match &constraint.field {
                ConstraintField::DocumentId => store.read(&constraint.scope, &constraint.value).await,
                ConstraintField::Attribute(field) => {
                    store
                        .find_by_field(&constraint.scope, field, &constraint.value)
                        .await
                }
            };

            match result {
                Err(e) if e.is_transient() && attempt < self.retry.max_retries => {
                    attempt += 1;
                    warn!(
                        constraint = %constraint,
                        attempt,
                        error = %e,
                        "Conflict check read failed, retrying"
                    );
                    tokio::time::sleep(self.retry.backoff).await;
                }
                other => {
                    if attempt > 0 {
                        debug!(constraint = %constraint, attempt, "Conflict check settled after retries");
                    }
                    return other;
                }
            }
        }
    }
}

fn duplicate(constraint: &UniquenessConstraint, existing: &Document) -> StorageError {
    StorageError::Duplicate(DuplicateError {
        scope: constraint.scope.clone(),
        field: constraint.field.to_string(),
        value: constraint.value.clone(),
        existing_id: existing.id().to_string(),
    })
}
