//! Native transaction support for the SQLite backend.
//!
//! Writes are buffered in an [`OptimisticTransaction`] and applied inside a
//! single `BEGIN IMMEDIATE` transaction at commit, after every recorded read
//! and lookup has been re-validated under the database write lock.

use async_trait::async_trait;
use rusqlite::TransactionBehavior;
use tracing::debug;

use crate::core::optimistic::{BufferedWrite, CommitBackend, CommitPlan};
use crate::error::StorageResult;
use crate::types::Document;

use super::SqliteDocumentStore;
use super::backend::{fetch, fetch_all_by_field, map_sqlite_error, put, remove};

#[async_trait]
impl CommitBackend for SqliteDocumentStore {
    fn backend_name(&self) -> &'static str {
        "sqlite"
    }

    async fn fetch(&self, collection: &str, id: &str) -> StorageResult<Option<Document>> {
        let conn = self.get_connection()?;
        fetch(&conn, collection, id)
    }

    async fn fetch_all_by_field(
        &self,
        collection: &str,
        field: &str,
        value: &str,
    ) -> StorageResult<Vec<Document>> {
        let conn = self.get_connection()?;
        fetch_all_by_field(&conn, collection, field, value)
    }

    async fn apply(&self, plan: CommitPlan) -> StorageResult<()> {
        let mut conn = self.get_connection()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(map_sqlite_error)?;

        plan.validate(
            |collection, id| Ok(fetch(&tx, collection, id)?.map(|d| d.version())),
            |collection, field, value| {
                Ok(fetch_all_by_field(&tx, collection, field, value)?
                    .iter()
                    .map(|d| d.id().to_string())
                    .collect())
            },
        )?;

        let writes = plan.writes.len();
        for write in &plan.writes {
            match write {
                BufferedWrite::Put(doc) => put(&tx, doc)?,
                BufferedWrite::Remove { collection, id } => remove(&tx, collection, id)?,
            }
        }

        tx.commit().map_err(map_sqlite_error)?;
        debug!(writes, "SQLite transaction committed");
        Ok(())
    }
}
