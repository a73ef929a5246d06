//! SQLite document store implementation.

use std::fmt::Debug;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{Connection, ErrorCode, OptionalExtension, TransactionBehavior, params};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::optimistic::{OptimisticTransaction, check_version};
use crate::core::{BackendCapability, BackendKind, DocumentStore, DocumentTransaction};
use crate::error::{BackendError, ResourceError, StorageError, StorageResult, ValidationError};
use crate::types::Document;

use super::schema;

/// SQLite-backed [`DocumentStore`].
///
/// Documents are stored as JSON text in a single `documents` table keyed by
/// `(collection, id)`. Field lookups use `json_extract` and compare the
/// textual value of the field.
#[derive(Clone)]
pub struct SqliteDocumentStore {
    pool: Pool<SqliteConnectionManager>,
    config: SqliteBackendConfig,
    is_memory: bool,
}

impl Debug for SqliteDocumentStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteDocumentStore")
            .field("config", &self.config)
            .field("is_memory", &self.is_memory)
            .finish_non_exhaustive()
    }
}

/// Configuration for the SQLite backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SqliteBackendConfig {
    /// Maximum number of connections in the pool.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum number of idle connections.
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    /// Connection timeout in milliseconds.
    #[serde(default = "default_connection_timeout_ms")]
    pub connection_timeout_ms: u64,

    /// SQLite busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u32,

    /// Enable WAL mode for better concurrency.
    #[serde(default = "default_true")]
    pub enable_wal: bool,
}

fn default_max_connections() -> u32 {
    10
}

fn default_min_connections() -> u32 {
    1
}

fn default_connection_timeout_ms() -> u64 {
    30000
}

fn default_busy_timeout_ms() -> u32 {
    5000
}

fn default_true() -> bool {
    true
}

impl Default for SqliteBackendConfig {
    fn default() -> Self {
        Self {
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
            connection_timeout_ms: default_connection_timeout_ms(),
            busy_timeout_ms: default_busy_timeout_ms(),
            enable_wal: true,
        }
    }
}

impl SqliteDocumentStore {
    /// Creates a new in-memory store.
    ///
    /// Every SQLite in-memory connection is its own database, so the pool is
    /// limited to a single connection.
    pub fn in_memory() -> StorageResult<Self> {
        let config = SqliteBackendConfig {
            max_connections: 1,
            min_connections: 1,
            ..Default::default()
        };
        Self::build(SqliteConnectionManager::memory(), config, true)
    }

    /// Opens or creates a file-based database.
    pub fn open<P: AsRef<Path>>(path: P) -> StorageResult<Self> {
        Self::with_config(path, SqliteBackendConfig::default())
    }

    /// Creates a store with custom configuration.
    pub fn with_config<P: AsRef<Path>>(
        path: P,
        config: SqliteBackendConfig,
    ) -> StorageResult<Self> {
        Self::build(SqliteConnectionManager::file(path.as_ref()), config, false)
    }

    fn build(
        manager: SqliteConnectionManager,
        config: SqliteBackendConfig,
        is_memory: bool,
    ) -> StorageResult<Self> {
        let busy_timeout = Duration::from_millis(config.busy_timeout_ms as u64);
        let enable_wal = config.enable_wal && !is_memory;
        let manager = manager.with_init(move |conn| {
            conn.busy_timeout(busy_timeout)?;
            if enable_wal {
                conn.pragma_update_and_check(None, "journal_mode", "WAL", |_| Ok(()))?;
            }
            Ok(())
        });

        let pool = Pool::builder()
            .max_size(config.max_connections)
            .min_idle(Some(config.min_connections))
            .connection_timeout(Duration::from_millis(config.connection_timeout_ms))
            .build(manager)
            .map_err(|e| {
                StorageError::Backend(BackendError::ConnectionFailed {
                    backend_name: "sqlite".to_string(),
                    message: e.to_string(),
                })
            })?;

        let store = Self {
            pool,
            config,
            is_memory,
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Initialize the database schema.
    pub fn init_schema(&self) -> StorageResult<()> {
        let conn = self.get_connection()?;
        schema::initialize_schema(&conn)
    }

    /// Get a connection from the pool.
    pub(crate) fn get_connection(
        &self,
    ) -> StorageResult<PooledConnection<SqliteConnectionManager>> {
        self.pool.get().map_err(|e| {
            StorageError::Backend(BackendError::ConnectionFailed {
                backend_name: "sqlite".to_string(),
                message: e.to_string(),
            })
        })
    }

    /// Returns whether this is an in-memory database.
    pub fn is_memory(&self) -> bool {
        self.is_memory
    }

    /// Returns the backend configuration.
    pub fn config(&self) -> &SqliteBackendConfig {
        &self.config
    }
}

/// Maps a SQLite error, classifying lock contention as transient.
pub(crate) fn map_sqlite_error(e: rusqlite::Error) -> StorageError {
    match e.sqlite_error_code() {
        Some(ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked) => {
            StorageError::Backend(BackendError::Unavailable {
                backend_name: "sqlite".to_string(),
                message: e.to_string(),
            })
        }
        _ => StorageError::from(e),
    }
}

fn parse_timestamp(raw: &str) -> StorageResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| {
            StorageError::Backend(BackendError::SerializationError {
                message: format!("invalid timestamp '{}': {}", raw, e),
            })
        })
}

/// Builds the JSON path for a top-level field, rejecting anything else.
fn field_path(field: &str) -> StorageResult<String> {
    let valid = !field.is_empty()
        && field
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_');
    if !valid {
        return Err(StorageError::Validation(ValidationError::InvalidField {
            field: field.to_string(),
            message: "lookup fields must be top-level identifiers".to_string(),
        }));
    }
    Ok(format!("$.{}", field))
}

type DocumentRow = (String, String, i64, String, String, String);

fn row_to_document(row: DocumentRow) -> StorageResult<Document> {
    let (collection, id, version, data, created_at, updated_at) = row;
    let data: Value = serde_json::from_str(&data)?;
    Ok(Document::from_parts(
        collection,
        id,
        version as u64,
        data,
        parse_timestamp(&created_at)?,
        parse_timestamp(&updated_at)?,
    ))
}

fn read_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<DocumentRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
    ))
}

pub(crate) fn fetch(
    conn: &Connection,
    collection: &str,
    id: &str,
) -> StorageResult<Option<Document>> {
    conn.query_row(
        "SELECT collection, id, version, data, created_at, updated_at
         FROM documents WHERE collection = ?1 AND id = ?2",
        params![collection, id],
        read_row,
    )
    .optional()
    .map_err(map_sqlite_error)?
    .map(row_to_document)
    .transpose()
}

pub(crate) fn fetch_by_field(
    conn: &Connection,
    collection: &str,
    field: &str,
    value: &str,
) -> StorageResult<Option<Document>> {
    let path = field_path(field)?;
    conn.query_row(
        "SELECT collection, id, version, data, created_at, updated_at
         FROM documents
         WHERE collection = ?1 AND CAST(json_extract(data, ?2) AS TEXT) = ?3
         ORDER BY id LIMIT 1",
        params![collection, path, value],
        read_row,
    )
    .optional()
    .map_err(map_sqlite_error)?
    .map(row_to_document)
    .transpose()
}

pub(crate) fn fetch_all_by_field(
    conn: &Connection,
    collection: &str,
    field: &str,
    value: &str,
) -> StorageResult<Vec<Document>> {
    let path = field_path(field)?;
    let mut stmt = conn
        .prepare(
            "SELECT collection, id, version, data, created_at, updated_at
             FROM documents
             WHERE collection = ?1 AND CAST(json_extract(data, ?2) AS TEXT) = ?3
             ORDER BY id",
        )
        .map_err(map_sqlite_error)?;
    let rows = stmt
        .query_map(params![collection, path, value], read_row)
        .map_err(map_sqlite_error)?;

    let mut docs = Vec::new();
    for row in rows {
        docs.push(row_to_document(row.map_err(map_sqlite_error)?)?);
    }
    Ok(docs)
}

/// Inserts or replaces a document row.
pub(crate) fn put(conn: &Connection, doc: &Document) -> StorageResult<()> {
    let data = serde_json::to_string(doc.data())?;
    conn.execute(
        "INSERT OR REPLACE INTO documents (collection, id, version, data, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            doc.collection(),
            doc.id(),
            doc.version() as i64,
            data,
            doc.created_at().to_rfc3339(),
            doc.updated_at().to_rfc3339(),
        ],
    )
    .map_err(map_sqlite_error)?;
    Ok(())
}

pub(crate) fn remove(conn: &Connection, collection: &str, id: &str) -> StorageResult<()> {
    conn.execute(
        "DELETE FROM documents WHERE collection = ?1 AND id = ?2",
        params![collection, id],
    )
    .map_err(map_sqlite_error)?;
    Ok(())
}

fn not_found(collection: &str, id: &str) -> StorageError {
    StorageError::Resource(ResourceError::NotFound {
        collection: collection.to_string(),
        id: id.to_string(),
    })
}

#[async_trait]
impl DocumentStore for SqliteDocumentStore {
    fn backend_name(&self) -> &'static str {
        "sqlite"
    }

    fn kind(&self) -> BackendKind {
        BackendKind::Sqlite
    }

    fn capabilities(&self) -> Vec<BackendCapability> {
        vec![
            BackendCapability::Crud,
            BackendCapability::FieldLookup,
            BackendCapability::OptimisticLocking,
            BackendCapability::NativeTransactions,
        ]
    }

    async fn health_check(&self) -> StorageResult<()> {
        let conn = self.get_connection()?;
        conn.query_row("SELECT 1", [], |_| Ok(()))
            .map_err(map_sqlite_error)
    }

    async fn read(&self, collection: &str, id: &str) -> StorageResult<Option<Document>> {
        let conn = self.get_connection()?;
        fetch(&conn, collection, id)
    }

    async fn find_by_field(
        &self,
        collection: &str,
        field: &str,
        value: &str,
    ) -> StorageResult<Option<Document>> {
        let conn = self.get_connection()?;
        fetch_by_field(&conn, collection, field, value)
    }

    async fn create(&self, collection: &str, id: &str, data: Value) -> StorageResult<Document> {
        let conn = self.get_connection()?;
        let doc = Document::new(collection, id, data);
        let payload = serde_json::to_string(doc.data())?;

        let result = conn.execute(
            "INSERT INTO documents (collection, id, version, data, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                collection,
                id,
                doc.version() as i64,
                payload,
                doc.created_at().to_rfc3339(),
                doc.updated_at().to_rfc3339(),
            ],
        );

        match result {
            Ok(_) => Ok(doc),
            Err(e) if e.sqlite_error_code() == Some(ErrorCode::ConstraintViolation) => {
                Err(StorageError::Resource(ResourceError::AlreadyExists {
                    collection: collection.to_string(),
                    id: id.to_string(),
                }))
            }
            Err(e) => Err(map_sqlite_error(e)),
        }
    }

    async fn update(
        &self,
        collection: &str,
        id: &str,
        data: Value,
        expected_version: Option<u64>,
    ) -> StorageResult<Document> {
        let mut conn = self.get_connection()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(map_sqlite_error)?;

        let current = fetch(&tx, collection, id)?.ok_or_else(|| not_found(collection, id))?;
        check_version(&current, expected_version)?;

        let next = current.next_version(data);
        put(&tx, &next)?;
        tx.commit().map_err(map_sqlite_error)?;
        Ok(next)
    }

    async fn delete(
        &self,
        collection: &str,
        id: &str,
        expected_version: Option<u64>,
    ) -> StorageResult<()> {
        let mut conn = self.get_connection()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(map_sqlite_error)?;

        let current = fetch(&tx, collection, id)?.ok_or_else(|| not_found(collection, id))?;
        check_version(&current, expected_version)?;

        remove(&tx, collection, id)?;
        tx.commit().map_err(map_sqlite_error)?;
        Ok(())
    }

    async fn count(&self, collection: &str) -> StorageResult<u64> {
        let conn = self.get_connection()?;
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM documents WHERE collection = ?1",
                params![collection],
                |row| row.get(0),
            )
            .map_err(map_sqlite_error)?;
        Ok(count as u64)
    }

    async fn begin_transaction(&self) -> StorageResult<Box<dyn DocumentTransaction>> {
        Ok(Box::new(OptimisticTransaction::new(self.clone())))
    }
}
