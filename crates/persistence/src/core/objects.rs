//! Object storage adapter trait.

use std::fmt::Debug;

use async_trait::async_trait;

use crate::error::StorageResult;
use crate::types::ObjectHandle;

/// Uniform operations over binary object storage.
///
/// Object storage has no staged-transaction concept: a successful `put` is
/// immediately visible and can only be undone by `delete`.
#[async_trait]
pub trait ObjectAdapter: Send + Sync + Debug {
    /// Returns a short name used in errors and logs.
    fn backend_name(&self) -> &'static str;

    /// Writes an object, replacing any previous content under the key.
    async fn put(&self, bucket: &str, key: &str, bytes: Vec<u8>) -> StorageResult<ObjectHandle>;

    /// Deletes an object.
    ///
    /// Idempotent: deleting a key that does not exist succeeds and is only
    /// logged.
    async fn delete(&self, bucket: &str, key: &str) -> StorageResult<()>;

    /// Returns whether an object exists.
    async fn exists(&self, bucket: &str, key: &str) -> StorageResult<bool>;

    /// Reads an object's content.
    async fn get(&self, bucket: &str, key: &str) -> StorageResult<Option<Vec<u8>>>;

    /// Lists the keys under `prefix`, sorted.
    ///
    /// Used to audit buckets for objects left behind by failed compensation.
    async fn list(&self, bucket: &str, prefix: Option<&str>) -> StorageResult<Vec<String>>;
}
