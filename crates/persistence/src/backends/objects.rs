//! Object storage adapter over `object_store`.
//!
//! One [`ObjectStore`] is kept per configured bucket. The same adapter serves
//! in-memory stores (tests), a local directory per bucket, or S3 buckets
//! (feature `s3`).

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use futures::TryStreamExt;
use object_store::local::LocalFileSystem;
use object_store::memory::InMemory;
use object_store::path::Path;
use object_store::{ObjectMeta, ObjectStore, PutPayload};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::ObjectAdapter;
use crate::error::{BackendError, StorageError, StorageResult};
use crate::types::ObjectHandle;

/// Which object storage to build.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ObjectStoreConfig {
    /// In-process storage, lost on exit.
    #[default]
    Memory,
    /// One directory per bucket under `root`.
    Local {
        /// Parent directory of the bucket directories.
        root: PathBuf,
    },
    /// Amazon S3 or an S3-compatible service.
    #[cfg(feature = "s3")]
    S3(S3ObjectConfig),
}

/// S3 connection settings shared by every bucket.
#[cfg(feature = "s3")]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct S3ObjectConfig {
    /// S3 region.
    #[serde(default = "default_region")]
    pub region: String,

    /// Optional custom endpoint (for MinIO or S3-compatible services).
    #[serde(default)]
    pub endpoint: Option<String>,

    /// Optional static access key ID.
    #[serde(default)]
    pub access_key_id: Option<String>,

    /// Optional static secret access key.
    #[serde(default)]
    pub secret_access_key: Option<String>,

    /// Whether HTTP is allowed (useful for local MinIO).
    #[serde(default)]
    pub allow_http: bool,

    /// Whether virtual-hosted-style requests should be used.
    #[serde(default)]
    pub virtual_hosted_style_request: bool,
}

#[cfg(feature = "s3")]
fn default_region() -> String {
    "us-east-1".to_string()
}

/// [`ObjectAdapter`] backed by one `object_store` instance per bucket.
#[derive(Debug, Clone)]
pub struct ObjectStoreAdapter {
    stores: HashMap<String, Arc<dyn ObjectStore>>,
    backend_name: &'static str,
}

impl ObjectStoreAdapter {
    /// Builds stores for `buckets` from configuration.
    pub fn from_config<S: AsRef<str>>(
        config: &ObjectStoreConfig,
        buckets: &[S],
    ) -> StorageResult<Self> {
        let mut stores: HashMap<String, Arc<dyn ObjectStore>> = HashMap::new();
        let backend_name = match config {
            ObjectStoreConfig::Memory => "memory",
            ObjectStoreConfig::Local { .. } => "local",
            #[cfg(feature = "s3")]
            ObjectStoreConfig::S3(_) => "s3",
        };

        for bucket in buckets {
            let bucket = bucket.as_ref();
            let store: Arc<dyn ObjectStore> = match config {
                ObjectStoreConfig::Memory => Arc::new(InMemory::new()),
                ObjectStoreConfig::Local { root } => build_local(root, bucket)?,
                #[cfg(feature = "s3")]
                ObjectStoreConfig::S3(s3) => build_s3(s3, bucket)?,
            };
            stores.insert(bucket.to_string(), store);
        }

        Ok(Self {
            stores,
            backend_name,
        })
    }

    /// Creates in-memory stores for `buckets`.
    pub fn in_memory<S: AsRef<str>>(buckets: &[S]) -> Self {
        let stores = buckets
            .iter()
            .map(|b| {
                let store: Arc<dyn ObjectStore> = Arc::new(InMemory::new());
                (b.as_ref().to_string(), store)
            })
            .collect();
        Self {
            stores,
            backend_name: "memory",
        }
    }

    /// Registers (or replaces) the store serving `bucket`.
    pub fn with_store(mut self, bucket: impl Into<String>, store: Arc<dyn ObjectStore>) -> Self {
        self.stores.insert(bucket.into(), store);
        self
    }

    /// Returns the configured bucket names.
    pub fn buckets(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.stores.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    fn store(&self, bucket: &str, key: &str) -> StorageResult<&Arc<dyn ObjectStore>> {
        self.stores.get(bucket).ok_or_else(|| {
            StorageError::Backend(BackendError::ObjectStore {
                bucket: bucket.to_string(),
                key: key.to_string(),
                message: "bucket is not configured".to_string(),
            })
        })
    }
}

fn object_error(bucket: &str, key: &str, e: object_store::Error) -> StorageError {
    StorageError::Backend(BackendError::ObjectStore {
        bucket: bucket.to_string(),
        key: key.to_string(),
        message: e.to_string(),
    })
}

fn build_local(root: &std::path::Path, bucket: &str) -> StorageResult<Arc<dyn ObjectStore>> {
    let dir = root.join(bucket);
    std::fs::create_dir_all(&dir).map_err(|e| {
        StorageError::Backend(BackendError::ConnectionFailed {
            backend_name: "local".to_string(),
            message: format!("failed to create bucket directory {}: {}", dir.display(), e),
        })
    })?;

    let store = LocalFileSystem::new_with_prefix(&dir).map_err(|e| {
        StorageError::Backend(BackendError::ConnectionFailed {
            backend_name: "local".to_string(),
            message: format!("failed to open bucket '{bucket}': {e}"),
        })
    })?;
    Ok(Arc::new(store))
}

#[cfg(feature = "s3")]
fn build_s3(config: &S3ObjectConfig, bucket: &str) -> StorageResult<Arc<dyn ObjectStore>> {
    use object_store::aws::AmazonS3Builder;

    let mut builder = AmazonS3Builder::new()
        .with_region(&config.region)
        .with_bucket_name(bucket)
        .with_allow_http(config.allow_http)
        .with_virtual_hosted_style_request(config.virtual_hosted_style_request);

    if let Some(endpoint) = &config.endpoint {
        builder = builder.with_endpoint(endpoint);
    }

    if let Some(access_key_id) = &config.access_key_id {
        builder = builder.with_access_key_id(access_key_id);
    }

    if let Some(secret_access_key) = &config.secret_access_key {
        builder = builder.with_secret_access_key(secret_access_key);
    }

    let store = builder.build().map_err(|e| {
        StorageError::Backend(BackendError::ConnectionFailed {
            backend_name: "s3".to_string(),
            message: format!("failed to build S3 store for bucket '{bucket}': {e}"),
        })
    })?;

    Ok(Arc::new(store))
}

#[async_trait]
impl ObjectAdapter for ObjectStoreAdapter {
    fn backend_name(&self) -> &'static str {
        self.backend_name
    }

    async fn put(&self, bucket: &str, key: &str, bytes: Vec<u8>) -> StorageResult<ObjectHandle> {
        let store = self.store(bucket, key)?;
        let size = bytes.len();
        let result = store
            .put(&Path::from(key), PutPayload::from(bytes))
            .await
            .map_err(|e| object_error(bucket, key, e))?;

        Ok(ObjectHandle {
            bucket: bucket.to_string(),
            key: key.to_string(),
            size,
            e_tag: result.e_tag,
        })
    }

    async fn delete(&self, bucket: &str, key: &str) -> StorageResult<()> {
        let store = self.store(bucket, key)?;
        match store.delete(&Path::from(key)).await {
            Ok(()) => Ok(()),
            Err(object_store::Error::NotFound { .. }) => {
                debug!(bucket, key, "Object already absent, nothing to delete");
                Ok(())
            }
            Err(e) => Err(object_error(bucket, key, e)),
        }
    }

    async fn exists(&self, bucket: &str, key: &str) -> StorageResult<bool> {
        let store = self.store(bucket, key)?;
        match store.head(&Path::from(key)).await {
            Ok(_) => Ok(true),
            Err(object_store::Error::NotFound { .. }) => Ok(false),
            Err(e) => Err(object_error(bucket, key, e)),
        }
    }

    async fn get(&self, bucket: &str, key: &str) -> StorageResult<Option<Vec<u8>>> {
        let store = self.store(bucket, key)?;
        let result = match store.get(&Path::from(key)).await {
            Ok(result) => result,
            Err(object_store::Error::NotFound { .. }) => return Ok(None),
            Err(e) => return Err(object_error(bucket, key, e)),
        };
        let bytes = result
            .bytes()
            .await
            .map_err(|e| object_error(bucket, key, e))?;
        Ok(Some(bytes.to_vec()))
    }

    async fn list(&self, bucket: &str, prefix: Option<&str>) -> StorageResult<Vec<String>> {
        let label = prefix.unwrap_or("");
        let store = self.store(bucket, label)?;
        let prefix = prefix.map(Path::from);
        let objects: Vec<ObjectMeta> = store
            .list(prefix.as_ref())
            .try_collect()
            .await
            .map_err(|e| object_error(bucket, label, e))?;

        let mut keys: Vec<String> = objects
            .into_iter()
            .map(|meta| meta.location.to_string())
            .collect();
        keys.sort_unstable();
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_get_delete() {
        let adapter = ObjectStoreAdapter::in_memory(&["avatars"]);
        let handle = adapter
            .put("avatars", "users/u1/a.png", vec![1, 2, 3])
            .await
            .unwrap();
        assert_eq!(handle.size, 3);
        assert!(adapter.exists("avatars", "users/u1/a.png").await.unwrap());
        assert_eq!(
            adapter.get("avatars", "users/u1/a.png").await.unwrap(),
            Some(vec![1, 2, 3])
        );

        adapter.delete("avatars", "users/u1/a.png").await.unwrap();
        assert!(!adapter.exists("avatars", "users/u1/a.png").await.unwrap());
    }

    #[tokio::test]
    async fn test_list_by_prefix() {
        let adapter = ObjectStoreAdapter::in_memory(&["avatars"]);
        for key in ["users/u2/a.png", "users/u1/a.png", "orders/o1/qr"] {
            adapter.put("avatars", key, vec![0]).await.unwrap();
        }

        assert_eq!(
            adapter.list("avatars", Some("users")).await.unwrap(),
            vec!["users/u1/a.png", "users/u2/a.png"]
        );
        assert_eq!(adapter.list("avatars", None).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let config = ObjectStoreConfig::Local {
            root: dir.path().to_path_buf(),
        };
        let adapter = ObjectStoreAdapter::from_config(&config, &["tickets"]).unwrap();
        assert_eq!(adapter.backend_name(), "local");

        adapter.delete("tickets", "never/written.png").await.unwrap();
        adapter.put("tickets", "t/1.png", vec![9]).await.unwrap();
        assert!(dir.path().join("tickets").join("t").join("1.png").exists());
        adapter.delete("tickets", "t/1.png").await.unwrap();
        adapter.delete("tickets", "t/1.png").await.unwrap();
    }

    #[tokio::test]
    async fn test_unknown_bucket() {
        let adapter = ObjectStoreAdapter::in_memory(&["avatars"]);
        let err = adapter.put("qr", "k", vec![]).await.unwrap_err();
        assert!(err.to_string().contains("bucket is not configured"));
        assert_eq!(adapter.buckets(), vec!["avatars"]);
    }
}
