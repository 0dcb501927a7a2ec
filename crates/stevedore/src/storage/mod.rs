//! Storage abstraction consumed by every engine in the crate
//!
//! This module provides the uniform object-store contract and the in-memory
//! implementation used by tests and the worker scaffold. Provider adapters
//! (S3, Azure Blob, MinIO-compatible services) implement [`ObjectStore`]
//! outside this crate.

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

pub mod memory;

pub use memory::MemoryStore;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Object not found: {container}/{key}")]
    NotFound { container: String, key: String },

    #[error("Container not found: {0}")]
    ContainerNotFound(String),

    #[error("Container already exists: {0}")]
    ContainerAlreadyExists(String),

    #[error("Invalid key format: {0}")]
    InvalidKey(String),

    #[error("Operation not supported by this provider: {0}")]
    Unsupported(&'static str),

    #[error("Storage backend error: {0}")]
    Backend(String),
}

/// Metadata describing a single stored object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectMetadata {
    /// Object key within its container
    pub key: String,

    /// Object size in bytes
    pub size: u64,

    /// MIME content type
    pub content_type: String,

    /// Provider entity tag
    pub etag: String,

    /// When the object was first created
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,

    /// When the object content was last replaced
    #[serde(with = "time::serde::rfc3339")]
    pub last_modified: OffsetDateTime,

    /// Free-form provider metadata attached to the object
    #[serde(default)]
    pub custom: HashMap<String, String>,
}

impl ObjectMetadata {
    /// Directory placeholders use a trailing slash and carry no payload.
    pub fn is_directory(&self) -> bool {
        self.key.ends_with('/')
    }
}

/// Access mode requested for a presigned URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessMode {
    Read,
    Write,
}

/// Provider storage tier for lifecycle transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageClass {
    Hot,
    Cool,
    Archive,
}

impl StorageClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hot => "hot",
            Self::Cool => "cool",
            Self::Archive => "archive",
        }
    }
}

/// Aggregate usage numbers for one container.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerUsage {
    pub container: String,
    pub object_count: u64,
    pub total_bytes: u64,
}

/// Per-key outcome of a batch delete.
#[derive(Debug, Default)]
pub struct BatchDelete {
    pub deleted: Vec<String>,
    pub failed: Vec<(String, String)>,
}

impl BatchDelete {
    pub fn all_succeeded(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Uniform contract over cloud object stores.
///
/// Every engine in this crate talks to storage exclusively through this
/// trait, held as an `Arc<dyn ObjectStore>`.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store an object, returning a provider URI for it.
    async fn upload(
        &self,
        container: &str,
        key: &str,
        data: Bytes,
        content_type: &str,
        metadata: Option<HashMap<String, String>>,
    ) -> Result<String, StoreError>;

    /// Retrieve an object's full content.
    async fn download(&self, container: &str, key: &str) -> Result<Bytes, StoreError>;

    /// Retrieve an object into a local file, returning the byte count.
    async fn download_to_file(
        &self,
        container: &str,
        key: &str,
        path: &Path,
    ) -> Result<u64, StoreError> {
        let data = self.download(container, key).await?;
        tokio::fs::write(path, &data).await.map_err(|e| {
            StoreError::Backend(format!("Failed to write '{}': {}", path.display(), e))
        })?;
        Ok(data.len() as u64)
    }

    /// Delete a single object.
    async fn delete(&self, container: &str, key: &str) -> Result<(), StoreError>;

    /// Delete several objects, fanning out concurrently within the container.
    async fn delete_batch(
        &self,
        container: &str,
        keys: &[String],
    ) -> Result<BatchDelete, StoreError> {
        let results =
            futures::future::join_all(keys.iter().map(|key| self.delete(container, key))).await;

        let mut outcome = BatchDelete::default();
        for (key, result) in keys.iter().zip(results) {
            match result {
                Ok(()) => outcome.deleted.push(key.clone()),
                Err(e) => outcome.failed.push((key.clone(), e.to_string())),
            }
        }
        Ok(outcome)
    }

    /// Check whether an object exists.
    async fn exists(&self, container: &str, key: &str) -> Result<bool, StoreError>;

    /// Fetch an object's metadata without its content.
    async fn metadata(&self, container: &str, key: &str) -> Result<ObjectMetadata, StoreError>;

    /// List objects in a container, optionally restricted to a key prefix.
    async fn list(
        &self,
        container: &str,
        prefix: Option<&str>,
    ) -> Result<Vec<ObjectMetadata>, StoreError>;

    /// Generate a presigned URL granting time-limited access to an object.
    async fn presigned_url(
        &self,
        container: &str,
        key: &str,
        ttl: Duration,
        mode: AccessMode,
    ) -> Result<String, StoreError>;

    /// Create a container. Fails if it already exists.
    async fn create_container(&self, container: &str) -> Result<(), StoreError>;

    /// Delete a container and everything in it.
    async fn delete_container(&self, container: &str) -> Result<(), StoreError>;

    /// Check whether a container exists.
    async fn container_exists(&self, container: &str) -> Result<bool, StoreError>;

    /// List all container names.
    async fn list_containers(&self) -> Result<Vec<String>, StoreError>;

    /// Create a container if it does not exist yet.
    async fn ensure_container(&self, container: &str) -> Result<(), StoreError> {
        if !self.container_exists(container).await? {
            self.create_container(container).await?;
        }
        Ok(())
    }

    /// Server-side copy of an object.
    async fn copy(
        &self,
        src_container: &str,
        src_key: &str,
        dst_container: &str,
        dst_key: &str,
    ) -> Result<(), StoreError>;

    /// Report aggregate usage for a container.
    async fn usage(&self, container: &str) -> Result<ContainerUsage, StoreError>;

    /// Move an object to a different storage tier.
    ///
    /// Providers without tiering keep the default, which reports
    /// [`StoreError::Unsupported`].
    async fn set_storage_class(
        &self,
        _container: &str,
        _key: &str,
        _class: StorageClass,
    ) -> Result<(), StoreError> {
        Err(StoreError::Unsupported("storage class transitions"))
    }

    /// Re-encode an object with provider-side compression.
    ///
    /// Providers without re-encoding keep the default, which reports
    /// [`StoreError::Unsupported`].
    async fn compress_object(&self, _container: &str, _key: &str) -> Result<(), StoreError> {
        Err(StoreError::Unsupported("in-place compression"))
    }
}
