//! In-memory object store for testing and development

use async_trait::async_trait;
use bytes::Bytes;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use time::OffsetDateTime;

use super::{
    AccessMode, ContainerUsage, ObjectMetadata, ObjectStore, StorageClass, StoreError,
};

const MAX_KEY_LEN: usize = 1024;

#[derive(Debug, Clone)]
struct StoredObject {
    data: Bytes,
    meta: ObjectMetadata,
}

type ContainerMap = HashMap<String, HashMap<String, StoredObject>>;

/// In-memory implementation of the storage contract.
///
/// Objects live in per-container maps behind a single mutex. Besides tests,
/// the worker binary uses this store as its scaffold until a provider
/// adapter is wired in.
#[derive(Debug, Default)]
pub struct MemoryStore {
    containers: Mutex<ContainerMap>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, ContainerMap>, StoreError> {
        self.containers
            .lock()
            .map_err(|_| StoreError::Backend("Lock poisoned".into()))
    }

    fn validate_key(key: &str) -> Result<(), StoreError> {
        if key.is_empty() || key.len() > MAX_KEY_LEN {
            return Err(StoreError::InvalidKey(format!(
                "Key must be between 1 and {} characters",
                MAX_KEY_LEN
            )));
        }
        if key.starts_with('/') || key.contains("..") {
            return Err(StoreError::InvalidKey(
                "Key cannot start with '/' or contain '..'".into(),
            ));
        }
        Ok(())
    }

    fn etag(data: &[u8]) -> String {
        format!("{:x}", Sha256::digest(data))
    }

    /// Rewrite an object's timestamps (useful for exercising age-based
    /// lifecycle rules in tests).
    pub fn backdate(
        &self,
        container: &str,
        key: &str,
        created_at: OffsetDateTime,
        last_modified: OffsetDateTime,
    ) -> Result<(), StoreError> {
        let mut containers = self.lock()?;
        let objects = containers
            .get_mut(container)
            .ok_or_else(|| StoreError::ContainerNotFound(container.to_string()))?;
        let object = objects.get_mut(key).ok_or_else(|| StoreError::NotFound {
            container: container.to_string(),
            key: key.to_string(),
        })?;
        object.meta.created_at = created_at;
        object.meta.last_modified = last_modified;
        Ok(())
    }

    /// Number of objects across all containers (useful for testing).
    pub fn total_objects(&self) -> usize {
        self.containers
            .lock()
            .map(|c| c.values().map(|objects| objects.len()).sum())
            .unwrap_or(0)
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn upload(
        &self,
        container: &str,
        key: &str,
        data: Bytes,
        content_type: &str,
        metadata: Option<HashMap<String, String>>,
    ) -> Result<String, StoreError> {
        Self::validate_key(key)?;
        let mut containers = self.lock()?;
        let objects = containers
            .get_mut(container)
            .ok_or_else(|| StoreError::ContainerNotFound(container.to_string()))?;

        let now = OffsetDateTime::now_utc();
        let created_at = objects
            .get(key)
            .map(|existing| existing.meta.created_at)
            .unwrap_or(now);

        let meta = ObjectMetadata {
            key: key.to_string(),
            size: data.len() as u64,
            content_type: content_type.to_string(),
            etag: Self::etag(&data),
            created_at,
            last_modified: now,
            custom: metadata.unwrap_or_default(),
        };
        objects.insert(key.to_string(), StoredObject { data, meta });

        Ok(format!("memory://{}/{}", container, key))
    }

    async fn download(&self, container: &str, key: &str) -> Result<Bytes, StoreError> {
        let containers = self.lock()?;
        containers
            .get(container)
            .ok_or_else(|| StoreError::ContainerNotFound(container.to_string()))?
            .get(key)
            .map(|object| object.data.clone())
            .ok_or_else(|| StoreError::NotFound {
                container: container.to_string(),
                key: key.to_string(),
            })
    }

    async fn delete(&self, container: &str, key: &str) -> Result<(), StoreError> {
        let mut containers = self.lock()?;
        let objects = containers
            .get_mut(container)
            .ok_or_else(|| StoreError::ContainerNotFound(container.to_string()))?;
        objects.remove(key).ok_or_else(|| StoreError::NotFound {
            container: container.to_string(),
            key: key.to_string(),
        })?;
        Ok(())
    }

    async fn exists(&self, container: &str, key: &str) -> Result<bool, StoreError> {
        let containers = self.lock()?;
        Ok(containers
            .get(container)
            .is_some_and(|objects| objects.contains_key(key)))
    }

    async fn metadata(&self, container: &str, key: &str) -> Result<ObjectMetadata, StoreError> {
        let containers = self.lock()?;
        containers
            .get(container)
            .ok_or_else(|| StoreError::ContainerNotFound(container.to_string()))?
            .get(key)
            .map(|object| object.meta.clone())
            .ok_or_else(|| StoreError::NotFound {
                container: container.to_string(),
                key: key.to_string(),
            })
    }

    async fn list(
        &self,
        container: &str,
        prefix: Option<&str>,
    ) -> Result<Vec<ObjectMetadata>, StoreError> {
        let containers = self.lock()?;
        let objects = containers
            .get(container)
            .ok_or_else(|| StoreError::ContainerNotFound(container.to_string()))?;

        let mut entries: Vec<ObjectMetadata> = objects
            .values()
            .filter(|object| prefix.is_none_or(|p| object.meta.key.starts_with(p)))
            .map(|object| object.meta.clone())
            .collect();
        entries.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(entries)
    }

    async fn presigned_url(
        &self,
        container: &str,
        key: &str,
        ttl: Duration,
        mode: AccessMode,
    ) -> Result<String, StoreError> {
        Self::validate_key(key)?;
        let mode = match mode {
            AccessMode::Read => "read",
            AccessMode::Write => "write",
        };
        Ok(format!(
            "memory://{}/{}?mode={}&expires_in={}",
            container,
            key,
            mode,
            ttl.as_secs()
        ))
    }

    async fn create_container(&self, container: &str) -> Result<(), StoreError> {
        let mut containers = self.lock()?;
        if containers.contains_key(container) {
            return Err(StoreError::ContainerAlreadyExists(container.to_string()));
        }
        containers.insert(container.to_string(), HashMap::new());
        Ok(())
    }

    async fn delete_container(&self, container: &str) -> Result<(), StoreError> {
        let mut containers = self.lock()?;
        containers
            .remove(container)
            .ok_or_else(|| StoreError::ContainerNotFound(container.to_string()))?;
        Ok(())
    }

    async fn container_exists(&self, container: &str) -> Result<bool, StoreError> {
        let containers = self.lock()?;
        Ok(containers.contains_key(container))
    }

    async fn list_containers(&self) -> Result<Vec<String>, StoreError> {
        let containers = self.lock()?;
        let mut names: Vec<String> = containers.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    async fn copy(
        &self,
        src_container: &str,
        src_key: &str,
        dst_container: &str,
        dst_key: &str,
    ) -> Result<(), StoreError> {
        Self::validate_key(dst_key)?;
        let mut containers = self.lock()?;

        let object = containers
            .get(src_container)
            .ok_or_else(|| StoreError::ContainerNotFound(src_container.to_string()))?
            .get(src_key)
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                container: src_container.to_string(),
                key: src_key.to_string(),
            })?;

        let destination = containers
            .get_mut(dst_container)
            .ok_or_else(|| StoreError::ContainerNotFound(dst_container.to_string()))?;

        let mut copied = object;
        copied.meta.key = dst_key.to_string();
        copied.meta.last_modified = OffsetDateTime::now_utc();
        destination.insert(dst_key.to_string(), copied);
        Ok(())
    }

    async fn usage(&self, container: &str) -> Result<ContainerUsage, StoreError> {
        let containers = self.lock()?;
        let objects = containers
            .get(container)
            .ok_or_else(|| StoreError::ContainerNotFound(container.to_string()))?;

        let live = objects.values().filter(|o| !o.meta.is_directory());
        Ok(ContainerUsage {
            container: container.to_string(),
            object_count: live.clone().count() as u64,
            total_bytes: live.map(|o| o.meta.size).sum(),
        })
    }

    async fn set_storage_class(
        &self,
        container: &str,
        key: &str,
        class: StorageClass,
    ) -> Result<(), StoreError> {
        let mut containers = self.lock()?;
        let object = containers
            .get_mut(container)
            .ok_or_else(|| StoreError::ContainerNotFound(container.to_string()))?
            .get_mut(key)
            .ok_or_else(|| StoreError::NotFound {
                container: container.to_string(),
                key: key.to_string(),
            })?;
        object
            .meta
            .custom
            .insert("storage-class".to_string(), class.as_str().to_string());
        Ok(())
    }
}
