//! Orchestrating facade over the storage, security and monitoring layers
//!
//! Gated data flow: uploads pass the security pipeline and optional at-rest
//! encryption before hitting the store; downloads run the inverse.
//! Every operation is measured through a monitoring guard.

use bytes::Bytes;
use std::sync::Arc;
use tracing::warn;

use crate::error::Result;
use crate::monitor::MonitoringService;
use crate::security::{SecurityError, SecurityService};
use crate::storage::{BatchDelete, ObjectStore};

/// Caller identity attached to gated operations.
#[derive(Debug, Clone)]
pub struct ClientContext {
    pub client_id: String,
    pub ip: Option<String>,
}

impl ClientContext {
    pub fn new(client_id: impl Into<String>, ip: Option<String>) -> Self {
        Self {
            client_id: client_id.into(),
            ip,
        }
    }
}

/// Storage operations with security gating and monitoring applied.
pub struct StorageService {
    store: Arc<dyn ObjectStore>,
    security: Arc<SecurityService>,
    monitor: Arc<MonitoringService>,
}

impl StorageService {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        security: Arc<SecurityService>,
        monitor: Arc<MonitoringService>,
    ) -> Self {
        Self {
            store,
            security,
            monitor,
        }
    }

    /// Access the underlying store for operations without gating semantics.
    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }

    pub fn security(&self) -> &Arc<SecurityService> {
        &self.security
    }

    pub fn monitor(&self) -> &Arc<MonitoringService> {
        &self.monitor
    }

    /// Validate, optionally encrypt, store, and meter one upload.
    pub async fn upload(
        &self,
        container: &str,
        key: &str,
        data: Bytes,
        content_type: &str,
        client: Option<&ClientContext>,
    ) -> Result<String> {
        let guard = self
            .monitor
            .start_operation("upload", container, Some(key.to_string()));
        let ip = client.and_then(|c| c.ip.as_deref());

        let outcome = self
            .security
            .validate_upload(key, &data, content_type, ip)
            .await;
        if !outcome.valid {
            guard.failure("validation");
            return Err(SecurityError::Rejected {
                violations: outcome.violations,
            }
            .into());
        }

        if let Some(client) = client {
            match self.security.rate_limit_status(&client.client_id).await {
                Ok(status) if !status.allowed => {
                    guard.failure("rate_limit");
                    return Err(SecurityError::RateLimited(client.client_id.clone()).into());
                }
                Ok(_) => {}
                Err(e) => {
                    guard.failure("cache");
                    return Err(e.into());
                }
            }
        }

        let plain_len = data.len() as u64;
        let sealed = match self.security.encrypt(data) {
            Ok(sealed) => sealed,
            Err(e) => {
                guard.failure("encryption");
                return Err(e.into());
            }
        };

        match self
            .store
            .upload(container, key, sealed, content_type, None)
            .await
        {
            Ok(uri) => {
                self.bump_rate_limit(client).await;
                guard.success(plain_len);
                Ok(uri)
            }
            Err(e) => {
                guard.failure(e.to_string());
                Err(e.into())
            }
        }
    }

    /// Validate, fetch, optionally decrypt, and meter one download.
    pub async fn download(
        &self,
        container: &str,
        key: &str,
        client: Option<&ClientContext>,
    ) -> Result<Bytes> {
        let guard = self
            .monitor
            .start_operation("download", container, Some(key.to_string()));
        let ip = client.and_then(|c| c.ip.as_deref());

        let outcome = self.security.validate_download(container, key, ip).await;
        if !outcome.valid {
            guard.failure("validation");
            return Err(SecurityError::Rejected {
                violations: outcome.violations,
            }
            .into());
        }

        let sealed = match self.store.download(container, key).await {
            Ok(sealed) => sealed,
            Err(e) => {
                guard.failure(e.to_string());
                return Err(e.into());
            }
        };
        match self.security.decrypt(sealed) {
            Ok(data) => {
                self.bump_rate_limit(client).await;
                guard.success(data.len() as u64);
                Ok(data)
            }
            Err(e) => {
                guard.failure("decryption");
                Err(e.into())
            }
        }
    }

    /// Delete one object, metered.
    pub async fn delete(&self, container: &str, key: &str) -> Result<()> {
        let guard = self
            .monitor
            .start_operation("delete", container, Some(key.to_string()));
        match self.store.delete(container, key).await {
            Ok(()) => {
                guard.success(0);
                Ok(())
            }
            Err(e) => {
                guard.failure(e.to_string());
                Err(e.into())
            }
        }
    }

    /// Delete several objects, metered as one batch operation.
    pub async fn delete_batch(&self, container: &str, keys: &[String]) -> Result<BatchDelete> {
        let guard = self.monitor.start_operation("delete_batch", container, None);
        match self.store.delete_batch(container, keys).await {
            Ok(outcome) => {
                if outcome.all_succeeded() {
                    guard.success(0);
                } else {
                    guard.failure("partial");
                }
                Ok(outcome)
            }
            Err(e) => {
                guard.failure(e.to_string());
                Err(e.into())
            }
        }
    }

    async fn bump_rate_limit(&self, client: Option<&ClientContext>) {
        if let Some(client) = client {
            // Best-effort: a broken counter must not fail the operation.
            if let Err(e) = self.security.update_rate_limit(&client.client_id).await {
                warn!(client = %client.client_id, error = %e, "rate limit counter update failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::config::{MonitorConfig, SecurityConfig};
    use crate::error::StevedoreError;
    use crate::storage::MemoryStore;
    use base64::Engine;

    fn build(config: SecurityConfig) -> (Arc<MemoryStore>, StorageService) {
        let store = Arc::new(MemoryStore::new());
        let security =
            Arc::new(SecurityService::new(config, Arc::new(MemoryCache::new())).unwrap());
        let monitor = Arc::new(MonitoringService::new(MonitorConfig::default()));
        let service = StorageService::new(store.clone(), security, monitor);
        (store, service)
    }

    fn encrypting_config() -> SecurityConfig {
        SecurityConfig {
            enable_encryption: true,
            encryption_key_base64: Some(
                base64::engine::general_purpose::STANDARD.encode([9u8; 32]),
            ),
            ..SecurityConfig::default()
        }
    }

    #[tokio::test]
    async fn test_rejected_upload_never_reaches_store() {
        let (store, service) = build(SecurityConfig::default());
        store.create_container("pkgs").await.unwrap();

        let result = service
            .upload(
                "pkgs",
                "malware.exe",
                Bytes::from_static(b"MZ"),
                "application/zip",
                None,
            )
            .await;

        match result {
            Err(StevedoreError::Security(SecurityError::Rejected { violations })) => {
                assert!(violations.iter().any(|v| v.contains("extension")));
            }
            other => panic!("expected rejection, got {:?}", other.map(|_| ())),
        }
        assert!(!store.exists("pkgs", "malware.exe").await.unwrap());

        let metrics = service.monitor().metrics(std::time::Duration::from_secs(60));
        assert_eq!(metrics.failures, 1);
    }

    #[tokio::test]
    async fn test_upload_download_roundtrip_with_encryption() {
        let (store, service) = build(encrypting_config());
        store.create_container("pkgs").await.unwrap();

        let body = Bytes::from_static(b"registry package payload");
        service
            .upload("pkgs", "pkg.zip", body.clone(), "application/zip", None)
            .await
            .unwrap();

        // At rest the payload is ciphertext.
        let at_rest = store.download("pkgs", "pkg.zip").await.unwrap();
        assert_ne!(at_rest, body);

        let served = service.download("pkgs", "pkg.zip", None).await.unwrap();
        assert_eq!(served, body);
    }

    #[tokio::test]
    async fn test_rate_limited_client_is_refused() {
        let config = SecurityConfig {
            rate_limit_max_per_window: 2,
            ..SecurityConfig::default()
        };
        let (store, service) = build(config);
        store.create_container("pkgs").await.unwrap();
        let client = ClientContext::new("cli-1", None);

        for i in 0..2 {
            service
                .upload(
                    "pkgs",
                    &format!("f{}.json", i),
                    Bytes::from_static(b"{}"),
                    "application/json",
                    Some(&client),
                )
                .await
                .unwrap();
        }

        let result = service
            .upload(
                "pkgs",
                "f3.json",
                Bytes::from_static(b"{}"),
                "application/json",
                Some(&client),
            )
            .await;
        assert!(matches!(
            result,
            Err(StevedoreError::Security(SecurityError::RateLimited(_)))
        ));
    }

    #[tokio::test]
    async fn test_every_operation_is_metered() {
        let (store, service) = build(SecurityConfig::default());
        store.create_container("pkgs").await.unwrap();

        service
            .upload("pkgs", "a.json", Bytes::from_static(b"{}"), "application/json", None)
            .await
            .unwrap();
        service.download("pkgs", "a.json", None).await.unwrap();
        service.delete("pkgs", "a.json").await.unwrap();

        let metrics = service.monitor().metrics(std::time::Duration::from_secs(60));
        assert_eq!(metrics.total_operations, 3);
        assert_eq!(metrics.failures, 0);
        assert!(metrics.per_operation.contains_key("upload"));
        assert!(metrics.per_operation.contains_key("download"));
        assert!(metrics.per_operation.contains_key("delete"));
    }
}
