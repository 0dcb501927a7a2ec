//! Stevedore is a storage orchestration layer that sits above pluggable
//! cloud object stores and provides backup/disaster-recovery, lifecycle
//! policy enforcement, security gating, and health monitoring for file
//! storage operations.
//!
//! ## Core pieces
//!
//! - [`storage::ObjectStore`] — the uniform contract provider adapters
//!   implement; everything above consumes it as `Arc<dyn ObjectStore>`
//! - [`cache::Cache`] — TTL key/value store backing rate-limit counters
//! - [`security::SecurityService`] — upload/download validation, content
//!   scanning, at-rest encryption, rate limiting, audit trail
//! - [`lifecycle::LifecycleEngine`] — retention/transition policies applied
//!   on a recurring cycle
//! - [`backup::BackupEngine`] — compressed, manifest-described backup sets
//!   with restore, validation and scripted disaster recovery
//! - [`monitor::MonitoringService`] — per-operation metrics, rolling health
//!   and threshold alerts
//! - [`service::StorageService`] — the facade wiring security, storage and
//!   monitoring into one gated data path
//! - [`scheduler`] — the recurring background loops
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use bytes::Bytes;
//! use stevedore::cache::MemoryCache;
//! use stevedore::config::StevedoreConfig;
//! use stevedore::monitor::MonitoringService;
//! use stevedore::security::SecurityService;
//! use stevedore::service::StorageService;
//! use stevedore::storage::{MemoryStore, ObjectStore};
//!
//! # async fn example() -> stevedore::Result<()> {
//! let config = StevedoreConfig::default();
//! let store = Arc::new(MemoryStore::new());
//! store.create_container("packages").await?;
//!
//! let security = Arc::new(SecurityService::new(
//!     config.security,
//!     Arc::new(MemoryCache::new()),
//! )?);
//! let monitor = Arc::new(MonitoringService::new(config.monitor));
//! let service = StorageService::new(store, security, monitor);
//!
//! let uri = service
//!     .upload("packages", "demo.json", Bytes::from_static(b"{}"), "application/json", None)
//!     .await?;
//! println!("stored at {uri}");
//! # Ok(())
//! # }
//! ```

pub mod backup;
pub mod cache;
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod monitor;
pub mod scheduler;
pub mod security;
pub mod service;
pub mod storage;

pub use backup::BackupEngine;
pub use cache::{Cache, MemoryCache};
pub use config::StevedoreConfig;
pub use error::{Result, StevedoreError};
pub use lifecycle::LifecycleEngine;
pub use monitor::MonitoringService;
pub use security::SecurityService;
pub use service::StorageService;
pub use storage::{MemoryStore, ObjectStore};

/// Get the library version
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
