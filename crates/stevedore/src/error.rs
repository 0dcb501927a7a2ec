//! Error types for the stevedore orchestration layer
//!
//! Each domain module owns its error enum; this root type rolls them up so
//! callers composing several engines can use a single `Result` alias.

use thiserror::Error;

/// Root error type aggregating every domain error in the crate
#[derive(Error, Debug)]
pub enum StevedoreError {
    /// Object store contract errors
    #[error("Storage error: {0}")]
    Store(#[from] crate::storage::StoreError),

    /// Cache contract errors
    #[error("Cache error: {0}")]
    Cache(#[from] crate::cache::CacheError),

    /// Security pipeline errors (policy rejections, crypto failures)
    #[error("Security error: {0}")]
    Security(#[from] crate::security::SecurityError),

    /// Lifecycle policy and engine errors
    #[error("Lifecycle error: {0}")]
    Lifecycle(#[from] crate::lifecycle::LifecycleError),

    /// Backup and disaster-recovery errors
    #[error("Backup error: {0}")]
    Backup(#[from] crate::backup::BackupError),

    /// Configuration and initialization errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for orchestration operations
pub type Result<T> = std::result::Result<T, StevedoreError>;
