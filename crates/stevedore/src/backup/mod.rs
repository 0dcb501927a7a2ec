//! Backup and disaster-recovery engine
//!
//! Snapshots a container into a compressed, manifest-described backup set
//! inside a dedicated backup container, restores from such sets, validates
//! their integrity, and orchestrates scripted recovery for named disaster
//! scenarios. Multi-step workflows report outcomes through result objects
//! rather than errors: a per-file failure is logged, skipped and surfaced
//! in the outcome, never fatal to the whole run.

use bytes::Bytes;
use flate2::{Compression, read::GzDecoder, write::GzEncoder};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::{Read, Write};
use std::sync::{Arc, Mutex};
use time::{Duration, OffsetDateTime};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::BackupConfig;
use crate::storage::{ObjectStore, StoreError};

pub mod manifest;

pub use manifest::{BackupFileEntry, BackupKind, BackupManifest, ManifestError, MANIFEST_FILE};

#[derive(Debug, thiserror::Error)]
pub enum BackupError {
    #[error("Backup not found: {0}")]
    NotFound(String),

    #[error("No backups exist for container: {0}")]
    NoBackupsForContainer(String),

    #[error("Recovery scenario requires a target container")]
    MissingTargetContainer,

    #[error("Manifest error: {0}")]
    Manifest(#[from] ManifestError),

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    #[error("Compression error: {0}")]
    Compression(#[from] std::io::Error),
}

fn gzip(data: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    encoder.finish()
}

fn gunzip(data: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut decoder = GzDecoder::new(data);
    let mut out = Vec::new();
    decoder.read_to_end(&mut out)?;
    Ok(out)
}

/// One file that could not be processed during a multi-file workflow.
#[derive(Debug, Clone, Serialize)]
pub struct FileFailure {
    pub file_name: String,
    pub error: String,
}

/// Result of one backup run.
#[derive(Debug, Clone, Serialize)]
pub struct BackupOutcome {
    pub backup_id: String,
    pub container: String,
    pub success: bool,
    pub files_backed_up: u64,
    pub total_bytes: u64,
    /// Files that failed and were left out of the manifest
    pub skipped: Vec<FileFailure>,
    pub error: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub started_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub completed_at: OffsetDateTime,
}

/// Result of one restore run.
#[derive(Debug, Clone, Serialize)]
pub struct RestoreOutcome {
    pub backup_id: String,
    pub target_container: String,
    pub success: bool,
    pub files_restored: u64,
    pub bytes_restored: u64,
    pub skipped: Vec<FileFailure>,
    pub error: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub started_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub completed_at: OffsetDateTime,
}

/// Summary of one stored backup, derived from its manifest.
#[derive(Debug, Clone, Serialize)]
pub struct BackupInfo {
    pub backup_id: String,
    pub container_name: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    pub backup_type: BackupKind,
    pub file_count: u64,
    pub total_size: u64,
}

impl From<&BackupManifest> for BackupInfo {
    fn from(manifest: &BackupManifest) -> Self {
        Self {
            backup_id: manifest.backup_id.clone(),
            container_name: manifest.container_name.clone(),
            created_at: manifest.created_at,
            backup_type: manifest.backup_type,
            file_count: manifest.file_count,
            total_size: manifest.total_size,
        }
    }
}

/// Result of checking a backup's integrity.
#[derive(Debug, Clone, Serialize)]
pub struct BackupValidation {
    pub backup_id: String,
    pub valid: bool,
    pub files_checked: u64,
    pub errors: Vec<String>,
}

/// Named, pre-scripted recovery procedure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DisasterScenario {
    ContainerCorruption,
    RegionalOutage,
    DataLoss,
}

/// Input to [`BackupEngine::perform_disaster_recovery`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisasterRecoveryRequest {
    pub scenario: DisasterScenario,
    #[serde(default)]
    pub target_container: Option<String>,
    #[serde(default)]
    pub parameters: HashMap<String, String>,
}

/// Result of a disaster-recovery run: an ordered narrative of the actions
/// taken plus the overall verdict.
#[derive(Debug, Clone, Serialize)]
pub struct DisasterRecoveryOutcome {
    pub scenario: DisasterScenario,
    pub success: bool,
    pub actions: Vec<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub started_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub completed_at: OffsetDateTime,
}

/// Result of the end-to-end self-test; each sub-step reports independently.
#[derive(Debug, Clone, Serialize)]
pub struct RecoveryTestReport {
    pub backup_ok: bool,
    pub restore_ok: bool,
    pub validation_ok: bool,
    pub details: Vec<String>,
}

impl RecoveryTestReport {
    pub fn passed(&self) -> bool {
        self.backup_ok && self.restore_ok && self.validation_ok
    }
}

/// Counters accumulated across backup/restore runs.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BackupStatistics {
    pub backups_attempted: u64,
    pub backups_succeeded: u64,
    pub restores_attempted: u64,
    pub restores_succeeded: u64,
    pub bytes_backed_up: u64,
    pub bytes_restored: u64,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_backup_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_restore_at: Option<OffsetDateTime>,
}

/// The backup and disaster-recovery engine.
pub struct BackupEngine {
    store: Arc<dyn ObjectStore>,
    config: BackupConfig,
    stats: Mutex<BackupStatistics>,
}

impl BackupEngine {
    pub fn new(store: Arc<dyn ObjectStore>, config: BackupConfig) -> Self {
        Self {
            store,
            config,
            stats: Mutex::new(BackupStatistics::default()),
        }
    }

    pub fn statistics(&self) -> BackupStatistics {
        self.stats.lock().map(|s| s.clone()).unwrap_or_default()
    }

    fn bump(&self, update: impl FnOnce(&mut BackupStatistics)) {
        if let Ok(mut stats) = self.stats.lock() {
            update(&mut stats);
        }
    }

    /// Snapshot a container into a new backup set.
    ///
    /// Individual file failures are skipped and reported in the outcome;
    /// the manifest reflects only the files that actually made it.
    pub async fn create_backup(&self, container: &str) -> BackupOutcome {
        let backup_id = Uuid::new_v4().to_string();
        let started_at = OffsetDateTime::now_utc();
        info!(container, backup_id, "starting backup");
        self.bump(|s| s.backups_attempted += 1);

        let failed = |error: String| BackupOutcome {
            backup_id: backup_id.clone(),
            container: container.to_string(),
            success: false,
            files_backed_up: 0,
            total_bytes: 0,
            skipped: Vec::new(),
            error: Some(error),
            started_at,
            completed_at: OffsetDateTime::now_utc(),
        };

        if let Err(e) = self.store.ensure_container(&self.config.backup_container).await {
            error!(backup_id, error = %e, "cannot prepare backup container");
            return failed(e.to_string());
        }

        let files = match self.store.list(container, None).await {
            Ok(files) => files,
            Err(e) => {
                error!(container, backup_id, error = %e, "cannot list source container");
                return failed(e.to_string());
            }
        };

        let mut manifest = BackupManifest::new(&backup_id, container);
        let mut skipped = Vec::new();

        // One file's bytes in flight at a time to bound memory.
        for meta in files.iter().filter(|m| !m.is_directory()) {
            match self.backup_one(container, &meta.key, &backup_id).await {
                Ok(entry) => manifest.push(entry),
                Err(e) => {
                    warn!(container, key = %meta.key, error = %e, "skipping file in backup");
                    skipped.push(FileFailure {
                        file_name: meta.key.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        let manifest_bytes = match manifest.to_bytes() {
            Ok(bytes) => bytes,
            Err(e) => return failed(e.to_string()),
        };
        if let Err(e) = self
            .store
            .upload(
                &self.config.backup_container,
                &BackupManifest::key(&backup_id),
                Bytes::from(manifest_bytes),
                "application/json",
                None,
            )
            .await
        {
            error!(backup_id, error = %e, "failed to write manifest");
            return failed(e.to_string());
        }

        let completed_at = OffsetDateTime::now_utc();
        self.bump(|s| {
            s.backups_succeeded += 1;
            s.bytes_backed_up += manifest.total_size;
            s.last_backup_at = Some(completed_at);
        });
        info!(
            container,
            backup_id,
            files = manifest.file_count,
            bytes = manifest.total_size,
            skipped = skipped.len(),
            "backup finished"
        );
        BackupOutcome {
            backup_id,
            container: container.to_string(),
            success: true,
            files_backed_up: manifest.file_count,
            total_bytes: manifest.total_size,
            skipped,
            error: None,
            started_at,
            completed_at,
        }
    }

    async fn backup_one(
        &self,
        container: &str,
        key: &str,
        backup_id: &str,
    ) -> Result<BackupFileEntry, BackupError> {
        let data = self.store.download(container, key).await?;
        let meta = self.store.metadata(container, key).await?;
        let compressed = gzip(&data)?;
        let backup_file_name = format!("{}/{}", backup_id, key);

        let provenance = HashMap::from([
            ("original-content-type".to_string(), meta.content_type.clone()),
            ("original-size".to_string(), meta.size.to_string()),
            ("backup-id".to_string(), backup_id.to_string()),
            ("source-container".to_string(), container.to_string()),
        ]);
        let compressed_size = compressed.len() as u64;
        self.store
            .upload(
                &self.config.backup_container,
                &backup_file_name,
                Bytes::from(compressed),
                "application/gzip",
                Some(provenance),
            )
            .await?;
        debug!(container, key, backup_id, "file backed up");

        Ok(BackupFileEntry {
            file_name: key.to_string(),
            original_size: meta.size,
            compressed_size,
            content_type: meta.content_type,
            last_modified: meta.last_modified,
            e_tag: meta.etag,
            backup_file_name,
        })
    }

    async fn load_manifest(&self, backup_id: &str) -> Result<BackupManifest, BackupError> {
        let bytes = self
            .store
            .download(&self.config.backup_container, &BackupManifest::key(backup_id))
            .await
            .map_err(|e| match e {
                StoreError::NotFound { .. } | StoreError::ContainerNotFound(_) => {
                    BackupError::NotFound(backup_id.to_string())
                }
                other => BackupError::Store(other),
            })?;
        Ok(BackupManifest::from_bytes(&bytes)?)
    }

    /// Restore a backup into its source container, or into `target` when
    /// given.
    pub async fn restore_backup(&self, backup_id: &str, target: Option<&str>) -> RestoreOutcome {
        let started_at = OffsetDateTime::now_utc();
        self.bump(|s| s.restores_attempted += 1);

        let manifest = match self.load_manifest(backup_id).await {
            Ok(manifest) => manifest,
            Err(e) => {
                error!(backup_id, error = %e, "restore failed to load manifest");
                return RestoreOutcome {
                    backup_id: backup_id.to_string(),
                    target_container: target.unwrap_or_default().to_string(),
                    success: false,
                    files_restored: 0,
                    bytes_restored: 0,
                    skipped: Vec::new(),
                    error: Some(e.to_string()),
                    started_at,
                    completed_at: OffsetDateTime::now_utc(),
                };
            }
        };

        let target_container = target.unwrap_or(&manifest.container_name).to_string();
        info!(backup_id, target = %target_container, files = manifest.file_count, "starting restore");

        if let Err(e) = self.store.ensure_container(&target_container).await {
            error!(backup_id, error = %e, "cannot prepare restore target");
            return RestoreOutcome {
                backup_id: backup_id.to_string(),
                target_container,
                success: false,
                files_restored: 0,
                bytes_restored: 0,
                skipped: Vec::new(),
                error: Some(e.to_string()),
                started_at,
                completed_at: OffsetDateTime::now_utc(),
            };
        }

        let mut files_restored = 0u64;
        let mut bytes_restored = 0u64;
        let mut skipped = Vec::new();

        for entry in &manifest.files {
            match self.restore_one(entry, &target_container, backup_id).await {
                Ok(bytes) => {
                    files_restored += 1;
                    bytes_restored += bytes;
                }
                Err(e) => {
                    warn!(backup_id, file = %entry.file_name, error = %e, "skipping file in restore");
                    skipped.push(FileFailure {
                        file_name: entry.file_name.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        let completed_at = OffsetDateTime::now_utc();
        self.bump(|s| {
            s.restores_succeeded += 1;
            s.bytes_restored += bytes_restored;
            s.last_restore_at = Some(completed_at);
        });
        info!(
            backup_id,
            target = %target_container,
            files = files_restored,
            skipped = skipped.len(),
            "restore finished"
        );
        RestoreOutcome {
            backup_id: backup_id.to_string(),
            target_container,
            success: true,
            files_restored,
            bytes_restored,
            skipped,
            error: None,
            started_at,
            completed_at,
        }
    }

    async fn restore_one(
        &self,
        entry: &BackupFileEntry,
        target_container: &str,
        backup_id: &str,
    ) -> Result<u64, BackupError> {
        let compressed = self
            .store
            .download(&self.config.backup_container, &entry.backup_file_name)
            .await?;
        let data = gunzip(&compressed)?;
        let size = data.len() as u64;

        let provenance = HashMap::from([
            ("restored-from-backup".to_string(), backup_id.to_string()),
            ("original-etag".to_string(), entry.e_tag.clone()),
        ]);
        self.store
            .upload(
                target_container,
                &entry.file_name,
                Bytes::from(data),
                &entry.content_type,
                Some(provenance),
            )
            .await?;
        Ok(size)
    }

    /// List stored backups, optionally scoped to one source container.
    pub async fn list_backups(
        &self,
        container: Option<&str>,
    ) -> Result<Vec<BackupInfo>, BackupError> {
        if !self
            .store
            .container_exists(&self.config.backup_container)
            .await?
        {
            return Ok(Vec::new());
        }

        let mut backups = Vec::new();
        let objects = self.store.list(&self.config.backup_container, None).await?;
        for meta in objects
            .iter()
            .filter(|m| m.key.ends_with(&format!("/{}", MANIFEST_FILE)))
        {
            let bytes = match self.store.download(&self.config.backup_container, &meta.key).await {
                Ok(bytes) => bytes,
                Err(e) => {
                    warn!(key = %meta.key, error = %e, "cannot read manifest, skipping");
                    continue;
                }
            };
            match BackupManifest::from_bytes(&bytes) {
                Ok(manifest) => {
                    if container.is_none_or(|c| manifest.container_name == c) {
                        backups.push(BackupInfo::from(&manifest));
                    }
                }
                Err(e) => warn!(key = %meta.key, error = %e, "unparseable manifest, skipping"),
            }
        }
        backups.sort_by_key(|info| info.created_at);
        Ok(backups)
    }

    /// The newest backup for a container: maximum `createdAt` among the
    /// backups scoped to it.
    pub async fn find_latest_backup(
        &self,
        container: &str,
    ) -> Result<Option<BackupInfo>, BackupError> {
        let backups = self.list_backups(Some(container)).await?;
        Ok(backups.into_iter().max_by_key(|info| info.created_at))
    }

    /// Remove a backup set: every payload object plus its manifest.
    pub async fn delete_backup(&self, backup_id: &str) -> Result<(), BackupError> {
        let prefix = format!("{}/", backup_id);
        let objects = self
            .store
            .list(&self.config.backup_container, Some(&prefix))
            .await?;
        if objects.is_empty() {
            return Err(BackupError::NotFound(backup_id.to_string()));
        }

        let keys: Vec<String> = objects.into_iter().map(|m| m.key).collect();
        let outcome = self
            .store
            .delete_batch(&self.config.backup_container, &keys)
            .await?;
        if !outcome.all_succeeded() {
            warn!(
                backup_id,
                failed = outcome.failed.len(),
                "some backup objects could not be deleted"
            );
        }
        info!(backup_id, deleted = outcome.deleted.len(), "backup deleted");
        Ok(())
    }

    /// Check that a backup's manifest parses and that every referenced
    /// object is still present in the backup store.
    pub async fn validate_backup(&self, backup_id: &str) -> BackupValidation {
        let manifest = match self.load_manifest(backup_id).await {
            Ok(manifest) => manifest,
            Err(e) => {
                return BackupValidation {
                    backup_id: backup_id.to_string(),
                    valid: false,
                    files_checked: 0,
                    errors: vec![e.to_string()],
                };
            }
        };

        let mut errors = Vec::new();
        let mut files_checked = 0u64;
        for entry in &manifest.files {
            files_checked += 1;
            match self
                .store
                .exists(&self.config.backup_container, &entry.backup_file_name)
                .await
            {
                Ok(true) => {}
                Ok(false) => errors.push(format!("backup file missing: {}", entry.backup_file_name)),
                Err(e) => errors.push(format!(
                    "cannot check backup file {}: {}",
                    entry.backup_file_name, e
                )),
            }
        }

        BackupValidation {
            backup_id: backup_id.to_string(),
            valid: errors.is_empty(),
            files_checked,
            errors,
        }
    }

    /// Run the scripted recovery procedure for a named disaster scenario.
    pub async fn perform_disaster_recovery(
        &self,
        request: DisasterRecoveryRequest,
    ) -> DisasterRecoveryOutcome {
        let started_at = OffsetDateTime::now_utc();
        let mut actions = Vec::new();
        info!(scenario = ?request.scenario, "starting disaster recovery");

        let success = match request.scenario {
            DisasterScenario::ContainerCorruption => {
                self.recover_container_corruption(&request, &mut actions).await
            }
            DisasterScenario::RegionalOutage => {
                let region = request
                    .parameters
                    .get("target-region")
                    .map(String::as_str)
                    .unwrap_or("secondary");
                actions.push(format!("initiated DNS failover to {} region", region));
                actions.push("redirected storage traffic to failover endpoints".to_string());
                actions.push("verified failover endpoint health".to_string());
                true
            }
            DisasterScenario::DataLoss => self.recover_data_loss(&mut actions).await,
        };

        let completed_at = OffsetDateTime::now_utc();
        info!(scenario = ?request.scenario, success, steps = actions.len(), "disaster recovery finished");
        DisasterRecoveryOutcome {
            scenario: request.scenario,
            success,
            actions,
            started_at,
            completed_at,
        }
    }

    async fn recover_container_corruption(
        &self,
        request: &DisasterRecoveryRequest,
        actions: &mut Vec<String>,
    ) -> bool {
        let Some(container) = request.target_container.as_deref() else {
            actions.push(BackupError::MissingTargetContainer.to_string());
            return false;
        };

        let latest = match self.find_latest_backup(container).await {
            Ok(Some(info)) => info,
            Ok(None) => {
                actions.push(BackupError::NoBackupsForContainer(container.to_string()).to_string());
                return false;
            }
            Err(e) => {
                actions.push(format!("failed to look up backups: {}", e));
                return false;
            }
        };
        actions.push(format!(
            "selected backup {} created at {} for container {}",
            latest.backup_id, latest.created_at, container
        ));

        let outcome = self.restore_backup(&latest.backup_id, Some(container)).await;
        actions.push(format!(
            "restored {} files ({} skipped) into {}",
            outcome.files_restored,
            outcome.skipped.len(),
            container
        ));
        outcome.success
    }

    async fn recover_data_loss(&self, actions: &mut Vec<String>) -> bool {
        let containers = match self.store.list_containers().await {
            Ok(containers) => containers,
            Err(e) => {
                actions.push(format!("failed to list containers: {}", e));
                return false;
            }
        };

        let mut failures = 0usize;
        for container in containers
            .iter()
            .filter(|c| *c != &self.config.backup_container)
        {
            match self.find_latest_backup(container).await {
                Ok(Some(info)) => {
                    let outcome = self.restore_backup(&info.backup_id, Some(container)).await;
                    if outcome.success {
                        actions.push(format!(
                            "restored container {} from backup {} ({} files)",
                            container, info.backup_id, outcome.files_restored
                        ));
                    } else {
                        failures += 1;
                        actions.push(format!(
                            "failed to restore container {} from backup {}: {}",
                            container,
                            info.backup_id,
                            outcome.error.unwrap_or_default()
                        ));
                    }
                }
                Ok(None) => {
                    actions.push(format!("no backup available for container {}", container));
                }
                Err(e) => {
                    failures += 1;
                    actions.push(format!("failed to look up backups for {}: {}", container, e));
                }
            }
        }
        failures == 0
    }

    /// End-to-end self-test: back up a throwaway container, restore it into
    /// a second one, validate the backup, then clean everything up. Each
    /// sub-step reports independently.
    pub async fn test_disaster_recovery(&self) -> RecoveryTestReport {
        let token = Uuid::new_v4().simple().to_string();
        let source = format!("dr-test-src-{}", &token[..8]);
        let target = format!("dr-test-dst-{}", &token[..8]);
        let probe_key = "dr-probe.txt";
        let probe_body = Bytes::from_static(b"disaster recovery probe");
        let mut details = Vec::new();

        let prepared = match self.store.ensure_container(&source).await {
            Ok(()) => self
                .store
                .upload(&source, probe_key, probe_body.clone(), "text/plain", None)
                .await
                .is_ok(),
            Err(_) => false,
        };
        if !prepared {
            details.push("could not prepare test fixtures".to_string());
            return RecoveryTestReport {
                backup_ok: false,
                restore_ok: false,
                validation_ok: false,
                details,
            };
        }

        let backup = self.create_backup(&source).await;
        let backup_ok = backup.success && backup.files_backed_up == 1;
        details.push(format!(
            "backup step: success={} files={}",
            backup.success, backup.files_backed_up
        ));

        let restore = self.restore_backup(&backup.backup_id, Some(&target)).await;
        let restored_matches = match self.store.download(&target, probe_key).await {
            Ok(data) => data == probe_body,
            Err(_) => false,
        };
        let restore_ok = restore.success && restore.files_restored == 1 && restored_matches;
        details.push(format!(
            "restore step: success={} files={} content_match={}",
            restore.success, restore.files_restored, restored_matches
        ));

        let validation = self.validate_backup(&backup.backup_id).await;
        details.push(format!(
            "validation step: valid={} errors={}",
            validation.valid,
            validation.errors.len()
        ));

        // Cleanup is best-effort; a failing delete must not fail the test.
        if let Err(e) = self.delete_backup(&backup.backup_id).await {
            debug!(error = %e, "self-test backup cleanup failed");
        }
        for container in [&source, &target] {
            if let Err(e) = self.store.delete_container(container).await {
                debug!(container, error = %e, "self-test container cleanup failed");
            }
        }

        RecoveryTestReport {
            backup_ok,
            restore_ok,
            validation_ok: validation.valid,
            details,
        }
    }

    /// Delete backups older than the configured retention window, returning
    /// how many were removed.
    pub async fn prune_expired(&self) -> Result<u32, BackupError> {
        let cutoff =
            OffsetDateTime::now_utc() - Duration::days(i64::from(self.config.retention_days));
        let mut pruned = 0u32;

        for info in self.list_backups(None).await? {
            if info.created_at < cutoff {
                match self.delete_backup(&info.backup_id).await {
                    Ok(()) => {
                        info!(
                            backup_id = %info.backup_id,
                            created_at = %info.created_at,
                            "pruned expired backup"
                        );
                        pruned += 1;
                    }
                    Err(e) => warn!(backup_id = %info.backup_id, error = %e, "failed to prune backup"),
                }
            }
        }
        Ok(pruned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    fn engine(store: Arc<MemoryStore>) -> BackupEngine {
        BackupEngine::new(store, BackupConfig::default())
    }

    async fn seed(store: &MemoryStore, container: &str, files: &[(&str, &[u8])]) {
        store.create_container(container).await.unwrap();
        for (key, body) in files {
            store
                .upload(
                    container,
                    key,
                    Bytes::copy_from_slice(body),
                    "application/octet-stream",
                    None,
                )
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn test_gzip_roundtrip() {
        let body = b"a manifest-described backup set".repeat(64);
        let compressed = gzip(&body).unwrap();
        assert!(compressed.len() < body.len());
        assert_eq!(gunzip(&compressed).unwrap(), body);
    }

    #[tokio::test]
    async fn test_backup_writes_manifest_and_compressed_payloads() {
        let store = Arc::new(MemoryStore::new());
        seed(&store, "pkgs", &[("a.bin", b"aaaa"), ("b.bin", b"bbbb")]).await;

        let outcome = engine(store.clone()).create_backup("pkgs").await;
        assert!(outcome.success);
        assert_eq!(outcome.files_backed_up, 2);
        assert_eq!(outcome.total_bytes, 8);
        assert!(outcome.skipped.is_empty());

        let manifest_key = BackupManifest::key(&outcome.backup_id);
        let manifest_bytes = store.download("backups", &manifest_key).await.unwrap();
        let manifest = BackupManifest::from_bytes(&manifest_bytes).unwrap();
        assert_eq!(manifest.container_name, "pkgs");
        assert_eq!(manifest.file_count, 2);

        for entry in &manifest.files {
            let stored = store.download("backups", &entry.backup_file_name).await.unwrap();
            assert_eq!(stored.len() as u64, entry.compressed_size);
            let meta = store.metadata("backups", &entry.backup_file_name).await.unwrap();
            assert_eq!(
                meta.custom.get("source-container").map(String::as_str),
                Some("pkgs")
            );
            assert_eq!(
                meta.custom.get("backup-id").map(String::as_str),
                Some(outcome.backup_id.as_str())
            );
        }
    }

    #[tokio::test]
    async fn test_backup_of_missing_container_reports_failure() {
        let store = Arc::new(MemoryStore::new());
        let outcome = engine(store).create_backup("ghost").await;
        assert!(!outcome.success);
        assert!(outcome.error.is_some());
        assert_eq!(outcome.files_backed_up, 0);
    }

    #[tokio::test]
    async fn test_restore_defaults_to_source_container() {
        let store = Arc::new(MemoryStore::new());
        seed(&store, "pkgs", &[("a.bin", b"payload")]).await;
        let backup_engine = engine(store.clone());

        let backup = backup_engine.create_backup("pkgs").await;
        store.delete("pkgs", "a.bin").await.unwrap();

        let restore = backup_engine.restore_backup(&backup.backup_id, None).await;
        assert!(restore.success);
        assert_eq!(restore.target_container, "pkgs");
        assert_eq!(restore.files_restored, 1);

        let data = store.download("pkgs", "a.bin").await.unwrap();
        assert_eq!(&data[..], b"payload");
        let meta = store.metadata("pkgs", "a.bin").await.unwrap();
        assert_eq!(
            meta.custom.get("restored-from-backup").map(String::as_str),
            Some(backup.backup_id.as_str())
        );
        assert!(meta.custom.contains_key("original-etag"));
    }

    #[tokio::test]
    async fn test_restore_unknown_backup_fails_cleanly() {
        let store = Arc::new(MemoryStore::new());
        store.create_container("backups").await.unwrap();
        let restore = engine(store).restore_backup("no-such-id", None).await;
        assert!(!restore.success);
        assert!(restore.error.unwrap().contains("no-such-id"));
    }

    #[tokio::test]
    async fn test_validate_detects_missing_backup_file() {
        let store = Arc::new(MemoryStore::new());
        seed(&store, "pkgs", &[("a.bin", b"aaaa"), ("b.bin", b"bbbb")]).await;
        let backup_engine = engine(store.clone());

        let backup = backup_engine.create_backup("pkgs").await;
        let valid = backup_engine.validate_backup(&backup.backup_id).await;
        assert!(valid.valid);
        assert_eq!(valid.files_checked, 2);

        let victim = format!("{}/a.bin", backup.backup_id);
        store.delete("backups", &victim).await.unwrap();

        let invalid = backup_engine.validate_backup(&backup.backup_id).await;
        assert!(!invalid.valid);
        assert_eq!(invalid.errors.len(), 1);
        assert!(invalid.errors[0].contains("a.bin"));
        assert!(invalid.errors[0].contains("missing"));
    }

    #[tokio::test]
    async fn test_list_backups_scopes_by_container() {
        let store = Arc::new(MemoryStore::new());
        seed(&store, "alpha", &[("a", b"1")]).await;
        seed(&store, "beta", &[("b", b"2")]).await;
        let backup_engine = engine(store);

        backup_engine.create_backup("alpha").await;
        backup_engine.create_backup("alpha").await;
        backup_engine.create_backup("beta").await;

        assert_eq!(backup_engine.list_backups(None).await.unwrap().len(), 3);
        assert_eq!(
            backup_engine.list_backups(Some("alpha")).await.unwrap().len(),
            2
        );
        assert_eq!(
            backup_engine.list_backups(Some("beta")).await.unwrap().len(),
            1
        );
    }

    #[tokio::test]
    async fn test_delete_backup_removes_payloads_and_manifest() {
        let store = Arc::new(MemoryStore::new());
        seed(&store, "pkgs", &[("a.bin", b"aaaa")]).await;
        let backup_engine = engine(store.clone());

        let backup = backup_engine.create_backup("pkgs").await;
        backup_engine.delete_backup(&backup.backup_id).await.unwrap();

        let remaining = store
            .list("backups", Some(&format!("{}/", backup.backup_id)))
            .await
            .unwrap();
        assert!(remaining.is_empty());

        assert!(matches!(
            backup_engine.delete_backup(&backup.backup_id).await,
            Err(BackupError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_container_corruption_requires_target() {
        let store = Arc::new(MemoryStore::new());
        let outcome = engine(store)
            .perform_disaster_recovery(DisasterRecoveryRequest {
                scenario: DisasterScenario::ContainerCorruption,
                target_container: None,
                parameters: HashMap::new(),
            })
            .await;
        assert!(!outcome.success);
        assert!(outcome.actions[0].contains("target container"));
    }

    #[tokio::test]
    async fn test_container_corruption_restores_most_recent_backup() {
        let store = Arc::new(MemoryStore::new());
        seed(&store, "pkgs", &[("a.bin", b"version-one")]).await;
        let backup_engine = engine(store.clone());

        backup_engine.create_backup("pkgs").await;
        store
            .upload("pkgs", "a.bin", Bytes::from_static(b"version-two"), "application/octet-stream", None)
            .await
            .unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        backup_engine.create_backup("pkgs").await;

        // Corrupt the live object, then recover.
        store
            .upload("pkgs", "a.bin", Bytes::from_static(b"garbage"), "application/octet-stream", None)
            .await
            .unwrap();

        let outcome = backup_engine
            .perform_disaster_recovery(DisasterRecoveryRequest {
                scenario: DisasterScenario::ContainerCorruption,
                target_container: Some("pkgs".to_string()),
                parameters: HashMap::new(),
            })
            .await;
        assert!(outcome.success);

        let data = store.download("pkgs", "a.bin").await.unwrap();
        assert_eq!(&data[..], b"version-two");
    }

    #[tokio::test]
    async fn test_regional_outage_is_narrative_only() {
        let store = Arc::new(MemoryStore::new());
        store.create_container("pkgs").await.unwrap();
        let before = store.total_objects();

        let outcome = engine(store.clone())
            .perform_disaster_recovery(DisasterRecoveryRequest {
                scenario: DisasterScenario::RegionalOutage,
                target_container: None,
                parameters: HashMap::from([(
                    "target-region".to_string(),
                    "eu-central".to_string(),
                )]),
            })
            .await;

        assert!(outcome.success);
        assert!(outcome.actions.iter().any(|a| a.contains("eu-central")));
        assert_eq!(store.total_objects(), before);
    }

    #[tokio::test]
    async fn test_data_loss_restores_every_container() {
        let store = Arc::new(MemoryStore::new());
        seed(&store, "alpha", &[("a", b"alpha-data")]).await;
        seed(&store, "beta", &[("b", b"beta-data")]).await;
        let backup_engine = engine(store.clone());

        backup_engine.create_backup("alpha").await;
        backup_engine.create_backup("beta").await;

        store.delete("alpha", "a").await.unwrap();
        store.delete("beta", "b").await.unwrap();

        let outcome = backup_engine
            .perform_disaster_recovery(DisasterRecoveryRequest {
                scenario: DisasterScenario::DataLoss,
                target_container: None,
                parameters: HashMap::new(),
            })
            .await;
        assert!(outcome.success);
        assert_eq!(&store.download("alpha", "a").await.unwrap()[..], b"alpha-data");
        assert_eq!(&store.download("beta", "b").await.unwrap()[..], b"beta-data");
    }

    #[tokio::test]
    async fn test_self_test_passes_and_cleans_up() {
        let store = Arc::new(MemoryStore::new());
        let report = engine(store.clone()).test_disaster_recovery().await;

        assert!(report.backup_ok, "{:?}", report.details);
        assert!(report.restore_ok, "{:?}", report.details);
        assert!(report.validation_ok, "{:?}", report.details);
        assert!(report.passed());

        let containers = store.list_containers().await.unwrap();
        assert!(!containers.iter().any(|c| c.starts_with("dr-test-")));
    }

    #[tokio::test]
    async fn test_prune_expired_removes_old_backups() {
        let store = Arc::new(MemoryStore::new());
        seed(&store, "pkgs", &[("a.bin", b"aaaa")]).await;
        let backup_engine = engine(store.clone());

        let old = backup_engine.create_backup("pkgs").await;
        let fresh = backup_engine.create_backup("pkgs").await;

        // Age the first backup's manifest past the retention window.
        let aged = OffsetDateTime::now_utc() - Duration::days(60);
        let manifest_key = BackupManifest::key(&old.backup_id);
        let bytes = store.download("backups", &manifest_key).await.unwrap();
        let mut manifest = BackupManifest::from_bytes(&bytes).unwrap();
        manifest.created_at = aged;
        store
            .upload(
                "backups",
                &manifest_key,
                Bytes::from(manifest.to_bytes().unwrap()),
                "application/json",
                None,
            )
            .await
            .unwrap();

        let pruned = backup_engine.prune_expired().await.unwrap();
        assert_eq!(pruned, 1);

        let remaining = backup_engine.list_backups(Some("pkgs")).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].backup_id, fresh.backup_id);
    }

    #[tokio::test]
    async fn test_statistics_track_runs() {
        let store = Arc::new(MemoryStore::new());
        seed(&store, "pkgs", &[("a.bin", b"aaaa")]).await;
        let backup_engine = engine(store);

        let backup = backup_engine.create_backup("pkgs").await;
        backup_engine.restore_backup(&backup.backup_id, None).await;

        let stats = backup_engine.statistics();
        assert_eq!(stats.backups_attempted, 1);
        assert_eq!(stats.backups_succeeded, 1);
        assert_eq!(stats.restores_succeeded, 1);
        assert_eq!(stats.bytes_backed_up, 4);
        assert_eq!(stats.bytes_restored, 4);
        assert!(stats.last_backup_at.is_some());
    }
}
