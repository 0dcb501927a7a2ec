//! Backup manifest: the JSON index describing one backup set

use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::OffsetDateTime;

/// File name of the manifest inside a backup's key prefix.
pub const MANIFEST_FILE: &str = "manifest.json";

/// Kind of backup a manifest describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackupKind {
    Full,
    Incremental,
}

/// One backed-up object as recorded in the manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupFileEntry {
    /// Key of the object in the source container
    pub file_name: String,

    /// Uncompressed size in bytes
    pub original_size: u64,

    /// Size of the stored gzip payload
    pub compressed_size: u64,

    /// Content type of the original object
    pub content_type: String,

    /// Last-modified timestamp of the original object
    #[serde(with = "time::serde::rfc3339")]
    pub last_modified: OffsetDateTime,

    /// Entity tag of the original object
    pub e_tag: String,

    /// Backup-relative key (`{backupId}/{fileName}`) of the stored payload
    pub backup_file_name: String,
}

/// Index of everything contained in one backup.
///
/// Written once at the end of a backup run and immutable thereafter; the
/// only thing that removes it is explicit backup deletion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupManifest {
    /// Opaque unique backup identifier
    pub backup_id: String,

    /// Container the backup was taken from
    pub container_name: String,

    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,

    pub backup_type: BackupKind,

    pub file_count: u64,

    /// Sum of the original (uncompressed) sizes
    pub total_size: u64,

    pub files: Vec<BackupFileEntry>,
}

impl BackupManifest {
    pub fn new(backup_id: impl Into<String>, container_name: impl Into<String>) -> Self {
        Self {
            backup_id: backup_id.into(),
            container_name: container_name.into(),
            created_at: OffsetDateTime::now_utc(),
            backup_type: BackupKind::Full,
            file_count: 0,
            total_size: 0,
            files: Vec::new(),
        }
    }

    /// Storage key of the manifest for a given backup id.
    pub fn key(backup_id: &str) -> String {
        format!("{}/{}", backup_id, MANIFEST_FILE)
    }

    /// Record one successfully backed-up file.
    pub fn push(&mut self, entry: BackupFileEntry) {
        self.total_size += entry.original_size;
        self.file_count += 1;
        self.files.push(entry);
    }

    /// Serialize to the JSON wire format.
    pub fn to_bytes(&self) -> Result<Vec<u8>, ManifestError> {
        self.validate()?;
        serde_json::to_vec_pretty(self).map_err(ManifestError::Serialization)
    }

    /// Parse and re-validate a stored manifest.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ManifestError> {
        let manifest: Self = serde_json::from_slice(bytes).map_err(ManifestError::Serialization)?;
        manifest.validate()?;
        Ok(manifest)
    }

    pub fn validate(&self) -> Result<(), ManifestError> {
        if self.backup_id.trim().is_empty() {
            return Err(ManifestError::EmptyBackupId);
        }
        if self.container_name.trim().is_empty() {
            return Err(ManifestError::EmptyContainerName);
        }
        if self.file_count != self.files.len() as u64 {
            return Err(ManifestError::CountMismatch {
                declared: self.file_count,
                actual: self.files.len() as u64,
            });
        }
        Ok(())
    }
}

/// Errors that can occur when working with manifests
#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("Manifest has an empty backup id")]
    EmptyBackupId,

    #[error("Manifest has an empty container name")]
    EmptyContainerName,

    #[error("Manifest declares {declared} files but lists {actual}")]
    CountMismatch { declared: u64, actual: u64 },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str, size: u64) -> BackupFileEntry {
        BackupFileEntry {
            file_name: name.to_string(),
            original_size: size,
            compressed_size: size / 2,
            content_type: "application/zip".to_string(),
            last_modified: OffsetDateTime::now_utc(),
            e_tag: "abc123".to_string(),
            backup_file_name: format!("backup-1/{}", name),
        }
    }

    #[test]
    fn test_push_keeps_totals_consistent() {
        let mut manifest = BackupManifest::new("backup-1", "pkgs");
        manifest.push(entry("a.zip", 100));
        manifest.push(entry("b.zip", 50));

        assert_eq!(manifest.file_count, 2);
        assert_eq!(manifest.total_size, 150);
        assert!(manifest.validate().is_ok());
    }

    #[test]
    fn test_serialization_roundtrip() {
        let mut manifest = BackupManifest::new("backup-1", "pkgs");
        manifest.push(entry("a.zip", 100));

        let bytes = manifest.to_bytes().unwrap();
        let parsed = BackupManifest::from_bytes(&bytes).unwrap();
        assert_eq!(manifest, parsed);
    }

    #[test]
    fn test_wire_format_field_names() {
        let mut manifest = BackupManifest::new("backup-1", "pkgs");
        manifest.push(entry("a.zip", 100));

        let json: serde_json::Value =
            serde_json::from_slice(&manifest.to_bytes().unwrap()).unwrap();
        assert_eq!(json["backupId"], "backup-1");
        assert_eq!(json["containerName"], "pkgs");
        assert_eq!(json["backupType"], "full");
        assert!(json["createdAt"].is_string());
        assert_eq!(json["fileCount"], 1);
        assert_eq!(json["totalSize"], 100);

        let file = &json["files"][0];
        assert_eq!(file["fileName"], "a.zip");
        assert_eq!(file["originalSize"], 100);
        assert_eq!(file["compressedSize"], 50);
        assert_eq!(file["contentType"], "application/zip");
        assert_eq!(file["eTag"], "abc123");
        assert_eq!(file["backupFileName"], "backup-1/a.zip");
        assert!(file["lastModified"].is_string());
    }

    #[test]
    fn test_count_mismatch_rejected() {
        let mut manifest = BackupManifest::new("backup-1", "pkgs");
        manifest.push(entry("a.zip", 100));
        manifest.file_count = 5;

        assert!(matches!(
            manifest.validate(),
            Err(ManifestError::CountMismatch { declared: 5, actual: 1 })
        ));
    }

    #[test]
    fn test_empty_identifiers_rejected() {
        let manifest = BackupManifest::new("", "pkgs");
        assert!(matches!(manifest.validate(), Err(ManifestError::EmptyBackupId)));

        let manifest = BackupManifest::new("backup-1", " ");
        assert!(matches!(
            manifest.validate(),
            Err(ManifestError::EmptyContainerName)
        ));
    }

    #[test]
    fn test_manifest_key_layout() {
        assert_eq!(BackupManifest::key("abc"), "abc/manifest.json");
    }
}
