//! Integration tests exercising the engines together over one store

use std::collections::HashMap;
use std::sync::Arc;

use base64::Engine;
use bytes::Bytes;
use stevedore::backup::{BackupEngine, DisasterRecoveryRequest, DisasterScenario};
use stevedore::cache::MemoryCache;
use stevedore::config::{BackupConfig, MonitorConfig, SecurityConfig};
use stevedore::lifecycle::{LifecycleAction, LifecycleEngine, LifecyclePolicy, LifecycleRule};
use stevedore::monitor::MonitoringService;
use stevedore::security::SecurityService;
use stevedore::service::StorageService;
use stevedore::storage::{MemoryStore, ObjectStore};
use time::{Duration, OffsetDateTime};

fn archive_after_days(days: u32) -> LifecycleRule {
    LifecycleRule {
        action: LifecycleAction::Archive,
        min_age_created_days: Some(days),
        min_age_modified_days: None,
        min_size_bytes: None,
        max_size_bytes: None,
    }
}

#[tokio::test]
async fn test_backup_restore_round_trip_preserves_bytes_and_content_types() {
    let store = Arc::new(MemoryStore::new());
    store.create_container("pkgs").await.unwrap();

    let files: Vec<(&str, Vec<u8>, &str)> = vec![
        ("alpha/pkg-1.0.0.zip", b"zip-payload-one".to_vec(), "application/zip"),
        ("alpha/metadata.json", b"{\"name\":\"alpha\"}".to_vec(), "application/json"),
        ("readme.txt", vec![0u8, 159, 146, 150], "text/plain"),
    ];
    for (key, body, content_type) in &files {
        store
            .upload("pkgs", key, Bytes::from(body.clone()), content_type, None)
            .await
            .unwrap();
    }

    let engine = BackupEngine::new(store.clone(), BackupConfig::default());
    let backup = engine.create_backup("pkgs").await;
    assert!(backup.success);
    assert_eq!(backup.files_backed_up, files.len() as u64);

    let restore = engine.restore_backup(&backup.backup_id, Some("pkgs-restored")).await;
    assert!(restore.success);
    assert_eq!(restore.files_restored, files.len() as u64);
    assert!(restore.skipped.is_empty());

    for (key, body, content_type) in &files {
        let data = store.download("pkgs-restored", key).await.unwrap();
        assert_eq!(&data[..], &body[..], "{key}");
        let meta = store.metadata("pkgs-restored", key).await.unwrap();
        assert_eq!(&meta.content_type, content_type, "{key}");
    }
}

#[tokio::test]
async fn test_disaster_recovery_restores_the_newer_of_two_backups() {
    let store = Arc::new(MemoryStore::new());
    store.create_container("pkgs").await.unwrap();
    let engine = BackupEngine::new(store.clone(), BackupConfig::default());

    store
        .upload("pkgs", "state", Bytes::from_static(b"t1"), "text/plain", None)
        .await
        .unwrap();
    let first = engine.create_backup("pkgs").await;

    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    store
        .upload("pkgs", "state", Bytes::from_static(b"t2"), "text/plain", None)
        .await
        .unwrap();
    let second = engine.create_backup("pkgs").await;
    assert_ne!(first.backup_id, second.backup_id);

    store.delete("pkgs", "state").await.unwrap();
    let outcome = engine
        .perform_disaster_recovery(DisasterRecoveryRequest {
            scenario: DisasterScenario::ContainerCorruption,
            target_container: Some("pkgs".to_string()),
            parameters: HashMap::new(),
        })
        .await;
    assert!(outcome.success);
    assert!(outcome.actions.iter().any(|a| a.contains(&second.backup_id)));

    let data = store.download("pkgs", "state").await.unwrap();
    assert_eq!(&data[..], b"t2");
}

#[tokio::test]
async fn test_gated_uploads_survive_backup_and_recovery_encrypted() {
    let store = Arc::new(MemoryStore::new());
    store.create_container("pkgs").await.unwrap();

    let security_config = SecurityConfig {
        enable_encryption: true,
        encryption_key_base64: Some(
            base64::engine::general_purpose::STANDARD.encode([3u8; 32]),
        ),
        ..SecurityConfig::default()
    };
    let security = Arc::new(
        SecurityService::new(security_config, Arc::new(MemoryCache::new())).unwrap(),
    );
    let monitor = Arc::new(MonitoringService::new(MonitorConfig::default()));
    let service = StorageService::new(store.clone(), security, monitor.clone());

    let body = Bytes::from_static(b"{\"package\":\"demo\",\"version\":\"2.1.0\"}");
    service
        .upload("pkgs", "demo.json", body.clone(), "application/json", None)
        .await
        .unwrap();

    // Back up the (encrypted-at-rest) container, wipe it, then recover.
    let engine = BackupEngine::new(store.clone(), BackupConfig::default());
    let backup = engine.create_backup("pkgs").await;
    assert!(backup.success);

    store.delete("pkgs", "demo.json").await.unwrap();
    let outcome = engine
        .perform_disaster_recovery(DisasterRecoveryRequest {
            scenario: DisasterScenario::ContainerCorruption,
            target_container: Some("pkgs".to_string()),
            parameters: HashMap::new(),
        })
        .await;
    assert!(outcome.success);

    // The recovered object still decrypts through the gated path.
    let served = service.download("pkgs", "demo.json", None).await.unwrap();
    assert_eq!(served, body);

    let metrics = monitor.metrics(std::time::Duration::from_secs(60));
    assert_eq!(metrics.failures, 0);
    assert!(metrics.total_operations >= 2);
}

#[tokio::test]
async fn test_lifecycle_archive_feeds_backup_of_archive_container() {
    let store = Arc::new(MemoryStore::new());
    store.create_container("releases").await.unwrap();
    store
        .upload("releases", "v0.9.0.zip", Bytes::from_static(b"legacy"), "application/zip", None)
        .await
        .unwrap();
    let aged = OffsetDateTime::now_utc() - Duration::days(200);
    store.backdate("releases", "v0.9.0.zip", aged, aged).unwrap();

    let lifecycle = LifecycleEngine::new(store.clone());
    lifecycle
        .add_policy(LifecyclePolicy {
            name: "archive-old-releases".to_string(),
            enabled: true,
            container_pattern: "^releases$".to_string(),
            file_pattern: None,
            rules: vec![archive_after_days(90)],
        })
        .unwrap();
    let summary = lifecycle.apply_policies().await.unwrap();
    assert_eq!(summary.actions_applied, 1);
    assert!(store.exists("releases-archive", "v0.9.0.zip").await.unwrap());

    // The archive container is an ordinary container: back it up and
    // validate like any other.
    let engine = BackupEngine::new(store.clone(), BackupConfig::default());
    let backup = engine.create_backup("releases-archive").await;
    assert!(backup.success);
    assert_eq!(backup.files_backed_up, 1);

    let validation = engine.validate_backup(&backup.backup_id).await;
    assert!(validation.valid);
}

#[tokio::test]
async fn test_audit_trail_grows_one_entry_per_gated_call() {
    let store = Arc::new(MemoryStore::new());
    store.create_container("pkgs").await.unwrap();

    let security = Arc::new(
        SecurityService::new(SecurityConfig::default(), Arc::new(MemoryCache::new())).unwrap(),
    );
    let monitor = Arc::new(MonitoringService::new(MonitorConfig::default()));
    let service = StorageService::new(store, security.clone(), monitor);

    for i in 0..20 {
        // Half pass, half are rejected; both must be audited.
        let name = if i % 2 == 0 {
            format!("pkg-{}.json", i)
        } else {
            format!("tool-{}.exe", i)
        };
        let _ = service
            .upload("pkgs", &name, Bytes::from_static(b"{}"), "application/json", None)
            .await;
    }

    let upload_audits = security
        .recent_events(1000)
        .into_iter()
        .filter(|e| matches!(e.kind, stevedore::security::SecurityEventKind::UploadValidated))
        .count();
    assert_eq!(upload_audits, 20);
}
