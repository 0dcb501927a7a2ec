//! Stevedore background worker
//!
//! Wires configuration, tracing and the three recurring loops (backup,
//! lifecycle, threshold checks). Runs against the in-memory store scaffold
//! until a provider adapter is wired in.

use std::sync::Arc;

use stevedore::backup::BackupEngine;
use stevedore::config::StevedoreConfig;
use stevedore::lifecycle::LifecycleEngine;
use stevedore::monitor::MonitoringService;
use stevedore::scheduler;
use stevedore::storage::{MemoryStore, ObjectStore};
use tracing::{error, info};

#[tokio::main]
async fn main() -> stevedore::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "stevedore=info".to_string()),
        )
        .init();

    let config = StevedoreConfig::from_env()?;
    info!(version = stevedore::version(), "stevedore-worker starting");

    let store: Arc<dyn ObjectStore> = Arc::new(MemoryStore::new());
    let monitor = Arc::new(MonitoringService::new(config.monitor.clone()));

    let backup_engine = Arc::new(BackupEngine::new(store.clone(), config.backup.clone()));
    let lifecycle_engine = Arc::new(LifecycleEngine::new(store.clone()));
    for policy in config.lifecycle.policies.clone() {
        let name = policy.name.clone();
        if let Err(e) = lifecycle_engine.add_policy(policy) {
            error!(policy = %name, error = %e, "rejected lifecycle policy");
        }
    }

    let backup_containers: Vec<String> = std::env::var("STEVEDORE_BACKUP_SOURCES")
        .map(|raw| {
            raw.split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        })
        .unwrap_or_default();
    for container in &backup_containers {
        store.ensure_container(container).await?;
    }

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let handles = vec![
        scheduler::spawn_backup_loop(
            backup_engine,
            backup_containers,
            config.backup.interval(),
            shutdown_rx.clone(),
        ),
        scheduler::spawn_lifecycle_loop(
            lifecycle_engine,
            config.lifecycle.interval(),
            shutdown_rx.clone(),
        ),
        scheduler::spawn_threshold_loop(
            monitor,
            config.monitor.threshold_check_interval(),
            shutdown_rx,
        ),
    ];
    info!("background loops running, press ctrl-c to stop");

    tokio::signal::ctrl_c().await?;
    info!("shutting down");
    let _ = shutdown_tx.send(true);
    for handle in handles {
        let _ = handle.await;
    }

    Ok(())
}
