//! Recurring background loops for backup, lifecycle and threshold checks
//!
//! Each loop runs on its own interval and survives any failure within a
//! single cycle: errors are logged and the next tick proceeds. A watch
//! channel stops the loops for shutdown.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

use crate::backup::BackupEngine;
use crate::lifecycle::LifecycleEngine;
use crate::monitor::{AlertSeverity, MonitoringService};

/// Run scheduled backups (and retention pruning) for a fixed set of
/// containers.
pub fn spawn_backup_loop(
    engine: Arc<BackupEngine>,
    containers: Vec<String>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(?interval, containers = containers.len(), "backup loop started");
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    for container in &containers {
                        let outcome = engine.create_backup(container).await;
                        if !outcome.success {
                            error!(
                                container,
                                error = outcome.error.as_deref().unwrap_or("unknown"),
                                "scheduled backup failed"
                            );
                        }
                    }
                    match engine.prune_expired().await {
                        Ok(0) => {}
                        Ok(pruned) => info!(pruned, "expired backups pruned"),
                        Err(e) => error!(error = %e, "backup retention pruning failed"),
                    }
                }
                _ = shutdown.changed() => {
                    info!("backup loop stopping");
                    break;
                }
            }
        }
    })
}

/// Run the lifecycle engine on a recurring cycle.
pub fn spawn_lifecycle_loop(
    engine: Arc<LifecycleEngine>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(?interval, "lifecycle loop started");
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = engine.apply_policies().await {
                        error!(error = %e, "lifecycle cycle failed");
                    }
                }
                _ = shutdown.changed() => {
                    info!("lifecycle loop stopping");
                    break;
                }
            }
        }
    })
}

/// Periodically evaluate monitoring thresholds and log any alerts.
pub fn spawn_threshold_loop(
    monitor: Arc<MonitoringService>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(?interval, "threshold loop started");
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    for alert in monitor.check_thresholds() {
                        match alert.severity {
                            AlertSeverity::Critical => error!(
                                kind = ?alert.kind,
                                observed = alert.observed,
                                threshold = alert.threshold,
                                "{}", alert.message
                            ),
                            AlertSeverity::Warning => warn!(
                                kind = ?alert.kind,
                                observed = alert.observed,
                                threshold = alert.threshold,
                                "{}", alert.message
                            ),
                        }
                    }
                }
                _ = shutdown.changed() => {
                    info!("threshold loop stopping");
                    break;
                }
            }
        }
    })
}
