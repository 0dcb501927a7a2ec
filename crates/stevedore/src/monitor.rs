//! Monitoring service for storage operations
//!
//! Records one metric per operation into a rolling in-memory buffer,
//! computes health over a trailing window, and raises threshold alerts.
//! Recording is deliberately infallible: telemetry must never break the
//! operation it observes.

use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use time::OffsetDateTime;
use tracing::debug;

use crate::config::MonitorConfig;

/// Success rate below this is degraded (and alerts at warning level).
const SUCCESS_RATE_FLOOR: f64 = 0.95;

/// Success rate below this is unhealthy.
const UNHEALTHY_SUCCESS_RATE: f64 = 0.80;

/// Error rate above this raises a critical alert.
const ERROR_RATE_CEILING: f64 = 0.05;

/// One recorded storage operation.
#[derive(Debug, Clone, Serialize)]
pub struct OperationMetric {
    pub operation: String,
    pub container: String,
    pub file: Option<String>,
    pub success: bool,
    pub duration: Duration,
    pub bytes: u64,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    pub error_kind: Option<String>,
}

/// Rolling health verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthState {
    Healthy,
    Degraded,
    Unhealthy,
}

/// Health over the trailing window.
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub state: HealthState,
    pub success_rate: f64,
    pub average_response_time: Duration,
    pub sample_count: usize,
    pub window: Duration,
}

/// Aggregates for one operation name.
#[derive(Debug, Clone, Default, Serialize)]
pub struct OperationAggregate {
    pub count: u64,
    pub failures: u64,
    pub bytes: u64,
    pub average_response_time: Duration,
}

/// Aggregated metrics over a requested period.
#[derive(Debug, Clone, Serialize)]
pub struct StorageMetrics {
    pub period: Duration,
    pub total_operations: u64,
    pub successes: u64,
    pub failures: u64,
    pub success_rate: f64,
    pub average_response_time: Duration,
    pub total_bytes: u64,
    pub per_operation: HashMap<String, OperationAggregate>,
}

/// Transfer volume for one operation kind.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct KindUsage {
    pub count: u64,
    pub bytes: u64,
}

/// Transfer volumes over the retention window, split by operation kind.
#[derive(Debug, Clone, Serialize)]
pub struct UsageStatistics {
    pub window: Duration,
    pub uploads: KindUsage,
    pub downloads: KindUsage,
    pub deletes: KindUsage,
    pub other: KindUsage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    SuccessRate,
    ResponseTime,
    ErrorRate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Warning,
    Critical,
}

/// One threshold breach, carrying the observed value and the threshold it
/// crossed for downstream paging.
#[derive(Debug, Clone, Serialize)]
pub struct ThresholdAlert {
    pub kind: AlertKind,
    pub severity: AlertSeverity,
    pub observed: f64,
    pub threshold: f64,
    pub message: String,
}

/// Records and aggregates per-operation metrics.
pub struct MonitoringService {
    config: MonitorConfig,
    metrics: Mutex<VecDeque<OperationMetric>>,
}

impl MonitoringService {
    pub fn new(config: MonitorConfig) -> Self {
        Self {
            config,
            metrics: Mutex::new(VecDeque::new()),
        }
    }

    /// Record one operation. Best-effort: never fails, never panics.
    pub fn record_operation(&self, metric: OperationMetric) {
        debug!(
            operation = %metric.operation,
            container = %metric.container,
            success = metric.success,
            duration_ms = metric.duration.as_millis() as u64,
            "operation recorded"
        );
        let Ok(mut metrics) = self.metrics.lock() else {
            return;
        };
        let cutoff = OffsetDateTime::now_utc() - self.config.retention();
        while metrics.front().is_some_and(|m| m.timestamp < cutoff) {
            metrics.pop_front();
        }
        metrics.push_back(metric);
    }

    /// Open a scoped handle that records exactly one metric when finished
    /// or dropped.
    pub fn start_operation(
        self: &Arc<Self>,
        operation: impl Into<String>,
        container: impl Into<String>,
        file: Option<String>,
    ) -> OperationGuard {
        OperationGuard {
            service: Arc::clone(self),
            operation: operation.into(),
            container: container.into(),
            file,
            started: Instant::now(),
            recorded: false,
        }
    }

    fn window_snapshot(&self, window: Duration) -> Vec<OperationMetric> {
        let cutoff = OffsetDateTime::now_utc() - window;
        self.metrics
            .lock()
            .map(|metrics| {
                metrics
                    .iter()
                    .filter(|m| m.timestamp >= cutoff)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Aggregate metrics over the requested trailing period.
    pub fn metrics(&self, period: Duration) -> StorageMetrics {
        let samples = self.window_snapshot(period);
        let total = samples.len() as u64;
        let successes = samples.iter().filter(|m| m.success).count() as u64;
        let total_bytes = samples.iter().map(|m| m.bytes).sum();
        let average_response_time = average_duration(samples.iter().map(|m| m.duration));

        let mut per_operation: HashMap<String, OperationAggregate> = HashMap::new();
        let mut durations: HashMap<String, Vec<Duration>> = HashMap::new();
        for metric in &samples {
            let aggregate = per_operation.entry(metric.operation.clone()).or_default();
            aggregate.count += 1;
            if !metric.success {
                aggregate.failures += 1;
            }
            aggregate.bytes += metric.bytes;
            durations
                .entry(metric.operation.clone())
                .or_default()
                .push(metric.duration);
        }
        for (operation, observed) in durations {
            if let Some(aggregate) = per_operation.get_mut(&operation) {
                aggregate.average_response_time = average_duration(observed.into_iter());
            }
        }

        StorageMetrics {
            period,
            total_operations: total,
            successes,
            failures: total - successes,
            success_rate: success_rate(successes, total),
            average_response_time,
            total_bytes,
            per_operation,
        }
    }

    /// Health over the configured trailing window.
    pub fn health(&self) -> HealthReport {
        let window = self.config.health_window();
        let samples = self.window_snapshot(window);
        let total = samples.len();
        let successes = samples.iter().filter(|m| m.success).count();
        let rate = success_rate(successes as u64, total as u64);
        let average = average_duration(samples.iter().map(|m| m.duration));

        let state = if total == 0 {
            HealthState::Healthy
        } else if rate < UNHEALTHY_SUCCESS_RATE {
            HealthState::Unhealthy
        } else if rate < SUCCESS_RATE_FLOOR || average > self.config.max_response_time() {
            HealthState::Degraded
        } else {
            HealthState::Healthy
        };

        HealthReport {
            state,
            success_rate: rate,
            average_response_time: average,
            sample_count: total,
            window,
        }
    }

    /// Transfer volumes over the retention window.
    pub fn usage(&self) -> UsageStatistics {
        let window = self.config.retention();
        let samples = self.window_snapshot(window);

        let mut usage = UsageStatistics {
            window,
            uploads: KindUsage::default(),
            downloads: KindUsage::default(),
            deletes: KindUsage::default(),
            other: KindUsage::default(),
        };
        for metric in &samples {
            let bucket = if metric.operation.starts_with("upload") {
                &mut usage.uploads
            } else if metric.operation.starts_with("download") {
                &mut usage.downloads
            } else if metric.operation.starts_with("delete") {
                &mut usage.deletes
            } else {
                &mut usage.other
            };
            bucket.count += 1;
            bucket.bytes += metric.bytes;
        }
        usage
    }

    /// Evaluate success-rate, response-time and error-rate thresholds
    /// independently over the health window.
    pub fn check_thresholds(&self) -> Vec<ThresholdAlert> {
        let samples = self.window_snapshot(self.config.health_window());
        if samples.is_empty() {
            return Vec::new();
        }

        let total = samples.len() as u64;
        let successes = samples.iter().filter(|m| m.success).count() as u64;
        let rate = success_rate(successes, total);
        let error_rate = 1.0 - rate;
        let average = average_duration(samples.iter().map(|m| m.duration));
        let max_response = self.config.max_response_time();

        let mut alerts = Vec::new();
        if rate < SUCCESS_RATE_FLOOR {
            alerts.push(ThresholdAlert {
                kind: AlertKind::SuccessRate,
                severity: AlertSeverity::Warning,
                observed: rate,
                threshold: SUCCESS_RATE_FLOOR,
                message: format!(
                    "success rate {:.1}% is below {:.0}%",
                    rate * 100.0,
                    SUCCESS_RATE_FLOOR * 100.0
                ),
            });
        }
        if average > max_response {
            alerts.push(ThresholdAlert {
                kind: AlertKind::ResponseTime,
                severity: AlertSeverity::Warning,
                observed: average.as_millis() as f64,
                threshold: max_response.as_millis() as f64,
                message: format!(
                    "average response time {}ms exceeds {}ms",
                    average.as_millis(),
                    max_response.as_millis()
                ),
            });
        }
        if error_rate > ERROR_RATE_CEILING {
            alerts.push(ThresholdAlert {
                kind: AlertKind::ErrorRate,
                severity: AlertSeverity::Critical,
                observed: error_rate,
                threshold: ERROR_RATE_CEILING,
                message: format!(
                    "error rate {:.1}% exceeds {:.0}%",
                    error_rate * 100.0,
                    ERROR_RATE_CEILING * 100.0
                ),
            });
        }
        alerts
    }

    /// Number of metrics currently buffered (useful for testing).
    pub fn buffered(&self) -> usize {
        self.metrics.lock().map(|m| m.len()).unwrap_or(0)
    }
}

fn success_rate(successes: u64, total: u64) -> f64 {
    if total == 0 {
        1.0
    } else {
        successes as f64 / total as f64
    }
}

fn average_duration(samples: impl Iterator<Item = Duration>) -> Duration {
    let mut total = Duration::ZERO;
    let mut count = 0u32;
    for duration in samples {
        total += duration;
        count += 1;
    }
    if count == 0 {
        Duration::ZERO
    } else {
        total / count
    }
}

/// Scoped handle recording exactly one metric for one operation.
///
/// Dropping the guard without an explicit outcome records a success with
/// zero bytes.
pub struct OperationGuard {
    service: Arc<MonitoringService>,
    operation: String,
    container: String,
    file: Option<String>,
    started: Instant,
    recorded: bool,
}

impl OperationGuard {
    /// Record a successful completion with the bytes transferred.
    pub fn success(mut self, bytes: u64) {
        self.record(true, bytes, None);
    }

    /// Record a failure with an error classification.
    pub fn failure(mut self, error_kind: impl Into<String>) {
        self.record(false, 0, Some(error_kind.into()));
    }

    fn record(&mut self, success: bool, bytes: u64, error_kind: Option<String>) {
        if self.recorded {
            return;
        }
        self.recorded = true;
        self.service.record_operation(OperationMetric {
            operation: self.operation.clone(),
            container: self.container.clone(),
            file: self.file.take(),
            success,
            duration: self.started.elapsed(),
            bytes,
            timestamp: OffsetDateTime::now_utc(),
            error_kind,
        });
    }
}

impl Drop for OperationGuard {
    fn drop(&mut self) {
        self.record(true, 0, None);
    }
}
