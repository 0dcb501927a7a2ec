//! Configuration surface consumed by the engines
//!
//! Every component takes its own config struct; [`StevedoreConfig`] bundles
//! them and offers `from_env` for deployments driven by environment
//! variables.

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

use crate::error::{Result, StevedoreError};
use crate::lifecycle::LifecyclePolicy;

fn env_parse<T: FromStr>(name: &str, default: T) -> Result<T> {
    match std::env::var(name) {
        Ok(raw) => raw
            .parse()
            .map_err(|_| StevedoreError::Config(format!("Invalid {} value", name))),
        Err(_) => Ok(default),
    }
}

fn env_list(name: &str, default: &[&str]) -> Vec<String> {
    match std::env::var(name) {
        Ok(raw) => raw
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
        Err(_) => default.iter().map(|s| s.to_string()).collect(),
    }
}

/// Security pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    /// Maximum accepted upload size in bytes
    pub max_file_size: u64,

    /// File extensions (without dot) rejected outright
    pub blocked_extensions: Vec<String>,

    /// When non-empty, only these extensions are accepted
    pub allowed_extensions: Vec<String>,

    /// Accepted content-type prefixes
    pub allowed_content_types: Vec<String>,

    /// IP prefixes rejected outright
    pub blocked_ip_ranges: Vec<String>,

    /// When non-empty, only these IP prefixes are accepted
    pub allowed_ip_ranges: Vec<String>,

    /// Run the signature scanner on uploads
    pub enable_content_scanning: bool,

    /// Encrypt object content at rest
    pub enable_encryption: bool,

    /// 32-byte AES-256 key, base64-encoded; required when encryption is on
    pub encryption_key_base64: Option<String>,

    /// Operations allowed per client per window
    pub rate_limit_max_per_window: u64,

    /// Rate-limit window length in seconds
    pub rate_limit_window_secs: u64,

    /// Bound on the in-memory security event history
    pub max_event_history: usize,
}

impl SecurityConfig {
    pub fn rate_limit_window(&self) -> Duration {
        Duration::from_secs(self.rate_limit_window_secs)
    }
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            max_file_size: 100 * 1024 * 1024,
            blocked_extensions: ["exe", "bat", "cmd", "scr", "vbs", "ps1"]
                .map(String::from)
                .to_vec(),
            allowed_extensions: Vec::new(),
            allowed_content_types: [
                "application/json",
                "application/xml",
                "application/zip",
                "application/pdf",
                "application/gzip",
                "text/",
                "image/",
            ]
            .map(String::from)
            .to_vec(),
            blocked_ip_ranges: Vec::new(),
            allowed_ip_ranges: Vec::new(),
            enable_content_scanning: true,
            enable_encryption: false,
            encryption_key_base64: None,
            rate_limit_max_per_window: 1000,
            rate_limit_window_secs: 3600,
            max_event_history: 10_000,
        }
    }
}

/// Backup engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupConfig {
    /// Container holding all backup sets and manifests
    pub backup_container: String,

    /// Days a backup is retained before pruning
    pub retention_days: u32,

    /// Seconds between scheduled backup cycles
    pub interval_secs: u64,
}

impl BackupConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            backup_container: "backups".to_string(),
            retention_days: 30,
            interval_secs: 24 * 60 * 60,
        }
    }
}

/// Lifecycle engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleConfig {
    /// Seconds between lifecycle cycles
    #[serde(default = "default_lifecycle_interval")]
    pub interval_secs: u64,

    /// Policies loaded into the engine at startup
    #[serde(default)]
    pub policies: Vec<LifecyclePolicy>,
}

fn default_lifecycle_interval() -> u64 {
    60 * 60
}

impl LifecycleConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_lifecycle_interval(),
            policies: Vec::new(),
        }
    }
}

/// Monitoring configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Average latency above this is considered degraded
    pub max_response_time_ms: u64,

    /// How long raw metrics are kept in the rolling buffer
    pub retention_secs: u64,

    /// Trailing window for health and threshold evaluation
    pub health_window_secs: u64,

    /// Seconds between threshold-check cycles
    pub threshold_check_interval_secs: u64,
}

impl MonitorConfig {
    pub fn max_response_time(&self) -> Duration {
        Duration::from_millis(self.max_response_time_ms)
    }

    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_secs)
    }

    pub fn health_window(&self) -> Duration {
        Duration::from_secs(self.health_window_secs)
    }

    pub fn threshold_check_interval(&self) -> Duration {
        Duration::from_secs(self.threshold_check_interval_secs)
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            max_response_time_ms: 5000,
            retention_secs: 24 * 60 * 60,
            health_window_secs: 5 * 60,
            threshold_check_interval_secs: 60,
        }
    }
}

/// Full configuration bundle for the orchestration layer
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StevedoreConfig {
    #[serde(default)]
    pub security: SecurityConfig,
    #[serde(default)]
    pub backup: BackupConfig,
    #[serde(default)]
    pub lifecycle: LifecycleConfig,
    #[serde(default)]
    pub monitor: MonitorConfig,
}

impl StevedoreConfig {
    /// Load configuration from `STEVEDORE_*` environment variables,
    /// falling back to defaults for anything unset.
    pub fn from_env() -> Result<Self> {
        let security_defaults = SecurityConfig::default();
        let security = SecurityConfig {
            max_file_size: env_parse("STEVEDORE_MAX_FILE_SIZE", security_defaults.max_file_size)?,
            blocked_extensions: env_list(
                "STEVEDORE_BLOCKED_EXTENSIONS",
                &["exe", "bat", "cmd", "scr", "vbs", "ps1"],
            ),
            allowed_extensions: env_list("STEVEDORE_ALLOWED_EXTENSIONS", &[]),
            allowed_content_types: security_defaults.allowed_content_types.clone(),
            blocked_ip_ranges: env_list("STEVEDORE_BLOCKED_IP_RANGES", &[]),
            allowed_ip_ranges: env_list("STEVEDORE_ALLOWED_IP_RANGES", &[]),
            enable_content_scanning: env_parse("STEVEDORE_ENABLE_SCANNING", true)?,
            enable_encryption: env_parse("STEVEDORE_ENABLE_ENCRYPTION", false)?,
            encryption_key_base64: std::env::var("STEVEDORE_ENCRYPTION_KEY").ok(),
            rate_limit_max_per_window: env_parse(
                "STEVEDORE_RATE_LIMIT_MAX",
                security_defaults.rate_limit_max_per_window,
            )?,
            rate_limit_window_secs: env_parse(
                "STEVEDORE_RATE_LIMIT_WINDOW_SECONDS",
                security_defaults.rate_limit_window_secs,
            )?,
            max_event_history: security_defaults.max_event_history,
        };

        let backup_defaults = BackupConfig::default();
        let backup = BackupConfig {
            backup_container: std::env::var("STEVEDORE_BACKUP_CONTAINER")
                .unwrap_or(backup_defaults.backup_container),
            retention_days: env_parse(
                "STEVEDORE_BACKUP_RETENTION_DAYS",
                backup_defaults.retention_days,
            )?,
            interval_secs: env_parse(
                "STEVEDORE_BACKUP_INTERVAL_SECONDS",
                backup_defaults.interval_secs,
            )?,
        };

        let lifecycle = LifecycleConfig {
            interval_secs: env_parse(
                "STEVEDORE_LIFECYCLE_INTERVAL_SECONDS",
                default_lifecycle_interval(),
            )?,
            policies: Vec::new(),
        };

        let monitor_defaults = MonitorConfig::default();
        let monitor = MonitorConfig {
            max_response_time_ms: env_parse(
                "STEVEDORE_MAX_RESPONSE_TIME_MS",
                monitor_defaults.max_response_time_ms,
            )?,
            retention_secs: monitor_defaults.retention_secs,
            health_window_secs: monitor_defaults.health_window_secs,
            threshold_check_interval_secs: env_parse(
                "STEVEDORE_THRESHOLD_INTERVAL_SECONDS",
                monitor_defaults.threshold_check_interval_secs,
            )?,
        };

        Ok(Self {
            security,
            backup,
            lifecycle,
            monitor,
        })
    }
}
