//! Security validation pipeline gating uploads and downloads
//!
//! Validation accumulates every violation instead of stopping at the first
//! one, so a caller sees the complete rejection reason set. Each validation
//! attempt is recorded in the append-only audit trail, pass or fail.

use bytes::Bytes;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use time::OffsetDateTime;
use uuid::Uuid;

use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::cache::{Cache, CacheError};
use crate::config::SecurityConfig;

pub mod encryption;
pub mod scanner;

pub use encryption::Encryptor;
pub use scanner::{ContentScanner, ScanResult};

#[derive(Debug, thiserror::Error)]
pub enum SecurityError {
    #[error("Invalid key material: {0}")]
    InvalidKeyMaterial(String),

    #[error("Encryption failure: {0}")]
    Encryption(String),

    #[error("Validation rejected: {}", violations.join("; "))]
    Rejected { violations: Vec<String> },

    #[error("Rate limit exceeded for client: {0}")]
    RateLimited(String),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),
}

/// Kind of entry in the security audit trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SecurityEventKind {
    UploadValidated,
    DownloadValidated,
    ScanCompleted,
    AccessDenied,
    RateLimited,
    SuspiciousActivity,
}

/// One entry in the append-only security audit trail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityEvent {
    pub id: String,
    pub kind: SecurityEventKind,

    /// Container, file name or client address the event concerns
    pub subject: String,

    pub success: bool,

    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,

    pub detail: String,
}

impl SecurityEvent {
    pub fn new(
        kind: SecurityEventKind,
        subject: impl Into<String>,
        success: bool,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            kind,
            subject: subject.into(),
            success,
            timestamp: OffsetDateTime::now_utc(),
            detail: detail.into(),
        }
    }
}

/// Outcome of one validation call. Policy failures are reported here, never
/// as errors, so the caller decides what to do with a rejection.
#[derive(Debug, Clone, Serialize)]
pub struct ValidationOutcome {
    pub valid: bool,
    pub violations: Vec<String>,
}

impl ValidationOutcome {
    fn from_violations(violations: Vec<String>) -> Self {
        Self {
            valid: violations.is_empty(),
            violations,
        }
    }
}

/// Rate-limit standing for one client within the current window.
#[derive(Debug, Clone, Serialize)]
pub struct RateLimitStatus {
    pub client_id: String,
    pub current: u64,
    pub max: u64,
    pub allowed: bool,
    pub window_secs: u64,
}

/// The security validation pipeline.
pub struct SecurityService {
    config: SecurityConfig,
    cache: Arc<dyn Cache>,
    scanner: ContentScanner,
    encryptor: Encryptor,
    events: Mutex<VecDeque<SecurityEvent>>,
}

impl SecurityService {
    pub fn new(config: SecurityConfig, cache: Arc<dyn Cache>) -> Result<Self, SecurityError> {
        let encryptor = if config.enable_encryption {
            let encoded = config.encryption_key_base64.as_deref().ok_or_else(|| {
                SecurityError::InvalidKeyMaterial(
                    "encryption is enabled but no key is configured".to_string(),
                )
            })?;
            let key = base64::engine::general_purpose::STANDARD
                .decode(encoded)
                .map_err(|e| SecurityError::InvalidKeyMaterial(e.to_string()))?;
            Encryptor::from_key(&key)?
        } else {
            Encryptor::disabled()
        };

        Ok(Self {
            config,
            cache,
            scanner: ContentScanner::new(),
            encryptor,
            events: Mutex::new(VecDeque::new()),
        })
    }

    /// Validate an upload before it reaches the store.
    ///
    /// Checks run in order (extension, size, content type, IP policy) and
    /// accumulate; the signature scan runs last and only when everything
    /// before it passed.
    pub async fn validate_upload(
        &self,
        file_name: &str,
        content: &[u8],
        content_type: &str,
        client_ip: Option<&str>,
    ) -> ValidationOutcome {
        let mut violations = Vec::new();

        match file_extension(file_name) {
            Some(ext) => {
                if self
                    .config
                    .blocked_extensions
                    .iter()
                    .any(|blocked| blocked.eq_ignore_ascii_case(ext))
                {
                    violations.push(format!("File extension '.{}' is blocked", ext));
                } else if !self.config.allowed_extensions.is_empty()
                    && !self
                        .config
                        .allowed_extensions
                        .iter()
                        .any(|allowed| allowed.eq_ignore_ascii_case(ext))
                {
                    violations.push(format!("File extension '.{}' is not on the allow list", ext));
                }
            }
            None => {
                if !self.config.allowed_extensions.is_empty() {
                    violations.push(
                        "File has no extension but an extension allow list is configured"
                            .to_string(),
                    );
                }
            }
        }

        if content.len() as u64 > self.config.max_file_size {
            violations.push(format!(
                "File size {} exceeds the maximum of {} bytes",
                content.len(),
                self.config.max_file_size
            ));
        }

        if !self
            .config
            .allowed_content_types
            .iter()
            .any(|prefix| content_type.starts_with(prefix))
        {
            violations.push(format!("Content type '{}' is not allowed", content_type));
        }

        if let Some(ip) = client_ip {
            if !self.is_ip_allowed(ip) {
                violations.push(format!("Client address {} is denied by IP policy", ip));
                self.record_event(SecurityEvent::new(
                    SecurityEventKind::AccessDenied,
                    ip,
                    false,
                    format!("upload of '{}' denied by IP policy", file_name),
                ));
            }
        }

        // The scan is the expensive step; skip it once the upload is
        // already rejected.
        if violations.is_empty() && self.config.enable_content_scanning {
            let scan = self.scanner.scan(content, file_name);
            self.record_event(SecurityEvent::new(
                SecurityEventKind::ScanCompleted,
                file_name,
                scan.is_clean,
                scan.threat.clone().unwrap_or_else(|| "clean".to_string()),
            ));
            if let Some(threat) = scan.threat {
                violations.push(format!("Content scan detected threat: {}", threat));
            }
        }

        let outcome = ValidationOutcome::from_violations(violations);
        self.record_event(SecurityEvent::new(
            SecurityEventKind::UploadValidated,
            file_name,
            outcome.valid,
            outcome.violations.join("; "),
        ));
        outcome
    }

    /// Validate a download request before content is served.
    pub async fn validate_download(
        &self,
        container: &str,
        file_name: &str,
        client_ip: Option<&str>,
    ) -> ValidationOutcome {
        let mut violations = Vec::new();
        let subject = format!("{}/{}", container, file_name);

        if file_name.contains("..") || file_name.starts_with('/') {
            violations.push(format!("File name '{}' is not a valid object key", file_name));
            self.record_event(SecurityEvent::new(
                SecurityEventKind::SuspiciousActivity,
                &subject,
                false,
                "path traversal attempt in download request",
            ));
        }

        if let Some(ip) = client_ip {
            if !self.is_ip_allowed(ip) {
                violations.push(format!("Client address {} is denied by IP policy", ip));
                self.record_event(SecurityEvent::new(
                    SecurityEventKind::AccessDenied,
                    ip,
                    false,
                    format!("download of '{}' denied by IP policy", subject),
                ));
            }
        }

        let outcome = ValidationOutcome::from_violations(violations);
        self.record_event(SecurityEvent::new(
            SecurityEventKind::DownloadValidated,
            &subject,
            outcome.valid,
            outcome.violations.join("; "),
        ));
        outcome
    }

    /// Run the signature scanner directly.
    pub fn scan(&self, content: &[u8], file_name: &str) -> ScanResult {
        self.scanner.scan(content, file_name)
    }

    /// Apply the IP policy: explicit blocks win, then the allow list when
    /// one is configured, otherwise default-allow.
    pub fn is_ip_allowed(&self, ip: &str) -> bool {
        if self
            .config
            .blocked_ip_ranges
            .iter()
            .any(|range| ip.starts_with(range.as_str()))
        {
            return false;
        }
        if !self.config.allowed_ip_ranges.is_empty() {
            return self
                .config
                .allowed_ip_ranges
                .iter()
                .any(|range| ip.starts_with(range.as_str()));
        }
        true
    }

    fn rate_limit_key(client_id: &str) -> String {
        format!("ratelimit:{}", client_id)
    }

    /// Report a client's standing against the hourly ceiling.
    pub async fn rate_limit_status(&self, client_id: &str) -> Result<RateLimitStatus, SecurityError> {
        let current = match self.cache.get(&Self::rate_limit_key(client_id)).await? {
            Some(bytes) => std::str::from_utf8(&bytes)
                .ok()
                .and_then(|text| text.parse::<u64>().ok())
                .unwrap_or(0),
            None => 0,
        };
        let max = self.config.rate_limit_max_per_window;
        Ok(RateLimitStatus {
            client_id: client_id.to_string(),
            current,
            max,
            allowed: current < max,
            window_secs: self.config.rate_limit_window_secs,
        })
    }

    /// Count one completed operation against the client's window.
    ///
    /// Uses the cache's atomic increment-with-TTL, so concurrent operations
    /// from the same client cannot lose counts.
    pub async fn update_rate_limit(&self, client_id: &str) -> Result<u64, SecurityError> {
        let count = self
            .cache
            .increment(
                &Self::rate_limit_key(client_id),
                self.config.rate_limit_window(),
            )
            .await?;

        if count > self.config.rate_limit_max_per_window {
            self.record_event(SecurityEvent::new(
                SecurityEventKind::RateLimited,
                client_id,
                false,
                format!(
                    "{} operations in the current window, limit {}",
                    count, self.config.rate_limit_max_per_window
                ),
            ));
        }
        Ok(count)
    }

    /// Encrypt content for at-rest storage (pass-through when disabled).
    pub fn encrypt(&self, data: Bytes) -> Result<Bytes, SecurityError> {
        self.encryptor.encrypt(data)
    }

    /// Decrypt at-rest content (pass-through when disabled).
    pub fn decrypt(&self, data: Bytes) -> Result<Bytes, SecurityError> {
        self.encryptor.decrypt(data)
    }

    pub fn encryption_enabled(&self) -> bool {
        self.encryptor.is_enabled()
    }

    /// Append an entry to the audit trail.
    pub fn record_event(&self, event: SecurityEvent) {
        tracing::info!(
            kind = ?event.kind,
            subject = %event.subject,
            success = event.success,
            "security event"
        );
        if let Ok(mut events) = self.events.lock() {
            events.push_back(event);
            while events.len() > self.config.max_event_history {
                events.pop_front();
            }
        }
    }

    /// Most recent audit entries, newest last.
    pub fn recent_events(&self, limit: usize) -> Vec<SecurityEvent> {
        self.events
            .lock()
            .map(|events| {
                events
                    .iter()
                    .rev()
                    .take(limit)
                    .cloned()
                    .collect::<Vec<_>>()
                    .into_iter()
                    .rev()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Total audit entries currently retained.
    pub fn event_count(&self) -> usize {
        self.events.lock().map(|events| events.len()).unwrap_or(0)
    }
}

fn file_extension(file_name: &str) -> Option<&str> {
    let (stem, ext) = file_name.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext)
}
