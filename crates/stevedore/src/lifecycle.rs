//! Lifecycle policy engine
//!
//! Evaluates configured retention/transition rules against object metadata
//! and applies the matching action. Policies are validated before entering
//! the active set; per-file failures never abort the rest of a cycle.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, RwLock};
use time::{Duration, OffsetDateTime};
use tracing::{debug, info, warn};

use crate::storage::{ObjectMetadata, ObjectStore, StorageClass, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    #[error("Policy name must not be empty")]
    EmptyName,

    #[error("Policy '{policy}' has an invalid container pattern: {reason}")]
    InvalidContainerPattern { policy: String, reason: String },

    #[error("Policy '{policy}' has an invalid file pattern: {reason}")]
    InvalidFilePattern { policy: String, reason: String },

    #[error("Policy '{0}' has no rules")]
    NoRules(String),

    #[error("Policy '{policy}' rule {index} has neither age predicate configured")]
    RuleWithoutAge { policy: String, index: usize },

    #[error("Policy '{policy}' rule {index} has min size greater than max size")]
    SizeBoundsInverted { policy: String, index: usize },

    #[error("Policy '{0}' is already registered")]
    DuplicatePolicy(String),

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),
}

/// Action applied to an object when a rule fires.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "class")]
pub enum LifecycleAction {
    /// Remove the object outright
    Delete,
    /// Copy to the sibling `-archive` container and delete the original
    Archive,
    /// Transition to another provider storage tier
    MoveStorageClass(StorageClass),
    /// Provider-side re-encoding
    Compress,
}

/// One age/size predicate set paired with an action.
///
/// Unset or zero predicates do not constrain; ages are measured in days.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleRule {
    pub action: LifecycleAction,

    #[serde(default)]
    pub min_age_created_days: Option<u32>,

    #[serde(default)]
    pub min_age_modified_days: Option<u32>,

    #[serde(default)]
    pub min_size_bytes: Option<u64>,

    #[serde(default)]
    pub max_size_bytes: Option<u64>,
}

impl LifecycleRule {
    fn has_age_predicate(&self) -> bool {
        self.min_age_created_days.is_some_and(|d| d > 0)
            || self.min_age_modified_days.is_some_and(|d| d > 0)
    }

    /// A rule fires only when every configured predicate holds.
    pub fn matches(&self, meta: &ObjectMetadata, now: OffsetDateTime) -> bool {
        if let Some(days) = self.min_age_created_days.filter(|d| *d > 0) {
            if now - meta.created_at < Duration::days(i64::from(days)) {
                return false;
            }
        }
        if let Some(days) = self.min_age_modified_days.filter(|d| *d > 0) {
            if now - meta.last_modified < Duration::days(i64::from(days)) {
                return false;
            }
        }
        if let Some(min) = self.min_size_bytes.filter(|s| *s > 0) {
            if meta.size < min {
                return false;
            }
        }
        if let Some(max) = self.max_size_bytes.filter(|s| *s > 0) {
            if meta.size > max {
                return false;
            }
        }
        true
    }
}

/// A named set of rules scoped to containers (and optionally file names)
/// by regex.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecyclePolicy {
    pub name: String,

    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Regex matched against container names
    pub container_pattern: String,

    /// Optional regex matched against object keys
    #[serde(default)]
    pub file_pattern: Option<String>,

    /// Ordered rules; the first matching rule per object wins
    pub rules: Vec<LifecycleRule>,
}

fn default_enabled() -> bool {
    true
}

/// Counters accumulated across lifecycle cycles.
#[derive(Debug, Clone, Default, Serialize)]
pub struct LifecycleStatistics {
    pub cycles: u64,
    pub files_evaluated: u64,
    pub files_deleted: u64,
    pub files_archived: u64,
    pub files_transitioned: u64,
    pub files_compressed: u64,
    pub failures: u64,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_run_at: Option<OffsetDateTime>,
}

/// Outcome of one `apply_policies` cycle.
#[derive(Debug, Clone, Default, Serialize)]
pub struct LifecycleRunSummary {
    pub policies_applied: u64,
    pub files_evaluated: u64,
    pub actions_applied: u64,
    pub failures: Vec<String>,
}

/// Applies lifecycle policies against the object store.
pub struct LifecycleEngine {
    store: Arc<dyn ObjectStore>,
    policies: RwLock<Vec<LifecyclePolicy>>,
    stats: Mutex<LifecycleStatistics>,
}

impl LifecycleEngine {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self {
            store,
            policies: RwLock::new(Vec::new()),
            stats: Mutex::new(LifecycleStatistics::default()),
        }
    }

    /// Check a policy without registering it.
    pub fn validate_policy(policy: &LifecyclePolicy) -> Result<(), LifecycleError> {
        if policy.name.trim().is_empty() {
            return Err(LifecycleError::EmptyName);
        }
        if policy.container_pattern.trim().is_empty() {
            return Err(LifecycleError::InvalidContainerPattern {
                policy: policy.name.clone(),
                reason: "pattern is empty".to_string(),
            });
        }
        Regex::new(&policy.container_pattern).map_err(|e| {
            LifecycleError::InvalidContainerPattern {
                policy: policy.name.clone(),
                reason: e.to_string(),
            }
        })?;
        if let Some(pattern) = &policy.file_pattern {
            Regex::new(pattern).map_err(|e| LifecycleError::InvalidFilePattern {
                policy: policy.name.clone(),
                reason: e.to_string(),
            })?;
        }
        if policy.rules.is_empty() {
            return Err(LifecycleError::NoRules(policy.name.clone()));
        }
        for (index, rule) in policy.rules.iter().enumerate() {
            if !rule.has_age_predicate() {
                return Err(LifecycleError::RuleWithoutAge {
                    policy: policy.name.clone(),
                    index,
                });
            }
            if let (Some(min), Some(max)) = (rule.min_size_bytes, rule.max_size_bytes) {
                if min > 0 && max > 0 && min > max {
                    return Err(LifecycleError::SizeBoundsInverted {
                        policy: policy.name.clone(),
                        index,
                    });
                }
            }
        }
        Ok(())
    }

    /// Validate a policy and add it to the active set.
    pub fn add_policy(&self, policy: LifecyclePolicy) -> Result<(), LifecycleError> {
        Self::validate_policy(&policy)?;
        let mut policies = self
            .policies
            .write()
            .map_err(|_| StoreError::Backend("Lock poisoned".into()))?;
        if policies.iter().any(|p| p.name == policy.name) {
            return Err(LifecycleError::DuplicatePolicy(policy.name));
        }
        policies.push(policy);
        Ok(())
    }

    /// Remove a policy by name, reporting whether it existed.
    pub fn remove_policy(&self, name: &str) -> bool {
        let Ok(mut policies) = self.policies.write() else {
            return false;
        };
        let before = policies.len();
        policies.retain(|p| p.name != name);
        policies.len() != before
    }

    /// Snapshot of the active policies.
    pub fn policies(&self) -> Vec<LifecyclePolicy> {
        self.policies.read().map(|p| p.clone()).unwrap_or_default()
    }

    pub fn statistics(&self) -> LifecycleStatistics {
        self.stats.lock().map(|s| s.clone()).unwrap_or_default()
    }

    /// Apply every enabled policy across all containers.
    pub async fn apply_policies(&self) -> Result<LifecycleRunSummary, LifecycleError> {
        let containers = self.store.list_containers().await?;
        self.run_cycle(&containers).await
    }

    /// Apply only the policies whose container pattern matches `container`.
    pub async fn apply_policies_for(
        &self,
        container: &str,
    ) -> Result<LifecycleRunSummary, LifecycleError> {
        let containers = [container.to_string()];
        self.run_cycle(&containers).await
    }

    async fn run_cycle(&self, containers: &[String]) -> Result<LifecycleRunSummary, LifecycleError> {
        let policies = self.policies();
        let mut summary = LifecycleRunSummary::default();
        let now = OffsetDateTime::now_utc();

        for policy in policies.iter().filter(|p| p.enabled) {
            // Patterns were validated on entry into the active set.
            let Ok(container_re) = Regex::new(&policy.container_pattern) else {
                continue;
            };
            let file_re = policy
                .file_pattern
                .as_deref()
                .and_then(|p| Regex::new(p).ok());

            let mut applied = false;
            for container in containers.iter().filter(|c| container_re.is_match(c)) {
                applied = true;
                self.apply_policy_to_container(policy, file_re.as_ref(), container, now, &mut summary)
                    .await;
            }
            if applied {
                summary.policies_applied += 1;
            }
        }

        if let Ok(mut stats) = self.stats.lock() {
            stats.cycles += 1;
            stats.files_evaluated += summary.files_evaluated;
            stats.failures += summary.failures.len() as u64;
            stats.last_run_at = Some(now);
        }
        info!(
            policies = summary.policies_applied,
            evaluated = summary.files_evaluated,
            actions = summary.actions_applied,
            failures = summary.failures.len(),
            "lifecycle cycle finished"
        );
        Ok(summary)
    }

    async fn apply_policy_to_container(
        &self,
        policy: &LifecyclePolicy,
        file_re: Option<&Regex>,
        container: &str,
        now: OffsetDateTime,
        summary: &mut LifecycleRunSummary,
    ) {
        let files = match self.store.list(container, None).await {
            Ok(files) => files,
            Err(e) => {
                warn!(container, policy = %policy.name, error = %e, "failed to list container");
                summary
                    .failures
                    .push(format!("{}: list failed: {}", container, e));
                return;
            }
        };

        for meta in files.iter().filter(|m| !m.is_directory()) {
            if file_re.is_some_and(|re| !re.is_match(&meta.key)) {
                continue;
            }
            summary.files_evaluated += 1;

            let Some(rule) = policy.rules.iter().find(|rule| rule.matches(meta, now)) else {
                continue;
            };
            match self.apply_action(&rule.action, container, &meta.key).await {
                Ok(applied) => {
                    if applied {
                        summary.actions_applied += 1;
                    }
                }
                Err(e) => {
                    warn!(
                        container,
                        key = %meta.key,
                        policy = %policy.name,
                        error = %e,
                        "lifecycle action failed, skipping file"
                    );
                    summary
                        .failures
                        .push(format!("{}/{}: {}", container, meta.key, e));
                }
            }
        }
    }

    /// Dispatch one action. Returns whether the action counted as applied;
    /// provider-unsupported transitions report `Ok(false)`.
    async fn apply_action(
        &self,
        action: &LifecycleAction,
        container: &str,
        key: &str,
    ) -> Result<bool, StoreError> {
        match action {
            LifecycleAction::Delete => {
                self.store.delete(container, key).await?;
                debug!(container, key, "lifecycle deleted object");
                self.bump(|s| s.files_deleted += 1);
                Ok(true)
            }
            LifecycleAction::Archive => {
                let archive = format!("{}-archive", container);
                self.store.ensure_container(&archive).await?;
                self.store.copy(container, key, &archive, key).await?;
                self.store.delete(container, key).await?;
                debug!(container, key, archive, "lifecycle archived object");
                self.bump(|s| s.files_archived += 1);
                Ok(true)
            }
            LifecycleAction::MoveStorageClass(class) => {
                match self.store.set_storage_class(container, key, *class).await {
                    Ok(()) => {
                        self.bump(|s| s.files_transitioned += 1);
                        Ok(true)
                    }
                    Err(StoreError::Unsupported(what)) => {
                        debug!(container, key, what, "provider does not support transition");
                        Ok(false)
                    }
                    Err(e) => Err(e),
                }
            }
            LifecycleAction::Compress => match self.store.compress_object(container, key).await {
                Ok(()) => {
                    self.bump(|s| s.files_compressed += 1);
                    Ok(true)
                }
                Err(StoreError::Unsupported(what)) => {
                    debug!(container, key, what, "provider does not support compression");
                    Ok(false)
                }
                Err(e) => Err(e),
            },
        }
    }

    fn bump(&self, update: impl FnOnce(&mut LifecycleStatistics)) {
        if let Ok(mut stats) = self.stats.lock() {
            update(&mut stats);
        }
    }
}
