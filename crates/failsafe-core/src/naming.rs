//! Snapshot naming convention shared by both accounts.
//!
//! The promoted manual identifier is the only correlation key between the
//! live and failsafe accounts, so the mapping must be deterministic and must
//! refuse identifiers that do not follow the expected backend convention.

use regex::Regex;

use crate::config::NamingConfig;
use crate::error::{FailsafeError, FailsafeResult};

/// Bidirectional mapping between automatic and promoted snapshot names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamingScheme {
    automated_prefix: String,
    managed_prefix: String,
}

impl NamingScheme {
    pub fn new(automated_prefix: impl Into<String>, managed_prefix: impl Into<String>) -> Self {
        Self {
            automated_prefix: automated_prefix.into(),
            managed_prefix: managed_prefix.into(),
        }
    }

    pub fn from_config(config: &NamingConfig) -> Self {
        Self::new(&config.automated_prefix, &config.managed_prefix)
    }

    pub fn automated_prefix(&self) -> &str {
        &self.automated_prefix
    }

    pub fn managed_prefix(&self) -> &str {
        &self.managed_prefix
    }

    /// Maps `rds:db-2024-01-01` to `failsafe-db-2024-01-01`.
    ///
    /// # Errors
    ///
    /// `FailsafeError::InvalidName` if `auto_id` lacks the automated prefix
    /// or has nothing after it.
    pub fn promoted_name(&self, auto_id: &str) -> FailsafeResult<String> {
        match auto_id.strip_prefix(&self.automated_prefix) {
            Some(stem) if !stem.is_empty() => Ok(format!("{}{}", self.managed_prefix, stem)),
            _ => Err(FailsafeError::invalid_name(auto_id, &self.automated_prefix)),
        }
    }

    /// Inverse of [`promoted_name`](Self::promoted_name).
    pub fn source_name(&self, manual_id: &str) -> FailsafeResult<String> {
        match manual_id.strip_prefix(&self.managed_prefix) {
            Some(stem) if !stem.is_empty() => Ok(format!("{}{}", self.automated_prefix, stem)),
            _ => Err(FailsafeError::invalid_name(manual_id, &self.managed_prefix)),
        }
    }

    /// Whether `id` belongs to the pipeline's namespace. Snapshots outside it
    /// are never touched by retention.
    pub fn is_managed_name(&self, id: &str) -> bool {
        id.strip_prefix(&self.managed_prefix)
            .is_some_and(|stem| !stem.is_empty())
    }

    /// Builds the matcher used to find `manual_id` among shared snapshots.
    pub fn shared_matcher(&self, manual_id: &str) -> FailsafeResult<SharedSnapshotMatcher> {
        SharedSnapshotMatcher::new(manual_id)
    }
}

/// Matches fully-qualified shared identifiers (`arn:...:snapshot:<name>`)
/// against a manual snapshot name. The name is escaped, so characters such
/// as `.` in instance names are compared literally, and the match is
/// anchored at the end of the identifier.
#[derive(Debug, Clone)]
pub struct SharedSnapshotMatcher {
    manual_id: String,
    pattern: Regex,
}

impl SharedSnapshotMatcher {
    pub fn new(manual_id: &str) -> FailsafeResult<Self> {
        let pattern = Regex::new(&format!("^.*:{}$", regex::escape(manual_id)))
            .map_err(|e| FailsafeError::configuration(format!("invalid shared matcher: {e}")))?;
        Ok(Self {
            manual_id: manual_id.to_string(),
            pattern,
        })
    }

    pub fn manual_id(&self) -> &str {
        &self.manual_id
    }

    pub fn matches(&self, shared_id: &str) -> bool {
        self.pattern.is_match(shared_id)
    }
}

impl Default for NamingScheme {
    fn default() -> Self {
        Self::from_config(&NamingConfig::default())
    }
}
