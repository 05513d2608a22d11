use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Snapshot origin as understood by the backend's describe call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SnapshotType {
    /// Backend-scheduled snapshot with short retention.
    Automated,
    /// Operator- or pipeline-created copy.
    Manual,
    /// Manual snapshot owned by another account and shared with this one.
    Shared,
}

impl SnapshotType {
    /// Wire value used in backend filters.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Automated => "automated",
            Self::Manual => "manual",
            Self::Shared => "shared",
        }
    }
}

impl fmt::Display for SnapshotType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle status reported by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SnapshotStatus {
    Creating,
    Copying,
    Available,
    Failed,
    Deleting,
    /// Backend-specific transient state, carried verbatim.
    Other(String),
}

impl SnapshotStatus {
    /// Parses a backend status string. Unknown values are kept as `Other`.
    #[must_use]
    pub fn parse(value: &str) -> Self {
        match value {
            "creating" => Self::Creating,
            "copying" => Self::Copying,
            "available" => Self::Available,
            "failed" => Self::Failed,
            "deleting" => Self::Deleting,
            other => Self::Other(other.to_string()),
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Creating => "creating",
            Self::Copying => "copying",
            Self::Available => "available",
            Self::Failed => "failed",
            Self::Deleting => "deleting",
            Self::Other(value) => value,
        }
    }

    #[must_use]
    pub fn is_available(&self) -> bool {
        matches!(self, Self::Available)
    }
}

impl fmt::Display for SnapshotStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time view of one snapshot as returned by a describe call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Identifier, unique within the owning account. Shared snapshots carry
    /// a fully-qualified (ARN-like) identifier.
    pub id: String,
    /// Owning database instance identifier.
    pub instance_id: String,
    pub snapshot_type: SnapshotType,
    pub status: SnapshotStatus,
    /// Absent while the snapshot is still being produced.
    pub created_at: Option<DateTime<Utc>>,
    /// Accounts granted restore access.
    #[serde(default)]
    pub shared_with: BTreeSet<String>,
}

impl Snapshot {
    /// Builds a snapshot that is still in progress (no creation time yet).
    pub fn pending(
        id: impl Into<String>,
        instance_id: impl Into<String>,
        snapshot_type: SnapshotType,
        status: SnapshotStatus,
    ) -> Self {
        Self {
            id: id.into(),
            instance_id: instance_id.into(),
            snapshot_type,
            status,
            created_at: None,
            shared_with: BTreeSet::new(),
        }
    }

    /// Builds an available snapshot created at `created_at`.
    pub fn available(
        id: impl Into<String>,
        instance_id: impl Into<String>,
        snapshot_type: SnapshotType,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            instance_id: instance_id.into(),
            snapshot_type,
            status: SnapshotStatus::Available,
            created_at: Some(created_at),
            shared_with: BTreeSet::new(),
        }
    }

    /// Ranking timestamp: the creation time of an available snapshot,
    /// otherwise `now`, so in-progress snapshots sort last.
    #[must_use]
    pub fn rank_time(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        match (&self.status, self.created_at) {
            (SnapshotStatus::Available, Some(created_at)) => created_at,
            _ => now,
        }
    }
}

/// Query passed to [`SnapshotBackend::describe_snapshots`](crate::SnapshotBackend::describe_snapshots).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotFilter {
    /// `None` requests an account-wide query.
    pub instance: Option<String>,
    pub snapshot_type: SnapshotType,
    /// Also return snapshots shared with this account by others.
    pub include_shared: bool,
}

impl SnapshotFilter {
    pub fn for_instance(instance: impl Into<String>, snapshot_type: SnapshotType) -> Self {
        Self {
            instance: Some(instance.into()),
            snapshot_type,
            include_shared: false,
        }
    }

    pub fn account_wide(snapshot_type: SnapshotType) -> Self {
        Self {
            instance: None,
            snapshot_type,
            include_shared: false,
        }
    }

    /// Account-wide shared snapshot query.
    #[must_use]
    pub fn shared() -> Self {
        Self::account_wide(SnapshotType::Shared).include_shared(true)
    }

    #[must_use]
    pub fn include_shared(mut self, include: bool) -> Self {
        self.include_shared = include;
        self
    }

    /// Whether `snapshot` satisfies this filter.
    #[must_use]
    pub fn matches(&self, snapshot: &Snapshot) -> bool {
        if snapshot.snapshot_type != self.snapshot_type {
            return false;
        }
        match &self.instance {
            Some(instance) => snapshot.instance_id == *instance,
            None => true,
        }
    }
}
