//! Age-based deletion of managed snapshots.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use failsafe_core::{FailsafeResult, NamingScheme, Snapshot, SnapshotType};
use failsafe_storage::SnapshotInventory;

use crate::metrics::SNAPSHOTS_PRUNED_TOTAL;

/// How long a managed snapshot is kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    window: Duration,
}

impl RetentionPolicy {
    pub fn new(window: Duration) -> Self {
        Self { window }
    }

    pub fn from_days(days: i64) -> Self {
        Self::new(Duration::days(days))
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// A snapshot is expired once its age reaches the window.
    pub fn is_expired(&self, created_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        now - created_at >= self.window
    }
}

/// Result of one pruning pass over an instance.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PruneReport {
    /// Snapshots deleted (or, for a plan, that would be deleted).
    pub deleted: Vec<String>,
    /// Managed snapshots younger than the window.
    pub retained: Vec<String>,
    /// Managed snapshots ignored because they are not `available`.
    pub skipped: Vec<String>,
    /// Snapshots whose delete call was rejected.
    pub failed: Vec<String>,
}

impl PruneReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Deletes managed manual snapshots older than the retention window.
///
/// Only snapshots carrying the managed prefix are considered; anything an
/// operator created by hand, and anything still copying or deleting, is
/// left alone.
#[derive(Clone)]
pub struct RetentionManager {
    inventory: SnapshotInventory,
    naming: NamingScheme,
    policy: RetentionPolicy,
}

impl RetentionManager {
    pub fn new(inventory: SnapshotInventory, naming: NamingScheme, policy: RetentionPolicy) -> Self {
        Self {
            inventory,
            naming,
            policy,
        }
    }

    pub fn policy(&self) -> RetentionPolicy {
        self.policy
    }

    /// Deletes expired managed snapshots of `instance` as of now.
    pub async fn prune_expired(&self, instance: &str) -> FailsafeResult<PruneReport> {
        self.prune_expired_at(instance, Utc::now()).await
    }

    /// Deletes expired managed snapshots of `instance`, measuring age
    /// against `now`. A rejected delete is logged and recorded in the
    /// report; the pass continues with the remaining snapshots.
    pub async fn prune_expired_at(
        &self,
        instance: &str,
        now: DateTime<Utc>,
    ) -> FailsafeResult<PruneReport> {
        let mut report = self.plan_expired_at(instance, now).await?;
        let expired = std::mem::take(&mut report.deleted);

        for snapshot_id in expired {
            tracing::info!(instance, snapshot_id = %snapshot_id, "Deleting expired snapshot");

            match self.inventory.backend().delete_snapshot(&snapshot_id).await {
                Ok(()) => {
                    SNAPSHOTS_PRUNED_TOTAL.with_label_values(&[instance]).inc();
                    report.deleted.push(snapshot_id);
                }
                Err(e) => {
                    tracing::error!(
                        instance,
                        snapshot_id = %snapshot_id,
                        error = %e,
                        "Failed to delete expired snapshot"
                    );
                    report.failed.push(snapshot_id);
                }
            }
        }

        Ok(report)
    }

    /// Classifies the managed snapshots of `instance` without deleting
    /// anything. `deleted` lists what a prune would remove.
    pub async fn plan_expired_at(
        &self,
        instance: &str,
        now: DateTime<Utc>,
    ) -> FailsafeResult<PruneReport> {
        let snapshots = self
            .inventory
            .list_local(instance, SnapshotType::Manual)
            .await?;

        let mut report = PruneReport::default();
        for snapshot in snapshots {
            if !self.naming.is_managed_name(&snapshot.id) {
                continue;
            }
            match self.expiry(&snapshot, now) {
                Some(true) => report.deleted.push(snapshot.id),
                Some(false) => report.retained.push(snapshot.id),
                None => report.skipped.push(snapshot.id),
            }
        }

        tracing::debug!(
            instance,
            expired = report.deleted.len(),
            retained = report.retained.len(),
            skipped = report.skipped.len(),
            window_secs = self.policy.window().num_seconds(),
            "Planned retention pass"
        );

        Ok(report)
    }

    /// Same as [`plan_expired_at`](Self::plan_expired_at) as of now.
    pub async fn plan_expired(&self, instance: &str) -> FailsafeResult<PruneReport> {
        self.plan_expired_at(instance, Utc::now()).await
    }

    fn expiry(&self, snapshot: &Snapshot, now: DateTime<Utc>) -> Option<bool> {
        if !snapshot.status.is_available() {
            return None;
        }
        snapshot
            .created_at
            .map(|created_at| self.policy.is_expired(created_at, now))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use failsafe_core::SnapshotStatus;
    use failsafe_storage::{MockFailure, MockSnapshotBackend};
    use std::sync::Arc;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    fn manager(backend: Arc<MockSnapshotBackend>, days: i64) -> RetentionManager {
        RetentionManager::new(
            SnapshotInventory::new(backend),
            NamingScheme::default(),
            RetentionPolicy::from_days(days),
        )
    }

    fn manual(id: &str, created_at: DateTime<Utc>) -> Snapshot {
        Snapshot::available(id, "orders-db", SnapshotType::Manual, created_at)
    }

    #[test]
    fn test_policy_boundary_is_inclusive() {
        let policy = RetentionPolicy::from_days(31);
        assert!(policy.is_expired(now() - Duration::days(31), now()));
        assert!(!policy.is_expired(now() - Duration::days(31) + Duration::seconds(1), now()));
    }

    #[tokio::test]
    async fn test_prune_window_boundary() {
        let backend = Arc::new(MockSnapshotBackend::new());
        backend.seed(manual("failsafe-exact", now() - Duration::days(31)));
        backend.seed(manual(
            "failsafe-young",
            now() - Duration::days(31) + Duration::seconds(1),
        ));
        backend.seed(manual("failsafe-old", now() - Duration::days(90)));

        let report = manager(backend.clone(), 31)
            .prune_expired_at("orders-db", now())
            .await
            .unwrap();

        assert_eq!(report.deleted, vec!["failsafe-old", "failsafe-exact"]);
        assert_eq!(report.retained, vec!["failsafe-young"]);
        assert!(report.is_clean());
        assert!(!backend.contains("failsafe-exact"));
        assert!(backend.contains("failsafe-young"));
    }

    #[tokio::test]
    async fn test_prune_ignores_unmanaged_and_pending() {
        let backend = Arc::new(MockSnapshotBackend::new());
        backend.seed(manual("before-migration", now() - Duration::days(400)));
        backend.seed(Snapshot::pending(
            "failsafe-copying",
            "orders-db",
            SnapshotType::Manual,
            SnapshotStatus::Creating,
        ));
        backend.seed(Snapshot::available(
            "rds:orders-db-2023-01-01-03-10",
            "orders-db",
            SnapshotType::Automated,
            now() - Duration::days(400),
        ));

        let report = manager(backend.clone(), 1)
            .prune_expired_at("orders-db", now())
            .await
            .unwrap();

        assert!(report.deleted.is_empty());
        assert_eq!(report.skipped, vec!["failsafe-copying"]);
        assert_eq!(backend.calls("delete"), 0);
        assert!(backend.contains("before-migration"));
    }

    #[tokio::test]
    async fn test_prune_other_instance_untouched() {
        let backend = Arc::new(MockSnapshotBackend::new());
        backend.seed(Snapshot::available(
            "failsafe-billing",
            "billing-db",
            SnapshotType::Manual,
            now() - Duration::days(90),
        ));

        let report = manager(backend.clone(), 1)
            .prune_expired_at("orders-db", now())
            .await
            .unwrap();

        assert_eq!(report, PruneReport::default());
        assert!(backend.contains("failsafe-billing"));
    }

    #[tokio::test]
    async fn test_plan_does_not_delete() {
        let backend = Arc::new(MockSnapshotBackend::new());
        backend.seed(manual("failsafe-old", now() - Duration::days(90)));

        let plan = manager(backend.clone(), 31)
            .plan_expired_at("orders-db", now())
            .await
            .unwrap();

        assert_eq!(plan.deleted, vec!["failsafe-old"]);
        assert_eq!(backend.mutation_calls(), 0);
        assert!(backend.contains("failsafe-old"));
    }

    #[tokio::test]
    async fn test_rejected_delete_continues() {
        let backend = Arc::new(MockSnapshotBackend::new());
        backend.seed(manual("failsafe-a", now() - Duration::days(90)));
        backend.seed(manual("failsafe-b", now() - Duration::days(80)));
        backend.push_failures([MockFailure::Permanent("InvalidDBSnapshotState")]);

        let report = manager(backend.clone(), 31)
            .prune_expired_at("orders-db", now())
            .await
            .unwrap();

        assert_eq!(report.failed, vec!["failsafe-a"]);
        assert_eq!(report.deleted, vec!["failsafe-b"]);
        assert!(!report.is_clean());
    }
}
