//! Live-account workflow: promote the newest automatic snapshot to a managed
//! manual copy, share it with the failsafe account and announce it.

use std::sync::Arc;

use serde::Serialize;
use tokio::time::Instant;

use failsafe_core::{
    FailsafeError, FailsafeResult, NamingScheme, NotificationTransport, ProducerConfig,
    ReplicationNotice, SnapshotStatus, SnapshotType,
};
use failsafe_storage::{CompletionWaiter, SnapshotInventory};

use crate::metrics::{SNAPSHOTS_PROMOTED_TOTAL, SNAPSHOT_WAIT_DURATION_SECONDS};

/// Snapshot attribute that grants restore access to other accounts.
pub const RESTORE_ATTRIBUTE: &str = "restore";

/// Whether a run issued the copy itself or picked up an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PromoteKind {
    Promoted,
    Resumed,
}

impl PromoteKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Promoted => "promoted",
            Self::Resumed => "resumed",
        }
    }
}

/// What one call to [`ReplicationWorkflow::promote`] did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PromoteOutcome {
    pub instance: String,
    pub source_id: String,
    pub snapshot_id: String,
    pub kind: PromoteKind,
    pub shared: bool,
    pub notified: bool,
}

#[derive(Clone)]
pub struct ReplicationWorkflow {
    inventory: SnapshotInventory,
    waiter: CompletionWaiter,
    naming: NamingScheme,
    share_with: Option<String>,
    transport: Option<Arc<dyn NotificationTransport>>,
    renotify_on_replay: bool,
}

impl ReplicationWorkflow {
    pub fn new(inventory: SnapshotInventory, waiter: CompletionWaiter, naming: NamingScheme) -> Self {
        Self {
            inventory,
            waiter,
            naming,
            share_with: None,
            transport: None,
            renotify_on_replay: true,
        }
    }

    /// Applies the sharing and replay settings of `config`. The transport is
    /// wired separately since it needs a live client.
    pub fn with_producer_config(mut self, config: &ProducerConfig) -> Self {
        self.share_with = config.share_with.clone();
        self.renotify_on_replay = config.renotify_on_replay;
        self
    }

    pub fn with_share_with(mut self, account: impl Into<String>) -> Self {
        self.share_with = Some(account.into());
        self
    }

    pub fn with_transport(mut self, transport: Arc<dyn NotificationTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn with_renotify_on_replay(mut self, renotify: bool) -> Self {
        self.renotify_on_replay = renotify;
        self
    }

    /// Promotes the most recent available automatic snapshot of `instance`.
    ///
    /// Steps: pick the source, derive the managed name, copy unless the
    /// target already exists, wait for it, share it, publish a notice.
    /// Re-running after any partial failure resumes from the wait; a target
    /// left in `failed` is deleted and copied again, and one already being
    /// deleted is copied again once it is gone.
    ///
    /// # Errors
    ///
    /// - `NoSourceSnapshot` when no automatic snapshot is available; nothing
    ///   is mutated in that case
    /// - `InvalidName` when the source does not carry the automatic prefix
    /// - waiter, backend and transport errors as they occur
    #[tracing::instrument(skip(self), fields(workflow = "replication"))]
    pub async fn promote(&self, instance: &str) -> FailsafeResult<PromoteOutcome> {
        let source = self
            .inventory
            .most_recent_available(instance, SnapshotType::Automated)
            .await?
            .ok_or_else(|| FailsafeError::no_source_snapshot(instance))?;

        let target = self.naming.promoted_name(&source.id)?;
        tracing::info!(source_id = %source.id, snapshot_id = %target, "Selected source snapshot");

        let existing = self
            .inventory
            .find_by_name(instance, SnapshotType::Manual, &target)
            .await?;

        let kind = match existing {
            Some(snapshot) if snapshot.status == SnapshotStatus::Failed => {
                tracing::warn!(snapshot_id = %target, "Previous copy failed, replacing it");
                self.inventory.backend().delete_snapshot(&target).await?;
                self.waiter.await_deleted(instance, &target).await?;
                self.copy(&source.id, &target).await?;
                PromoteKind::Promoted
            }
            Some(snapshot) if snapshot.status == SnapshotStatus::Deleting => {
                tracing::warn!(snapshot_id = %target, "Managed snapshot is being deleted, copying again");
                self.waiter.await_deleted(instance, &target).await?;
                self.copy(&source.id, &target).await?;
                PromoteKind::Promoted
            }
            Some(snapshot) => {
                tracing::info!(
                    snapshot_id = %target,
                    status = %snapshot.status,
                    "Managed snapshot already exists, resuming"
                );
                PromoteKind::Resumed
            }
            None => {
                self.copy(&source.id, &target).await?;
                PromoteKind::Promoted
            }
        };

        let wait_started = Instant::now();
        self.waiter.await_available(instance, &target).await?;
        SNAPSHOT_WAIT_DURATION_SECONDS
            .with_label_values(&["replication"])
            .observe(wait_started.elapsed().as_secs_f64());

        let shared = self.share(&target).await?;

        let notified = if kind == PromoteKind::Resumed && !self.renotify_on_replay {
            tracing::info!(snapshot_id = %target, "Replay, notice not re-published");
            false
        } else {
            self.notify(instance, &target).await?
        };

        SNAPSHOTS_PROMOTED_TOTAL
            .with_label_values(&[kind.as_str()])
            .inc();

        Ok(PromoteOutcome {
            instance: instance.to_string(),
            source_id: source.id,
            snapshot_id: target,
            kind,
            shared,
            notified,
        })
    }

    async fn copy(&self, source_id: &str, target_id: &str) -> FailsafeResult<()> {
        tracing::info!(source_id, target_id, "Copying snapshot");
        self.inventory
            .backend()
            .copy_snapshot(source_id, target_id)
            .await
    }

    async fn share(&self, snapshot_id: &str) -> FailsafeResult<bool> {
        let Some(account) = &self.share_with else {
            tracing::debug!(snapshot_id, "No target account configured, not sharing");
            return Ok(false);
        };

        tracing::info!(snapshot_id, account = %account, "Sharing snapshot");
        self.inventory
            .backend()
            .modify_share_grant(snapshot_id, RESTORE_ATTRIBUTE, std::slice::from_ref(account))
            .await?;
        Ok(true)
    }

    async fn notify(&self, instance: &str, snapshot_id: &str) -> FailsafeResult<bool> {
        let Some(transport) = &self.transport else {
            tracing::debug!(snapshot_id, "No transport configured, not notifying");
            return Ok(false);
        };

        transport
            .publish(&ReplicationNotice::new(instance, snapshot_id))
            .await?;
        tracing::info!(snapshot_id, "Published replication notice");
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration as ChronoDuration, Utc};
    use failsafe_core::{Snapshot, SnapshotBackend};
    use failsafe_storage::{MemoryTransport, MockFailure, MockSnapshotBackend, MockSnapshotConfig};
    use std::time::Duration;

    const FAILSAFE_ACCOUNT: &str = "210987654321";

    struct Fixture {
        backend: Arc<MockSnapshotBackend>,
        transport: MemoryTransport,
        workflow: ReplicationWorkflow,
    }

    fn fixture_with(backend: MockSnapshotBackend) -> Fixture {
        let backend = Arc::new(backend);
        let inventory = SnapshotInventory::new(backend.clone());
        let waiter = CompletionWaiter::new(
            inventory.clone(),
            Duration::from_secs(10),
            Duration::from_secs(600),
        );
        let transport = MemoryTransport::new();
        let workflow = ReplicationWorkflow::new(inventory, waiter, NamingScheme::default())
            .with_share_with(FAILSAFE_ACCOUNT)
            .with_transport(Arc::new(transport.clone()));

        Fixture {
            backend,
            transport,
            workflow,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(MockSnapshotBackend::new())
    }

    fn automated(id: &str, hours_ago: i64) -> Snapshot {
        Snapshot::available(
            id,
            "orders-db",
            SnapshotType::Automated,
            Utc::now() - ChronoDuration::hours(hours_ago),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_promote_newest_available() {
        let f = fixture();
        f.backend.seed(automated("rds:orders-db-2024-01-01-03-10", 48));
        f.backend.seed(automated("rds:orders-db-2024-01-02-03-10", 24));
        f.backend.seed(Snapshot::pending(
            "rds:orders-db-2024-01-03-03-10",
            "orders-db",
            SnapshotType::Automated,
            SnapshotStatus::Creating,
        ));

        let outcome = f.workflow.promote("orders-db").await.unwrap();

        assert_eq!(outcome.kind, PromoteKind::Promoted);
        assert_eq!(outcome.source_id, "rds:orders-db-2024-01-02-03-10");
        assert_eq!(outcome.snapshot_id, "failsafe-orders-db-2024-01-02-03-10");
        assert!(outcome.shared && outcome.notified);

        let promoted = f.backend.get("failsafe-orders-db-2024-01-02-03-10").unwrap();
        assert!(promoted.status.is_available());
        assert!(promoted.shared_with.contains(FAILSAFE_ACCOUNT));

        let published = f.transport.published();
        assert_eq!(
            published,
            vec![ReplicationNotice::new(
                "orders-db",
                "failsafe-orders-db-2024-01-02-03-10"
            )]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_source_mutates_nothing() {
        let f = fixture();
        f.backend.seed(Snapshot::pending(
            "rds:orders-db-2024-01-03-03-10",
            "orders-db",
            SnapshotType::Automated,
            SnapshotStatus::Creating,
        ));

        let err = f.workflow.promote("orders-db").await.unwrap_err();

        assert!(matches!(err, FailsafeError::NoSourceSnapshot { ref instance } if instance == "orders-db"));
        assert!(err.is_recoverable());
        assert_eq!(f.backend.mutation_calls(), 0);
        assert!(f.transport.published().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_double_promote_copies_once() {
        let f = fixture();
        f.backend.seed(automated("rds:orders-db-2024-01-02-03-10", 24));

        let first = f.workflow.promote("orders-db").await.unwrap();
        let second = f.workflow.promote("orders-db").await.unwrap();

        assert_eq!(first.kind, PromoteKind::Promoted);
        assert_eq!(second.kind, PromoteKind::Resumed);
        assert_eq!(first.snapshot_id, second.snapshot_id);
        assert_eq!(f.backend.calls("copy"), 1);
        assert_eq!(f.transport.published().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_replay_without_renotify() {
        let f = fixture();
        let workflow = f.workflow.clone().with_renotify_on_replay(false);
        f.backend.seed(automated("rds:orders-db-2024-01-02-03-10", 24));

        workflow.promote("orders-db").await.unwrap();
        let replay = workflow.promote("orders-db").await.unwrap();

        assert!(!replay.notified);
        assert!(replay.shared);
        assert_eq!(f.transport.published().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_resume_after_failed_share() {
        let f = fixture();
        f.backend.seed(automated("rds:orders-db-2024-01-02-03-10", 24));
        // copy succeeds, share is rejected
        f.backend
            .push_failures([MockFailure::Ok, MockFailure::Transient("Throttling")]);

        let err = f.workflow.promote("orders-db").await.unwrap_err();
        assert!(matches!(err, FailsafeError::Backend(_)));
        assert!(f.transport.published().is_empty());

        let outcome = f.workflow.promote("orders-db").await.unwrap();
        assert_eq!(outcome.kind, PromoteKind::Resumed);
        assert!(outcome.notified);
        assert_eq!(f.backend.successful_calls("copy"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_copy_is_replaced() {
        let f = fixture();
        f.backend.seed(automated("rds:orders-db-2024-01-02-03-10", 24));
        f.backend.seed(Snapshot::pending(
            "failsafe-orders-db-2024-01-02-03-10",
            "orders-db",
            SnapshotType::Manual,
            SnapshotStatus::Failed,
        ));

        let outcome = f.workflow.promote("orders-db").await.unwrap();

        assert_eq!(outcome.kind, PromoteKind::Promoted);
        assert_eq!(f.backend.successful_calls("delete"), 1);
        assert_eq!(f.backend.successful_calls("copy"), 1);
        assert!(f
            .backend
            .get("failsafe-orders-db-2024-01-02-03-10")
            .unwrap()
            .status
            .is_available());
    }

    #[tokio::test(start_paused = true)]
    async fn test_target_being_deleted_is_recopied() {
        let f = fixture_with(MockSnapshotBackend::new_with_config(MockSnapshotConfig {
            polls_to_delete: 3,
            ..Default::default()
        }));
        f.backend.seed(automated("rds:orders-db-2024-01-02-03-10", 24));
        f.backend.seed(Snapshot::available(
            "failsafe-orders-db-2024-01-02-03-10",
            "orders-db",
            SnapshotType::Manual,
            Utc::now() - ChronoDuration::hours(23),
        ));
        f.backend
            .delete_snapshot("failsafe-orders-db-2024-01-02-03-10")
            .await
            .unwrap();
        f.backend.clear_history();

        let outcome = f.workflow.promote("orders-db").await.unwrap();

        assert_eq!(outcome.kind, PromoteKind::Promoted);
        assert!(outcome.shared && outcome.notified);
        assert_eq!(f.backend.calls("delete"), 0);
        assert_eq!(f.backend.successful_calls("copy"), 1);
        assert!(f
            .backend
            .get("failsafe-orders-db-2024-01-02-03-10")
            .unwrap()
            .status
            .is_available());
    }

    #[tokio::test(start_paused = true)]
    async fn test_copy_entering_failed_is_surfaced() {
        let f = fixture_with(MockSnapshotBackend::new_with_config(MockSnapshotConfig {
            copy_terminal_status: SnapshotStatus::Failed,
            ..Default::default()
        }));
        f.backend.seed(automated("rds:orders-db-2024-01-02-03-10", 24));

        let err = f.workflow.promote("orders-db").await.unwrap_err();

        assert!(matches!(err, FailsafeError::SnapshotFailed { .. }));
        assert_eq!(f.backend.calls("share"), 0);
        assert!(f.transport.published().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_without_collaborators_only_copies() {
        let backend = Arc::new(MockSnapshotBackend::new());
        backend.seed(automated("rds:orders-db-2024-01-02-03-10", 24));
        let inventory = SnapshotInventory::new(backend.clone());
        let waiter = CompletionWaiter::new(
            inventory.clone(),
            Duration::from_secs(10),
            Duration::from_secs(600),
        );
        let workflow = ReplicationWorkflow::new(inventory, waiter, NamingScheme::default());

        let outcome = workflow.promote("orders-db").await.unwrap();

        assert!(!outcome.shared);
        assert!(!outcome.notified);
        assert_eq!(backend.calls("share"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unexpected_source_prefix() {
        let f = fixture();
        f.backend.seed(automated("awsbackup:job-1234", 1));

        let err = f.workflow.promote("orders-db").await.unwrap_err();

        assert!(matches!(err, FailsafeError::InvalidName { .. }));
        assert_eq!(f.backend.mutation_calls(), 0);
    }
}
