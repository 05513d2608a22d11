//! Failsafe-account workflow: copy a snapshot shared by the live account into
//! a locally owned snapshot with the same name.

use serde::Serialize;
use tokio::time::Instant;

use failsafe_core::{
    FailsafeError, FailsafeResult, NamingScheme, ReplicationNotice, SnapshotStatus, SnapshotType,
};
use failsafe_storage::{CompletionWaiter, SnapshotInventory};

use crate::metrics::{SNAPSHOTS_INGESTED_TOTAL, SNAPSHOT_WAIT_DURATION_SECONDS};

/// What one call to [`IntakeWorkflow::ingest`] did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngestOutcome {
    pub instance: String,
    /// Fully-qualified identifier of the shared snapshot that was copied.
    pub source_id: String,
    pub snapshot_id: String,
    /// A local snapshot with the same name existed and was replaced.
    pub replaced: bool,
}

#[derive(Clone)]
pub struct IntakeWorkflow {
    inventory: SnapshotInventory,
    waiter: CompletionWaiter,
    naming: NamingScheme,
}

impl IntakeWorkflow {
    pub fn new(inventory: SnapshotInventory, waiter: CompletionWaiter, naming: NamingScheme) -> Self {
        Self {
            inventory,
            waiter,
            naming,
        }
    }

    pub async fn ingest_notice(&self, notice: &ReplicationNotice) -> FailsafeResult<IngestOutcome> {
        self.ingest(&notice.instance, &notice.snapshot_id).await
    }

    /// Copies the shared snapshot announced as `manual_id` into this account.
    ///
    /// Exactly one shared snapshot must end in `:{manual_id}`. A local
    /// snapshot already holding the name is deleted first, and the copy is
    /// issued only once the backend no longer lists it.
    ///
    /// # Errors
    ///
    /// - `InvalidName` when `manual_id` is not a managed name; nothing is
    ///   queried or deleted
    /// - `NoSharedSnapshots` / `SharedSnapshotNotFound` /
    ///   `AmbiguousSharedSnapshot` before any mutation
    /// - waiter and backend errors as they occur
    #[tracing::instrument(skip(self), fields(workflow = "intake"))]
    pub async fn ingest(&self, instance: &str, manual_id: &str) -> FailsafeResult<IngestOutcome> {
        if !self.naming.is_managed_name(manual_id) {
            return Err(FailsafeError::invalid_name(
                manual_id,
                self.naming.managed_prefix(),
            ));
        }

        let shared = self.inventory.list_shared().await?;
        if shared.is_empty() {
            return Err(FailsafeError::NoSharedSnapshots);
        }

        let matcher = self.naming.shared_matcher(manual_id)?;
        let mut candidates: Vec<_> = shared
            .into_iter()
            .filter(|snapshot| {
                tracing::debug!(shared_id = %snapshot.id, "Checking shared snapshot");
                matcher.matches(&snapshot.id)
            })
            .collect();

        let source = match candidates.len() {
            0 => return Err(FailsafeError::shared_not_found(manual_id)),
            1 => candidates.remove(0),
            _ => {
                return Err(FailsafeError::AmbiguousSharedSnapshot {
                    snapshot_id: manual_id.to_string(),
                    candidates: candidates.into_iter().map(|s| s.id).collect(),
                })
            }
        };
        tracing::info!(source_id = %source.id, "Matched shared snapshot");

        let stale = self
            .inventory
            .find_by_name(instance, SnapshotType::Manual, manual_id)
            .await?;

        let replaced = stale.is_some();
        match stale {
            Some(snapshot) if snapshot.status == SnapshotStatus::Deleting => {
                tracing::info!(snapshot_id = manual_id, "Local snapshot already being deleted");
                self.waiter.await_deleted(instance, manual_id).await?;
            }
            Some(_) => {
                tracing::warn!(snapshot_id = manual_id, "Local snapshot exists, replacing it");
                self.inventory.backend().delete_snapshot(manual_id).await?;
                self.waiter.await_deleted(instance, manual_id).await?;
            }
            None => {}
        }

        tracing::info!(source_id = %source.id, target_id = manual_id, "Copying shared snapshot");
        self.inventory
            .backend()
            .copy_snapshot(&source.id, manual_id)
            .await?;

        let wait_started = Instant::now();
        self.waiter.await_available(instance, manual_id).await?;
        SNAPSHOT_WAIT_DURATION_SECONDS
            .with_label_values(&["intake"])
            .observe(wait_started.elapsed().as_secs_f64());

        SNAPSHOTS_INGESTED_TOTAL.with_label_values(&[instance]).inc();

        Ok(IngestOutcome {
            instance: instance.to_string(),
            source_id: source.id,
            snapshot_id: manual_id.to_string(),
            replaced,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration as ChronoDuration, Utc};
    use failsafe_core::{Snapshot, SnapshotBackend};
    use failsafe_storage::{MockSnapshotBackend, MockSnapshotConfig};
    use std::sync::Arc;
    use std::time::Duration;

    const LIVE_ARN: &str = "arn:aws:rds:eu-west-1:012345678901:snapshot:";

    fn workflow_over(backend: Arc<MockSnapshotBackend>) -> IntakeWorkflow {
        let inventory = SnapshotInventory::new(backend);
        let waiter = CompletionWaiter::new(
            inventory.clone(),
            Duration::from_secs(10),
            Duration::from_secs(600),
        );
        IntakeWorkflow::new(inventory, waiter, NamingScheme::default())
    }

    fn shared(id: &str) -> Snapshot {
        Snapshot::available(
            id,
            "orders-db",
            SnapshotType::Shared,
            Utc::now() - ChronoDuration::hours(1),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_ingest_copies_single_match() {
        let backend = Arc::new(MockSnapshotBackend::new());
        backend.seed(shared(&format!("{LIVE_ARN}failsafe-orders-db-2024-01-02")));
        backend.seed(shared(&format!("{LIVE_ARN}failsafe-orders-db-2024-01-01")));

        let outcome = workflow_over(backend.clone())
            .ingest("orders-db", "failsafe-orders-db-2024-01-02")
            .await
            .unwrap();

        assert_eq!(
            outcome.source_id,
            format!("{LIVE_ARN}failsafe-orders-db-2024-01-02")
        );
        assert!(!outcome.replaced);

        let local = backend.get("failsafe-orders-db-2024-01-02").unwrap();
        assert_eq!(local.snapshot_type, SnapshotType::Manual);
        assert!(local.status.is_available());
        assert_eq!(backend.calls("copy"), 1);
        assert_eq!(backend.calls("delete"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_prefix_of_longer_name_does_not_match() {
        let backend = Arc::new(MockSnapshotBackend::new());
        backend.seed(shared(&format!("{LIVE_ARN}failsafe-orders-db-2024-01-02-extra")));

        let err = workflow_over(backend.clone())
            .ingest("orders-db", "failsafe-orders-db-2024-01-02")
            .await
            .unwrap_err();

        assert!(matches!(err, FailsafeError::SharedSnapshotNotFound { .. }));
        assert_eq!(backend.mutation_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ambiguous_match_copies_nothing() {
        let backend = Arc::new(MockSnapshotBackend::new());
        backend.seed(shared(&format!("{LIVE_ARN}failsafe-orders-db-2024-01-02")));
        backend.seed(shared(
            "arn:aws:rds:us-east-1:333333333333:snapshot:failsafe-orders-db-2024-01-02",
        ));

        let err = workflow_over(backend.clone())
            .ingest("orders-db", "failsafe-orders-db-2024-01-02")
            .await
            .unwrap_err();

        match err {
            FailsafeError::AmbiguousSharedSnapshot { candidates, .. } => {
                assert_eq!(candidates.len(), 2)
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(backend.mutation_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_shared_snapshots() {
        let backend = Arc::new(MockSnapshotBackend::new());

        let err = workflow_over(backend.clone())
            .ingest("orders-db", "failsafe-orders-db-2024-01-02")
            .await
            .unwrap_err();

        assert!(matches!(err, FailsafeError::NoSharedSnapshots));
        assert!(err.is_recoverable());
        assert_eq!(backend.mutation_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unmanaged_name_is_rejected() {
        let backend = Arc::new(MockSnapshotBackend::new());
        backend.seed(Snapshot::available(
            "prod-baseline",
            "orders-db",
            SnapshotType::Manual,
            Utc::now(),
        ));
        backend.seed(shared(&format!("{LIVE_ARN}prod-baseline")));

        let err = workflow_over(backend.clone())
            .ingest("orders-db", "prod-baseline")
            .await
            .unwrap_err();

        assert!(matches!(err, FailsafeError::InvalidName { .. }));
        assert!(backend.contains("prod-baseline"));
        assert_eq!(backend.get_call_history().len(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_existing_local_copy_is_replaced() {
        let backend = Arc::new(MockSnapshotBackend::new_with_config(MockSnapshotConfig {
            polls_to_delete: 2,
            ..Default::default()
        }));
        backend.seed(Snapshot::pending(
            "failsafe-orders-db-2024-01-02",
            "orders-db",
            SnapshotType::Manual,
            SnapshotStatus::Failed,
        ));
        backend.seed(shared(&format!("{LIVE_ARN}failsafe-orders-db-2024-01-02")));

        let outcome = workflow_over(backend.clone())
            .ingest("orders-db", "failsafe-orders-db-2024-01-02")
            .await
            .unwrap();

        assert!(outcome.replaced);
        let ops: Vec<_> = backend
            .get_call_history()
            .into_iter()
            .filter(|entry| entry.operation != "describe")
            .map(|entry| entry.operation)
            .collect();
        assert_eq!(ops, vec!["delete", "copy"]);
        assert!(backend
            .get("failsafe-orders-db-2024-01-02")
            .unwrap()
            .status
            .is_available());
    }

    #[tokio::test(start_paused = true)]
    async fn test_local_copy_already_deleting_is_awaited() {
        let backend = Arc::new(MockSnapshotBackend::new_with_config(MockSnapshotConfig {
            polls_to_delete: 3,
            ..Default::default()
        }));
        backend.seed(Snapshot::available(
            "failsafe-orders-db-2024-01-02",
            "orders-db",
            SnapshotType::Manual,
            Utc::now() - ChronoDuration::days(40),
        ));
        backend.seed(shared(&format!("{LIVE_ARN}failsafe-orders-db-2024-01-02")));
        backend
            .delete_snapshot("failsafe-orders-db-2024-01-02")
            .await
            .unwrap();
        backend.clear_history();

        let outcome = workflow_over(backend.clone())
            .ingest("orders-db", "failsafe-orders-db-2024-01-02")
            .await
            .unwrap();

        assert!(outcome.replaced);
        assert_eq!(backend.calls("delete"), 0);
        assert_eq!(backend.successful_calls("copy"), 1);
        assert!(backend
            .get("failsafe-orders-db-2024-01-02")
            .unwrap()
            .status
            .is_available());
    }
}
