use std::sync::Arc;

use chrono::Utc;
use failsafe_core::{FailsafeResult, Snapshot, SnapshotBackend, SnapshotFilter, SnapshotType};

/// Ranked, read-only view over the backend's snapshots.
///
/// Results are ordered by creation time ascending. Snapshots that are not yet
/// `available` have no usable creation time and rank as if created at query
/// time, so they always trail completed ones. "Last in order" is therefore
/// not the same as "most recent completed"; use
/// [`most_recent_available`](Self::most_recent_available) for the latter.
#[derive(Clone)]
pub struct SnapshotInventory {
    backend: Arc<dyn SnapshotBackend>,
}

impl SnapshotInventory {
    pub fn new(backend: Arc<dyn SnapshotBackend>) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &Arc<dyn SnapshotBackend> {
        &self.backend
    }

    /// Lists snapshots of `snapshot_type`, for one instance or (with `None`)
    /// account-wide. Returns an empty vector when nothing matches.
    pub async fn list_snapshots(
        &self,
        instance: Option<&str>,
        snapshot_type: SnapshotType,
        include_shared: bool,
    ) -> FailsafeResult<Vec<Snapshot>> {
        let filter = match instance {
            Some(instance) => SnapshotFilter::for_instance(instance, snapshot_type),
            None => SnapshotFilter::account_wide(snapshot_type),
        }
        .include_shared(include_shared);

        let mut snapshots = self.backend.describe_snapshots(&filter).await?;
        let now = Utc::now();
        snapshots.sort_by_key(|snapshot| snapshot.rank_time(now));

        tracing::debug!(
            instance = instance.unwrap_or("*"),
            snapshot_type = %snapshot_type,
            count = snapshots.len(),
            "Listed snapshots"
        );

        Ok(snapshots)
    }

    /// Local snapshots of one instance.
    pub async fn list_local(
        &self,
        instance: &str,
        snapshot_type: SnapshotType,
    ) -> FailsafeResult<Vec<Snapshot>> {
        self.list_snapshots(Some(instance), snapshot_type, false)
            .await
    }

    /// Account-wide snapshots shared with this account.
    pub async fn list_shared(&self) -> FailsafeResult<Vec<Snapshot>> {
        self.list_snapshots(None, SnapshotType::Shared, true).await
    }

    /// Newest snapshot whose status is `available`, ignoring in-progress ones
    /// that rank after it.
    pub async fn most_recent_available(
        &self,
        instance: &str,
        snapshot_type: SnapshotType,
    ) -> FailsafeResult<Option<Snapshot>> {
        let snapshots = self.list_local(instance, snapshot_type).await?;
        Ok(snapshots
            .into_iter()
            .rev()
            .find(|snapshot| snapshot.status.is_available()))
    }

    /// Snapshot of `instance` with exactly `snapshot_id`, if any.
    pub async fn find_by_name(
        &self,
        instance: &str,
        snapshot_type: SnapshotType,
        snapshot_id: &str,
    ) -> FailsafeResult<Option<Snapshot>> {
        let snapshots = self.list_local(instance, snapshot_type).await?;
        Ok(snapshots
            .into_iter()
            .find(|snapshot| snapshot.id == snapshot_id))
    }
}
