use async_trait::async_trait;

use crate::error::FailsafeResult;
use crate::notice::ReplicationNotice;
use crate::snapshot::{Snapshot, SnapshotFilter};

/// Managed snapshot store.
///
/// Every mutating call only *requests* a change: completion is observed by
/// polling [`describe_snapshots`](Self::describe_snapshots).
///
/// # Error Handling
///
/// Rejected calls return `FailsafeError::Backend`. An empty query result is
/// not an error.
#[async_trait]
pub trait SnapshotBackend: Send + Sync {
    /// Returns every snapshot matching `filter`, in backend order.
    async fn describe_snapshots(&self, filter: &SnapshotFilter) -> FailsafeResult<Vec<Snapshot>>;

    /// Starts copying `source_id` (local or fully-qualified shared) into a new
    /// local manual snapshot `target_id`.
    async fn copy_snapshot(&self, source_id: &str, target_id: &str) -> FailsafeResult<()>;

    /// Starts deleting a local manual snapshot.
    async fn delete_snapshot(&self, snapshot_id: &str) -> FailsafeResult<()>;

    /// Adds `accounts_to_add` to the snapshot attribute (`restore` grants
    /// cross-account access).
    async fn modify_share_grant(
        &self,
        snapshot_id: &str,
        attribute: &str,
        accounts_to_add: &[String],
    ) -> FailsafeResult<()>;
}

/// Outbound half of the producer-to-consumer hand-off.
#[async_trait]
pub trait NotificationTransport: Send + Sync {
    /// Publishes a notice announcing a newly shared snapshot.
    async fn publish(&self, notice: &ReplicationNotice) -> FailsafeResult<()>;
}
