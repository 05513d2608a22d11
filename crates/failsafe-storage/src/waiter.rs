use std::time::Duration;

use failsafe_core::{
    FailsafeError, FailsafeResult, Snapshot, SnapshotStatus, SnapshotType, WaiterConfig,
};
use tokio::time::Instant;

use crate::inventory::SnapshotInventory;

/// Blocks a workflow until an asynchronous backend operation settles.
///
/// The backend offers no completion event, so the waiter polls the inventory
/// at a fixed interval. Every wait is bounded: a `failed` status or an
/// exhausted timeout ends the wait with an error.
#[derive(Clone)]
pub struct CompletionWaiter {
    inventory: SnapshotInventory,
    poll_interval: Duration,
    timeout: Duration,
}

impl CompletionWaiter {
    pub fn new(inventory: SnapshotInventory, poll_interval: Duration, timeout: Duration) -> Self {
        Self {
            inventory,
            poll_interval,
            timeout,
        }
    }

    pub fn from_config(inventory: SnapshotInventory, config: &WaiterConfig) -> Self {
        Self::new(inventory, config.poll_interval(), config.timeout())
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Waits until the manual snapshot `snapshot_id` of `instance` is
    /// `available` and returns its final view. A snapshot that is not yet
    /// visible counts as pending.
    ///
    /// # Errors
    ///
    /// - `FailsafeError::SnapshotFailed` if the backend reports `failed`
    /// - `FailsafeError::Timeout` once the bound is exceeded
    /// - any error from the describe call
    pub async fn await_available(
        &self,
        instance: &str,
        snapshot_id: &str,
    ) -> FailsafeResult<Snapshot> {
        tracing::info!(instance, snapshot_id, "Waiting for snapshot to become available");
        let started = Instant::now();

        loop {
            let current = self
                .inventory
                .find_by_name(instance, SnapshotType::Manual, snapshot_id)
                .await?;

            match current {
                Some(snapshot) if snapshot.status.is_available() => {
                    tracing::info!(
                        instance,
                        snapshot_id,
                        waited_ms = started.elapsed().as_millis() as u64,
                        "Snapshot available"
                    );
                    return Ok(snapshot);
                }
                Some(snapshot) if snapshot.status == SnapshotStatus::Failed => {
                    return Err(FailsafeError::SnapshotFailed {
                        snapshot_id: snapshot_id.to_string(),
                        status: snapshot.status.to_string(),
                    });
                }
                Some(snapshot) => {
                    tracing::debug!(instance, snapshot_id, status = %snapshot.status, "Still pending");
                }
                None => {
                    tracing::debug!(instance, snapshot_id, "Not visible yet");
                }
            }

            self.pause(snapshot_id, started).await?;
        }
    }

    /// Waits until `snapshot_id` no longer appears among the manual snapshots
    /// of `instance`. The backend refuses to reuse an identifier while the old
    /// snapshot is still being deleted.
    pub async fn await_deleted(&self, instance: &str, snapshot_id: &str) -> FailsafeResult<()> {
        tracing::info!(instance, snapshot_id, "Waiting for snapshot deletion");
        let started = Instant::now();

        loop {
            let current = self
                .inventory
                .find_by_name(instance, SnapshotType::Manual, snapshot_id)
                .await?;

            match current {
                None => return Ok(()),
                Some(snapshot) => {
                    tracing::debug!(instance, snapshot_id, status = %snapshot.status, "Still present");
                }
            }

            self.pause(snapshot_id, started).await?;
        }
    }

    async fn pause(&self, snapshot_id: &str, started: Instant) -> FailsafeResult<()> {
        let waited = started.elapsed();
        if waited >= self.timeout {
            return Err(FailsafeError::Timeout {
                snapshot_id: snapshot_id.to_string(),
                waited,
            });
        }
        tokio::time::sleep(self.poll_interval.min(self.timeout - waited)).await;
        Ok(())
    }
}
