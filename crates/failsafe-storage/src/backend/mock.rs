//! Mock snapshot backend for testing
//!
//! Provides an in-memory simulation of the managed snapshot store with
//! asynchronous completion and configurable failure patterns, so workflows can
//! be exercised without a real account.
//!
//! # Features
//!
//! - **Asynchronous completion**: copies and deletions settle after a
//!   configurable number of describe polls
//! - **Deterministic failures**: pre-defined failure sequence for mutating calls
//! - **Call history**: every call is recorded for assertions
//! - **Cross-account export**: snapshots shared with an account can be exported
//!   as fully-qualified shared snapshots and seeded into another mock
//!
//! # Examples
//!
//! ```rust
//! use failsafe_core::{Snapshot, SnapshotBackend, SnapshotType};
//! use failsafe_storage::backend::{MockFailure, MockSnapshotBackend};
//!
//! # async fn example() -> failsafe_core::FailsafeResult<()> {
//! let mock = MockSnapshotBackend::new_with_failures(vec![
//!     MockFailure::Permanent("DBSnapshotAlreadyExists"),
//!     MockFailure::Ok,
//! ]);
//! mock.seed(Snapshot::available(
//!     "rds:orders-db-1",
//!     "orders-db",
//!     SnapshotType::Automated,
//!     chrono::Utc::now(),
//! ));
//!
//! assert!(mock.copy_snapshot("rds:orders-db-1", "failsafe-orders-db-1").await.is_err());
//! assert!(mock.copy_snapshot("rds:orders-db-1", "failsafe-orders-db-1").await.is_ok());
//! assert_eq!(mock.successful_calls("copy"), 1);
//! # Ok(())
//! # }
//! ```

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;

use failsafe_core::{
    FailsafeError, FailsafeResult, Snapshot, SnapshotBackend, SnapshotFilter, SnapshotStatus,
    SnapshotType,
};

/// Mock failure pattern, consumed by mutating calls in order.
#[derive(Debug, Clone)]
pub enum MockFailure {
    /// Throttling or service-side error.
    Transient(&'static str),

    /// Request rejected (permissions, invalid state, duplicate identifier).
    Permanent(&'static str),

    /// Success (no error).
    Ok,
}

impl MockFailure {
    fn to_error(&self) -> Option<FailsafeError> {
        match self {
            MockFailure::Transient(msg) => {
                Some(FailsafeError::backend(format!("Transient: {}", msg)))
            }
            MockFailure::Permanent(msg) => {
                Some(FailsafeError::backend(format!("Permanent: {}", msg)))
            }
            MockFailure::Ok => None,
        }
    }
}

/// Mock backend configuration.
#[derive(Debug, Clone)]
pub struct MockSnapshotConfig {
    /// Simulated API latency.
    pub latency: Duration,

    /// Describe polls before a copy leaves `copying`.
    pub polls_to_complete: u32,

    /// Status a copy settles into (`available` unless testing failures).
    pub copy_terminal_status: SnapshotStatus,

    /// Describe polls a deleted snapshot stays visible as `deleting`.
    /// Zero removes it immediately.
    pub polls_to_delete: u32,

    /// Enable call history tracking.
    pub track_history: bool,
}

impl Default for MockSnapshotConfig {
    fn default() -> Self {
        Self {
            latency: Duration::ZERO,
            polls_to_complete: 1,
            copy_terminal_status: SnapshotStatus::Available,
            polls_to_delete: 0,
            track_history: true,
        }
    }
}

/// Mock call history entry.
#[derive(Debug, Clone)]
pub struct CallHistoryEntry {
    /// Operation type: "describe", "copy", "delete", "share".
    pub operation: String,

    /// Snapshot identifier (target for copies, instance or `*` for describes).
    pub key: String,

    /// Whether operation succeeded.
    pub success: bool,

    /// Timestamp of operation.
    pub timestamp: Instant,
}

#[derive(Debug, Clone)]
struct MockEntry {
    snapshot: Snapshot,
    /// Remaining describe polls before the pending transition settles.
    countdown: u32,
}

/// In-memory snapshot backend.
pub struct MockSnapshotBackend {
    /// Snapshots keyed by identifier (simulates one account's namespace).
    snapshots: Arc<RwLock<BTreeMap<String, MockEntry>>>,

    /// Failure pattern queue for mutating calls.
    failure_queue: Arc<RwLock<VecDeque<MockFailure>>>,

    config: MockSnapshotConfig,

    call_history: Arc<RwLock<Vec<CallHistoryEntry>>>,
}

impl MockSnapshotBackend {
    /// Create new mock with default config (no failures).
    pub fn new() -> Self {
        Self::new_with_config(MockSnapshotConfig::default())
    }

    pub fn new_with_config(config: MockSnapshotConfig) -> Self {
        Self {
            snapshots: Arc::new(RwLock::new(BTreeMap::new())),
            failure_queue: Arc::new(RwLock::new(VecDeque::new())),
            config,
            call_history: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Create mock with a deterministic failure pattern for mutating calls.
    /// Once the queue is empty, all operations succeed.
    pub fn new_with_failures(pattern: Vec<MockFailure>) -> Self {
        let mock = Self::new();
        *mock.failure_queue.write() = pattern.into();
        mock
    }

    /// Queue more failures for upcoming mutating calls.
    pub fn push_failures(&self, pattern: impl IntoIterator<Item = MockFailure>) {
        self.failure_queue.write().extend(pattern);
    }

    /// Insert or replace a snapshot as-is. A pending snapshot seeded this way
    /// never settles.
    pub fn seed(&self, snapshot: Snapshot) {
        self.snapshots.write().insert(
            snapshot.id.clone(),
            MockEntry {
                snapshot,
                countdown: 0,
            },
        );
    }

    /// Current view of a snapshot, without advancing pending transitions.
    pub fn get(&self, snapshot_id: &str) -> Option<Snapshot> {
        self.snapshots
            .read()
            .get(snapshot_id)
            .map(|entry| entry.snapshot.clone())
    }

    pub fn contains(&self, snapshot_id: &str) -> bool {
        self.snapshots.read().contains_key(snapshot_id)
    }

    pub fn len(&self) -> usize {
        self.snapshots.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.read().is_empty()
    }

    /// Manual snapshots shared with `account`, as the receiving account would
    /// see them: typed `shared` and addressed by a fully-qualified identifier.
    pub fn export_shared(&self, account: &str, owner_account: &str, region: &str) -> Vec<Snapshot> {
        self.snapshots
            .read()
            .values()
            .map(|entry| &entry.snapshot)
            .filter(|snapshot| snapshot.snapshot_type == SnapshotType::Manual)
            .filter(|snapshot| snapshot.shared_with.contains(account))
            .map(|snapshot| Snapshot {
                id: format!(
                    "arn:aws:rds:{}:{}:snapshot:{}",
                    region, owner_account, snapshot.id
                ),
                snapshot_type: SnapshotType::Shared,
                shared_with: Default::default(),
                ..snapshot.clone()
            })
            .collect()
    }

    /// Get call history for assertions.
    pub fn get_call_history(&self) -> Vec<CallHistoryEntry> {
        self.call_history.read().clone()
    }

    pub fn clear_history(&self) {
        self.call_history.write().clear();
    }

    /// Number of successful calls of `operation`.
    pub fn successful_calls(&self, operation: &str) -> usize {
        self.call_history
            .read()
            .iter()
            .filter(|entry| entry.operation == operation && entry.success)
            .count()
    }

    /// Number of attempted calls of `operation`, successful or not.
    pub fn calls(&self, operation: &str) -> usize {
        self.call_history
            .read()
            .iter()
            .filter(|entry| entry.operation == operation)
            .count()
    }

    /// Number of attempted copy, delete and share calls.
    pub fn mutation_calls(&self) -> usize {
        self.calls("copy") + self.calls("delete") + self.calls("share")
    }

    fn check_failure(&self) -> Option<FailsafeError> {
        self.failure_queue
            .write()
            .pop_front()
            .and_then(|failure| failure.to_error())
    }

    fn record_call(&self, operation: &str, key: &str, success: bool) {
        if self.config.track_history {
            self.call_history.write().push(CallHistoryEntry {
                operation: operation.to_string(),
                key: key.to_string(),
                success,
                timestamp: Instant::now(),
            });
        }
    }

    /// One describe poll worth of backend progress.
    fn advance(&self) {
        let mut snapshots = self.snapshots.write();
        let mut removed = Vec::new();

        for (id, entry) in snapshots.iter_mut() {
            let pending = match entry.snapshot.status {
                SnapshotStatus::Copying | SnapshotStatus::Creating => true,
                SnapshotStatus::Deleting => true,
                _ => false,
            };
            // Zero marks a seeded snapshot frozen in its status.
            if !pending || entry.countdown == 0 {
                continue;
            }

            entry.countdown -= 1;
            if entry.countdown > 0 {
                continue;
            }

            if entry.snapshot.status == SnapshotStatus::Deleting {
                removed.push(id.clone());
            } else {
                entry.snapshot.status = self.config.copy_terminal_status.clone();
                if entry.snapshot.status.is_available() {
                    entry.snapshot.created_at = Some(Utc::now());
                }
            }
        }

        for id in removed {
            snapshots.remove(&id);
        }
    }

    fn fail<T>(&self, operation: &str, key: &str, error: FailsafeError) -> FailsafeResult<T> {
        self.record_call(operation, key, false);
        Err(error)
    }
}

impl Default for MockSnapshotBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SnapshotBackend for MockSnapshotBackend {
    async fn describe_snapshots(&self, filter: &SnapshotFilter) -> FailsafeResult<Vec<Snapshot>> {
        tokio::time::sleep(self.config.latency).await;
        self.advance();

        let snapshots: Vec<Snapshot> = self
            .snapshots
            .read()
            .values()
            .map(|entry| &entry.snapshot)
            .filter(|snapshot| filter.matches(snapshot))
            .cloned()
            .collect();

        self.record_call("describe", filter.instance.as_deref().unwrap_or("*"), true);
        Ok(snapshots)
    }

    async fn copy_snapshot(&self, source_id: &str, target_id: &str) -> FailsafeResult<()> {
        tokio::time::sleep(self.config.latency).await;

        if let Some(error) = self.check_failure() {
            return self.fail("copy", target_id, error);
        }

        let outcome = {
            let mut snapshots = self.snapshots.write();
            let source = snapshots.get(source_id).map(|entry| entry.snapshot.clone());

            match source {
                _ if snapshots.contains_key(target_id) => Err(FailsafeError::backend(format!(
                    "DBSnapshotAlreadyExists: {}",
                    target_id
                ))),
                Some(source) if source.status.is_available() => {
                    snapshots.insert(
                        target_id.to_string(),
                        MockEntry {
                            snapshot: Snapshot::pending(
                                target_id,
                                source.instance_id,
                                SnapshotType::Manual,
                                SnapshotStatus::Copying,
                            ),
                            countdown: self.config.polls_to_complete.max(1),
                        },
                    );
                    Ok(())
                }
                Some(source) => Err(FailsafeError::backend(format!(
                    "InvalidDBSnapshotState: {} is {}",
                    source_id, source.status
                ))),
                None => Err(FailsafeError::backend(format!(
                    "DBSnapshotNotFound: {}",
                    source_id
                ))),
            }
        };

        match outcome {
            Ok(()) => {
                self.record_call("copy", target_id, true);
                Ok(())
            }
            Err(error) => self.fail("copy", target_id, error),
        }
    }

    async fn delete_snapshot(&self, snapshot_id: &str) -> FailsafeResult<()> {
        tokio::time::sleep(self.config.latency).await;

        if let Some(error) = self.check_failure() {
            return self.fail("delete", snapshot_id, error);
        }

        let outcome = {
            let mut snapshots = self.snapshots.write();
            let status = snapshots
                .get(snapshot_id)
                .filter(|entry| entry.snapshot.snapshot_type == SnapshotType::Manual)
                .map(|entry| entry.snapshot.status.clone());

            match status {
                Some(SnapshotStatus::Deleting) => Err(FailsafeError::backend(format!(
                    "InvalidDBSnapshotState: {} is already being deleted",
                    snapshot_id
                ))),
                Some(_) if self.config.polls_to_delete == 0 => {
                    snapshots.remove(snapshot_id);
                    Ok(())
                }
                Some(_) => {
                    if let Some(entry) = snapshots.get_mut(snapshot_id) {
                        entry.snapshot.status = SnapshotStatus::Deleting;
                        entry.countdown = self.config.polls_to_delete;
                    }
                    Ok(())
                }
                None => Err(FailsafeError::backend(format!(
                    "DBSnapshotNotFound: {}",
                    snapshot_id
                ))),
            }
        };

        if let Err(error) = outcome {
            return self.fail("delete", snapshot_id, error);
        }

        self.record_call("delete", snapshot_id, true);
        Ok(())
    }

    async fn modify_share_grant(
        &self,
        snapshot_id: &str,
        attribute: &str,
        accounts_to_add: &[String],
    ) -> FailsafeResult<()> {
        tokio::time::sleep(self.config.latency).await;

        if let Some(error) = self.check_failure() {
            return self.fail("share", snapshot_id, error);
        }

        if attribute != "restore" {
            return self.fail(
                "share",
                snapshot_id,
                FailsafeError::backend(format!("InvalidParameterValue: attribute {}", attribute)),
            );
        }

        let granted = {
            let mut snapshots = self.snapshots.write();
            match snapshots.get_mut(snapshot_id) {
                Some(entry) if entry.snapshot.status.is_available() => {
                    entry
                        .snapshot
                        .shared_with
                        .extend(accounts_to_add.iter().cloned());
                    true
                }
                _ => false,
            }
        };

        if !granted {
            return self.fail(
                "share",
                snapshot_id,
                FailsafeError::backend(format!(
                    "InvalidDBSnapshotState: {} is not available",
                    snapshot_id
                )),
            );
        }

        self.record_call("share", snapshot_id, true);
        Ok(())
    }
}
