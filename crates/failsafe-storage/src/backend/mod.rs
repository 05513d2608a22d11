//! Snapshot backend implementations
//!
//! - Amazon RDS (production)
//! - In-memory mock (testing)

mod mock;
mod rds;

pub use mock::{CallHistoryEntry, MockFailure, MockSnapshotBackend, MockSnapshotConfig};
pub use rds::RdsSnapshotBackend;
