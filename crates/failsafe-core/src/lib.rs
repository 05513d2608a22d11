//! Core domain types and collaborator traits for failsafe snapshot replication.

pub mod config;
pub mod error;
pub mod naming;
pub mod notice;
pub mod snapshot;
pub mod traits;

pub use self::config::{
    ConsumerConfig, FailsafeConfig, LoggingConfig, NamingConfig, ProducerConfig, WaiterConfig,
};
pub use error::{ErrorClass, FailsafeError, FailsafeResult};
pub use naming::{NamingScheme, SharedSnapshotMatcher};
pub use notice::ReplicationNotice;
pub use snapshot::{Snapshot, SnapshotFilter, SnapshotStatus, SnapshotType};
pub use traits::{NotificationTransport, SnapshotBackend};
