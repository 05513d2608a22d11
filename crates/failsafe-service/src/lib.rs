//! Replication workflows for the live and failsafe accounts, plus the batch
//! drivers and metrics around them.

pub mod batch;
pub mod intake;
pub mod metrics;
pub mod replication;
pub mod retention;

pub use batch::{BatchReport, ConsumerRunner, ItemReport, ItemStatus, ProducerRunner};
pub use intake::{IngestOutcome, IntakeWorkflow};
pub use metrics::export_prometheus;
pub use replication::{PromoteKind, PromoteOutcome, ReplicationWorkflow, RESTORE_ATTRIBUTE};
pub use retention::{PruneReport, RetentionManager, RetentionPolicy};
