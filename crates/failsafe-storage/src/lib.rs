//! Snapshot inventory, completion waiting, and collaborator adapters.

pub mod backend;
pub mod inventory;
pub mod transport;
pub mod waiter;

pub use backend::{MockFailure, MockSnapshotBackend, MockSnapshotConfig, RdsSnapshotBackend};
pub use inventory::SnapshotInventory;
pub use transport::{MemoryTransport, SnsTransport};
pub use waiter::CompletionWaiter;
