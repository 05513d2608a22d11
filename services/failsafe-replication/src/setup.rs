use std::sync::Arc;

use clap::ValueEnum;
use failsafe_core::{FailsafeConfig, NamingScheme, NotificationTransport, SnapshotBackend};
use failsafe_service::{
    ConsumerRunner, IntakeWorkflow, ProducerRunner, ReplicationWorkflow, RetentionManager,
    RetentionPolicy,
};
use failsafe_storage::{CompletionWaiter, SnapshotInventory};

/// Which account a retention pass runs against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Side {
    /// Live account (promoted copies)
    Producer,
    /// Failsafe account (ingested copies)
    Consumer,
}

pub fn retention_manager(
    config: &FailsafeConfig,
    backend: Arc<dyn SnapshotBackend>,
    side: Side,
) -> RetentionManager {
    let days = match side {
        Side::Producer => config.producer.retention_days,
        Side::Consumer => config.consumer.retention_days,
    };
    RetentionManager::new(
        SnapshotInventory::new(backend),
        NamingScheme::from_config(&config.naming),
        RetentionPolicy::from_days(days),
    )
}

pub fn producer_runner(
    config: &FailsafeConfig,
    backend: Arc<dyn SnapshotBackend>,
    transport: Option<Arc<dyn NotificationTransport>>,
) -> ProducerRunner {
    let inventory = SnapshotInventory::new(backend.clone());
    let waiter = CompletionWaiter::from_config(inventory.clone(), &config.waiter);

    let mut replication =
        ReplicationWorkflow::new(inventory, waiter, NamingScheme::from_config(&config.naming))
            .with_producer_config(&config.producer);
    if let Some(transport) = transport {
        replication = replication.with_transport(transport);
    }

    ProducerRunner::new(replication, retention_manager(config, backend, Side::Producer))
}

pub fn consumer_runner(config: &FailsafeConfig, backend: Arc<dyn SnapshotBackend>) -> ConsumerRunner {
    let inventory = SnapshotInventory::new(backend.clone());
    let waiter = CompletionWaiter::from_config(inventory.clone(), &config.waiter);
    let intake = IntakeWorkflow::new(inventory, waiter, NamingScheme::from_config(&config.naming));

    ConsumerRunner::new(intake, retention_manager(config, backend, Side::Consumer))
}
