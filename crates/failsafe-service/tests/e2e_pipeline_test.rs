//! Live account → notice → failsafe account, over two in-memory accounts.

use std::sync::Arc;
use std::time::Duration;

use chrono::{Duration as ChronoDuration, Utc};
use failsafe_core::{NamingScheme, ReplicationNotice, Snapshot, SnapshotType};
use failsafe_service::{
    ConsumerRunner, IntakeWorkflow, ItemStatus, PromoteKind, ReplicationWorkflow,
    RetentionManager, RetentionPolicy,
};
use failsafe_storage::{CompletionWaiter, MemoryTransport, MockSnapshotBackend, SnapshotInventory};

const LIVE_ACCOUNT: &str = "012345678901";
const FAILSAFE_ACCOUNT: &str = "210987654321";
const REGION: &str = "eu-west-1";

fn naming() -> NamingScheme {
    NamingScheme::new("auto-", "failsafe-")
}

fn waiter(inventory: &SnapshotInventory) -> CompletionWaiter {
    CompletionWaiter::new(
        inventory.clone(),
        Duration::from_secs(10),
        Duration::from_secs(3600),
    )
}

fn sns_event(notices: &[ReplicationNotice]) -> String {
    let records: Vec<_> = notices
        .iter()
        .map(|notice| {
            serde_json::json!({
                "EventSource": "aws:sns",
                "Sns": { "Message": notice.to_json().unwrap() }
            })
        })
        .collect();
    serde_json::json!({ "Records": records }).to_string()
}

#[tokio::test(start_paused = true)]
async fn test_orders_db_end_to_end() {
    // Live account
    let live = Arc::new(MockSnapshotBackend::new());
    live.seed(Snapshot::available(
        "auto-2024-01-01",
        "orders-db",
        SnapshotType::Automated,
        Utc::now() - ChronoDuration::hours(3),
    ));
    let transport = MemoryTransport::new();

    let live_inventory = SnapshotInventory::new(live.clone());
    let replication = ReplicationWorkflow::new(live_inventory.clone(), waiter(&live_inventory), naming())
        .with_share_with(FAILSAFE_ACCOUNT)
        .with_transport(Arc::new(transport.clone()));

    let promoted = replication.promote("orders-db").await.unwrap();
    assert_eq!(promoted.kind, PromoteKind::Promoted);
    assert_eq!(promoted.snapshot_id, "failsafe-2024-01-01");
    assert!(live
        .get("failsafe-2024-01-01")
        .unwrap()
        .shared_with
        .contains(FAILSAFE_ACCOUNT));

    let notices = transport.take();
    assert_eq!(notices.len(), 1);
    assert_eq!(
        notices[0].to_json().unwrap(),
        r#"{"Instance":"orders-db","FailsafeSnapshotID":"failsafe-2024-01-01"}"#
    );

    // Failsafe account sees the grant as a shared snapshot
    let failsafe = Arc::new(MockSnapshotBackend::new());
    for snapshot in live.export_shared(FAILSAFE_ACCOUNT, LIVE_ACCOUNT, REGION) {
        failsafe.seed(snapshot);
    }

    let failsafe_inventory = SnapshotInventory::new(failsafe.clone());
    let intake = IntakeWorkflow::new(failsafe_inventory.clone(), waiter(&failsafe_inventory), naming());
    let retention = RetentionManager::new(
        failsafe_inventory,
        naming(),
        RetentionPolicy::from_days(31),
    );
    let consumer = ConsumerRunner::new(intake, retention);

    let report = consumer.run_event(&sns_event(&notices)).await.unwrap();
    assert!(report.is_clean());

    let intake_items: Vec<_> = report.items_for("intake").collect();
    assert_eq!(intake_items.len(), 1);
    assert_eq!(intake_items[0].status, ItemStatus::Succeeded);
    assert!(intake_items[0]
        .detail
        .contains("arn:aws:rds:eu-west-1:012345678901:snapshot:failsafe-2024-01-01"));

    let prune_items: Vec<_> = report.items_for("prune").collect();
    assert_eq!(prune_items.len(), 1);
    assert_eq!(prune_items[0].status, ItemStatus::Succeeded);
    assert!(prune_items[0].detail.starts_with("deleted 0"));

    let local = failsafe.get("failsafe-2024-01-01").unwrap();
    assert_eq!(local.snapshot_type, SnapshotType::Manual);
    assert!(local.status.is_available());
    assert_eq!(failsafe.calls("delete"), 0);
    assert_eq!(failsafe.successful_calls("copy"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_redelivered_notice_replaces_local_copy() {
    let failsafe = Arc::new(MockSnapshotBackend::new());
    failsafe.seed(Snapshot::available(
        "arn:aws:rds:eu-west-1:012345678901:snapshot:failsafe-2024-01-01",
        "orders-db",
        SnapshotType::Shared,
        Utc::now(),
    ));

    let inventory = SnapshotInventory::new(failsafe.clone());
    let intake = IntakeWorkflow::new(inventory.clone(), waiter(&inventory), naming());
    let consumer = ConsumerRunner::new(
        intake,
        RetentionManager::new(inventory, naming(), RetentionPolicy::from_days(31)),
    );

    let event = sns_event(&[ReplicationNotice::new("orders-db", "failsafe-2024-01-01")]);
    consumer.run_event(&event).await.unwrap();
    let second = consumer.run_event(&event).await.unwrap();

    assert!(second.is_clean());
    assert_eq!(failsafe.successful_calls("copy"), 2);
    assert_eq!(failsafe.successful_calls("delete"), 1);
    assert!(failsafe
        .get("failsafe-2024-01-01")
        .unwrap()
        .status
        .is_available());
}

#[tokio::test(start_paused = true)]
async fn test_unmatched_notice_is_skipped() {
    let failsafe = Arc::new(MockSnapshotBackend::new());
    failsafe.seed(Snapshot::available(
        "arn:aws:rds:eu-west-1:012345678901:snapshot:failsafe-2023-12-31",
        "orders-db",
        SnapshotType::Shared,
        Utc::now(),
    ));

    let inventory = SnapshotInventory::new(failsafe.clone());
    let intake = IntakeWorkflow::new(inventory.clone(), waiter(&inventory), naming());
    let consumer = ConsumerRunner::new(
        intake,
        RetentionManager::new(inventory, naming(), RetentionPolicy::from_days(31)),
    );

    let event = sns_event(&[ReplicationNotice::new("orders-db", "failsafe-2024-01-01")]);
    let report = consumer.run_event(&event).await.unwrap();

    let intake_items: Vec<_> = report.items_for("intake").collect();
    assert_eq!(intake_items[0].status, ItemStatus::Skipped);
    assert_eq!(intake_items[0].error_class.as_deref(), Some("not_found"));
    assert_eq!(failsafe.mutation_calls(), 0);
}
