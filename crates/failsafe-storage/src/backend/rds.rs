//! Amazon RDS snapshot backend
//!
//! Thin adapter from [`SnapshotBackend`] to the RDS API. Identifiers of
//! snapshots shared by another account come back fully qualified (ARN form),
//! which is what the shared matcher expects.

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_rds::error::DisplayErrorContext;
use aws_sdk_rds::types::DbSnapshot;
use aws_sdk_rds::Client;
use chrono::{DateTime, Utc};

use failsafe_core::{
    FailsafeError, FailsafeResult, Snapshot, SnapshotBackend, SnapshotFilter, SnapshotStatus,
    SnapshotType,
};

/// RDS-backed snapshot store for one account and region.
#[derive(Clone)]
pub struct RdsSnapshotBackend {
    client: Client,
}

impl RdsSnapshotBackend {
    /// Create a backend using the default credential chain.
    pub async fn new(region: &str) -> Self {
        let aws_config = aws_config::defaults(BehaviorVersion::latest())
            .region(aws_config::Region::new(region.to_string()))
            .load()
            .await;

        Self {
            client: Client::new(&aws_config),
        }
    }

    pub fn from_client(client: Client) -> Self {
        Self { client }
    }
}

fn convert(raw: &DbSnapshot, requested: SnapshotType) -> Option<Snapshot> {
    let id = raw.db_snapshot_identifier()?.to_string();
    let status = SnapshotStatus::parse(raw.status().unwrap_or_default());

    // Shared snapshots may report their owner-side type; the query decides.
    let snapshot_type = match (requested, raw.snapshot_type()) {
        (SnapshotType::Shared, _) => SnapshotType::Shared,
        (_, Some("automated")) => SnapshotType::Automated,
        (_, Some("manual")) => SnapshotType::Manual,
        _ => requested,
    };

    let created_at = raw
        .snapshot_create_time()
        .and_then(|t| DateTime::<Utc>::from_timestamp(t.secs(), t.subsec_nanos()));

    Some(Snapshot {
        id,
        instance_id: raw.db_instance_identifier().unwrap_or_default().to_string(),
        snapshot_type,
        status,
        created_at,
        shared_with: Default::default(),
    })
}

#[async_trait]
impl SnapshotBackend for RdsSnapshotBackend {
    async fn describe_snapshots(&self, filter: &SnapshotFilter) -> FailsafeResult<Vec<Snapshot>> {
        let mut snapshots = Vec::new();
        let mut marker: Option<String> = None;

        loop {
            let output = self
                .client
                .describe_db_snapshots()
                .set_db_instance_identifier(filter.instance.clone())
                .snapshot_type(filter.snapshot_type.as_str())
                .include_shared(filter.include_shared)
                .set_marker(marker.take())
                .send()
                .await
                .map_err(|e| {
                    FailsafeError::backend(format!(
                        "describe_db_snapshots failed: {}",
                        DisplayErrorContext(&e)
                    ))
                })?;

            snapshots.extend(
                output
                    .db_snapshots()
                    .iter()
                    .filter_map(|raw| convert(raw, filter.snapshot_type)),
            );

            match output.marker() {
                Some(next) if !next.is_empty() => marker = Some(next.to_string()),
                _ => break,
            }
        }

        Ok(snapshots)
    }

    async fn copy_snapshot(&self, source_id: &str, target_id: &str) -> FailsafeResult<()> {
        tracing::debug!(source_id, target_id, "RDS copy_db_snapshot");

        self.client
            .copy_db_snapshot()
            .source_db_snapshot_identifier(source_id)
            .target_db_snapshot_identifier(target_id)
            .send()
            .await
            .map_err(|e| {
                FailsafeError::backend(format!(
                    "copy_db_snapshot {} -> {} failed: {}",
                    source_id,
                    target_id,
                    DisplayErrorContext(&e)
                ))
            })?;

        Ok(())
    }

    async fn delete_snapshot(&self, snapshot_id: &str) -> FailsafeResult<()> {
        tracing::debug!(snapshot_id, "RDS delete_db_snapshot");

        self.client
            .delete_db_snapshot()
            .db_snapshot_identifier(snapshot_id)
            .send()
            .await
            .map_err(|e| {
                FailsafeError::backend(format!(
                    "delete_db_snapshot {} failed: {}",
                    snapshot_id,
                    DisplayErrorContext(&e)
                ))
            })?;

        Ok(())
    }

    async fn modify_share_grant(
        &self,
        snapshot_id: &str,
        attribute: &str,
        accounts_to_add: &[String],
    ) -> FailsafeResult<()> {
        tracing::debug!(snapshot_id, attribute, "RDS modify_db_snapshot_attribute");

        self.client
            .modify_db_snapshot_attribute()
            .db_snapshot_identifier(snapshot_id)
            .attribute_name(attribute)
            .set_values_to_add(Some(accounts_to_add.to_vec()))
            .send()
            .await
            .map_err(|e| {
                FailsafeError::backend(format!(
                    "modify_db_snapshot_attribute {} failed: {}",
                    snapshot_id,
                    DisplayErrorContext(&e)
                ))
            })?;

        Ok(())
    }
}
