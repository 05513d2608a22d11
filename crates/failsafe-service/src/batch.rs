//! Batch drivers for the two scheduled entry points.
//!
//! Each item (an instance on the producer side, a notice on the consumer
//! side) runs independently: a failure is logged, counted and recorded in
//! the [`BatchReport`], and the batch moves on to the next item.

use serde::Serialize;

use failsafe_core::{FailsafeError, FailsafeResult, ReplicationNotice};

use crate::intake::IntakeWorkflow;
use crate::metrics::WORKFLOW_FAILURES_TOTAL;
use crate::replication::ReplicationWorkflow;
use crate::retention::{PruneReport, RetentionManager};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    Succeeded,
    /// Ended in a not-found condition that a later run may resolve.
    Skipped,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemReport {
    /// `prune`, `replication`, `intake` or `decode`.
    pub stage: String,
    /// Instance name or notice position.
    pub subject: String,
    pub status: ItemStatus,
    pub detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_class: Option<String>,
}

/// Per-item outcomes of one batch run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    pub items: Vec<ItemReport>,
}

impl BatchReport {
    pub fn count(&self, status: ItemStatus) -> usize {
        self.items.iter().filter(|item| item.status == status).count()
    }

    /// No item failed. Skipped items do not count against a batch.
    pub fn is_clean(&self) -> bool {
        self.count(ItemStatus::Failed) == 0
    }

    pub fn items_for(&self, stage: &str) -> impl Iterator<Item = &ItemReport> + '_ {
        let stage = stage.to_string();
        self.items.iter().filter(move |item| item.stage == stage)
    }

    fn succeeded(&mut self, stage: &str, subject: &str, detail: String) {
        tracing::info!(stage, subject, detail = %detail, "Item completed");
        self.items.push(ItemReport {
            stage: stage.to_string(),
            subject: subject.to_string(),
            status: ItemStatus::Succeeded,
            detail,
            error_class: None,
        });
    }

    fn failed(&mut self, stage: &str, subject: &str, error: &FailsafeError) {
        let class = error.class();
        let status = if error.is_recoverable() {
            tracing::warn!(stage, subject, error = %error, "Item skipped");
            ItemStatus::Skipped
        } else {
            tracing::error!(stage, subject, error = %error, class = class.as_str(), "Item failed");
            ItemStatus::Failed
        };

        WORKFLOW_FAILURES_TOTAL
            .with_label_values(&[stage, class.as_str()])
            .inc();

        self.items.push(ItemReport {
            stage: stage.to_string(),
            subject: subject.to_string(),
            status,
            detail: error.to_string(),
            error_class: Some(class.as_str().to_string()),
        });
    }

    fn prune_result(&mut self, subject: &str, result: FailsafeResult<PruneReport>) {
        match result {
            Ok(report) if report.is_clean() => {
                self.succeeded(
                    "prune",
                    subject,
                    format!(
                        "deleted {}, retained {}",
                        report.deleted.len(),
                        report.retained.len()
                    ),
                );
            }
            Ok(report) => {
                let error = FailsafeError::backend(format!(
                    "delete rejected for {}",
                    report.failed.join(", ")
                ));
                self.failed("prune", subject, &error);
            }
            Err(e) => self.failed("prune", subject, &e),
        }
    }
}

/// Live-account entry point: for each instance, prune expired managed
/// snapshots, then promote the newest automatic one.
#[derive(Clone)]
pub struct ProducerRunner {
    replication: ReplicationWorkflow,
    retention: RetentionManager,
}

impl ProducerRunner {
    pub fn new(replication: ReplicationWorkflow, retention: RetentionManager) -> Self {
        Self {
            replication,
            retention,
        }
    }

    pub async fn run(&self, instances: &[String]) -> BatchReport {
        let mut report = BatchReport::default();
        if instances.is_empty() {
            tracing::warn!("No instances configured, nothing to replicate");
            return report;
        }

        tracing::info!(instances = instances.len(), "Starting producer run");
        let start = std::time::Instant::now();

        for instance in instances {
            report.prune_result(instance, self.retention.prune_expired(instance).await);

            match self.replication.promote(instance).await {
                Ok(outcome) => report.succeeded(
                    "replication",
                    instance,
                    format!("{} {}", outcome.kind.as_str(), outcome.snapshot_id),
                ),
                Err(e) => report.failed("replication", instance, &e),
            }
        }

        tracing::info!(
            duration_ms = start.elapsed().as_millis() as u64,
            failed = report.count(ItemStatus::Failed),
            "Producer run finished"
        );
        report
    }
}

/// Failsafe-account entry point: ingest every announced snapshot, then prune
/// each instance seen in the batch once.
#[derive(Clone)]
pub struct ConsumerRunner {
    intake: IntakeWorkflow,
    retention: RetentionManager,
}

impl ConsumerRunner {
    pub fn new(intake: IntakeWorkflow, retention: RetentionManager) -> Self {
        Self { intake, retention }
    }

    /// Decodes a notification event and runs every record in it.
    ///
    /// # Errors
    ///
    /// Only when the event itself is not valid JSON. Undecodable records
    /// are reported per item.
    pub async fn run_event(&self, event: &str) -> FailsafeResult<BatchReport> {
        let notices = ReplicationNotice::from_event(event)?;
        if notices.is_empty() {
            tracing::warn!("Event carried no notification records");
        }
        Ok(self.run(notices).await)
    }

    pub async fn run(&self, notices: Vec<FailsafeResult<ReplicationNotice>>) -> BatchReport {
        let mut report = BatchReport::default();
        let mut instances: Vec<String> = Vec::new();

        tracing::info!(records = notices.len(), "Starting consumer run");

        for (index, notice) in notices.into_iter().enumerate() {
            let notice = match notice {
                Ok(notice) => notice,
                Err(e) => {
                    report.failed("decode", &format!("record {}", index), &e);
                    continue;
                }
            };

            match self.intake.ingest_notice(&notice).await {
                Ok(outcome) => report.succeeded(
                    "intake",
                    &notice.instance,
                    format!("copied {} from {}", outcome.snapshot_id, outcome.source_id),
                ),
                Err(e) => report.failed("intake", &notice.instance, &e),
            }

            if !instances.contains(&notice.instance) {
                instances.push(notice.instance);
            }
        }

        for instance in &instances {
            report.prune_result(instance, self.retention.prune_expired(instance).await);
        }

        report
    }
}
