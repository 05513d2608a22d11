//! Prometheus metrics for the replication pipeline
//!
//! Counters are process-global and registered on first use. A batch run
//! prints them with [`export_prometheus`] when asked to.

use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_histogram_vec, CounterVec, Encoder, HistogramVec, TextEncoder,
};

lazy_static! {
    // ========== Workflow Outcomes ==========

    /// Snapshots promoted in the live account, by outcome (promoted/resumed)
    pub static ref SNAPSHOTS_PROMOTED_TOTAL: CounterVec = register_counter_vec!(
        "failsafe_snapshots_promoted_total",
        "Automatic snapshots promoted to managed manual snapshots",
        &["outcome"]
    )
    .unwrap();

    /// Shared snapshots copied into the failsafe account, by instance
    pub static ref SNAPSHOTS_INGESTED_TOTAL: CounterVec = register_counter_vec!(
        "failsafe_snapshots_ingested_total",
        "Shared snapshots copied into the failsafe account",
        &["instance"]
    )
    .unwrap();

    /// Managed snapshots deleted by retention, by instance
    pub static ref SNAPSHOTS_PRUNED_TOTAL: CounterVec = register_counter_vec!(
        "failsafe_snapshots_pruned_total",
        "Managed snapshots deleted after their retention window",
        &["instance"]
    )
    .unwrap();

    /// Failed workflow items by workflow and error class
    pub static ref WORKFLOW_FAILURES_TOTAL: CounterVec = register_counter_vec!(
        "failsafe_workflow_failures_total",
        "Workflow items that ended in an error",
        &["workflow", "class"]
    )
    .unwrap();

    // ========== Waiting ==========

    /// Time spent waiting for copies to settle (seconds)
    pub static ref SNAPSHOT_WAIT_DURATION_SECONDS: HistogramVec = register_histogram_vec!(
        "failsafe_snapshot_wait_duration_seconds",
        "Time spent waiting for a snapshot copy to become available",
        &["workflow"],
        vec![1.0, 10.0, 30.0, 60.0, 120.0, 300.0, 600.0, 1200.0, 1800.0, 3600.0]
    )
    .unwrap();
}

/// Export all metrics in Prometheus text format.
pub fn export_prometheus() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();

    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .unwrap_or_else(|e| {
            tracing::error!("Failed to encode metrics: {}", e);
        });

    String::from_utf8(buffer).unwrap_or_else(|e| {
        tracing::error!("Failed to convert metrics to UTF-8: {}", e);
        String::from("# Error encoding metrics\n")
    })
}
