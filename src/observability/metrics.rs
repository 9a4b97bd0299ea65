//! # Metrics
//!
//! Prometheus metrics for monitoring the controller.
//!
//! ## Metrics Exposed
//!
//! - `backup_bucket_reconciliations_total` - Total number of reconciliations
//! - `backup_bucket_reconciliation_errors_total` - Reconciliation errors by error category
//! - `backup_bucket_reconciliation_duration_seconds` - Duration of reconciliation operations
//! - `backup_bucket_key_rotations_total` - Total number of storage account key rotations
//! - `backup_bucket_generated_secrets_written_total` - Generated secrets created or updated
//! - `backup_bucket_generated_secrets_deleted_total` - Superseded or deleted generated secrets removed
//! - `backup_bucket_provider_operations_total` - Azure operations by operation name
//! - `backup_bucket_provider_operation_duration_seconds` - Duration of Azure operations
//! - `backup_bucket_provider_operation_errors_total` - Failed Azure operations by operation name

use anyhow::Result;
use prometheus::{Histogram, HistogramVec, IntCounter, IntCounterVec, Registry};
use std::sync::LazyLock;

// Metrics
pub(crate) static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

static RECONCILIATIONS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "backup_bucket_reconciliations_total",
        "Total number of reconciliations",
    )
    .expect("Failed to create RECONCILIATIONS_TOTAL metric - this should never happen")
});

static RECONCILIATION_ERRORS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "backup_bucket_reconciliation_errors_total",
            "Total number of reconciliation errors by error category",
        ),
        &["category"],
    )
    .expect("Failed to create RECONCILIATION_ERRORS_TOTAL metric - this should never happen")
});

static RECONCILIATION_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        prometheus::HistogramOpts::new(
            "backup_bucket_reconciliation_duration_seconds",
            "Duration of reconciliation in seconds",
        )
        .buckets(vec![0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0, 60.0, 120.0]),
    )
    .expect("Failed to create RECONCILIATION_DURATION metric - this should never happen")
});

static KEY_ROTATIONS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "backup_bucket_key_rotations_total",
        "Total number of storage account key rotations",
    )
    .expect("Failed to create KEY_ROTATIONS_TOTAL metric - this should never happen")
});

static GENERATED_SECRETS_WRITTEN_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "backup_bucket_generated_secrets_written_total",
        "Total number of generated secrets created or updated",
    )
    .expect("Failed to create GENERATED_SECRETS_WRITTEN_TOTAL metric - this should never happen")
});

static GENERATED_SECRETS_DELETED_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "backup_bucket_generated_secrets_deleted_total",
        "Total number of generated secrets deleted",
    )
    .expect("Failed to create GENERATED_SECRETS_DELETED_TOTAL metric - this should never happen")
});

static PROVIDER_OPERATIONS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "backup_bucket_provider_operations_total",
            "Total number of Azure operations by operation",
        ),
        &["operation"],
    )
    .expect("Failed to create PROVIDER_OPERATIONS_TOTAL metric - this should never happen")
});

static PROVIDER_OPERATION_DURATION: LazyLock<HistogramVec> = LazyLock::new(|| {
    HistogramVec::new(
        prometheus::HistogramOpts::new(
            "backup_bucket_provider_operation_duration_seconds",
            "Duration of Azure operations in seconds by operation",
        )
        .buckets(vec![0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0, 60.0]),
        &["operation"],
    )
    .expect("Failed to create PROVIDER_OPERATION_DURATION metric - this should never happen")
});

static PROVIDER_OPERATION_ERRORS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "backup_bucket_provider_operation_errors_total",
            "Total number of failed Azure operations by operation",
        ),
        &["operation"],
    )
    .expect("Failed to create PROVIDER_OPERATION_ERRORS_TOTAL metric - this should never happen")
});

pub fn register_metrics() -> Result<()> {
    REGISTRY.register(Box::new(RECONCILIATIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILIATION_ERRORS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILIATION_DURATION.clone()))?;
    REGISTRY.register(Box::new(KEY_ROTATIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(GENERATED_SECRETS_WRITTEN_TOTAL.clone()))?;
    REGISTRY.register(Box::new(GENERATED_SECRETS_DELETED_TOTAL.clone()))?;
    REGISTRY.register(Box::new(PROVIDER_OPERATIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(PROVIDER_OPERATION_DURATION.clone()))?;
    REGISTRY.register(Box::new(PROVIDER_OPERATION_ERRORS_TOTAL.clone()))?;

    Ok(())
}

pub fn increment_reconciliations() {
    RECONCILIATIONS_TOTAL.inc();
}

/// `category` is one of the error category labels (`not_found`, `unauthorized`, `generic`)
pub fn increment_reconciliation_errors(category: &str) {
    RECONCILIATION_ERRORS_TOTAL
        .with_label_values(&[category])
        .inc();
}

pub fn observe_reconciliation_duration(duration: f64) {
    RECONCILIATION_DURATION.observe(duration);
}

pub fn increment_key_rotations() {
    KEY_ROTATIONS_TOTAL.inc();
}

pub fn increment_generated_secrets_written() {
    GENERATED_SECRETS_WRITTEN_TOTAL.inc();
}

pub fn increment_generated_secrets_deleted() {
    GENERATED_SECRETS_DELETED_TOTAL.inc();
}

pub fn record_provider_operation(operation: &str, duration: f64) {
    PROVIDER_OPERATIONS_TOTAL
        .with_label_values(&[operation])
        .inc();
    PROVIDER_OPERATION_DURATION
        .with_label_values(&[operation])
        .observe(duration);
}

pub fn increment_provider_operation_errors(operation: &str) {
    PROVIDER_OPERATION_ERRORS_TOTAL
        .with_label_values(&[operation])
        .inc();
}
