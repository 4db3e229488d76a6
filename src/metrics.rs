// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Prometheus metrics for the Conductor controller.
//!
//! All metrics use the namespace prefix `conductor_firestoned_io_` (prometheus-safe
//! version of "conductor.firestoned.io") and live in [`METRICS_REGISTRY`].
//!
//! # Metrics Categories
//!
//! - **Reconciliation Metrics** - Bundle passes and their outcomes
//! - **Object Metrics** - Writes issued against managed objects
//! - **Resource Metrics** - Per-resource states reached at the end of a pass
//! - **Queue Metrics** - Retries and dropped keys
//!
//! No HTTP endpoint is served; [`gather_metrics`] renders the text exposition format.
//!
//! # Example
//!
//! ```rust,no_run
//! use conductor::metrics::record_pass;
//!
//! record_pass("success", std::time::Duration::from_millis(120));
//! ```

use prometheus::{CounterVec, Encoder, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder};
use std::sync::LazyLock;
use std::time::Duration;

// ============================================================================
// Metric Name Constants
// ============================================================================

/// Namespace prefix for all Conductor metrics (prometheus-safe)
const METRICS_NAMESPACE: &str = "conductor_firestoned_io";

// ============================================================================
// Global Metrics Registry
// ============================================================================

/// Global Prometheus metrics registry
pub static METRICS_REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

// ============================================================================
// Reconciliation Metrics
// ============================================================================

/// Total number of Bundle passes by outcome
///
/// Labels:
/// - `outcome`: `success`, `error`, `invalid`, `cancelled`
pub static RECONCILIATION_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_reconciliations_total"),
        "Total number of Bundle reconciliation passes by outcome",
    );
    let counter = CounterVec::new(opts, &["outcome"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .unwrap();
    counter
});

/// Duration of Bundle passes in seconds
///
/// Labels:
/// - `outcome`: same values as [`RECONCILIATION_TOTAL`]
pub static RECONCILIATION_DURATION_SECONDS: LazyLock<HistogramVec> = LazyLock::new(|| {
    let opts = HistogramOpts::new(
        format!("{METRICS_NAMESPACE}_reconciliation_duration_seconds"),
        "Duration of Bundle reconciliation passes in seconds",
    )
    .buckets(vec![0.001, 0.01, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0, 60.0]);
    let histogram = HistogramVec::new(opts, &["outcome"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(histogram.clone()))
        .unwrap();
    histogram
});

// ============================================================================
// Object Metrics
// ============================================================================

/// Writes issued against managed objects
///
/// Labels:
/// - `operation`: `create`, `update`, `delete`
/// - `kind`: Kind of the object
pub static OBJECT_WRITES_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_object_writes_total"),
        "Total number of writes to managed objects by operation and kind",
    );
    let counter = CounterVec::new(opts, &["operation", "kind"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .unwrap();
    counter
});

// ============================================================================
// Resource Metrics
// ============================================================================

/// Resource states reached at the end of a pass
///
/// Labels:
/// - `state`: `ready`, `in_progress`, `blocked`, `error`
pub static RESOURCE_STATES_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_resource_states_total"),
        "Total number of resource evaluations by resulting state",
    );
    let counter = CounterVec::new(opts, &["state"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .unwrap();
    counter
});

// ============================================================================
// Queue Metrics
// ============================================================================

/// Work queue retry decisions
///
/// Labels:
/// - `decision`: `retry` (backoff scheduled), `drop` (retries exhausted), `resync`
pub static QUEUE_REQUEUES_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_queue_requeues_total"),
        "Total number of work queue requeue decisions",
    );
    let counter = CounterVec::new(opts, &["decision"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .unwrap();
    counter
});

// ============================================================================
// Helper Functions
// ============================================================================

/// Record a finished Bundle pass
///
/// # Arguments
/// * `outcome` - `success`, `error`, `invalid` or `cancelled`
/// * `duration` - Wall time of the pass
pub fn record_pass(outcome: &str, duration: Duration) {
    RECONCILIATION_TOTAL.with_label_values(&[outcome]).inc();
    RECONCILIATION_DURATION_SECONDS
        .with_label_values(&[outcome])
        .observe(duration.as_secs_f64());
}

/// Record a write against a managed object
pub fn record_object_write(operation: &str, kind: &str) {
    OBJECT_WRITES_TOTAL
        .with_label_values(&[operation, kind])
        .inc();
}

/// Record the state a resource ended a pass in
pub fn record_resource_state(state: &str) {
    RESOURCE_STATES_TOTAL.with_label_values(&[state]).inc();
}

/// Record a work queue requeue decision
pub fn record_requeue(decision: &str) {
    QUEUE_REQUEUES_TOTAL.with_label_values(&[decision]).inc();
}

/// Gather and encode all metrics in Prometheus text format
///
/// # Errors
/// Returns error if encoding fails
pub fn gather_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = METRICS_REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(format!("UTF-8 error: {e}")))
}
