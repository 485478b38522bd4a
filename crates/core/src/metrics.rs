//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Job executor (outcomes, durations, concurrency)
//! - Staging store (bytes staged, cleanup failures)
//! - Remote fetch (pre-flight failures)

use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts};

// =============================================================================
// Job executor
// =============================================================================

/// Finished jobs by operation and outcome.
pub static JOBS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("convertino_jobs_total", "Total jobs run to completion"),
        &["operation", "outcome"], // outcome: "succeeded" or an error kind
    )
    .unwrap()
});

/// Wall-clock duration of a job's execute phase.
pub static JOB_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "convertino_job_duration_seconds",
            "Duration of converter execution in seconds",
        )
        .buckets(vec![0.05, 0.1, 0.5, 1.0, 5.0, 15.0, 60.0, 300.0, 1800.0]),
        &["operation"],
    )
    .unwrap()
});

/// Jobs currently executing.
pub static JOBS_IN_FLIGHT: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new("convertino_jobs_in_flight", "Jobs currently executing").unwrap()
});

// =============================================================================
// Staging
// =============================================================================

/// Bytes written to the upload directory.
pub static STAGED_BYTES: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "convertino_staged_bytes_total",
        "Total bytes staged from inbound payloads",
    )
    .unwrap()
});

/// Staged files that could not be removed.
pub static CLEANUP_FAILURES: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "convertino_cleanup_failures_total",
        "Staged files that could not be removed",
    )
    .unwrap()
});

// =============================================================================
// Remote fetch
// =============================================================================

/// Pre-flight checks that gave up after all retries.
pub static FETCH_PREFLIGHT_FAILURES: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "convertino_fetch_preflight_failures_total",
        "Remote fetch pre-flight checks that failed",
    )
    .unwrap()
});

// =============================================================================
// Helper functions
// =============================================================================

/// Get all core metrics for registration in a registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        // Jobs
        Box::new(JOBS_TOTAL.clone()),
        Box::new(JOB_DURATION.clone()),
        Box::new(JOBS_IN_FLIGHT.clone()),
        // Staging
        Box::new(STAGED_BYTES.clone()),
        Box::new(CLEANUP_FAILURES.clone()),
        // Fetch
        Box::new(FETCH_PREFLIGHT_FAILURES.clone()),
    ]
}
