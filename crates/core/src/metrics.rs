//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Job lifecycle (started, finished by result and provider)
//! - Retry and fallback decisions
//! - Provider attempts and progress fan-out

use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts};

// =============================================================================
// Jobs
// =============================================================================

/// Jobs accepted by the dispatcher.
pub static JOBS_STARTED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new("tubeline_jobs_started_total", "Total download jobs started").unwrap()
});

/// Jobs that reached a terminal state.
pub static JOBS_FINISHED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "tubeline_jobs_finished_total",
            "Total download jobs finished",
        ),
        &["result", "provider"], // "completed" | "failed" | "canceled", "primary" | "secondary" | "none"
    )
    .unwrap()
});

/// Valid requests refused because the dispatcher is shutting down.
/// Malformed URLs are never counted.
pub static JOBS_REJECTED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "tubeline_jobs_rejected_total",
            "Total download requests rejected while shutting down",
        ),
        &["reason"], // "shutting_down"
    )
    .unwrap()
});

// =============================================================================
// Retries and fallback
// =============================================================================

/// Backoff waits scheduled before another primary attempt.
pub static PRIMARY_RETRIES: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "tubeline_primary_retries_total",
        "Total primary provider retries",
    )
    .unwrap()
});

/// Switches to the secondary provider.
pub static FALLBACKS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("tubeline_fallbacks_total", "Total fallbacks to the secondary provider"),
        &["reason"], // "exhausted", "non_retryable"
    )
    .unwrap()
});

// =============================================================================
// Provider attempts
// =============================================================================

/// Duration of a single provider attempt.
pub static ATTEMPT_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "tubeline_attempt_duration_seconds",
            "Duration of provider download attempts",
        )
        .buckets(vec![
            1.0, 5.0, 15.0, 30.0, 60.0, 120.0, 300.0, 600.0, 1200.0,
        ]),
        &["provider", "result"], // "primary" | "secondary", "success" | error kind
    )
    .unwrap()
});

/// Progress events published to subscribers.
pub static PROGRESS_EVENTS: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "tubeline_progress_events_total",
        "Total progress events published",
    )
    .unwrap()
});

/// Terminal snapshots that could not be written to history.
pub static HISTORY_WRITE_ERRORS: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "tubeline_history_write_errors_total",
        "Total failed job history writes",
    )
    .unwrap()
});

/// Get all core metrics for registration.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        // Jobs
        Box::new(JOBS_STARTED.clone()),
        Box::new(JOBS_FINISHED.clone()),
        Box::new(JOBS_REJECTED.clone()),
        // Retries and fallback
        Box::new(PRIMARY_RETRIES.clone()),
        Box::new(FALLBACKS.clone()),
        // Attempts
        Box::new(ATTEMPT_DURATION.clone()),
        Box::new(PROGRESS_EVENTS.clone()),
        Box::new(HISTORY_WRITE_ERRORS.clone()),
    ]
}
