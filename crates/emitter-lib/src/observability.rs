//! Observability infrastructure for the metrics emitter
//!
//! Provides:
//! - Prometheus metrics about the emitter itself (pass counts, push
//!   outcomes, query traffic)
//! - Structured JSON logging with tracing

use crate::error::PushError;
use crate::models::PassSummary;
use prometheus::{
    register_histogram, register_int_counter, register_int_gauge, Histogram, IntCounter, IntGauge,
};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Histogram buckets for pass durations (in seconds)
const PASS_DURATION_BUCKETS: &[f64] = &[0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<EmitterMetricsInner> = OnceLock::new();

/// Inner metrics structure that holds the actual Prometheus metrics
struct EmitterMetricsInner {
    passes_total: IntCounter,
    pods_listed: IntGauge,
    pods_matched: IntGauge,
    samples_pushed_total: IntCounter,
    push_failures_total: IntCounter,
    query_requests_total: IntCounter,
    pass_duration_seconds: Histogram,
}

impl EmitterMetricsInner {
    fn new() -> Self {
        Self {
            passes_total: register_int_counter!(
                "metrics_emitter_passes_total",
                "Total number of generation passes started"
            )
            .expect("Failed to register passes_total"),

            pods_listed: register_int_gauge!(
                "metrics_emitter_pods_listed",
                "Number of pods returned by the last listing"
            )
            .expect("Failed to register pods_listed"),

            pods_matched: register_int_gauge!(
                "metrics_emitter_pods_matched",
                "Number of pods that matched the name patterns in the last pass"
            )
            .expect("Failed to register pods_matched"),

            samples_pushed_total: register_int_counter!(
                "metrics_emitter_samples_pushed_total",
                "Total number of samples accepted by the push destination"
            )
            .expect("Failed to register samples_pushed_total"),

            push_failures_total: register_int_counter!(
                "metrics_emitter_push_failures_total",
                "Total number of pushes the destination rejected or that failed in transit"
            )
            .expect("Failed to register push_failures_total"),

            query_requests_total: register_int_counter!(
                "metrics_emitter_query_requests_total",
                "Total number of time-series queries answered"
            )
            .expect("Failed to register query_requests_total"),

            pass_duration_seconds: register_histogram!(
                "metrics_emitter_pass_duration_seconds",
                "Wall-clock duration of a full generation pass",
                PASS_DURATION_BUCKETS.to_vec()
            )
            .expect("Failed to register pass_duration_seconds"),
        }
    }
}

/// Emitter metrics for Prometheus exposition
///
/// This is a lightweight handle to the global metrics instance.
/// Multiple clones share the same underlying metrics.
#[derive(Clone)]
pub struct EmitterMetrics {
    // This is just a marker - we use the global instance
    _private: (),
}

impl Default for EmitterMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl EmitterMetrics {
    /// Create a new metrics handle (initializes global metrics if needed)
    pub fn new() -> Self {
        // Initialize global metrics on first call
        GLOBAL_METRICS.get_or_init(EmitterMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &EmitterMetricsInner {
        GLOBAL_METRICS.get().expect("Metrics not initialized")
    }

    /// Count one generation pass
    pub fn inc_passes(&self) {
        self.inner().passes_total.inc();
    }

    /// Record pod counts from the latest listing
    pub fn set_pod_counts(&self, listed: i64, matched: i64) {
        self.inner().pods_listed.set(listed);
        self.inner().pods_matched.set(matched);
    }

    /// Count one accepted push
    pub fn inc_samples_pushed(&self) {
        self.inner().samples_pushed_total.inc();
    }

    /// Count one failed push
    pub fn inc_push_failures(&self) {
        self.inner().push_failures_total.inc();
    }

    /// Count one answered query
    pub fn inc_query_requests(&self) {
        self.inner().query_requests_total.inc();
    }

    /// Total queries answered so far
    pub fn query_requests(&self) -> u64 {
        self.inner().query_requests_total.get()
    }

    /// Record the duration of a completed pass
    pub fn observe_pass_duration(&self, duration_secs: f64) {
        self.inner().pass_duration_seconds.observe(duration_secs);
    }
}

/// Structured logger for emitter events
///
/// Provides consistent JSON-formatted logging for pass summaries and
/// push outcomes.
#[derive(Clone)]
pub struct StructuredLogger {
    job: String,
}

impl StructuredLogger {
    pub fn new(job: impl Into<String>) -> Self {
        Self { job: job.into() }
    }

    /// Log emitter startup
    pub fn log_startup(&self, version: &str, destination: &str) {
        info!(
            event = "emitter_started",
            job = %self.job,
            version = %version,
            destination = %destination,
            "Metrics emitter started"
        );
    }

    /// Log emitter shutdown
    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "emitter_shutdown",
            job = %self.job,
            reason = %reason,
            "Metrics emitter shutting down"
        );
    }

    /// Log the summary of a completed generation pass
    pub fn log_pass_complete(&self, summary: &PassSummary) {
        info!(
            event = "pass_complete",
            job = %self.job,
            started_at = %summary.started_at,
            pods_total = summary.pods_total,
            pods_matched = summary.pods_matched,
            samples_pushed = summary.samples_pushed,
            push_failures = summary.push_failures,
            api_requests = summary.api_request_count,
            skipped_keys = %summary.skipped_keys_text(),
            "Pass complete"
        );
    }

    /// Log a push that the destination rejected or that failed in transit
    pub fn log_push_failure(&self, pod: &str, container: &str, error: &PushError) {
        warn!(
            event = "push_failed",
            job = %self.job,
            pod = %pod,
            container = %container,
            error = %error,
            "Failed to push sample"
        );
    }
}
