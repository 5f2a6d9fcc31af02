//! Observability infrastructure for the collector
//!
//! Provides:
//! - Prometheus metrics (poll latency, overruns, errors by stage, submissions)
//! - Structured JSON logging of lifecycle events with tracing

use crate::error::PollStage;
use chrono::{DateTime, Utc};
use prometheus::{
    register_histogram_vec, register_int_counter_vec, register_int_gauge, HistogramVec,
    IntCounterVec, IntGauge,
};
use std::sync::OnceLock;
use tracing::{error, info, warn};

/// Histogram buckets for poll cycle duration (in seconds)
const POLL_BUCKETS: &[f64] = &[0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 20.0, 40.0, 60.0];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<AgentMetricsInner> = OnceLock::new();

/// Inner metrics structure that holds the actual Prometheus metrics
struct AgentMetricsInner {
    poll_duration_seconds: HistogramVec,
    poll_overruns: IntCounterVec,
    poll_errors: IntCounterVec,
    measurements_submitted: IntCounterVec,
    submission_failures: IntCounterVec,
    series_skipped: IntCounterVec,
    sources_cached: IntGauge,
    endpoints_monitored: IntGauge,
    endpoints_disabled: IntGauge,
}

impl AgentMetricsInner {
    fn new() -> Self {
        Self {
            poll_duration_seconds: register_histogram_vec!(
                "perf_agent_poll_duration_seconds",
                "Time spent in one poll cycle of an endpoint",
                &["endpoint"],
                POLL_BUCKETS.to_vec()
            )
            .expect("Failed to register poll_duration_seconds"),

            poll_overruns: register_int_counter_vec!(
                "perf_agent_poll_overruns_total",
                "Ticks skipped because the previous poll was still running",
                &["endpoint"]
            )
            .expect("Failed to register poll_overruns"),

            poll_errors: register_int_counter_vec!(
                "perf_agent_poll_errors_total",
                "Failed poll cycles by stage",
                &["endpoint", "stage"]
            )
            .expect("Failed to register poll_errors"),

            measurements_submitted: register_int_counter_vec!(
                "perf_agent_measurements_submitted_total",
                "Measurements accepted by the ingestion backend",
                &["endpoint"]
            )
            .expect("Failed to register measurements_submitted"),

            submission_failures: register_int_counter_vec!(
                "perf_agent_submission_failures_total",
                "Measurement batches the ingestion backend rejected or never received",
                &["endpoint"]
            )
            .expect("Failed to register submission_failures"),

            series_skipped: register_int_counter_vec!(
                "perf_agent_series_skipped_total",
                "Series dropped during transformation by reason",
                &["endpoint", "reason"]
            )
            .expect("Failed to register series_skipped"),

            sources_cached: register_int_gauge!(
                "perf_agent_sources_cached",
                "Source identities held in the cache"
            )
            .expect("Failed to register sources_cached"),

            endpoints_monitored: register_int_gauge!(
                "perf_agent_endpoints_monitored",
                "Endpoints with a running poller"
            )
            .expect("Failed to register endpoints_monitored"),

            endpoints_disabled: register_int_gauge!(
                "perf_agent_endpoints_disabled",
                "Endpoints disabled by an invalid catalog"
            )
            .expect("Failed to register endpoints_disabled"),
        }
    }
}

/// Agent metrics for Prometheus exposition
///
/// This is a lightweight handle to the global metrics instance.
/// Multiple clones share the same underlying metrics.
#[derive(Clone)]
pub struct AgentMetrics {
    _private: (),
}

impl Default for AgentMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl AgentMetrics {
    /// Create a new metrics handle (initializes global metrics if needed)
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(AgentMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &AgentMetricsInner {
        GLOBAL_METRICS.get().expect("Metrics not initialized")
    }

    pub fn observe_poll_duration(&self, endpoint: &str, duration_secs: f64) {
        self.inner()
            .poll_duration_seconds
            .with_label_values(&[endpoint])
            .observe(duration_secs);
    }

    pub fn inc_poll_overruns(&self, endpoint: &str) {
        self.inner().poll_overruns.with_label_values(&[endpoint]).inc();
    }

    pub fn inc_poll_errors(&self, endpoint: &str, stage: PollStage) {
        self.inner()
            .poll_errors
            .with_label_values(&[endpoint, stage.as_str()])
            .inc();
    }

    pub fn add_measurements_submitted(&self, endpoint: &str, count: usize) {
        self.inner()
            .measurements_submitted
            .with_label_values(&[endpoint])
            .inc_by(count as u64);
    }

    pub fn inc_submission_failures(&self, endpoint: &str) {
        self.inner()
            .submission_failures
            .with_label_values(&[endpoint])
            .inc();
    }

    /// Count a dropped series; `reason` is one of `unresolved`, `no_data`,
    /// `unrecognized`, `invalid`, `source_unresolved`
    pub fn inc_series_skipped(&self, endpoint: &str, reason: &str) {
        self.inner()
            .series_skipped
            .with_label_values(&[endpoint, reason])
            .inc();
    }

    pub fn set_sources_cached(&self, count: usize) {
        self.inner().sources_cached.set(count as i64);
    }

    pub fn set_endpoints_monitored(&self, count: usize) {
        self.inner().endpoints_monitored.set(count as i64);
    }

    pub fn inc_endpoints_disabled(&self) {
        self.inner().endpoints_disabled.inc();
    }
}

/// Structured logger for agent events
///
/// Provides consistent JSON-formatted logging for lifecycle events
/// that operators alert on.
#[derive(Clone)]
pub struct StructuredLogger {
    instance: String,
}

impl StructuredLogger {
    pub fn new(instance: impl Into<String>) -> Self {
        Self {
            instance: instance.into(),
        }
    }

    /// Log agent startup
    pub fn log_startup(&self, version: &str, endpoints: usize) {
        info!(
            event = "agent_started",
            instance = %self.instance,
            agent_version = %version,
            endpoints = endpoints,
            "Performance collector started"
        );
    }

    /// Log agent shutdown
    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "agent_shutdown",
            instance = %self.instance,
            reason = %reason,
            "Performance collector shutting down"
        );
    }

    /// Log an endpoint taken out of rotation for good
    pub fn log_endpoint_disabled(&self, endpoint: &str, reason: &str) {
        error!(
            event = "endpoint_disabled",
            instance = %self.instance,
            endpoint = %endpoint,
            reason = %reason,
            "Endpoint disabled, polling stopped"
        );
    }

    /// Log a tick skipped because the previous poll still holds the lock
    pub fn log_poll_overrun(&self, endpoint: &str, overruns: u64) {
        warn!(
            event = "poll_overrun",
            instance = %self.instance,
            endpoint = %endpoint,
            overruns = overruns,
            "Poll already in progress, skipping"
        );
    }

    /// Log a batch delivered to ingestion
    pub fn log_batch_submitted(
        &self,
        endpoint: &str,
        measurements: usize,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
    ) {
        info!(
            event = "batch_submitted",
            instance = %self.instance,
            endpoint = %endpoint,
            measurements = measurements,
            window_start = %window_start,
            window_end = %window_end,
            "Submitted measurement batch"
        );
    }
}
