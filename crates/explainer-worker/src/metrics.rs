//! Prometheus metrics for the worker.

use std::net::SocketAddr;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus recorder with an HTTP scrape endpoint.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()
}

/// Metric names as constants for consistency.
pub mod names {
    // Job metrics
    pub const JOBS_TOTAL: &str = "explainer_jobs_total";
    pub const JOBS_REJECTED_TOTAL: &str = "explainer_jobs_rejected_total";
    pub const JOBS_IN_FLIGHT: &str = "explainer_jobs_in_flight";
    pub const JOB_DURATION_SECONDS: &str = "explainer_job_duration_seconds";

    // Clip metrics
    pub const CLIPS_TOTAL: &str = "explainer_clips_total";
    pub const RENDER_ATTEMPTS: &str = "explainer_render_attempts";
}

/// Record a job reaching a terminal state.
pub fn record_job_finished(status: &str, duration_secs: f64) {
    let labels = [("status", status.to_string())];
    counter!(names::JOBS_TOTAL, &labels).increment(1);
    histogram!(names::JOB_DURATION_SECONDS, &labels).record(duration_secs);
}

/// Record a submission turned away before any work started.
pub fn record_job_rejected(reason: &str) {
    let labels = [("reason", reason.to_string())];
    counter!(names::JOBS_REJECTED_TOTAL, &labels).increment(1);
}

pub fn set_jobs_in_flight(count: usize) {
    gauge!(names::JOBS_IN_FLIGHT).set(count as f64);
}

/// Record a clip outcome and the render attempts it used.
pub fn record_clip(outcome: &str, attempts: u8) {
    let labels = [("outcome", outcome.to_string())];
    counter!(names::CLIPS_TOTAL, &labels).increment(1);
    histogram!(names::RENDER_ATTEMPTS, &labels).record(f64::from(attempts));
}
