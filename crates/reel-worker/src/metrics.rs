//! Prometheus metrics for the render worker.

use std::net::SocketAddr;

use metrics::{counter, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

use reel_models::{FailureKind, RenderJobKey};

/// Install the Prometheus recorder with an HTTP scrape listener.
///
/// Must be called from within a tokio runtime.
pub fn init_metrics(listen_addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new()
        .with_http_listener(listen_addr)
        .install()
}

/// Metric names as constants for consistency.
pub mod names {
    // Render jobs
    pub const RENDERS_SUBMITTED_TOTAL: &str = "reel_renders_submitted_total";
    pub const RENDERS_COMPLETED_TOTAL: &str = "reel_renders_completed_total";
    pub const RENDERS_FAILED_TOTAL: &str = "reel_renders_failed_total";
    pub const RENDER_DURATION_SECONDS: &str = "reel_render_duration_seconds";
    pub const POLL_ATTEMPTS_TOTAL: &str = "reel_poll_attempts_total";

    // Review loop
    pub const REVIEWS_TOTAL: &str = "reel_reviews_total";
    pub const REVISIONS_TOTAL: &str = "reel_revisions_total";
    pub const REGRESSIONS_TOTAL: &str = "reel_regressions_total";

    // Preprocessing
    pub const CLIPS_PREPROCESSED_TOTAL: &str = "reel_clips_preprocessed_total";
}

fn key_labels(key: &RenderJobKey) -> [(&'static str, String); 2] {
    [
        ("platform", key.platform.to_string()),
        ("backend", key.backend.to_string()),
    ]
}

pub fn record_render_submitted(key: &RenderJobKey, revision: u32) {
    let [platform, backend] = key_labels(key);
    let labels = [platform, backend, ("revision", revision.to_string())];
    counter!(names::RENDERS_SUBMITTED_TOTAL, &labels).increment(1);
}

pub fn record_render_completed(key: &RenderJobKey, duration_secs: f64) {
    let labels = key_labels(key);
    counter!(names::RENDERS_COMPLETED_TOTAL, &labels).increment(1);
    histogram!(names::RENDER_DURATION_SECONDS, &labels).record(duration_secs);
}

pub fn record_render_failed(key: &RenderJobKey, kind: FailureKind) {
    let [platform, backend] = key_labels(key);
    let labels = [platform, backend, ("kind", kind.to_string())];
    counter!(names::RENDERS_FAILED_TOTAL, &labels).increment(1);
}

pub fn record_poll_attempt(key: &RenderJobKey, ok: bool) {
    let labels = [
        ("platform", key.platform.to_string()),
        ("outcome", if ok { "ok" } else { "error" }.to_string()),
    ];
    counter!(names::POLL_ATTEMPTS_TOTAL, &labels).increment(1);
}

pub fn record_review(key: &RenderJobKey, outcome: &str) {
    let labels = [
        ("platform", key.platform.to_string()),
        ("outcome", outcome.to_string()),
    ];
    counter!(names::REVIEWS_TOTAL, &labels).increment(1);
}

pub fn record_revision(key: &RenderJobKey) {
    let labels = key_labels(key);
    counter!(names::REVISIONS_TOTAL, &labels).increment(1);
}

pub fn record_regression(key: &RenderJobKey) {
    let labels = key_labels(key);
    counter!(names::REGRESSIONS_TOTAL, &labels).increment(1);
}

pub fn record_clips_preprocessed(count: usize) {
    counter!(names::CLIPS_PREPROCESSED_TOTAL).increment(count as u64);
}
