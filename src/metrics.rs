/// Metrics and telemetry for Roomwatch
///
/// Prometheus-compatible metrics for monitoring:
/// - HTTP request counts and latencies
/// - Moderation actions and their outcomes
/// - Audit trail write failures
/// - Cascading room deletions
/// - Live subscription failures
/// - Traffic estimation and background jobs

use lazy_static::lazy_static;
use prometheus::{
    register_histogram_vec, register_int_counter, register_int_counter_vec, register_int_gauge,
    Encoder, HistogramVec, IntCounter, IntCounterVec, IntGauge, TextEncoder,
};

lazy_static! {
    // ========== HTTP Metrics ==========

    /// Total HTTP requests by method, path, and status
    pub static ref HTTP_REQUESTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "roomwatch_http_requests_total",
        "Total number of HTTP requests",
        &["method", "path", "status"]
    )
    .unwrap();

    /// HTTP request duration in seconds
    pub static ref HTTP_REQUEST_DURATION_SECONDS: HistogramVec = register_histogram_vec!(
        "roomwatch_http_request_duration_seconds",
        "HTTP request latencies in seconds",
        &["method", "path"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]
    )
    .unwrap();

    // ========== Moderation Metrics ==========

    /// Moderation actions by action tag and outcome
    pub static ref MODERATION_ACTIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "roomwatch_moderation_actions_total",
        "Total number of moderation actions",
        &["action", "outcome"]
    )
    .unwrap();

    /// Audit entries that could not be written
    pub static ref AUDIT_WRITE_FAILURES_TOTAL: IntCounter = register_int_counter!(
        "roomwatch_audit_write_failures_total",
        "Total number of audit log writes that failed"
    )
    .unwrap();

    /// Documents removed by cascading room deletion, by sub-collection
    pub static ref CASCADE_DOCUMENTS_DELETED_TOTAL: IntCounterVec = register_int_counter_vec!(
        "roomwatch_cascade_documents_deleted_total",
        "Total number of dependent documents deleted with their room",
        &["collection"]
    )
    .unwrap();

    // ========== Live State Metrics ==========

    /// Live subscription failures by selector
    pub static ref SUBSCRIPTION_ERRORS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "roomwatch_subscription_errors_total",
        "Total number of live subscriptions ended by an error",
        &["selector"]
    )
    .unwrap();

    /// Documents left out of table rows because they failed to decode
    pub static ref MALFORMED_DOCUMENTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "roomwatch_malformed_documents_total",
        "Total number of snapshot documents skipped by typed decoding",
        &["collection"]
    )
    .unwrap();

    /// Users currently online, as of the latest snapshot
    pub static ref ONLINE_USERS: IntGauge = register_int_gauge!(
        "roomwatch_online_users",
        "Number of users currently online"
    )
    .unwrap();

    /// Active rooms, as of the latest snapshot
    pub static ref ACTIVE_ROOMS: IntGauge = register_int_gauge!(
        "roomwatch_active_rooms",
        "Number of active rooms"
    )
    .unwrap();

    // ========== Traffic Metrics ==========

    /// Estimated bytes recorded into the traffic ledger
    pub static ref TRAFFIC_BYTES_TOTAL: IntCounter = register_int_counter!(
        "roomwatch_traffic_estimated_bytes_total",
        "Total number of estimated bytes recorded"
    )
    .unwrap();

    // ========== Background Job Metrics ==========

    /// Background job executions by job type and status
    pub static ref BACKGROUND_JOBS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "roomwatch_background_jobs_total",
        "Total number of background job executions",
        &["job_type", "status"]
    )
    .unwrap();
}

/// Render metrics in Prometheus text format
pub fn render_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::warn!("Failed to encode metrics: {}", e);
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

/// Record an HTTP request
pub fn record_http_request(method: &str, path: &str, status: u16, duration: f64) {
    HTTP_REQUESTS_TOTAL
        .with_label_values(&[method, path, &status.to_string()])
        .inc();
    HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&[method, path])
        .observe(duration);
}

/// Record a moderation action outcome
pub fn record_moderation_action(action: &str, success: bool) {
    MODERATION_ACTIONS_TOTAL
        .with_label_values(&[action, if success { "success" } else { "failure" }])
        .inc();
}

/// Record an audit entry that was lost
pub fn record_audit_failure() {
    AUDIT_WRITE_FAILURES_TOTAL.inc();
}

/// Record dependent documents deleted from one sub-collection
pub fn record_cascade_deleted(collection: &str, documents: usize) {
    CASCADE_DOCUMENTS_DELETED_TOTAL
        .with_label_values(&[collection])
        .inc_by(documents as u64);
}

/// Record a failed live subscription
pub fn record_subscription_error(selector: &str) {
    SUBSCRIPTION_ERRORS_TOTAL
        .with_label_values(&[selector])
        .inc();
}

/// Record a snapshot document that could not be decoded
pub fn record_malformed_document(collection: &str) {
    MALFORMED_DOCUMENTS_TOTAL
        .with_label_values(&[collection])
        .inc();
}

/// Record an estimated traffic delta
pub fn record_traffic_bytes(bytes: u64) {
    TRAFFIC_BYTES_TOTAL.inc_by(bytes);
}

/// Record a background job execution
pub fn record_background_job(job_type: &str, success: bool) {
    BACKGROUND_JOBS_TOTAL
        .with_label_values(&[job_type, if success { "success" } else { "failure" }])
        .inc();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_http_request() {
        record_http_request("GET", "/api/stats", 200, 0.05);
        let metrics = render_metrics();
        assert!(metrics.contains("roomwatch_http_requests_total"));
        assert!(metrics.contains("roomwatch_http_request_duration_seconds"));
    }

    #[test]
    fn test_record_moderation_action() {
        record_moderation_action("ban_permanent", true);
        record_moderation_action("delete_room", false);
        let metrics = render_metrics();
        assert!(metrics.contains("roomwatch_moderation_actions_total"));
        assert!(metrics.contains("outcome=\"failure\""));
    }

    #[test]
    fn test_record_cascade_and_traffic() {
        record_cascade_deleted("messages", 75);
        record_traffic_bytes(102_400);
        let metrics = render_metrics();
        assert!(metrics.contains("roomwatch_cascade_documents_deleted_total"));
        assert!(metrics.contains("roomwatch_traffic_estimated_bytes_total"));
    }

    #[test]
    fn test_record_malformed_document() {
        record_malformed_document("users");
        let metrics = render_metrics();
        assert!(metrics.contains("roomwatch_malformed_documents_total"));
        assert!(metrics.contains("collection=\"users\""));
    }

    #[test]
    fn test_gauges() {
        ONLINE_USERS.set(3);
        ACTIVE_ROOMS.set(1);
        let metrics = render_metrics();
        assert!(metrics.contains("roomwatch_online_users"));
        assert!(metrics.contains("roomwatch_active_rooms"));
    }
}
