/// Metrics and telemetry for the Vellum backend
///
/// Provides Prometheus-compatible metrics for monitoring:
/// - HTTP request counts
/// - Governance decisions and lifecycle transitions
/// - Audit trail health
/// - Background job execution

use lazy_static::lazy_static;
use prometheus::{
    register_int_counter, register_int_counter_vec, register_int_gauge, Encoder, IntCounter,
    IntCounterVec, IntGauge, TextEncoder,
};

lazy_static! {
    // ========== HTTP Metrics ==========

    /// Total HTTP requests by method, path, and status
    pub static ref HTTP_REQUESTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "http_requests_total",
        "Total number of HTTP requests",
        &["method", "path", "status"]
    )
    .unwrap();

    // ========== Governance Metrics ==========

    /// Permission decisions by capability and outcome
    pub static ref GOVERNANCE_DECISIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "governance_decisions_total",
        "Total number of permission decisions",
        &["capability", "outcome"]
    )
    .unwrap();

    /// Content lifecycle transitions by action
    pub static ref LIFECYCLE_TRANSITIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "lifecycle_transitions_total",
        "Total number of content lifecycle transitions",
        &["action"]
    )
    .unwrap();

    /// Role changes applied
    pub static ref ROLE_CHANGES_TOTAL: IntCounter = register_int_counter!(
        "role_changes_total",
        "Total number of accepted role changes"
    )
    .unwrap();

    /// Bulk operation items by action and outcome
    pub static ref BULK_ITEMS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "bulk_items_total",
        "Total number of bulk operation items processed",
        &["action", "outcome"]
    )
    .unwrap();

    // ========== Audit Metrics ==========

    /// Best-effort audit writes that failed. The primary action already
    /// committed when this fires; a non-zero rate is an operational alert,
    /// not a user-visible error.
    pub static ref AUDIT_WRITE_FAILURES_TOTAL: IntCounter = register_int_counter!(
        "audit_write_failures_total",
        "Total number of failed best-effort audit writes"
    )
    .unwrap();

    /// Audit entries purged by retention
    pub static ref AUDIT_PURGED_TOTAL: IntCounter = register_int_counter!(
        "audit_purged_total",
        "Total number of audit entries deleted by retention"
    )
    .unwrap();

    // ========== Background Job Metrics ==========

    /// Background job executions by job type and status
    pub static ref BACKGROUND_JOBS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "background_jobs_total",
        "Total number of background job executions",
        &["job_type", "status"]
    )
    .unwrap();

    // ========== Account Metrics ==========

    /// Account registrations
    pub static ref ACCOUNT_REGISTRATIONS_TOTAL: IntCounter = register_int_counter!(
        "account_registrations_total",
        "Total number of accounts registered"
    )
    .unwrap();

    /// Active sessions
    pub static ref SESSIONS_ACTIVE: IntGauge = register_int_gauge!(
        "sessions_active",
        "Number of active sessions"
    )
    .unwrap();
}

/// Render all registered metrics in the Prometheus text format
pub fn render() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if encoder.encode(&metric_families, &mut buffer).is_err() {
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_includes_registered_metrics() {
        AUDIT_WRITE_FAILURES_TOTAL.inc_by(0);
        GOVERNANCE_DECISIONS_TOTAL
            .with_label_values(&["publish_post", "granted"])
            .inc_by(0);

        let output = render();
        assert!(output.contains("audit_write_failures_total"));
        assert!(output.contains("governance_decisions_total"));
    }
}
