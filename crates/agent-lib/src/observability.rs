//! Observability infrastructure for the alert agent
//!
//! Provides:
//! - Prometheus metrics (cycle latency, alert/recovery counts, check gauges)
//! - Structured JSON logging with tracing

use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, register_int_gauge,
    Histogram, IntCounter, IntCounterVec, IntGauge,
};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Histogram buckets for cycle latency (in seconds)
const LATENCY_BUCKETS: &[f64] = &[
    0.0001, 0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0,
];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<AgentMetricsInner> = OnceLock::new();

/// Inner metrics structure that holds the actual Prometheus metrics
struct AgentMetricsInner {
    cycle_latency_seconds: Histogram,
    checks_evaluated: IntCounter,
    alerts_emitted: IntCounterVec,
    alerts_suppressed: IntCounter,
    anomalies_detected: IntCounter,
    rule_compile_errors: IntCounter,
    checks_configured: IntGauge,
    checks_broken: IntGauge,
    history_series: IntGauge,
}

impl AgentMetricsInner {
    fn new() -> Self {
        Self {
            cycle_latency_seconds: register_histogram!(
                "alert_agent_cycle_latency_seconds",
                "Time spent running one evaluation cycle over all checks",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register cycle_latency_seconds"),

            checks_evaluated: register_int_counter!(
                "alert_agent_checks_evaluated_total",
                "Total number of check evaluations"
            )
            .expect("Failed to register checks_evaluated"),

            alerts_emitted: register_int_counter_vec!(
                "alert_agent_alerts_emitted_total",
                "Total number of alert events emitted, by kind",
                &["kind"]
            )
            .expect("Failed to register alerts_emitted"),

            alerts_suppressed: register_int_counter!(
                "alert_agent_alerts_suppressed_total",
                "Trigger emissions suppressed by an active cooldown"
            )
            .expect("Failed to register alerts_suppressed"),

            anomalies_detected: register_int_counter!(
                "alert_agent_anomalies_detected_total",
                "Total number of anomaly verdicts that were abnormal"
            )
            .expect("Failed to register anomalies_detected"),

            rule_compile_errors: register_int_counter!(
                "alert_agent_rule_compile_errors_total",
                "Rule strings that failed to compile"
            )
            .expect("Failed to register rule_compile_errors"),

            checks_configured: register_int_gauge!(
                "alert_agent_checks_configured",
                "Number of checks currently registered"
            )
            .expect("Failed to register checks_configured"),

            checks_broken: register_int_gauge!(
                "alert_agent_checks_broken",
                "Registered checks that are misconfigured and never evaluate"
            )
            .expect("Failed to register checks_broken"),

            history_series: register_int_gauge!(
                "alert_agent_history_series",
                "Number of metric series with stored history"
            )
            .expect("Failed to register history_series"),
        }
    }
}

/// Agent metrics for Prometheus exposition
///
/// This is a lightweight handle to the global metrics instance.
/// Multiple clones share the same underlying metrics.
#[derive(Clone)]
pub struct AgentMetrics {
    // This is just a marker - we use the global instance
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

    pub fn observe_cycle_latency(&self, duration_secs: f64) {
        self.inner().cycle_latency_seconds.observe(duration_secs);
    }

    pub fn inc_checks_evaluated(&self) {
        self.inner().checks_evaluated.inc();
    }

    pub fn inc_alerts_emitted(&self, kind: &str) {
        self.inner().alerts_emitted.with_label_values(&[kind]).inc();
    }

    pub fn inc_alerts_suppressed(&self) {
        self.inner().alerts_suppressed.inc();
    }

    pub fn inc_anomalies_detected(&self) {
        self.inner().anomalies_detected.inc();
    }

    pub fn inc_rule_compile_errors(&self) {
        self.inner().rule_compile_errors.inc();
    }

    pub fn set_checks_configured(&self, count: i64) {
        self.inner().checks_configured.set(count);
    }

    pub fn set_checks_broken(&self, count: i64) {
        self.inner().checks_broken.set(count);
    }

    pub fn set_history_series(&self, count: i64) {
        self.inner().history_series.set(count);
    }
}

/// Structured logger for agent events
///
/// Provides consistent JSON-formatted logging for alerts, recoveries,
/// and other significant events.
#[derive(Clone)]
pub struct StructuredLogger {
    node_name: String,
}

impl StructuredLogger {
    pub fn new(node_name: impl Into<String>) -> Self {
        Self {
            node_name: node_name.into(),
        }
    }

    /// Log an alert trigger emission
    pub fn log_alert_triggered(&self, check_id: &str, severity: u8, message: &str) {
        warn!(
            event = "alert_triggered",
            node = %self.node_name,
            check_id = %check_id,
            severity = severity,
            message = %message,
            "Alert triggered"
        );
    }

    /// Log an alert recovery emission
    pub fn log_alert_recovered(&self, check_id: &str, message: &str) {
        info!(
            event = "alert_recovered",
            node = %self.node_name,
            check_id = %check_id,
            message = %message,
            "Alert recovered"
        );
    }

    /// Log a check that is misconfigured and cannot evaluate
    pub fn log_check_broken(&self, check_id: &str, reason: &str) {
        warn!(
            event = "check_broken",
            node = %self.node_name,
            check_id = %check_id,
            reason = %reason,
            "Check is misconfigured and will not evaluate"
        );
    }

    /// Log an abnormal anomaly verdict
    pub fn log_anomaly(&self, check_id: &str, detail: &str) {
        info!(
            event = "anomaly_detected",
            node = %self.node_name,
            check_id = %check_id,
            detail = %detail,
            "Anomaly detected"
        );
    }

    /// Log agent startup
    pub fn log_startup(&self, version: &str, checks: usize) {
        info!(
            event = "agent_started",
            node = %self.node_name,
            agent_version = %version,
            checks = checks,
            "Alert agent started"
        );
    }

    /// Log agent shutdown
    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "agent_shutdown",
            node = %self.node_name,
            reason = %reason,
            "Alert agent shutting down"
        );
    }
}
