//! Agent configuration

use anyhow::Result;
use serde::Deserialize;

/// Agent configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    /// Node name for structured log context
    #[serde(default = "default_node_name")]
    pub node_name: String,

    /// API server port for health/metrics/status
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// Path to the checks definition file (JSON)
    #[serde(default = "default_checks_file")]
    pub checks_file: String,

    /// Path to the collector report consumed each cycle
    #[serde(default = "default_report_path")]
    pub report_path: String,

    /// Evaluation cycle interval in seconds
    #[serde(default = "default_cycle_interval")]
    pub cycle_interval_secs: u64,

    /// Path for persisted anomaly history; empty disables persistence
    #[serde(default = "default_history_path")]
    pub history_path: String,

    /// History flush interval in seconds
    #[serde(default = "default_flush_interval")]
    pub flush_interval_secs: u64,
}

fn default_node_name() -> String {
    std::env::var("NODE_NAME").unwrap_or_else(|_| "unknown".to_string())
}

fn default_api_port() -> u16 {
    8080
}

fn default_checks_file() -> String {
    "/etc/alert-agent/checks.json".to_string()
}

fn default_report_path() -> String {
    "/var/run/alert-agent/report.json".to_string()
}

fn default_cycle_interval() -> u64 {
    30
}

fn default_history_path() -> String {
    "/var/lib/alert-agent/history.json".to_string()
}

fn default_flush_interval() -> u64 {
    60
}

impl AgentConfig {
    /// Load configuration from environment variables (AGENT_ prefix)
    pub fn load() -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::Environment::with_prefix("AGENT"))
            .build()?;

        Ok(config.try_deserialize().unwrap_or_else(|_| AgentConfig {
            node_name: default_node_name(),
            api_port: default_api_port(),
            checks_file: default_checks_file(),
            report_path: default_report_path(),
            cycle_interval_secs: default_cycle_interval(),
            history_path: default_history_path(),
            flush_interval_secs: default_flush_interval(),
        }))
    }
}
