//! Check definitions loaded from the checks file

use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::alerting::AlertPolicy;
use crate::anomaly::AnomalyParams;

/// A composite (rule-based) check definition.
#[derive(Debug, Clone, Deserialize)]
pub struct CompositeCheckConfig {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default = "default_severity")]
    pub severity: u8,
    #[serde(default = "default_cooldown")]
    pub cooldown_secs: u64,
    /// Rule expression, e.g. `"cpu.value > 80 AND memory.value > 85"`
    pub rule: String,
    #[serde(default = "default_enabled")]
    pub notify_on_trigger: bool,
    #[serde(default)]
    pub notify_on_recovery: bool,
    /// Template with `{resource.metric}` placeholders; empty uses the
    /// evaluator's explanation string
    #[serde(default)]
    pub notification_message: String,
}

impl CompositeCheckConfig {
    pub fn policy(&self) -> AlertPolicy {
        AlertPolicy {
            severity: self.severity,
            cooldown_secs: self.cooldown_secs,
            notify_on_trigger: self.notify_on_trigger,
            notify_on_recovery: self.notify_on_recovery,
            message: self.notification_message.clone(),
        }
    }
}

/// A statistical anomaly check definition for one metric series.
#[derive(Debug, Clone, Deserialize)]
pub struct AnomalyCheckConfig {
    pub name: String,
    pub resource: String,
    pub metric: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default = "default_severity")]
    pub severity: u8,
    #[serde(default = "default_cooldown")]
    pub cooldown_secs: u64,
    #[serde(default = "default_sensitivity")]
    pub sensitivity: f64,
    #[serde(default = "default_window")]
    pub window: usize,
    /// Absolute delta against the recent mean that counts as a spike;
    /// omit to disable spike detection for this series
    #[serde(default = "default_spike_threshold")]
    pub spike_threshold: f64,
    #[serde(default = "default_min_data_points")]
    pub min_data_points: usize,
    #[serde(default = "default_recent_window")]
    pub recent_window: usize,
    #[serde(default = "default_enabled")]
    pub notify_on_trigger: bool,
    #[serde(default)]
    pub notify_on_recovery: bool,
    #[serde(default)]
    pub notification_message: String,
}

impl AnomalyCheckConfig {
    pub fn policy(&self) -> AlertPolicy {
        AlertPolicy {
            severity: self.severity,
            cooldown_secs: self.cooldown_secs,
            notify_on_trigger: self.notify_on_trigger,
            notify_on_recovery: self.notify_on_recovery,
            message: self.notification_message.clone(),
        }
    }

    pub fn params(&self) -> AnomalyParams {
        AnomalyParams {
            sensitivity: self.sensitivity,
            window: self.window,
            spike_threshold: self.spike_threshold,
            min_data_points: self.min_data_points,
            recent_window: self.recent_window,
        }
        .normalized()
    }
}

/// All check definitions for one agent.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChecksConfig {
    #[serde(default)]
    pub composite_checks: Vec<CompositeCheckConfig>,
    #[serde(default)]
    pub anomaly_checks: Vec<AnomalyCheckConfig>,
}

impl ChecksConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read(path)
            .with_context(|| format!("reading checks file {}", path.display()))?;
        serde_json::from_slice(&raw)
            .with_context(|| format!("parsing checks file {}", path.display()))
    }

    pub fn len(&self) -> usize {
        self.composite_checks.len() + self.anomaly_checks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.composite_checks.is_empty() && self.anomaly_checks.is_empty()
    }
}

fn default_enabled() -> bool {
    true
}

fn default_severity() -> u8 {
    1
}

fn default_cooldown() -> u64 {
    300
}

fn default_sensitivity() -> f64 {
    2.0
}

fn default_window() -> usize {
    crate::anomaly::DEFAULT_WINDOW
}

fn default_spike_threshold() -> f64 {
    f64::INFINITY
}

fn default_min_data_points() -> usize {
    5
}

fn default_recent_window() -> usize {
    3
}
