//! Core data models for the alert agent

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Structured identifier for a single metric series: `(resource, metric)`.
///
/// Composite rule paths like `cpu.value` resolve to a `MetricKey` with
/// `resource = "cpu"` and `metric = "value"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MetricKey {
    pub resource: String,
    pub metric: String,
}

impl MetricKey {
    pub fn new(resource: impl Into<String>, metric: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            metric: metric.into(),
        }
    }
}

impl fmt::Display for MetricKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.resource, self.metric)
    }
}

/// A single observed value with its collection timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricSample {
    pub value: f64,
    pub timestamp: i64,
}

/// Immutable set of metric values for one evaluation pass.
///
/// Built once per cycle from the collector report and never mutated while
/// checks are running.
#[derive(Debug, Clone, Default)]
pub struct MetricSnapshot {
    taken_at: i64,
    values: HashMap<MetricKey, MetricSample>,
}

impl MetricSnapshot {
    pub fn new(taken_at: i64) -> Self {
        Self {
            taken_at,
            values: HashMap::new(),
        }
    }

    /// Build a snapshot from the collector report shape:
    /// `{"plugins":[{"name":"cpu","metrics":{"value":95.5}}]}`.
    pub fn from_report(report: &AgentReport, taken_at: i64) -> Self {
        let mut snapshot = Self::new(report.timestamp.unwrap_or(taken_at));
        for plugin in &report.plugins {
            for (metric, value) in &plugin.metrics {
                snapshot.insert(MetricKey::new(&plugin.name, metric), *value);
            }
        }
        snapshot
    }

    /// Insert a value at the snapshot's own timestamp. Only used while
    /// assembling a snapshot, before evaluation starts.
    pub fn insert(&mut self, key: MetricKey, value: f64) {
        self.values.insert(
            key,
            MetricSample {
                value,
                timestamp: self.taken_at,
            },
        );
    }

    pub fn get(&self, key: &MetricKey) -> Option<MetricSample> {
        self.values.get(key).copied()
    }

    pub fn value(&self, key: &MetricKey) -> Option<f64> {
        self.get(key).map(|s| s.value)
    }

    pub fn taken_at(&self) -> i64 {
        self.taken_at
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Report written by the metric collector, consumed as snapshot input.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentReport {
    pub plugins: Vec<PluginReport>,
    /// Collection timestamp; falls back to the read time when absent.
    #[serde(default)]
    pub timestamp: Option<i64>,
}

/// One plugin's metrics within a collector report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginReport {
    pub name: String,
    pub metrics: HashMap<String, f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_from_report() {
        let report: AgentReport = serde_json::from_str(
            r#"{"plugins":[{"name":"cpu","metrics":{"value":95.5}},
                           {"name":"memory","metrics":{"value":42.0,"swap":1.5}}]}"#,
        )
        .unwrap();

        let snapshot = MetricSnapshot::from_report(&report, 1_700_000_000);
        assert_eq!(snapshot.len(), 3);
        assert_eq!(snapshot.value(&MetricKey::new("cpu", "value")), Some(95.5));
        assert_eq!(snapshot.value(&MetricKey::new("memory", "swap")), Some(1.5));
        assert_eq!(snapshot.value(&MetricKey::new("disk", "value")), None);
        assert_eq!(snapshot.taken_at(), 1_700_000_000);
    }

    #[test]
    fn test_report_timestamp_preferred() {
        let report = AgentReport {
            plugins: vec![],
            timestamp: Some(123),
        };
        let snapshot = MetricSnapshot::from_report(&report, 456);
        assert_eq!(snapshot.taken_at(), 123);
    }

    #[test]
    fn test_metric_key_display() {
        assert_eq!(MetricKey::new("cpu", "value").to_string(), "cpu.value");
    }
}
