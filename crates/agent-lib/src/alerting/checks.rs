//! Check abstraction and registry
//!
//! Every alerting rule is a [`Check`] held in a [`CheckRegistry`] keyed by
//! its id. Composite checks evaluate a compiled rule expression; anomaly
//! checks run the statistical detector over one metric series.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::warn;

use super::coordinator::AlertPolicy;
use crate::anomaly::{AnomalyDetector, AnomalyOutcome, HistoryStore};
use crate::config::{AnomalyCheckConfig, ChecksConfig, CompositeCheckConfig};
use crate::models::{MetricKey, MetricSnapshot};
use crate::rules::{evaluate, RuleCache, RuleError, RuleExpr};

/// What kind of check this is, for status reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckKind {
    Composite,
    Anomaly,
}

/// Per-cycle result of evaluating one check.
///
/// `Skipped` and `Broken` are deliberately distinct from an inactive
/// condition so operators can tell "not alerting" apart from
/// "misconfigured" or "waiting for data".
#[derive(Debug, Clone, PartialEq)]
pub enum CheckOutcome {
    /// The condition was evaluated; `detail` explains the verdict
    Condition { active: bool, detail: String },
    /// Evaluation did not apply this cycle (disabled, missing metric,
    /// not enough history); alert state is left untouched
    Skipped { reason: String },
    /// The check is misconfigured and will never evaluate (bad rule)
    Broken { reason: String },
}

/// One alerting rule evaluated each cycle against the current snapshot.
pub trait Check: Send {
    fn id(&self) -> &str;
    fn kind(&self) -> CheckKind;
    fn policy(&self) -> &AlertPolicy;
    /// Metric paths this check reads, used for the event value map.
    fn paths(&self) -> Vec<MetricKey>;
    fn evaluate(&mut self, snapshot: &MetricSnapshot, history: &mut HistoryStore) -> CheckOutcome;
}

/// Rule-based check over multiple metric comparisons.
pub struct CompositeCheck {
    id: String,
    enabled: bool,
    policy: AlertPolicy,
    rule: Result<Arc<RuleExpr>, RuleError>,
}

impl CompositeCheck {
    /// Compile the configured rule through the shared cache. A rule that
    /// fails to compile produces a permanently broken check; it is reported
    /// each cycle but never aborts anything.
    pub fn from_config(config: &CompositeCheckConfig, cache: &mut RuleCache) -> Self {
        let rule = cache.get_or_compile(&config.rule);
        if let Err(e) = &rule {
            crate::observability::AgentMetrics::new().inc_rule_compile_errors();
            warn!(check_id = %config.name, rule = %config.rule, error = %e, "Rule failed to compile, check disabled");
        }
        Self {
            id: config.name.clone(),
            enabled: config.enabled,
            policy: config.policy(),
            rule,
        }
    }
}

impl Check for CompositeCheck {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> CheckKind {
        CheckKind::Composite
    }

    fn policy(&self) -> &AlertPolicy {
        &self.policy
    }

    fn paths(&self) -> Vec<MetricKey> {
        match &self.rule {
            Ok(expr) => expr.paths().into_iter().cloned().collect(),
            Err(_) => Vec::new(),
        }
    }

    fn evaluate(&mut self, snapshot: &MetricSnapshot, _history: &mut HistoryStore) -> CheckOutcome {
        if !self.enabled {
            return CheckOutcome::Skipped {
                reason: "disabled".to_string(),
            };
        }
        match &self.rule {
            Err(e) => CheckOutcome::Broken {
                reason: e.to_string(),
            },
            Ok(expr) => {
                let result = evaluate(expr, snapshot);
                CheckOutcome::Condition {
                    active: result.matched,
                    detail: result.explanations.join("; "),
                }
            }
        }
    }
}

/// Statistical check over a single metric series.
pub struct AnomalyCheck {
    id: String,
    enabled: bool,
    key: MetricKey,
    detector: AnomalyDetector,
    policy: AlertPolicy,
}

impl AnomalyCheck {
    pub fn from_config(config: &AnomalyCheckConfig) -> Self {
        Self {
            id: config.name.clone(),
            enabled: config.enabled,
            key: MetricKey::new(&config.resource, &config.metric),
            detector: AnomalyDetector::new(config.params()),
            policy: config.policy(),
        }
    }
}

impl Check for AnomalyCheck {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> CheckKind {
        CheckKind::Anomaly
    }

    fn policy(&self) -> &AlertPolicy {
        &self.policy
    }

    fn paths(&self) -> Vec<MetricKey> {
        vec![self.key.clone()]
    }

    fn evaluate(&mut self, snapshot: &MetricSnapshot, history: &mut HistoryStore) -> CheckOutcome {
        if !self.enabled {
            return CheckOutcome::Skipped {
                reason: "disabled".to_string(),
            };
        }
        let Some(sample) = snapshot.get(&self.key) else {
            return CheckOutcome::Skipped {
                reason: format!("{}: metric missing from snapshot", self.key),
            };
        };

        match self
            .detector
            .observe(history, &self.key, sample.timestamp, sample.value)
        {
            AnomalyOutcome::NotEnoughData { have, need } => CheckOutcome::Skipped {
                reason: format!("{}: waiting for history ({have}/{need} samples)", self.key),
            },
            AnomalyOutcome::Verdict(v) => CheckOutcome::Condition {
                active: v.is_abnormal(),
                detail: format!(
                    "{}: value {} vs mean {:.2} (z-score {:.2}, stddev {:.2}, spike {})",
                    self.key, sample.value, v.mean, v.z_score, v.std_dev, v.is_spike
                ),
            },
        }
    }
}

/// All configured checks in definition order, keyed by id.
#[derive(Default)]
pub struct CheckRegistry {
    checks: Vec<Box<dyn Check>>,
}

impl CheckRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the registry from a checks file; duplicate ids keep the first
    /// definition and log the rest.
    pub fn from_config(config: &ChecksConfig, cache: &mut RuleCache) -> Self {
        let mut registry = Self::new();
        for check in &config.composite_checks {
            registry.register(Box::new(CompositeCheck::from_config(check, cache)));
        }
        let mut series = HashSet::new();
        for check in &config.anomaly_checks {
            let check = AnomalyCheck::from_config(check);
            if !series.insert(check.key.clone()) {
                // Each check appends the cycle's value to the shared series,
                // so the window fills with duplicated samples
                warn!(
                    check_id = %check.id,
                    series = %check.key,
                    "Multiple anomaly checks track the same metric series, statistics will be skewed"
                );
            }
            registry.register(Box::new(check));
        }
        registry
    }

    pub fn register(&mut self, check: Box<dyn Check>) {
        if self.checks.iter().any(|c| c.id() == check.id()) {
            warn!(check_id = %check.id(), "Duplicate check id, keeping first definition");
            return;
        }
        self.checks.push(check);
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Box<dyn Check>> {
        self.checks.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.checks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.checks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn composite(name: &str, rule: &str) -> CompositeCheckConfig {
        serde_json::from_str(&format!(r#"{{"name": "{name}", "rule": "{rule}"}}"#)).unwrap()
    }

    fn snapshot(values: &[(&str, &str, f64)]) -> MetricSnapshot {
        let mut snapshot = MetricSnapshot::new(1000);
        for (resource, metric, value) in values {
            snapshot.insert(MetricKey::new(*resource, *metric), *value);
        }
        snapshot
    }

    #[test]
    fn test_composite_check_active() {
        let mut cache = RuleCache::new();
        let mut check =
            CompositeCheck::from_config(&composite("c", "cpu.value > 80"), &mut cache);
        let mut history = HistoryStore::new();

        let outcome = check.evaluate(&snapshot(&[("cpu", "value", 95.0)]), &mut history);
        assert_eq!(
            outcome,
            CheckOutcome::Condition {
                active: true,
                detail: "cpu.value: 95.0 > 80".to_string()
            }
        );
    }

    #[test]
    fn test_bad_rule_reports_broken_not_inactive() {
        let mut cache = RuleCache::new();
        let mut check =
            CompositeCheck::from_config(&composite("c", "cpu.value >>> 80"), &mut cache);
        let mut history = HistoryStore::new();

        let outcome = check.evaluate(&snapshot(&[("cpu", "value", 95.0)]), &mut history);
        assert!(matches!(outcome, CheckOutcome::Broken { .. }));
    }

    #[test]
    fn test_disabled_check_skipped() {
        let mut cache = RuleCache::new();
        let config: CompositeCheckConfig = serde_json::from_str(
            r#"{"name": "c", "rule": "cpu.value > 80", "enabled": false}"#,
        )
        .unwrap();
        let mut check = CompositeCheck::from_config(&config, &mut cache);
        let mut history = HistoryStore::new();

        let outcome = check.evaluate(&snapshot(&[("cpu", "value", 95.0)]), &mut history);
        assert_eq!(
            outcome,
            CheckOutcome::Skipped {
                reason: "disabled".to_string()
            }
        );
    }

    #[test]
    fn test_anomaly_check_waits_for_history() {
        let config: AnomalyCheckConfig = serde_json::from_str(
            r#"{"name": "a", "resource": "cpu", "metric": "value"}"#,
        )
        .unwrap();
        let mut check = AnomalyCheck::from_config(&config);
        let mut history = HistoryStore::new();
        let snap = snapshot(&[("cpu", "value", 70.0)]);

        for _ in 0..4 {
            assert!(matches!(
                check.evaluate(&snap, &mut history),
                CheckOutcome::Skipped { .. }
            ));
        }
    }

    #[test]
    fn test_anomaly_check_flags_outlier() {
        let config: AnomalyCheckConfig = serde_json::from_str(
            r#"{"name": "a", "resource": "cpu", "metric": "value", "min_data_points": 5}"#,
        )
        .unwrap();
        let mut check = AnomalyCheck::from_config(&config);
        let mut history = HistoryStore::new();
        let key = MetricKey::new("cpu", "value");
        for (i, v) in [70.0, 72.0, 71.0, 69.0, 70.0, 73.0].iter().enumerate() {
            history.record(&key, i as i64, *v, 10);
        }

        let outcome = check.evaluate(&snapshot(&[("cpu", "value", 95.0)]), &mut history);
        match outcome {
            CheckOutcome::Condition { active, detail } => {
                assert!(active);
                assert!(detail.contains("z-score"));
            }
            other => panic!("expected condition, got {other:?}"),
        }
    }

    #[test]
    fn test_anomaly_check_missing_metric_skipped() {
        let config: AnomalyCheckConfig = serde_json::from_str(
            r#"{"name": "a", "resource": "disk", "metric": "used"}"#,
        )
        .unwrap();
        let mut check = AnomalyCheck::from_config(&config);
        let mut history = HistoryStore::new();

        let outcome = check.evaluate(&snapshot(&[("cpu", "value", 70.0)]), &mut history);
        assert!(matches!(outcome, CheckOutcome::Skipped { .. }));
        // Nothing was recorded for the absent series
        assert_eq!(history.tracked_series(), 0);
    }

    #[test]
    fn test_registry_rejects_duplicate_ids() {
        let mut cache = RuleCache::new();
        let mut registry = CheckRegistry::new();
        registry.register(Box::new(CompositeCheck::from_config(
            &composite("same", "cpu.value > 80"),
            &mut cache,
        )));
        registry.register(Box::new(CompositeCheck::from_config(
            &composite("same", "cpu.value > 90"),
            &mut cache,
        )));

        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_duplicate_series_checks_register_with_warning() {
        let config: ChecksConfig = serde_json::from_str(
            r#"{
                "anomaly_checks": [
                    {"name": "cpu-sensitive", "resource": "cpu", "metric": "value",
                     "sensitivity": 2.0},
                    {"name": "cpu-loose", "resource": "cpu", "metric": "value",
                     "sensitivity": 5.0}
                ]
            }"#,
        )
        .unwrap();
        let mut cache = RuleCache::new();

        // Distinct ids over the same series are legal (and logged), the
        // registry keeps both
        let registry = CheckRegistry::from_config(&config, &mut cache);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_registry_from_config() {
        let config: ChecksConfig = serde_json::from_str(
            r#"{
                "composite_checks": [{"name": "c", "rule": "cpu.value > 80"}],
                "anomaly_checks": [{"name": "a", "resource": "cpu", "metric": "value"}]
            }"#,
        )
        .unwrap();
        let mut cache = RuleCache::new();
        let registry = CheckRegistry::from_config(&config, &mut cache);

        assert_eq!(registry.len(), 2);
        assert_eq!(cache.len(), 1);
    }
}
