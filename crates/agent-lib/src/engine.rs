//! Evaluation cycle engine
//!
//! Runs one synchronous pass over all registered checks per cycle: evaluate
//! against the current snapshot, feed verdicts through the alert
//! coordinator, and hand emissions to the notification sink. Per-check
//! failures are contained: one broken rule or one missing metric never
//! stops the rest of the cycle.
//!
//! Cycles are driven by a tokio interval; a cycle always runs to completion
//! before the next tick is honored, which provides the single-flight
//! guarantee the state stores rely on.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::{broadcast, RwLock};
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::alerting::{
    AlertCoordinator, AlertEvent, AlertKind, AlertStatus, CheckKind, CheckOutcome, CheckRegistry,
};
use crate::anomaly::HistoryStore;
use crate::models::{AgentReport, MetricSnapshot};
use crate::observability::{AgentMetrics, StructuredLogger};

/// Supplies the metric snapshot for one evaluation pass.
#[async_trait]
pub trait SnapshotProvider: Send + Sync {
    async fn snapshot(&self) -> Result<MetricSnapshot>;
}

/// Receives alert events; transport and formatting live behind this seam.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(&self, event: &AlertEvent) -> Result<()>;
}

/// Snapshot provider reading the collector's report file.
pub struct FileSnapshotProvider {
    path: PathBuf,
}

impl FileSnapshotProvider {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl SnapshotProvider for FileSnapshotProvider {
    async fn snapshot(&self) -> Result<MetricSnapshot> {
        let raw = tokio::fs::read(&self.path)
            .await
            .with_context(|| format!("reading report file {}", self.path.display()))?;
        let report: AgentReport =
            serde_json::from_slice(&raw).context("parsing collector report")?;
        Ok(MetricSnapshot::from_report(
            &report,
            chrono::Utc::now().timestamp(),
        ))
    }
}

/// Sink that logs emissions as structured events. Useful on its own and as
/// the default wiring when no delivery transport is configured.
#[derive(Default)]
pub struct TracingSink;

#[async_trait]
impl NotificationSink for TracingSink {
    async fn notify(&self, event: &AlertEvent) -> Result<()> {
        info!(
            event = "alert_emitted",
            check_id = %event.check_id,
            kind = ?event.kind,
            severity = event.severity,
            message = %event.message,
            "Alert event"
        );
        Ok(())
    }
}

/// Condensed per-check outcome for status reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeKind {
    Active,
    Inactive,
    Skipped,
    Broken,
}

/// One row of the `/checks` status listing, refreshed after every cycle.
#[derive(Debug, Clone, Serialize)]
pub struct CheckStatusSummary {
    pub id: String,
    pub kind: CheckKind,
    pub outcome: OutcomeKind,
    pub detail: String,
    pub alert_status: AlertStatus,
}

/// Shared handle to the latest status summaries.
pub type CheckStatusHandle = Arc<RwLock<Vec<CheckStatusSummary>>>;

/// Counters for one completed cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleStats {
    pub evaluated: usize,
    pub triggered: usize,
    pub recovered: usize,
    pub suppressed: usize,
    pub skipped: usize,
    pub broken: usize,
}

/// Engine timing configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Base evaluation interval
    pub cycle_interval: Duration,
    /// How often the history store is flushed to disk
    pub flush_interval: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cycle_interval: Duration::from_secs(30),
            flush_interval: Duration::from_secs(60),
        }
    }
}

/// Owns the registry, history, and alert state; runs evaluation cycles.
pub struct EvaluationEngine {
    registry: CheckRegistry,
    coordinator: AlertCoordinator,
    history: HistoryStore,
    provider: Arc<dyn SnapshotProvider>,
    sink: Arc<dyn NotificationSink>,
    metrics: AgentMetrics,
    logger: StructuredLogger,
    status: CheckStatusHandle,
    config: EngineConfig,
}

impl EvaluationEngine {
    pub fn new(
        registry: CheckRegistry,
        history: HistoryStore,
        provider: Arc<dyn SnapshotProvider>,
        sink: Arc<dyn NotificationSink>,
        logger: StructuredLogger,
        config: EngineConfig,
    ) -> Self {
        let metrics = AgentMetrics::new();
        metrics.set_checks_configured(registry.len() as i64);
        Self {
            registry,
            coordinator: AlertCoordinator::new(),
            history,
            provider,
            sink,
            metrics,
            logger,
            status: Arc::new(RwLock::new(Vec::new())),
            config,
        }
    }

    /// Handle for the API layer to read the latest check statuses.
    pub fn status_handle(&self) -> CheckStatusHandle {
        self.status.clone()
    }

    /// Run one evaluation pass over all checks.
    ///
    /// Fails only when no snapshot could be acquired; everything per-check
    /// is contained and reflected in the stats instead.
    pub async fn run_cycle(&mut self) -> Result<CycleStats> {
        let snapshot = self
            .provider
            .snapshot()
            .await
            .context("acquiring metric snapshot")?;
        let now = snapshot.taken_at();

        let mut stats = CycleStats::default();
        let mut summaries = Vec::with_capacity(self.registry.len());

        for check in self.registry.iter_mut() {
            self.metrics.inc_checks_evaluated();
            stats.evaluated += 1;

            let outcome = check.evaluate(&snapshot, &mut self.history);
            let (outcome_kind, detail) = match &outcome {
                CheckOutcome::Condition { active: true, detail } => {
                    (OutcomeKind::Active, detail.clone())
                }
                CheckOutcome::Condition { active: false, detail } => {
                    (OutcomeKind::Inactive, detail.clone())
                }
                CheckOutcome::Skipped { reason } => (OutcomeKind::Skipped, reason.clone()),
                CheckOutcome::Broken { reason } => (OutcomeKind::Broken, reason.clone()),
            };

            match outcome {
                CheckOutcome::Condition { active, detail } => {
                    if active && check.kind() == CheckKind::Anomaly {
                        self.metrics.inc_anomalies_detected();
                        self.logger.log_anomaly(check.id(), &detail);
                    }

                    let emission =
                        self.coordinator
                            .decide(check.id(), active, check.policy(), now);

                    if active
                        && emission.is_none()
                        && self.coordinator.status(check.id()) == AlertStatus::Cooldown
                    {
                        self.metrics.inc_alerts_suppressed();
                        stats.suppressed += 1;
                    }

                    if let Some(kind) = emission {
                        let mut event = self.coordinator.build_event(
                            check.id(),
                            kind,
                            check.policy(),
                            &snapshot,
                            &detail,
                            now,
                        );
                        // Without a template the event still carries the
                        // values of every metric the check reads
                        if event.values.is_empty() {
                            for key in check.paths() {
                                if let Some(value) = snapshot.value(&key) {
                                    event.values.insert(key.to_string(), value);
                                }
                            }
                        }
                        match kind {
                            AlertKind::Triggered => {
                                self.logger.log_alert_triggered(
                                    check.id(),
                                    event.severity,
                                    &event.message,
                                );
                                self.metrics.inc_alerts_emitted("triggered");
                                stats.triggered += 1;
                            }
                            AlertKind::Recovered => {
                                self.logger.log_alert_recovered(check.id(), &event.message);
                                self.metrics.inc_alerts_emitted("recovered");
                                stats.recovered += 1;
                            }
                        }
                        // Delivery failure is contained to this emission
                        if let Err(e) = self.sink.notify(&event).await {
                            warn!(check_id = %check.id(), error = %e, "Notification sink failed");
                        }
                    }
                }
                CheckOutcome::Skipped { reason } => {
                    debug!(check_id = %check.id(), reason = %reason, "Check skipped");
                    stats.skipped += 1;
                }
                CheckOutcome::Broken { reason } => {
                    self.logger.log_check_broken(check.id(), &reason);
                    stats.broken += 1;
                }
            }

            summaries.push(CheckStatusSummary {
                id: check.id().to_string(),
                kind: check.kind(),
                outcome: outcome_kind,
                detail,
                alert_status: self.coordinator.status(check.id()),
            });
        }

        self.metrics.set_checks_broken(stats.broken as i64);
        self.metrics
            .set_history_series(self.history.tracked_series() as i64);
        *self.status.write().await = summaries;

        Ok(stats)
    }

    /// Run the cycle loop until a shutdown signal arrives, then flush.
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) {
        info!(
            interval_secs = self.config.cycle_interval.as_secs(),
            checks = self.registry.len(),
            "Starting evaluation cycle loop"
        );

        let mut ticker = interval(self.config.cycle_interval);
        // A long cycle delays the next tick instead of stacking ticks
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut last_flush = Instant::now();
        let mut cycle_count = 0u64;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let start = Instant::now();
                    match self.run_cycle().await {
                        Ok(stats) => {
                            cycle_count += 1;
                            debug!(
                                evaluated = stats.evaluated,
                                triggered = stats.triggered,
                                recovered = stats.recovered,
                                skipped = stats.skipped,
                                broken = stats.broken,
                                elapsed_ms = start.elapsed().as_millis() as u64,
                                cycle = cycle_count,
                                "Evaluation cycle complete"
                            );
                        }
                        Err(e) => {
                            warn!(error = %e, "Cycle skipped, no snapshot available");
                        }
                    }
                    self.metrics.observe_cycle_latency(start.elapsed().as_secs_f64());

                    if last_flush.elapsed() >= self.config.flush_interval {
                        if let Err(e) = self.history.flush() {
                            warn!(error = %e, "History flush failed");
                        }
                        last_flush = Instant::now();
                    }
                }
                _ = shutdown.recv() => {
                    info!("Shutting down evaluation cycle loop");
                    break;
                }
            }
        }

        if let Err(e) = self.history.flush() {
            warn!(error = %e, "Final history flush failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerting::CheckRegistry;
    use crate::config::ChecksConfig;
    use crate::models::MetricKey;
    use crate::rules::RuleCache;
    use std::sync::Mutex;

    /// Provider returning a settable in-memory snapshot.
    struct StaticProvider {
        snapshot: Mutex<MetricSnapshot>,
    }

    impl StaticProvider {
        fn new(snapshot: MetricSnapshot) -> Self {
            Self {
                snapshot: Mutex::new(snapshot),
            }
        }
    }

    #[async_trait]
    impl SnapshotProvider for StaticProvider {
        async fn snapshot(&self) -> Result<MetricSnapshot> {
            Ok(self.snapshot.lock().unwrap().clone())
        }
    }

    /// Provider that always fails, for cycle-skip behavior.
    struct FailingProvider;

    #[async_trait]
    impl SnapshotProvider for FailingProvider {
        async fn snapshot(&self) -> Result<MetricSnapshot> {
            anyhow::bail!("collector stalled")
        }
    }

    /// Sink recording every event it receives.
    #[derive(Default)]
    struct RecordingSink {
        events: Mutex<Vec<AlertEvent>>,
    }

    #[async_trait]
    impl NotificationSink for RecordingSink {
        async fn notify(&self, event: &AlertEvent) -> Result<()> {
            self.events.lock().unwrap().push(event.clone());
            Ok(())
        }
    }

    fn snapshot_at(now: i64, values: &[(&str, &str, f64)]) -> MetricSnapshot {
        let mut snapshot = MetricSnapshot::new(now);
        for (resource, metric, value) in values {
            snapshot.insert(MetricKey::new(*resource, *metric), *value);
        }
        snapshot
    }

    fn engine_with(
        checks_json: &str,
        provider: Arc<dyn SnapshotProvider>,
        sink: Arc<dyn NotificationSink>,
    ) -> EvaluationEngine {
        let config: ChecksConfig = serde_json::from_str(checks_json).unwrap();
        let mut cache = RuleCache::new();
        let registry = CheckRegistry::from_config(&config, &mut cache);
        EvaluationEngine::new(
            registry,
            HistoryStore::new(),
            provider,
            sink,
            StructuredLogger::new("test-node"),
            EngineConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_trigger_and_cooldown_across_cycles() {
        let provider = Arc::new(StaticProvider::new(snapshot_at(
            1000,
            &[("cpu", "value", 95.0)],
        )));
        let sink = Arc::new(RecordingSink::default());
        let mut engine = engine_with(
            r#"{"composite_checks": [
                {"name": "cpu-high", "rule": "cpu.value > 80", "cooldown_secs": 60}
            ]}"#,
            provider.clone(),
            sink.clone(),
        );

        let stats = engine.run_cycle().await.unwrap();
        assert_eq!(stats.triggered, 1);

        // Condition stays true within the cooldown window: suppressed
        *provider.snapshot.lock().unwrap() = snapshot_at(1030, &[("cpu", "value", 96.0)]);
        let stats = engine.run_cycle().await.unwrap();
        assert_eq!(stats.triggered, 0);
        assert_eq!(stats.suppressed, 1);

        assert_eq!(sink.events.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_recovery_event_after_cooldown() {
        let provider = Arc::new(StaticProvider::new(snapshot_at(
            1000,
            &[("cpu", "value", 95.0)],
        )));
        let sink = Arc::new(RecordingSink::default());
        let mut engine = engine_with(
            r#"{"composite_checks": [
                {"name": "cpu-high", "rule": "cpu.value > 80",
                 "cooldown_secs": 60, "notify_on_recovery": true}
            ]}"#,
            provider.clone(),
            sink.clone(),
        );

        engine.run_cycle().await.unwrap();

        *provider.snapshot.lock().unwrap() = snapshot_at(1070, &[("cpu", "value", 40.0)]);
        let stats = engine.run_cycle().await.unwrap();
        assert_eq!(stats.recovered, 1);

        let events = sink.events.lock().unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].kind, AlertKind::Recovered);
    }

    #[tokio::test]
    async fn test_broken_check_contained() {
        let provider = Arc::new(StaticProvider::new(snapshot_at(
            1000,
            &[("cpu", "value", 95.0)],
        )));
        let sink = Arc::new(RecordingSink::default());
        let mut engine = engine_with(
            r#"{"composite_checks": [
                {"name": "bad", "rule": "cpu.value >>> 80"},
                {"name": "good", "rule": "cpu.value > 80"}
            ]}"#,
            provider,
            sink.clone(),
        );

        let stats = engine.run_cycle().await.unwrap();
        assert_eq!(stats.broken, 1);
        // The healthy check still triggered
        assert_eq!(stats.triggered, 1);
        assert_eq!(sink.events.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_status_summary_distinguishes_broken_from_inactive() {
        let provider = Arc::new(StaticProvider::new(snapshot_at(
            1000,
            &[("cpu", "value", 10.0)],
        )));
        let mut engine = engine_with(
            r#"{"composite_checks": [
                {"name": "bad", "rule": "cpu.value >>> 80"},
                {"name": "quiet", "rule": "cpu.value > 80"}
            ]}"#,
            provider,
            Arc::new(RecordingSink::default()),
        );
        let status = engine.status_handle();

        engine.run_cycle().await.unwrap();

        let summaries = status.read().await;
        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].outcome, OutcomeKind::Broken);
        assert_eq!(summaries[1].outcome, OutcomeKind::Inactive);
    }

    #[tokio::test]
    async fn test_failed_snapshot_skips_cycle() {
        let mut engine = engine_with(
            r#"{"composite_checks": [{"name": "c", "rule": "cpu.value > 80"}]}"#,
            Arc::new(FailingProvider),
            Arc::new(RecordingSink::default()),
        );

        assert!(engine.run_cycle().await.is_err());
    }

    #[tokio::test]
    async fn test_anomaly_check_end_to_end() {
        let provider = Arc::new(StaticProvider::new(snapshot_at(
            0,
            &[("cpu", "value", 70.0)],
        )));
        let sink = Arc::new(RecordingSink::default());
        let mut engine = engine_with(
            r#"{"anomaly_checks": [
                {"name": "cpu-anomaly", "resource": "cpu", "metric": "value",
                 "sensitivity": 3.0, "min_data_points": 5, "cooldown_secs": 10}
            ]}"#,
            provider.clone(),
            sink.clone(),
        );

        // Build up steady history; all these cycles skip or stay inactive
        for (i, v) in [70.0, 72.0, 71.0, 69.0, 70.0, 73.0, 71.0].iter().enumerate() {
            *provider.snapshot.lock().unwrap() = snapshot_at(i as i64, &[("cpu", "value", *v)]);
            let stats = engine.run_cycle().await.unwrap();
            assert_eq!(stats.triggered, 0);
        }

        // An outlier triggers the anomaly alert
        *provider.snapshot.lock().unwrap() = snapshot_at(100, &[("cpu", "value", 95.0)]);
        let stats = engine.run_cycle().await.unwrap();
        assert_eq!(stats.triggered, 1);

        let events = sink.events.lock().unwrap();
        assert!(events[0].message.contains("z-score"));
    }

    #[tokio::test]
    async fn test_event_values_populated_from_rule_metrics() {
        let provider = Arc::new(StaticProvider::new(snapshot_at(
            1000,
            &[("cpu", "value", 95.0), ("memory", "value", 90.0)],
        )));
        let sink = Arc::new(RecordingSink::default());
        let mut engine = engine_with(
            r#"{"composite_checks": [
                {"name": "both-high", "rule": "cpu.value > 80 AND memory.value > 85"}
            ]}"#,
            provider,
            sink.clone(),
        );

        engine.run_cycle().await.unwrap();

        // No template configured: the event still carries the metrics the
        // rule reads
        let events = sink.events.lock().unwrap();
        assert_eq!(events[0].values.get("cpu.value"), Some(&95.0));
        assert_eq!(events[0].values.get("memory.value"), Some(&90.0));
    }

    #[tokio::test]
    async fn test_notification_message_template() {
        let provider = Arc::new(StaticProvider::new(snapshot_at(
            1000,
            &[("cpu", "value", 95.5)],
        )));
        let sink = Arc::new(RecordingSink::default());
        let mut engine = engine_with(
            r#"{"composite_checks": [
                {"name": "cpu-high", "rule": "cpu.value > 80",
                 "notification_message": "CPU at {cpu.value}%"}
            ]}"#,
            provider,
            sink.clone(),
        );

        engine.run_cycle().await.unwrap();

        let events = sink.events.lock().unwrap();
        assert_eq!(events[0].message, "CPU at 95.5%");
        assert_eq!(events[0].values.get("cpu.value"), Some(&95.5));
    }
}
