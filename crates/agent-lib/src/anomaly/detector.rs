//! Statistical anomaly detection
//!
//! Two independent signals over the per-series history:
//! - Z-score of the new value against the mean and population standard
//!   deviation of the stored window (long-horizon anomaly)
//! - Absolute deviation from the mean of the most recent few samples
//!   (short-horizon spike that a long window would average away)

use crate::anomaly::history::{HistoryStore, MIN_WINDOW};
use crate::models::MetricKey;

/// Default Z-score threshold
const DEFAULT_SENSITIVITY: f64 = 2.0;

/// Valid sensitivity domain; values outside are clamped
const SENSITIVITY_RANGE: (f64, f64) = (0.1, 10.0);

/// Default main window size
const DEFAULT_WINDOW: usize = 10;

/// Default minimum samples before any verdict is produced
const DEFAULT_MIN_DATA_POINTS: usize = 5;

/// Default short-horizon window for spike detection
const DEFAULT_RECENT_WINDOW: usize = 3;

/// Tuning parameters for one anomaly detector.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnomalyParams {
    /// Z-score threshold (0.1–10.0)
    pub sensitivity: f64,
    /// Main history window size (>= 3)
    pub window: usize,
    /// Absolute delta against the recent mean that counts as a spike
    pub spike_threshold: f64,
    /// Samples required before producing a verdict
    pub min_data_points: usize,
    /// Short-horizon window, always smaller than the main window
    pub recent_window: usize,
}

impl Default for AnomalyParams {
    fn default() -> Self {
        Self {
            sensitivity: DEFAULT_SENSITIVITY,
            window: DEFAULT_WINDOW,
            spike_threshold: f64::INFINITY,
            min_data_points: DEFAULT_MIN_DATA_POINTS,
            recent_window: DEFAULT_RECENT_WINDOW,
        }
    }
}

impl AnomalyParams {
    /// Clamp all fields into their valid domains.
    pub fn normalized(mut self) -> Self {
        self.sensitivity = self.sensitivity.clamp(SENSITIVITY_RANGE.0, SENSITIVITY_RANGE.1);
        self.window = self.window.max(MIN_WINDOW);
        // Need at least two samples for a meaningful deviation
        self.min_data_points = self.min_data_points.max(2);
        self.recent_window = self.recent_window.clamp(1, self.window - 1);
        self
    }
}

/// Verdict for one observed value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnomalyVerdict {
    pub z_score: f64,
    pub is_anomaly: bool,
    pub is_spike: bool,
    pub mean: f64,
    pub std_dev: f64,
}

impl AnomalyVerdict {
    pub fn is_abnormal(&self) -> bool {
        self.is_anomaly || self.is_spike
    }
}

/// Outcome of observing a value: either a verdict or an explicit
/// "not enough data" marker. A short history is never reported as normal
/// or anomalous.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AnomalyOutcome {
    NotEnoughData { have: usize, need: usize },
    Verdict(AnomalyVerdict),
}

/// Z-score and spike analyzer for one metric series.
#[derive(Debug, Clone)]
pub struct AnomalyDetector {
    params: AnomalyParams,
}

impl AnomalyDetector {
    pub fn new(params: AnomalyParams) -> Self {
        Self {
            params: params.normalized(),
        }
    }

    pub fn params(&self) -> &AnomalyParams {
        &self.params
    }

    /// Analyze `value` against the stored history for `key`, then append it
    /// (evicting the oldest sample at capacity). Statistics are computed
    /// over the window as it was *before* this observation.
    pub fn observe(
        &self,
        store: &mut HistoryStore,
        key: &MetricKey,
        timestamp: i64,
        value: f64,
    ) -> AnomalyOutcome {
        let outcome = match store.series(key) {
            Some(history) if history.len() >= self.params.min_data_points => {
                AnomalyOutcome::Verdict(self.analyze(history.values(), history.recent_mean(self.params.recent_window), value))
            }
            history => AnomalyOutcome::NotEnoughData {
                have: history.map(|h| h.len()).unwrap_or(0),
                need: self.params.min_data_points,
            },
        };

        store.record(key, timestamp, value, self.params.window);
        outcome
    }

    fn analyze(
        &self,
        values: impl Iterator<Item = f64>,
        recent_mean: Option<f64>,
        value: f64,
    ) -> AnomalyVerdict {
        let stored: Vec<f64> = values.collect();
        let n = stored.len() as f64;

        let mean = stored.iter().sum::<f64>() / n;
        let variance = stored.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
        let std_dev = variance.sqrt();

        // Zero spread: the Z-score path cannot fire (guards divide-by-zero
        // false positives); spike detection below stays independent
        let (z_score, is_anomaly) = if std_dev < f64::EPSILON {
            (0.0, false)
        } else {
            let z = (value - mean) / std_dev;
            (z, z.abs() > self.params.sensitivity)
        };

        let is_spike = recent_mean
            .map(|rm| (value - rm).abs() > self.params.spike_threshold)
            .unwrap_or(false);

        AnomalyVerdict {
            z_score,
            is_anomaly,
            is_spike,
            mean,
            std_dev,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded_store(key: &MetricKey, values: &[f64], window: usize) -> HistoryStore {
        let mut store = HistoryStore::new();
        for (i, v) in values.iter().enumerate() {
            store.record(key, i as i64, *v, window);
        }
        store
    }

    fn verdict(outcome: AnomalyOutcome) -> AnomalyVerdict {
        match outcome {
            AnomalyOutcome::Verdict(v) => v,
            other => panic!("expected verdict, got {other:?}"),
        }
    }

    #[test]
    fn test_not_enough_data_is_explicit() {
        let key = MetricKey::new("cpu", "value");
        let detector = AnomalyDetector::new(AnomalyParams::default());
        let mut store = seeded_store(&key, &[70.0, 71.0], 10);

        let outcome = detector.observe(&mut store, &key, 2, 95.0);
        assert_eq!(outcome, AnomalyOutcome::NotEnoughData { have: 2, need: 5 });
        // The value is still appended for future cycles
        assert_eq!(store.series(&key).unwrap().len(), 3);
    }

    #[test]
    fn test_outlier_flagged_as_anomaly() {
        let key = MetricKey::new("cpu", "value");
        let history = [70.0, 72.0, 71.0, 69.0, 70.0, 73.0, 71.0, 70.0, 72.0, 71.0];
        let detector = AnomalyDetector::new(AnomalyParams {
            sensitivity: 2.0,
            ..AnomalyParams::default()
        });
        let mut store = seeded_store(&key, &history, 10);

        let v = verdict(detector.observe(&mut store, &key, 10, 95.0));
        assert!(v.is_anomaly);
        assert!(v.z_score > 2.0);
    }

    #[test]
    fn test_normal_value_not_flagged() {
        let key = MetricKey::new("cpu", "value");
        let history = [70.0, 72.0, 71.0, 69.0, 70.0, 73.0, 71.0, 70.0, 72.0, 71.0];
        let detector = AnomalyDetector::new(AnomalyParams::default());
        let mut store = seeded_store(&key, &history, 10);

        let v = verdict(detector.observe(&mut store, &key, 10, 71.5));
        assert!(!v.is_anomaly);
        assert!(!v.is_spike);
    }

    #[test]
    fn test_z_score_of_mean_is_zero() {
        let key = MetricKey::new("cpu", "value");
        let history = [10.0, 20.0, 30.0, 40.0, 50.0];
        let detector = AnomalyDetector::new(AnomalyParams::default());
        let mut store = seeded_store(&key, &history, 10);

        let v = verdict(detector.observe(&mut store, &key, 5, 30.0));
        assert!(v.std_dev > 0.0);
        assert!(v.z_score.abs() < 1e-12);
    }

    #[test]
    fn test_z_score_symmetry() {
        let key = MetricKey::new("cpu", "value");
        let history = [10.0, 20.0, 30.0, 40.0, 50.0];
        let detector = AnomalyDetector::new(AnomalyParams::default());

        let mut store = seeded_store(&key, &history, 10);
        let above = verdict(detector.observe(&mut store, &key, 5, 30.0 + 7.0));

        let mut store = seeded_store(&key, &history, 10);
        let below = verdict(detector.observe(&mut store, &key, 5, 30.0 - 7.0));

        assert!((above.z_score + below.z_score).abs() < 1e-12);
    }

    #[test]
    fn test_zero_stddev_never_divides() {
        let key = MetricKey::new("cpu", "value");
        let detector = AnomalyDetector::new(AnomalyParams {
            spike_threshold: 10.0,
            ..AnomalyParams::default()
        });
        let mut store = seeded_store(&key, &[50.0; 8], 10);

        let v = verdict(detector.observe(&mut store, &key, 8, 95.0));
        // Z-path is disarmed on a flat series...
        assert_eq!(v.z_score, 0.0);
        assert!(!v.is_anomaly);
        // ...but the spike path still catches the jump
        assert!(v.is_spike);
    }

    #[test]
    fn test_spike_detection_catches_fast_transient() {
        let key = MetricKey::new("net", "rx");
        // Long window averages around 50, recent samples are already high
        let history = [50.0, 50.0, 50.0, 50.0, 50.0, 50.0, 50.0, 48.0, 52.0, 50.0];
        let detector = AnomalyDetector::new(AnomalyParams {
            spike_threshold: 20.0,
            recent_window: 3,
            ..AnomalyParams::default()
        });
        let mut store = seeded_store(&key, &history, 10);

        let v = verdict(detector.observe(&mut store, &key, 10, 80.0));
        assert!(v.is_spike);
    }

    #[test]
    fn test_stats_exclude_new_value() {
        let key = MetricKey::new("cpu", "value");
        let history = [10.0, 10.0, 10.0, 10.0, 10.0];
        let detector = AnomalyDetector::new(AnomalyParams::default());
        let mut store = seeded_store(&key, &history, 10);

        // Mean must be 10.0 (stored window only), not skewed by the new 100
        let v = verdict(detector.observe(&mut store, &key, 5, 100.0));
        assert_eq!(v.mean, 10.0);
    }

    #[test]
    fn test_params_clamped() {
        let params = AnomalyParams {
            sensitivity: 50.0,
            window: 1,
            spike_threshold: 5.0,
            min_data_points: 0,
            recent_window: 99,
        }
        .normalized();

        assert_eq!(params.sensitivity, 10.0);
        assert_eq!(params.window, MIN_WINDOW);
        assert_eq!(params.min_data_points, 2);
        assert!(params.recent_window < params.window);
    }

    #[test]
    fn test_window_eviction_bounds_history() {
        let key = MetricKey::new("cpu", "value");
        let detector = AnomalyDetector::new(AnomalyParams::default());
        let mut store = HistoryStore::new();

        for i in 0..100 {
            detector.observe(&mut store, &key, i, 70.0 + (i % 3) as f64);
            assert!(store.series(&key).unwrap().len() <= detector.params().window);
        }
    }
}
