//! Bounded per-series value history with optional persistence
//!
//! Each `(resource, metric)` pair owns a fixed-capacity ring of recent
//! `(timestamp, value)` samples. The store can persist all series to a
//! single JSON file; every series is capped at its window size, so the
//! file stays small and a full rewrite per flush is acceptable.

use std::collections::{HashMap, VecDeque};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::models::MetricKey;

/// Default ring capacity when a check does not configure one
pub const DEFAULT_WINDOW: usize = 10;

/// Smallest usable window; anything lower is clamped up
pub const MIN_WINDOW: usize = 3;

/// Fixed-capacity ring of recent samples for one metric series.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeriesHistory {
    capacity: usize,
    samples: VecDeque<(i64, f64)>,
}

impl SeriesHistory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(MIN_WINDOW);
        Self {
            capacity,
            samples: VecDeque::with_capacity(capacity),
        }
    }

    /// Append a sample, evicting the oldest entry when at capacity.
    pub fn push(&mut self, timestamp: i64, value: f64) {
        while self.samples.len() >= self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back((timestamp, value));
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Stored values, oldest first.
    pub fn values(&self) -> impl Iterator<Item = f64> + '_ {
        self.samples.iter().map(|(_, v)| *v)
    }

    /// Mean of the most recent `n` samples, or `None` when empty.
    pub fn recent_mean(&self, n: usize) -> Option<f64> {
        if self.samples.is_empty() || n == 0 {
            return None;
        }
        let take = n.min(self.samples.len());
        let sum: f64 = self
            .samples
            .iter()
            .rev()
            .take(take)
            .map(|(_, v)| v)
            .sum();
        Some(sum / take as f64)
    }

    pub fn samples(&self) -> impl Iterator<Item = (i64, f64)> + '_ {
        self.samples.iter().copied()
    }
}

/// On-disk form of one series.
#[derive(Debug, Serialize, Deserialize)]
struct PersistedSeries {
    resource: String,
    metric: String,
    capacity: usize,
    samples: Vec<(i64, f64)>,
}

/// Store of all tracked series, created lazily per metric key.
///
/// Owned by the evaluation engine and passed by reference into checks; the
/// cycle is single-threaded so no internal locking is needed.
#[derive(Debug, Default)]
pub struct HistoryStore {
    series: HashMap<MetricKey, SeriesHistory>,
    persistence_path: Option<PathBuf>,
    dirty: bool,
}

impl HistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store backed by a JSON file, loading any prior series.
    /// A missing or corrupt file logs a warning and starts fresh.
    pub fn with_persistence(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let mut store = Self {
            persistence_path: Some(path.clone()),
            ..Self::default()
        };

        if path.exists() {
            match store.load_from_disk(&path) {
                Ok(loaded) => info!(series = loaded, path = %path.display(), "Loaded persisted history"),
                Err(e) => warn!(error = %e, path = %path.display(), "Failed to load persisted history, starting fresh"),
            }
        }
        store
    }

    fn load_from_disk(&mut self, path: &Path) -> Result<usize> {
        let raw = fs::read(path).context("reading history file")?;
        let persisted: Vec<PersistedSeries> =
            serde_json::from_slice(&raw).context("decoding history file")?;

        let count = persisted.len();
        for entry in persisted {
            let mut history = SeriesHistory::new(entry.capacity);
            for (ts, value) in entry.samples {
                history.push(ts, value);
            }
            self.series
                .insert(MetricKey::new(entry.resource, entry.metric), history);
        }
        Ok(count)
    }

    /// Get the series for a key, if it has been observed before.
    pub fn series(&self, key: &MetricKey) -> Option<&SeriesHistory> {
        self.series.get(key)
    }

    /// Append a sample, creating the series with `window` capacity on first
    /// observation.
    pub fn record(&mut self, key: &MetricKey, timestamp: i64, value: f64, window: usize) {
        let history = self
            .series
            .entry(key.clone())
            .or_insert_with(|| SeriesHistory::new(window));
        history.push(timestamp, value);
        self.dirty = true;
    }

    /// Drop all samples for one series.
    pub fn reset(&mut self, key: &MetricKey) {
        if self.series.remove(key).is_some() {
            self.dirty = true;
        }
    }

    pub fn tracked_series(&self) -> usize {
        self.series.len()
    }

    /// Rewrite the persistence file if anything changed since the last
    /// flush. No-op for stores without persistence.
    pub fn flush(&mut self) -> Result<()> {
        let Some(path) = self.persistence_path.clone() else {
            return Ok(());
        };
        if !self.dirty {
            return Ok(());
        }

        let persisted: Vec<PersistedSeries> = self
            .series
            .iter()
            .map(|(key, history)| PersistedSeries {
                resource: key.resource.clone(),
                metric: key.metric.clone(),
                capacity: history.capacity(),
                samples: history.samples().collect(),
            })
            .collect();

        let json = serde_json::to_vec(&persisted).context("encoding history")?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).context("creating history directory")?;
        }

        // Write to a temp file and rename so an interrupted flush can never
        // leave a truncated file behind
        let temp_path = path.with_extension("tmp");
        let mut file = fs::File::create(&temp_path)
            .with_context(|| format!("creating temp history file {}", temp_path.display()))?;
        file.write_all(&json).context("writing history data")?;
        file.sync_all().context("syncing history file")?;
        fs::rename(&temp_path, &path)
            .with_context(|| format!("replacing history file {}", path.display()))?;

        self.dirty = false;
        debug!(series = persisted.len(), path = %path.display(), "Flushed history to disk");
        Ok(())
    }
}
