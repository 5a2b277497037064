//! Statistical anomaly detection over bounded per-series history
//!
//! This module provides:
//! - A per-(resource, metric) history store with FIFO eviction and
//!   JSON persistence
//! - Z-score and short-horizon spike analysis of new observations

mod detector;
mod history;

pub use detector::{AnomalyDetector, AnomalyOutcome, AnomalyParams, AnomalyVerdict};
pub use history::{HistoryStore, SeriesHistory, DEFAULT_WINDOW, MIN_WINDOW};
