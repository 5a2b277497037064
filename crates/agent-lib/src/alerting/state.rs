//! Per-check alert state

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Alert state machine status for one check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertStatus {
    /// Condition false, no active episode
    Normal,
    /// Condition became true and an episode started
    Triggered,
    /// Episode active but emissions suppressed until the cooldown expires
    Cooldown,
}

impl fmt::Display for AlertStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlertStatus::Normal => write!(f, "normal"),
            AlertStatus::Triggered => write!(f, "triggered"),
            AlertStatus::Cooldown => write!(f, "cooldown"),
        }
    }
}

/// Persistent per-check state, mutated only by the coordinator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CheckState {
    pub status: AlertStatus,
    /// Unix timestamp until which trigger emissions are suppressed.
    /// Monotonically non-decreasing within one alert episode.
    pub cooldown_until: i64,
}

impl Default for CheckState {
    fn default() -> Self {
        Self {
            status: AlertStatus::Normal,
            cooldown_until: 0,
        }
    }
}

/// State store keyed by check id; entries are created lazily on first
/// decision and live for the process lifetime.
#[derive(Debug, Default)]
pub struct StateStore {
    states: HashMap<String, CheckState>,
}

impl StateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, check_id: &str) -> CheckState {
        self.states.get(check_id).copied().unwrap_or_default()
    }

    pub fn set(&mut self, check_id: &str, state: CheckState) {
        self.states.insert(check_id.to_string(), state);
    }

    pub fn status(&self, check_id: &str) -> AlertStatus {
        self.get(check_id).status
    }

    pub fn reset(&mut self, check_id: &str) {
        self.states.remove(check_id);
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}
