//! Alert decision core for the node monitoring agent.
//!
//! The library evaluates configured checks against periodic metric
//! snapshots and decides which alert events to emit:
//!
//! - [`rules`]: the composite rule language (`cpu.value > 80 AND
//!   memory.value > 90`), compiled once and evaluated per cycle
//! - [`anomaly`]: statistical Z-score and spike detection over per-series
//!   history windows
//! - [`alerting`]: the check registry and the Normal/Triggered/Cooldown
//!   alert state machine
//! - [`engine`]: the evaluation cycle loop tying snapshots, checks, and
//!   notification sinks together
//!
//! The binary crate wires this up with configuration, the HTTP status API,
//! and process lifecycle.

pub mod alerting;
pub mod anomaly;
pub mod config;
pub mod engine;
pub mod health;
pub mod models;
pub mod observability;
pub mod rules;

pub use alerting::{AlertEvent, AlertKind, AlertStatus, CheckOutcome, CheckRegistry};
pub use engine::{EvaluationEngine, NotificationSink, SnapshotProvider};
pub use models::{MetricKey, MetricSnapshot};
