//! Alert decision making
//!
//! This module provides:
//! - The per-check alert state machine (Normal/Triggered/Cooldown) with
//!   cooldown-based emission suppression
//! - The `Check` trait with composite and anomaly implementations
//! - Alert event construction with message templating

mod checks;
mod coordinator;
mod state;

pub use checks::{AnomalyCheck, Check, CheckKind, CheckOutcome, CheckRegistry, CompositeCheck};
pub use coordinator::{render_template, AlertCoordinator, AlertEvent, AlertKind, AlertPolicy};
pub use state::{AlertStatus, CheckState, StateStore};
