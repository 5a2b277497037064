//! Alert decision coordinator
//!
//! Applies the Normal → Triggered → Cooldown state machine to per-cycle
//! check verdicts, guaranteeing at most one trigger emission per cooldown
//! window and a single, well-defined recovery signal.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::debug;

use super::state::{AlertStatus, CheckState, StateStore};
use crate::models::{MetricKey, MetricSnapshot};

/// Alert emission policy shared by all check kinds.
#[derive(Debug, Clone, PartialEq)]
pub struct AlertPolicy {
    pub severity: u8,
    pub cooldown_secs: u64,
    pub notify_on_trigger: bool,
    pub notify_on_recovery: bool,
    /// Message template; `{resource.metric}` placeholders are resolved
    /// against the snapshot at emission time. Empty means "use the check's
    /// own detail string".
    pub message: String,
}

impl Default for AlertPolicy {
    fn default() -> Self {
        Self {
            severity: 1,
            cooldown_secs: 300,
            notify_on_trigger: true,
            notify_on_recovery: false,
            message: String::new(),
        }
    }
}

/// Kind of alert emission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertKind {
    Triggered,
    Recovered,
}

/// Event handed to the notification sink.
#[derive(Debug, Clone, Serialize)]
pub struct AlertEvent {
    pub check_id: String,
    pub severity: u8,
    pub kind: AlertKind,
    pub message: String,
    pub timestamp: i64,
    /// Snapshot values the message referenced, keyed by `resource.metric`
    pub values: BTreeMap<String, f64>,
}

/// Owns all per-check alert state and decides what to emit each cycle.
#[derive(Debug, Default)]
pub struct AlertCoordinator {
    states: StateStore,
}

impl AlertCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance the state machine for one check and return the emission to
    /// make, if any. Notify flags are applied here: a transition still
    /// happens when its flag is off, it just emits nothing.
    ///
    /// The cooldown boundary is inclusive: at `now == cooldown_until` the
    /// check is eligible to recover or re-trigger.
    pub fn decide(
        &mut self,
        check_id: &str,
        condition_active: bool,
        policy: &AlertPolicy,
        now: i64,
    ) -> Option<AlertKind> {
        let mut state = self.states.get(check_id);

        let emission = match state.status {
            AlertStatus::Normal => {
                if condition_active {
                    state.status = AlertStatus::Triggered;
                    state.cooldown_until = now + policy.cooldown_secs as i64;
                    policy.notify_on_trigger.then_some(AlertKind::Triggered)
                } else {
                    None
                }
            }
            AlertStatus::Triggered | AlertStatus::Cooldown => {
                if now < state.cooldown_until {
                    // Suppress everything while cooling down, even if the
                    // condition keeps flapping
                    state.status = AlertStatus::Cooldown;
                    if condition_active {
                        debug!(
                            check_id = %check_id,
                            cooldown_until = state.cooldown_until,
                            "alert suppressed by cooldown"
                        );
                    }
                    None
                } else if condition_active {
                    // Cooldown expired with the condition still true: a new
                    // episode starts with a fresh cooldown window
                    state.status = AlertStatus::Triggered;
                    state.cooldown_until = now + policy.cooldown_secs as i64;
                    policy.notify_on_trigger.then_some(AlertKind::Triggered)
                } else {
                    state.status = AlertStatus::Normal;
                    state.cooldown_until = 0;
                    policy.notify_on_recovery.then_some(AlertKind::Recovered)
                }
            }
        };

        self.states.set(check_id, state);
        emission
    }

    pub fn status(&self, check_id: &str) -> AlertStatus {
        self.states.status(check_id)
    }

    pub fn reset(&mut self, check_id: &str) {
        self.states.reset(check_id);
    }

    /// Build the event for an emission decided by [`decide`].
    ///
    /// `fallback` is used when the policy has no message template (usually
    /// the check's explanation string).
    pub fn build_event(
        &self,
        check_id: &str,
        kind: AlertKind,
        policy: &AlertPolicy,
        snapshot: &MetricSnapshot,
        fallback: &str,
        now: i64,
    ) -> AlertEvent {
        let (message, values) = if policy.message.is_empty() {
            (fallback.to_string(), BTreeMap::new())
        } else {
            render_template(&policy.message, snapshot)
        };

        let message = match kind {
            AlertKind::Triggered => message,
            AlertKind::Recovered => format!("recovered: {message}"),
        };

        AlertEvent {
            check_id: check_id.to_string(),
            severity: policy.severity,
            kind,
            message,
            timestamp: now,
            values,
        }
    }
}

/// Resolve `{resource.metric}` placeholders against the snapshot.
///
/// Unknown paths render as `n/a`; malformed placeholders are left verbatim.
/// Returns the rendered message and the values that were substituted.
pub fn render_template(
    template: &str,
    snapshot: &MetricSnapshot,
) -> (String, BTreeMap<String, f64>) {
    let mut rendered = String::with_capacity(template.len());
    let mut values = BTreeMap::new();
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        rendered.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        match after.find('}') {
            Some(close) => {
                let inner = &after[..close];
                match inner.split_once('.') {
                    Some((resource, metric)) if !resource.is_empty() && !metric.is_empty() => {
                        let key = MetricKey::new(resource, metric);
                        match snapshot.value(&key) {
                            Some(value) => {
                                rendered.push_str(&value.to_string());
                                values.insert(key.to_string(), value);
                            }
                            None => rendered.push_str("n/a"),
                        }
                    }
                    _ => {
                        rendered.push('{');
                        rendered.push_str(inner);
                        rendered.push('}');
                    }
                }
                rest = &after[close + 1..];
            }
            None => {
                rendered.push('{');
                rest = after;
            }
        }
    }
    rendered.push_str(rest);

    (rendered, values)
}
