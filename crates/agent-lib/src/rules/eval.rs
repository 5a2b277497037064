//! Rule evaluation against a metric snapshot

use tracing::debug;

use super::ast::{LogicalOp, RuleExpr};
use crate::models::MetricSnapshot;

/// Result of evaluating a compiled rule against one snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub matched: bool,
    /// One human-readable line per comparison actually evaluated, in
    /// evaluation order, e.g. `"cpu.value: 95.0 > 80"`.
    pub explanations: Vec<String>,
}

/// Evaluate a rule tree with a post-order walk.
///
/// Missing metrics are non-fatal: the comparison evaluates to `false`, a
/// debug event is logged, and evaluation of the rest of the tree continues.
/// Logical nodes short-circuit, so explanations are only collected for the
/// children that were actually visited.
pub fn evaluate(expr: &RuleExpr, snapshot: &MetricSnapshot) -> Evaluation {
    let mut explanations = Vec::new();
    let matched = eval_node(expr, snapshot, &mut explanations);
    Evaluation {
        matched,
        explanations,
    }
}

fn eval_node(expr: &RuleExpr, snapshot: &MetricSnapshot, out: &mut Vec<String>) -> bool {
    match expr {
        RuleExpr::Comparison { path, op, value } => match snapshot.value(path) {
            Some(actual) => {
                let hit = op.apply(actual, *value);
                out.push(format!("{}: {:.1} {} {}", path, actual, op, value));
                hit
            }
            None => {
                debug!(
                    resource = %path.resource,
                    metric = %path.metric,
                    "metric missing from snapshot, comparison treated as false"
                );
                out.push(format!("{}: metric missing", path));
                false
            }
        },
        RuleExpr::Logical { op, left, right } => {
            let left_value = eval_node(left, snapshot, out);
            match op {
                // Short-circuit: right child is not evaluated (and leaves no
                // explanation) when the left child already decides the result
                LogicalOp::And if !left_value => false,
                LogicalOp::Or if left_value => true,
                _ => eval_node(right, snapshot, out),
            }
        }
    }
}
