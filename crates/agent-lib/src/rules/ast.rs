//! Compiled rule expression tree

use std::fmt;

use crate::models::MetricKey;

/// Epsilon for floating-point equality in `==` comparisons.
pub const EQ_EPSILON: f64 = 1e-9;

/// Comparison operator in a rule expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Gt,
    Lt,
    Ge,
    Le,
    Eq,
}

impl CompareOp {
    /// Apply the operator to actual vs. threshold values.
    pub fn apply(self, actual: f64, threshold: f64) -> bool {
        match self {
            CompareOp::Gt => actual > threshold,
            CompareOp::Lt => actual < threshold,
            CompareOp::Ge => actual >= threshold,
            CompareOp::Le => actual <= threshold,
            CompareOp::Eq => (actual - threshold).abs() < EQ_EPSILON,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            CompareOp::Gt => ">",
            CompareOp::Lt => "<",
            CompareOp::Ge => ">=",
            CompareOp::Le => "<=",
            CompareOp::Eq => "==",
        }
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Logical connective between rule terms. AND and OR have equal precedence
/// and associate left to right; only parentheses change the grouping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
}

impl fmt::Display for LogicalOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogicalOp::And => f.write_str("AND"),
            LogicalOp::Or => f.write_str("OR"),
        }
    }
}

/// A compiled rule: a binary tree of comparisons joined by logical operators.
///
/// Acyclic by construction (children are owned boxes). Compiled once per
/// distinct source string and shared behind an `Arc` via the rule cache.
#[derive(Debug, Clone, PartialEq)]
pub enum RuleExpr {
    Comparison {
        path: MetricKey,
        op: CompareOp,
        value: f64,
    },
    Logical {
        op: LogicalOp,
        left: Box<RuleExpr>,
        right: Box<RuleExpr>,
    },
}

impl RuleExpr {
    /// All metric paths referenced by this expression, in source order.
    pub fn paths(&self) -> Vec<&MetricKey> {
        let mut out = Vec::new();
        self.collect_paths(&mut out);
        out
    }

    fn collect_paths<'a>(&'a self, out: &mut Vec<&'a MetricKey>) {
        match self {
            RuleExpr::Comparison { path, .. } => out.push(path),
            RuleExpr::Logical { left, right, .. } => {
                left.collect_paths(out);
                right.collect_paths(out);
            }
        }
    }
}

impl fmt::Display for RuleExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleExpr::Comparison { path, op, value } => {
                write!(f, "{} {} {}", path, op, value)
            }
            RuleExpr::Logical { op, left, right } => {
                write!(f, "({} {} {})", left, op, right)
            }
        }
    }
}
