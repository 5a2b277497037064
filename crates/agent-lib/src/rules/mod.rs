//! Composite rule engine
//!
//! This module provides:
//! - A tokenizer and recursive-descent parser for rule strings
//! - A compiled expression tree evaluated against metric snapshots
//! - A compile cache keyed by the exact rule source

mod ast;
mod cache;
mod eval;
pub(crate) mod parser;

pub use ast::{CompareOp, LogicalOp, RuleExpr, EQ_EPSILON};
pub use cache::RuleCache;
pub use eval::{evaluate, Evaluation};
pub use parser::{compile, RuleError};
