//! Compile cache for rule expressions

use std::collections::HashMap;
use std::sync::Arc;

use super::ast::RuleExpr;
use super::parser::{compile, RuleError};

/// Cache of compiled rules keyed by the exact source string.
///
/// Failed compilations are cached too, so a permanently broken rule is
/// parsed (and logged) once instead of on every cycle.
#[derive(Debug, Default)]
pub struct RuleCache {
    compiled: HashMap<String, Result<Arc<RuleExpr>, RuleError>>,
}

impl RuleCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached tree for `src`, compiling on first sight.
    pub fn get_or_compile(&mut self, src: &str) -> Result<Arc<RuleExpr>, RuleError> {
        if let Some(entry) = self.compiled.get(src) {
            return entry.clone();
        }
        let result = compile(src).map(Arc::new);
        self.compiled.insert(src.to_string(), result.clone());
        result
    }

    pub fn len(&self) -> usize {
        self.compiled.len()
    }

    pub fn is_empty(&self) -> bool {
        self.compiled.is_empty()
    }
}
