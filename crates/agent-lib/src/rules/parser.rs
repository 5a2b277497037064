//! Rule compiler: tokenizer and recursive-descent parser
//!
//! Grammar:
//!   expr       := term (("AND" | "OR") term)*
//!   term       := "(" expr ")" | comparison
//!   comparison := path operator literal
//!   path       := identifier "." identifier
//!   operator   := ">" | "<" | ">=" | "<=" | "=="
//!   literal    := signed decimal number
//!
//! AND and OR bind with equal precedence, left to right. Parentheses (at any
//! nesting depth) are the only way to override grouping, and are treated as
//! separators even without surrounding whitespace.

use thiserror::Error;

use super::ast::{CompareOp, LogicalOp, RuleExpr};
use crate::models::MetricKey;

/// Rule compilation failure with the byte offset of the offending token.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RuleError {
    #[error("syntax error at offset {position}: unexpected `{token}`")]
    Syntax { position: usize, token: String },
    #[error("empty rule expression")]
    Empty,
}

impl RuleError {
    fn at(position: usize, token: impl Into<String>) -> Self {
        RuleError::Syntax {
            position,
            token: token.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Path(MetricKey),
    Number(f64),
    Op(CompareOp),
    And,
    Or,
    LParen,
    RParen,
}

impl Token {
    fn describe(&self) -> String {
        match self {
            Token::Path(key) => key.to_string(),
            Token::Number(n) => n.to_string(),
            Token::Op(op) => op.symbol().to_string(),
            Token::And => "AND".to_string(),
            Token::Or => "OR".to_string(),
            Token::LParen => "(".to_string(),
            Token::RParen => ")".to_string(),
        }
    }
}

fn tokenize(src: &str) -> Result<Vec<(usize, Token)>, RuleError> {
    let bytes = src.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        let c = bytes[i] as char;
        match c {
            ' ' | '\t' | '\r' | '\n' => i += 1,
            '(' => {
                tokens.push((i, Token::LParen));
                i += 1;
            }
            ')' => {
                tokens.push((i, Token::RParen));
                i += 1;
            }
            '>' | '<' | '=' => {
                let two = bytes.get(i + 1) == Some(&b'=');
                let op = match (c, two) {
                    ('>', true) => CompareOp::Ge,
                    ('<', true) => CompareOp::Le,
                    ('=', true) => CompareOp::Eq,
                    ('>', false) => CompareOp::Gt,
                    ('<', false) => CompareOp::Lt,
                    // Lone '=' is not a valid operator
                    ('=', false) => return Err(RuleError::at(i, "=")),
                    _ => unreachable!(),
                };
                tokens.push((i, Token::Op(op)));
                i += if two { 2 } else { 1 };
            }
            '-' | '+' | '0'..='9' => {
                let start = i;
                i += 1;
                while i < bytes.len() && matches!(bytes[i] as char, '0'..='9' | '.') {
                    i += 1;
                }
                let text = &src[start..i];
                let number: f64 = text
                    .parse()
                    .map_err(|_| RuleError::at(start, text))?;
                tokens.push((start, Token::Number(number)));
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let start = i;
                while i < bytes.len()
                    && matches!(bytes[i] as char, 'a'..='z' | 'A'..='Z' | '0'..='9' | '_' | '.')
                {
                    i += 1;
                }
                let word = &src[start..i];
                let token = match word {
                    "AND" => Token::And,
                    "OR" => Token::Or,
                    _ => Token::Path(parse_path(word).ok_or_else(|| RuleError::at(start, word))?),
                };
                tokens.push((start, token));
            }
            _ => return Err(RuleError::at(i, c.to_string())),
        }
    }

    Ok(tokens)
}

/// Parse `identifier "." identifier` into a metric key. Exactly one dot,
/// both segments non-empty and not starting with a digit.
fn parse_path(word: &str) -> Option<MetricKey> {
    let (resource, metric) = word.split_once('.')?;
    if metric.contains('.') {
        return None;
    }
    let valid = |s: &str| {
        !s.is_empty() && !s.starts_with(|c: char| c.is_ascii_digit())
    };
    if valid(resource) && valid(metric) {
        Some(MetricKey::new(resource, metric))
    } else {
        None
    }
}

struct Parser<'a> {
    src_len: usize,
    tokens: &'a [(usize, Token)],
    pos: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&(usize, Token)> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<&(usize, Token)> {
        let token = self.tokens.get(self.pos);
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn unexpected(&self, at: Option<&(usize, Token)>) -> RuleError {
        match at {
            Some((pos, token)) => RuleError::at(*pos, token.describe()),
            None => RuleError::at(self.src_len, "end of input"),
        }
    }

    /// expr := term (("AND" | "OR") term)*  — left-associative, equal precedence
    fn expr(&mut self) -> Result<RuleExpr, RuleError> {
        let mut left = self.term()?;
        loop {
            let op = match self.peek() {
                Some((_, Token::And)) => LogicalOp::And,
                Some((_, Token::Or)) => LogicalOp::Or,
                _ => break,
            };
            self.pos += 1;
            let right = self.term()?;
            left = RuleExpr::Logical {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn term(&mut self) -> Result<RuleExpr, RuleError> {
        if matches!(self.peek(), Some((_, Token::LParen))) {
            self.pos += 1;
            let inner = self.expr()?;
            match self.next() {
                Some((_, Token::RParen)) => Ok(inner),
                other => {
                    let other = other.cloned();
                    Err(self.unexpected(other.as_ref()))
                }
            }
        } else {
            self.comparison()
        }
    }

    fn comparison(&mut self) -> Result<RuleExpr, RuleError> {
        let path = match self.next().cloned() {
            Some((_, Token::Path(key))) => key,
            other => return Err(self.unexpected(other.as_ref())),
        };
        let op = match self.next().cloned() {
            Some((_, Token::Op(op))) => op,
            other => return Err(self.unexpected(other.as_ref())),
        };
        let value = match self.next().cloned() {
            Some((_, Token::Number(n))) => n,
            other => return Err(self.unexpected(other.as_ref())),
        };
        Ok(RuleExpr::Comparison { path, op, value })
    }
}

/// Compile a rule string into an expression tree.
///
/// Pure function of the source string; callers should go through
/// [`super::RuleCache`] to avoid recompiling per cycle.
pub fn compile(src: &str) -> Result<RuleExpr, RuleError> {
    let tokens = tokenize(src)?;
    if tokens.is_empty() {
        return Err(RuleError::Empty);
    }

    let mut parser = Parser {
        src_len: src.len(),
        tokens: &tokens,
        pos: 0,
    };
    let expr = parser.expr()?;

    // Trailing tokens after a complete expression are an error
    if let Some(extra) = parser.peek() {
        let extra = extra.clone();
        return Err(parser.unexpected(Some(&extra)));
    }
    Ok(expr)
}
