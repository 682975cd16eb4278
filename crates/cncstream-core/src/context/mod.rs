//! Immutable variable context for line substitution
//!
//! A [`Context`] is captured per line at the moment the line is dequeued and
//! passed explicitly into substitution. It is never mutated in place;
//! assignments produce new values that the owner folds into its globals.

mod expression;

pub use expression::evaluate;

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::OnceLock;

use crate::error::GcodeError;

static BRACKET_REGEX: OnceLock<Regex> = OnceLock::new();

fn bracket_regex() -> &'static Regex {
    BRACKET_REGEX.get_or_init(|| Regex::new(r"\[([^\[\]]*)\]").expect("invalid bracket regex"))
}

/// A context value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Number(f64),
    Bool(bool),
    Text(String),
}

impl Value {
    pub(crate) fn as_number(&self) -> Result<f64, String> {
        match self {
            Value::Number(n) => Ok(*n),
            Value::Bool(b) => Ok(if *b { 1.0 } else { 0.0 }),
            Value::Text(s) => s
                .trim()
                .parse::<f64>()
                .map_err(|_| format!("'{}' is not a number", s)),
        }
    }

    pub(crate) fn truthy(&self) -> bool {
        match self {
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::Bool(b) => *b,
            Value::Text(s) => !s.is_empty(),
        }
    }

    pub(crate) fn loosely_equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Text(a), Value::Text(b)) => a == b,
            (a, b) => match (a.as_number(), b.as_number()) {
                (Ok(x), Ok(y)) => x == y,
                _ => false,
            },
        }
    }

    /// Numeric view of this value, if it has one
    pub fn number(&self) -> Option<f64> {
        self.as_number().ok()
    }

    fn from_json(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::Number(n) => n.as_f64().map(Value::Number),
            serde_json::Value::Bool(b) => Some(Value::Bool(*b)),
            serde_json::Value::String(s) => Some(Value::Text(s.clone())),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Number(n) if *n == 0.0 => write!(f, "0"),
            Value::Number(n) => write!(f, "{}", n),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

/// Named values available to expressions
///
/// Keys may contain dots (`modal.units`, `global.depth`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Context(BTreeMap<String, Value>);

impl Context {
    /// Create an empty context
    pub fn new() -> Self {
        Self::default()
    }

    /// Return a copy with one more value
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    /// Return a copy where entries of `other` replace entries of `self`
    pub fn merged(&self, other: &Context) -> Context {
        let mut values = self.0.clone();
        values.extend(other.0.iter().map(|(k, v)| (k.clone(), v.clone())));
        Context(values)
    }

    /// Build a context from a JSON object; nested objects become dotted keys
    pub fn from_json(value: &serde_json::Value) -> Self {
        fn walk(prefix: &str, value: &serde_json::Value, out: &mut BTreeMap<String, Value>) {
            match value {
                serde_json::Value::Object(map) => {
                    for (key, child) in map {
                        let path = if prefix.is_empty() {
                            key.clone()
                        } else {
                            format!("{}.{}", prefix, key)
                        };
                        walk(&path, child, out);
                    }
                }
                other if !prefix.is_empty() => {
                    if let Some(v) = Value::from_json(other) {
                        out.insert(prefix.to_string(), v);
                    }
                }
                _ => {}
            }
        }

        let mut values = BTreeMap::new();
        walk("", value, &mut values);
        Context(values)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Evaluate a single expression
    pub fn evaluate(&self, expression: &str) -> Result<Value, GcodeError> {
        evaluate(expression, self)
    }

    /// Replace every `[expr]` in `line` with its value
    pub fn translate(&self, line: &str) -> Result<String, GcodeError> {
        let regex = bracket_regex();
        let mut out = String::with_capacity(line.len());
        let mut last = 0;
        for caps in regex.captures_iter(line) {
            let (Some(whole), Some(expr)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            out.push_str(&line[last..whole.start()]);
            out.push_str(&self.evaluate(expr.as_str())?.to_string());
            last = whole.end();
        }
        out.push_str(&line[last..]);
        Ok(out)
    }

    /// Evaluate `name = expr[, name = expr]*` left to right
    ///
    /// Later expressions see earlier results. Names are returned without a
    /// `global.` prefix.
    pub fn assign(&self, text: &str) -> Result<Vec<(String, Value)>, GcodeError> {
        let mut scope = self.clone();
        let mut results = Vec::new();
        for part in split_top_level(text) {
            let (name, expr) = split_assignment(part).ok_or_else(|| {
                GcodeError::InvalidExpression {
                    expression: part.trim().to_string(),
                    reason: "expected 'name = expression'".to_string(),
                }
            })?;
            let value = scope.evaluate(expr)?;
            let name = name.strip_prefix("global.").unwrap_or(name).to_string();
            scope = scope
                .with(name.clone(), value.clone())
                .with(format!("global.{}", name), value.clone());
            results.push((name, value));
        }
        Ok(results)
    }
}

fn split_top_level(text: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut quote: Option<char> = None;
    let mut start = 0;
    for (i, c) in text.char_indices() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"' | '\'') => quote = Some(c),
            (None, '(') => depth += 1,
            (None, ')') => depth -= 1,
            (None, ',') if depth == 0 => {
                parts.push(&text[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&text[start..]);
    parts.into_iter().filter(|p| !p.trim().is_empty()).collect()
}

fn split_assignment(text: &str) -> Option<(&str, &str)> {
    let bytes = text.as_bytes();
    let pos = (0..bytes.len()).find(|&i| {
        bytes[i] == b'='
            && bytes.get(i + 1) != Some(&b'=')
            && !matches!(i.checked_sub(1).map(|p| bytes[p]), Some(b'=' | b'!' | b'<' | b'>'))
    })?;
    let name = text[..pos].trim();
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
        && name.chars().next().is_some_and(|c| !c.is_ascii_digit());
    valid.then(|| (name, text[pos + 1..].trim()))
}
