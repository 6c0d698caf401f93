//! Drill-down into nested data by key, index or attribute.

use std::collections::VecDeque;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::NavigationError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PathKind {
    Key,
    Index,
    Attr,
}

impl fmt::Display for PathKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathKind::Key => write!(f, "key"),
            PathKind::Index => write!(f, "index"),
            PathKind::Attr => write!(f, "attr"),
        }
    }
}

/// One `(kind, key)` pair of a navigation path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathSegment {
    pub kind: PathKind,
    pub key: String,
}

impl PathSegment {
    pub fn key(key: impl Into<String>) -> Self {
        Self { kind: PathKind::Key, key: key.into() }
    }

    pub fn index(key: impl ToString) -> Self {
        Self { kind: PathKind::Index, key: key.to_string() }
    }

    pub fn attr(key: impl Into<String>) -> Self {
        Self { kind: PathKind::Attr, key: key.into() }
    }

    /// Accepts `{kind, key}` objects and `[kind, key]` pairs. Numeric keys are
    /// stringified so `["index", 0]` and `["index", "0"]` are equivalent.
    pub fn from_value(value: &Value) -> Option<Self> {
        let (kind, key) = match value {
            Value::Object(map) => (map.get("kind")?, map.get("key")?),
            Value::Array(pair) if pair.len() == 2 => (&pair[0], &pair[1]),
            _ => return None,
        };
        let kind = serde_json::from_value::<PathKind>(kind.clone()).ok()?;
        let key = match key {
            Value::String(s) => s.clone(),
            Value::Number(n) => n.to_string(),
            _ => return None,
        };
        Some(Self { kind, key })
    }
}

/// Walks `root` along `path`, consuming segments front to back.
///
/// Fails on the first segment whose accessor yields nothing (or null), even
/// when further segments remain. An empty path returns `root` unchanged.
pub fn resolve(root: &Value, path: impl Into<VecDeque<PathSegment>>) -> Result<Value, NavigationError> {
    let mut path = path.into();
    let mut current = root.clone();
    let mut position = 0;

    while let Some(segment) = path.pop_front() {
        let next = match segment.kind {
            PathKind::Key => current.as_object().and_then(|m| m.get(&segment.key)).cloned(),
            PathKind::Index => index(&current, &segment.key).cloned(),
            PathKind::Attr => attr(&current, &segment.key),
        };

        current = match next {
            Some(v) if !v.is_null() => v,
            _ => return Err(failure(&segment, position)),
        };
        position += 1;
    }

    Ok(current)
}

fn failure(segment: &PathSegment, position: usize) -> NavigationError {
    NavigationError {
        kind: segment.kind,
        key: segment.key.clone(),
        position,
    }
}

fn index<'a>(value: &'a Value, key: &str) -> Option<&'a Value> {
    let items = value.as_array()?;
    let idx: i64 = key.trim().parse().ok()?;
    let idx = if idx < 0 { items.len() as i64 + idx } else { idx };
    usize::try_from(idx).ok().and_then(|i| items.get(i))
}

/// Property lookup: object fields first, then the `attributes` map of an
/// element record, then the length of arrays, strings and objects.
fn attr(value: &Value, name: &str) -> Option<Value> {
    if let Some(map) = value.as_object() {
        if let Some(v) = map.get(name) {
            return Some(v.clone());
        }
        if let Some(v) = map.get("attributes").and_then(|a| a.get(name)) {
            return Some(v.clone());
        }
    }
    match (name, value) {
        ("len" | "length", Value::Array(items)) => Some(Value::from(items.len())),
        ("len" | "length", Value::String(s)) => Some(Value::from(s.chars().count())),
        ("len" | "length", Value::Object(map)) => Some(Value::from(map.len())),
        _ => None,
    }
}
