//! Attribute reporting contract.
//!
//! Commands and services push `(name, value)` pairs upstream through an
//! [`AttributeReporter`].  The sink is best-effort: implementations log and
//! drop delivery failures instead of returning them, so reporting can never
//! fail a command.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A reported attribute value.  Serialises as a plain JSON scalar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeValue::Bool(v) => write!(f, "{v}"),
            AttributeValue::Int(v) => write!(f, "{v}"),
            AttributeValue::Float(v) => write!(f, "{v}"),
            AttributeValue::Text(v) => f.write_str(v),
        }
    }
}

impl From<bool> for AttributeValue {
    fn from(v: bool) -> Self {
        AttributeValue::Bool(v)
    }
}

impl From<i64> for AttributeValue {
    fn from(v: i64) -> Self {
        AttributeValue::Int(v)
    }
}

impl From<f64> for AttributeValue {
    fn from(v: f64) -> Self {
        AttributeValue::Float(v)
    }
}

impl From<String> for AttributeValue {
    fn from(v: String) -> Self {
        AttributeValue::Text(v)
    }
}

impl From<&str> for AttributeValue {
    fn from(v: &str) -> Self {
        AttributeValue::Text(v.to_string())
    }
}

/// Upstream sink for attribute updates.
pub trait AttributeReporter: Send + Sync {
    /// Reports a single attribute.
    fn update(&self, name: &str, value: AttributeValue);

    /// Reports several attributes, in the order given.
    fn update_attributes(&self, attributes: &[(&str, AttributeValue)]) {
        for (name, value) in attributes {
            self.update(name, value.clone());
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
