//! Point values carried between the downstream adapters and the upstream server

use serde::{Deserialize, Serialize};
use std::fmt;

/// Value of a single data point
///
/// Modbus registers surface as `Int`; text is used for the semantic breaker
/// values (`"true"`/`"false"`) handed to `operate`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PointValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl PointValue {
    /// Integer view of the value, if it has an exact one
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            PointValue::Int(v) => Some(*v),
            PointValue::Bool(b) => Some(i64::from(*b)),
            PointValue::Float(f) if f.fract() == 0.0 && f.is_finite() => Some(*f as i64),
            PointValue::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

impl fmt::Display for PointValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PointValue::Bool(b) => write!(f, "{}", b),
            PointValue::Int(v) => write!(f, "{}", v),
            PointValue::Float(v) => write!(f, "{}", v),
            PointValue::Text(s) => f.write_str(s),
        }
    }
}

impl From<u16> for PointValue {
    fn from(v: u16) -> Self {
        PointValue::Int(i64::from(v))
    }
}

impl From<i64> for PointValue {
    fn from(v: i64) -> Self {
        PointValue::Int(v)
    }
}

impl From<bool> for PointValue {
    fn from(v: bool) -> Self {
        PointValue::Bool(v)
    }
}

impl From<f64> for PointValue {
    fn from(v: f64) -> Self {
        PointValue::Float(v)
    }
}

impl From<&str> for PointValue {
    fn from(v: &str) -> Self {
        PointValue::Text(v.to_string())
    }
}
