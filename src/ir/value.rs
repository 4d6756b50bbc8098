// src/ir/value.rs

use std::fmt;

use serde::{Deserialize, Serialize};

/// Declared type of a parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PrimitiveType {
    Int,
    Double,
    String,
}

impl fmt::Display for PrimitiveType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PrimitiveType::Int => f.write_str("INT"),
            PrimitiveType::Double => f.write_str("DOUBLE"),
            PrimitiveType::String => f.write_str("STRING"),
        }
    }
}

/// A concrete scalar value.
///
/// Serialized in the tagged form used by the IR, e.g. `{"int_value": 3}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    #[serde(rename = "int_value")]
    Int(i64),
    #[serde(rename = "double_value")]
    Double(f64),
    #[serde(rename = "string_value")]
    String(String),
}

impl Value {
    pub fn primitive_type(&self) -> PrimitiveType {
        match self {
            Value::Int(_) => PrimitiveType::Int,
            Value::Double(_) => PrimitiveType::Double,
            Value::String(_) => PrimitiveType::String,
        }
    }

    /// Convert this value to the declared type, if compatible.
    ///
    /// Only widening INT -> DOUBLE is allowed; everything else must match
    /// exactly.
    pub fn coerce_to(&self, ty: PrimitiveType) -> Option<Value> {
        match (self, ty) {
            (Value::Int(v), PrimitiveType::Int) => Some(Value::Int(*v)),
            (Value::Int(v), PrimitiveType::Double) => Some(Value::Double(*v as f64)),
            (Value::Double(v), PrimitiveType::Double) => Some(Value::Double(*v)),
            (Value::String(s), PrimitiveType::String) => Some(Value::String(s.clone())),
            _ => None,
        }
    }

    /// Parse the textual content of an output-parameter file.
    ///
    /// INT and DOUBLE ignore surrounding whitespace (executors commonly end
    /// files with a newline); STRING keeps the content verbatim.
    pub fn parse_as(text: &str, ty: PrimitiveType) -> Result<Value, String> {
        match ty {
            PrimitiveType::Int => text
                .trim()
                .parse::<i64>()
                .map(Value::Int)
                .map_err(|e| format!("expected INT, got {:?}: {e}", text.trim())),
            PrimitiveType::Double => text
                .trim()
                .parse::<f64>()
                .map(Value::Double)
                .map_err(|e| format!("expected DOUBLE, got {:?}: {e}", text.trim())),
            PrimitiveType::String => Ok(Value::String(text.to_string())),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }
}

/// Renders the bare scalar, as substituted into command lines.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(v) => write!(f, "{v}"),
            Value::Double(v) => write!(f, "{v}"),
            Value::String(s) => f.write_str(s),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}
