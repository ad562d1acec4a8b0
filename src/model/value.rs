//! Universal value type covering the serializable graph domain.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Arena index of a value node.
///
/// Identity in the graph is index equality: two properties holding the same
/// `ValueId` alias one underlying node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ValueId(pub u32);

impl fmt::Display for ValueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A value in the graph.
///
/// Covers the whole serializable domain:
/// - Scalars: Undefined, Null, Bool, Int, Float, BigInt, String
/// - References: Func (callable reference, serialized by name), Date
/// - Containers: Array, Object
///
/// Containers hold `ValueId` children rather than owned values, so shared
/// references and true cycles are representable without owning-pointer
/// loops. Scalars are copied by value wherever resolution demands a copy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum Value {
    /// Missing value. Routed through the encoder's null-handler policy.
    Undefined,
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    BigInt(i128),
    String(String),
    /// Reference to a callable. Only the name survives serialization.
    Func { name: Option<String> },
    Date(DateTime<Utc>),
    Array(Vec<ValueId>),
    /// Insertion-ordered fields. Order is load-bearing: the wire format is
    /// key-order sensitive.
    Object(Vec<(String, ValueId)>),
}

// ============================================================================
// Type checking
// ============================================================================

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Undefined => "UNDEFINED",
            Value::Null => "NULL",
            Value::Bool(_) => "BOOLEAN",
            Value::Int(_) => "INTEGER",
            Value::Float(_) => "FLOAT",
            Value::BigInt(_) => "BIG_INTEGER",
            Value::String(_) => "STRING",
            Value::Func { .. } => "FUNCTION",
            Value::Date(_) => "DATE",
            Value::Array(_) => "ARRAY",
            Value::Object(_) => "OBJECT",
        }
    }

    pub fn is_undefined(&self) -> bool { matches!(self, Value::Undefined) }
    pub fn is_null(&self) -> bool { matches!(self, Value::Null) }
    pub fn is_bool(&self) -> bool { matches!(self, Value::Bool(_)) }
    pub fn is_numeric(&self) -> bool { matches!(self, Value::Int(_) | Value::Float(_) | Value::BigInt(_)) }
    pub fn is_string(&self) -> bool { matches!(self, Value::String(_)) }
    pub fn is_function(&self) -> bool { matches!(self, Value::Func { .. }) }
    pub fn is_date(&self) -> bool { matches!(self, Value::Date(_)) }
    pub fn is_array(&self) -> bool { matches!(self, Value::Array(_)) }
    pub fn is_object(&self) -> bool { matches!(self, Value::Object(_)) }

    /// Containers participate in aliasing/cycle tracking; scalars never do.
    pub fn is_container(&self) -> bool {
        matches!(self, Value::Array(_) | Value::Object(_))
    }

    /// Attempt to extract as i64
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Float(f) if f.fract() == 0.0 => Some(*f as i64),
            _ => None,
        }
    }

    /// Attempt to extract as f64
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// Attempt to extract as &str
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }
}

// ============================================================================
// Conversions (From impls)
// ============================================================================

impl From<bool> for Value { fn from(v: bool) -> Self { Value::Bool(v) } }
impl From<i32> for Value { fn from(v: i32) -> Self { Value::Int(v as i64) } }
impl From<i64> for Value { fn from(v: i64) -> Self { Value::Int(v) } }
impl From<i128> for Value { fn from(v: i128) -> Self { Value::BigInt(v) } }
impl From<f64> for Value { fn from(v: f64) -> Self { Value::Float(v) } }
impl From<String> for Value { fn from(v: String) -> Self { Value::String(v) } }
impl From<&str> for Value { fn from(v: &str) -> Self { Value::String(v.to_owned()) } }
impl From<DateTime<Utc>> for Value { fn from(v: DateTime<Utc>) -> Self { Value::Date(v) } }
impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self { v.map(Into::into).unwrap_or(Value::Null) }
}

// ============================================================================
// Display
// ============================================================================

impl fmt::Display for Value {
    /// Shallow rendering. Containers hold arena indices, so children are
    /// summarized by count; `ValueGraph::preview` renders one level deep.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => write!(f, "undefined"),
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::BigInt(v) => write!(f, "{v}"),
            Value::String(s) => write!(f, "\"{}\"", s.replace('"', "\\\"")),
            Value::Func { name } => {
                write!(f, "function {}()", name.as_deref().unwrap_or("anonymous"))
            }
            Value::Date(dt) => write!(f, "{dt}"),
            Value::Array(items) => write!(f, "[{} values]", items.len()),
            Value::Object(fields) => write!(f, "{{{} fields}}", fields.len()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_from() {
        assert_eq!(Value::from("hello"), Value::String("hello".into()));
        assert_eq!(Value::from(42), Value::Int(42));
        assert_eq!(Value::from(3.14), Value::Float(3.14));
        assert_eq!(Value::from(true), Value::Bool(true));
        assert_eq!(Value::from(10_i128.pow(20)), Value::BigInt(100_000_000_000_000_000_000));
    }

    #[test]
    fn test_predicates() {
        assert!(Value::Null.is_null());
        assert!(Value::Int(1).is_numeric());
        assert!(Value::BigInt(1).is_numeric());
        assert!(Value::Array(vec![]).is_container());
        assert!(Value::Object(vec![]).is_container());
        assert!(!Value::String("x".into()).is_container());
        assert!(Value::Func { name: None }.is_function());
    }

    #[test]
    fn test_display_shallow() {
        assert_eq!(Value::Array(vec![ValueId(0), ValueId(1)]).to_string(), "[2 values]");
        assert_eq!(Value::Func { name: None }.to_string(), "function anonymous()");
    }
}
