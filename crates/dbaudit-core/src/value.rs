//! Property values
//!
//! Entities expose their properties as [`Value`]s so the tracker can snapshot and compare
//! them without knowing the concrete entity type. Equality is value equality.

use chrono::{DateTime, FixedOffset};
use std::fmt;
use uuid::Uuid;

/// The shape a persisted type key decodes to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Bool,
    Int32,
    Int64,
    Float,
    Text,
    Uuid,
    Timestamp,
    Json,
}

impl ValueKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValueKind::Bool => "bool",
            ValueKind::Int32 => "i32",
            ValueKind::Int64 => "i64",
            ValueKind::Float => "f64",
            ValueKind::Text => "string",
            ValueKind::Uuid => "uuid",
            ValueKind::Timestamp => "datetime",
            ValueKind::Json => "json",
        }
    }

    /// Whether `value` can be stored in a property of this kind. Null fits every kind.
    pub fn accepts(&self, value: &Value) -> bool {
        match (self, value) {
            (_, Value::Null) => true,
            (ValueKind::Bool, Value::Bool(_)) => true,
            (ValueKind::Int32, Value::Int(n)) => i32::try_from(*n).is_ok(),
            (ValueKind::Int64, Value::Int(_)) => true,
            (ValueKind::Float, Value::Float(_)) => true,
            (ValueKind::Text, Value::Text(_)) => true,
            (ValueKind::Uuid, Value::Uuid(_)) => true,
            (ValueKind::Timestamp, Value::Timestamp(_)) => true,
            (ValueKind::Json, _) => true,
            _ => false,
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A property value
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Uuid(Uuid),
    Timestamp(DateTime<FixedOffset>),
    Json(serde_json::Value),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Equality used when diffing snapshots. Floats compare by bit pattern, so an
    /// unchanged NaN is the same value while `0.0` and `-0.0` differ.
    pub fn same_as(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Float(a), Value::Float(b)) => a.to_bits() == b.to_bits(),
            _ => self == other,
        }
    }

    /// Short name of the variant, used in error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "integer",
            Value::Float(_) => "float",
            Value::Text(_) => "string",
            Value::Uuid(_) => "uuid",
            Value::Timestamp(_) => "datetime",
            Value::Json(_) => "json",
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(x) => Some(*x),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_uuid(&self) -> Option<Uuid> {
        match self {
            Value::Uuid(id) => Some(*id),
            _ => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<DateTime<FixedOffset>> {
        match self {
            Value::Timestamp(ts) => Some(*ts),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(n) => write!(f, "{}", n),
            Value::Float(x) => write!(f, "{}", x),
            Value::Text(s) => write!(f, "{:?}", s),
            Value::Uuid(id) => write!(f, "{}", id),
            Value::Timestamp(ts) => write!(f, "{}", ts.to_rfc3339()),
            Value::Json(json) => write!(f, "{}", json),
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Int(i64::from(value))
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<Uuid> for Value {
    fn from(value: Uuid) -> Self {
        Value::Uuid(value)
    }
}

impl From<DateTime<FixedOffset>> for Value {
    fn from(value: DateTime<FixedOffset>) -> Self {
        Value::Timestamp(value)
    }
}

impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        Value::Json(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Null, Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_equality_is_by_value() {
        let a = Value::Text(String::from("abc"));
        let b = Value::from("abc");
        assert_eq!(a, b);
        assert_ne!(Value::Int(1), Value::Float(1.0));
    }

    #[test]
    fn test_same_as_treats_nan_as_unchanged() {
        let nan = Value::Float(f64::NAN);
        assert_ne!(nan, nan.clone());
        assert!(nan.same_as(&nan.clone()));
        assert!(Value::Float(f64::INFINITY).same_as(&Value::Float(f64::INFINITY)));
        assert!(!nan.same_as(&Value::Float(1.0)));
        assert!(!Value::Float(0.0).same_as(&Value::Float(-0.0)));
        assert!(Value::from("a").same_as(&Value::from("a")));
    }

    #[test]
    fn test_option_conversion() {
        assert_eq!(Value::from(None::<String>), Value::Null);
        assert_eq!(Value::from(Some(7)), Value::Int(7));
    }

    #[test]
    fn test_kind_accepts() {
        assert!(ValueKind::Int32.accepts(&Value::Int(12)));
        assert!(!ValueKind::Int32.accepts(&Value::Int(i64::MAX)));
        assert!(ValueKind::Text.accepts(&Value::Null));
        assert!(!ValueKind::Text.accepts(&Value::Bool(true)));
        assert!(ValueKind::Json.accepts(&Value::Int(3)));
    }
}
