//! Text codec for Change values

use crate::error::{AuditError, Result};
use crate::types::TypeDescriptor;
use crate::value::{Value, ValueKind};
use chrono::DateTime;
use std::fmt;
use uuid::Uuid;

/// Converts values to and from their persisted text form
pub trait ValueCodec: Send + Sync + fmt::Debug {
    fn serialize(&self, value: &Value) -> Result<String>;

    /// Decode `text` as a value of the given type
    fn deserialize(&self, text: &str, ty: &TypeDescriptor) -> Result<Value>;
}

/// JSON text codec.
///
/// Timestamps are written as RFC 3339 strings and UUIDs as hyphenated strings.
/// Floats JSON has no number for are written as the strings `"NaN"`, `"Infinity"`
/// and `"-Infinity"`. `null` decodes to [`Value::Null`] whatever the type.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl JsonCodec {
    pub fn new() -> Self {
        Self
    }
}

fn mismatch(ty: &TypeDescriptor, json: &serde_json::Value) -> AuditError {
    AuditError::Codec(format!("expected {} for type `{}`, got {}", ty.kind, ty.key, json))
}

fn non_finite_tag(x: f64) -> Option<&'static str> {
    if x.is_nan() {
        Some("NaN")
    } else if x == f64::INFINITY {
        Some("Infinity")
    } else if x == f64::NEG_INFINITY {
        Some("-Infinity")
    } else {
        None
    }
}

fn parse_non_finite(tag: &str) -> Option<f64> {
    match tag {
        "NaN" => Some(f64::NAN),
        "Infinity" => Some(f64::INFINITY),
        "-Infinity" => Some(f64::NEG_INFINITY),
        _ => None,
    }
}

impl ValueCodec for JsonCodec {
    fn serialize(&self, value: &Value) -> Result<String> {
        let text = match value {
            Value::Null => "null".to_string(),
            Value::Bool(b) => serde_json::to_string(b)?,
            Value::Int(n) => serde_json::to_string(n)?,
            Value::Float(x) => match non_finite_tag(*x) {
                Some(tag) => serde_json::to_string(tag)?,
                None => serde_json::to_string(x)?,
            },
            Value::Text(s) => serde_json::to_string(s)?,
            Value::Uuid(id) => serde_json::to_string(&id.hyphenated().to_string())?,
            Value::Timestamp(ts) => serde_json::to_string(&ts.to_rfc3339())?,
            Value::Json(json) => serde_json::to_string(json)?,
        };
        Ok(text)
    }

    fn deserialize(&self, text: &str, ty: &TypeDescriptor) -> Result<Value> {
        let json: serde_json::Value = serde_json::from_str(text)?;
        if json.is_null() {
            return Ok(Value::Null);
        }

        let value = match ty.kind {
            ValueKind::Bool => json.as_bool().map(Value::Bool),
            ValueKind::Int32 => json
                .as_i64()
                .filter(|n| i32::try_from(*n).is_ok())
                .map(Value::Int),
            ValueKind::Int64 => json.as_i64().map(Value::Int),
            ValueKind::Float => json
                .as_f64()
                .or_else(|| json.as_str().and_then(parse_non_finite))
                .map(Value::Float),
            ValueKind::Text => json.as_str().map(|s| Value::Text(s.to_string())),
            ValueKind::Uuid => json
                .as_str()
                .and_then(|s| Uuid::parse_str(s).ok())
                .map(Value::Uuid),
            ValueKind::Timestamp => json
                .as_str()
                .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                .map(Value::Timestamp),
            ValueKind::Json => return Ok(Value::Json(json)),
        };

        value.ok_or_else(|| mismatch(ty, &json))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TypeRegistry;
    use chrono::{FixedOffset, TimeZone};
    use proptest::prelude::*;

    fn round_trip(value: Value, key: &str) -> Value {
        let registry = TypeRegistry::new();
        let codec = JsonCodec::new();
        let text = codec.serialize(&value).unwrap();
        codec.deserialize(&text, registry.resolve(key).unwrap()).unwrap()
    }

    #[test]
    fn test_multiline_multibyte_text() {
        let value = Value::from("Line one\nLine two: ünïcødé ✓ 日本語");
        assert_eq!(round_trip(value.clone(), "string"), value);
    }

    #[test]
    fn test_timestamp_keeps_offset() {
        let offset = FixedOffset::east_opt(2 * 3600).unwrap();
        let ts = offset.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap();
        assert_eq!(round_trip(Value::Timestamp(ts), "datetime"), Value::Timestamp(ts));
    }

    #[test]
    fn test_null_decodes_for_any_type() {
        let registry = TypeRegistry::new();
        let codec = JsonCodec::new();
        for key in ["bool", "i32", "uuid", "json"] {
            let value = codec
                .deserialize("null", registry.resolve(key).unwrap())
                .unwrap();
            assert_eq!(value, Value::Null);
        }
    }

    #[test]
    fn test_non_finite_floats_round_trip() {
        let codec = JsonCodec::new();
        assert_eq!(codec.serialize(&Value::Float(f64::NAN)).unwrap(), "\"NaN\"");
        assert_eq!(
            codec.serialize(&Value::Float(f64::NEG_INFINITY)).unwrap(),
            "\"-Infinity\""
        );

        let nan = round_trip(Value::Float(f64::NAN), "f64");
        assert!(nan.as_f64().unwrap().is_nan());
        for x in [f64::INFINITY, f64::NEG_INFINITY] {
            assert_eq!(round_trip(Value::Float(x), "f64"), Value::Float(x));
        }
    }

    #[test]
    fn test_float_rejects_other_strings() {
        let registry = TypeRegistry::new();
        let err = JsonCodec::new()
            .deserialize("\"nan\"", registry.resolve("f64").unwrap())
            .unwrap_err();
        assert!(matches!(err, AuditError::Codec(_)));
    }

    #[test]
    fn test_type_mismatch() {
        let registry = TypeRegistry::new();
        let codec = JsonCodec::new();
        let err = codec
            .deserialize("\"abc\"", registry.resolve("i64").unwrap())
            .unwrap_err();
        assert!(matches!(err, AuditError::Codec(_)));

        let err = codec
            .deserialize("4294967296", registry.resolve("i32").unwrap())
            .unwrap_err();
        assert!(matches!(err, AuditError::Codec(_)));
    }

    #[test]
    fn test_uuid_round_trip() {
        let id = Uuid::new_v4();
        assert_eq!(round_trip(Value::Uuid(id), "uuid"), Value::Uuid(id));
    }

    proptest! {
        #[test]
        fn prop_text_round_trips(s in any::<String>()) {
            let value = Value::Text(s);
            prop_assert_eq!(round_trip(value.clone(), "string"), value);
        }

        #[test]
        fn prop_i64_round_trips(n in any::<i64>()) {
            prop_assert_eq!(round_trip(Value::Int(n), "i64"), Value::Int(n));
        }

        #[test]
        fn prop_finite_float_round_trips(n in -1_000_000i32..1_000_000) {
            let x = f64::from(n) / 4.0;
            prop_assert_eq!(round_trip(Value::Float(x), "f64"), Value::Float(x));
        }
    }
}
