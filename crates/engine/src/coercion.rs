//! Field type compatibility and best-effort value coercion.

use railyard_types::FieldType;
use serde_json::{Number, Value};

use crate::field_paths::format_json_value;

/// How a value of one declared type fits a field of another.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compatibility {
    Exact,
    Coercible,
    Incompatible,
}

/// Classifies a source type against a target field type.
pub fn compatibility(source: FieldType, target: FieldType) -> Compatibility {
    use FieldType::*;

    if source == target || source == Any || target == Any {
        return Compatibility::Exact;
    }
    match (source, target) {
        (Integer, Number) | (Number, Integer) => Compatibility::Coercible,
        (String, Number) | (Number, String) | (String, Integer) | (Integer, String) => Compatibility::Coercible,
        (Boolean, String) | (String, Boolean) => Compatibility::Coercible,
        (_, String) => Compatibility::Coercible,
        _ => Compatibility::Incompatible,
    }
}

/// Converts `value` to `target` when a coercion applies; otherwise returns it unchanged.
pub fn coerce(value: Value, target: FieldType) -> Value {
    let Some(source) = FieldType::of_value(&value) else {
        return value;
    };
    if compatibility(source, target) != Compatibility::Coercible {
        return value;
    }
    // Integers are already numbers; keep their exact representation.
    if target == FieldType::Number && value.is_number() {
        return value;
    }

    let converted = match target {
        FieldType::String => Some(Value::String(format_json_value(&value))),
        FieldType::Number => to_number(&value).and_then(Number::from_f64).map(Value::Number),
        FieldType::Integer => to_integer(&value),
        FieldType::Boolean => to_boolean(&value).map(Value::Bool),
        _ => None,
    };
    converted.unwrap_or(value)
}

fn to_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse::<f64>().ok().filter(|parsed| parsed.is_finite()),
        _ => None,
    }
}

fn to_integer(value: &Value) -> Option<Value> {
    match value {
        Value::Number(number) => {
            let float = number.as_f64()?;
            (float.fract() == 0.0 && float.abs() < i64::MAX as f64).then(|| Value::from(float as i64))
        }
        Value::String(text) => {
            let trimmed = text.trim();
            if let Ok(integer) = trimmed.parse::<i64>() {
                return Some(Value::from(integer));
            }
            let float = trimmed.parse::<f64>().ok()?;
            (float.is_finite() && float.fract() == 0.0).then(|| Value::from(float as i64))
        }
        _ => None,
    }
}

fn to_boolean(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(flag) => Some(*flag),
        Value::String(text) => match text.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" | "1" | "on" => Some(true),
            "false" | "no" | "0" | "off" | "" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn classifies_type_pairs() {
        assert_eq!(compatibility(FieldType::Number, FieldType::Number), Compatibility::Exact);
        assert_eq!(compatibility(FieldType::Object, FieldType::Any), Compatibility::Exact);
        assert_eq!(compatibility(FieldType::Integer, FieldType::Number), Compatibility::Coercible);
        assert_eq!(compatibility(FieldType::String, FieldType::Number), Compatibility::Coercible);
        assert_eq!(compatibility(FieldType::Boolean, FieldType::String), Compatibility::Coercible);
        assert_eq!(compatibility(FieldType::Array, FieldType::String), Compatibility::Coercible);
        assert_eq!(compatibility(FieldType::Array, FieldType::Number), Compatibility::Incompatible);
        assert_eq!(compatibility(FieldType::Object, FieldType::Boolean), Compatibility::Incompatible);
    }

    #[test]
    fn coerces_where_possible() {
        assert_eq!(coerce(json!("42"), FieldType::Integer), json!(42));
        assert_eq!(coerce(json!("2.5"), FieldType::Number), json!(2.5));
        assert_eq!(coerce(json!(3), FieldType::String), json!("3"));
        assert_eq!(coerce(json!("yes"), FieldType::Boolean), json!(true));
        assert_eq!(coerce(json!(true), FieldType::String), json!("true"));
        assert_eq!(coerce(json!([1, 2]), FieldType::String), json!("[1,2]"));
    }

    #[test]
    fn passes_values_through_when_coercion_fails() {
        assert_eq!(coerce(json!("abc"), FieldType::Number), json!("abc"));
        assert_eq!(coerce(json!({"a": 1}), FieldType::Number), json!({"a": 1}));
        assert_eq!(coerce(json!(7), FieldType::Integer), json!(7));
        assert_eq!(coerce(json!(7), FieldType::Number), json!(7));
        assert_eq!(coerce(json!(null), FieldType::String), json!(null));
    }
}
