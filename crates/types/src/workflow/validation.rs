//! Validation helpers for workflow input values.
//!
//! These routines check a run-time value against the declared type of a
//! workflow input and the optional declarative constraints attached to it.

use regex::Regex;
use serde_json::Value;

use super::{FieldType, WorkflowInputDefinition, WorkflowInputValidation};

/// Validate a run-time value against an input definition.
///
/// Null values pass the type check; whether a value is required at all is the
/// caller's concern.
pub fn validate_input_value(candidate: &Value, definition: &WorkflowInputDefinition) -> Result<(), String> {
    if !value_matches_type(candidate, definition.r#type) {
        return Err(format!(
            "expected a value of type {}, got {}",
            definition.r#type.as_str(),
            FieldType::of_value(candidate).map(|found| found.as_str()).unwrap_or("null")
        ));
    }
    match &definition.validate {
        Some(validation) => validate_candidate_value(candidate, validation),
        None => Ok(()),
    }
}

/// True when the JSON value is acceptable for the declared type.
pub fn value_matches_type(candidate: &Value, expected: FieldType) -> bool {
    match (expected, candidate) {
        (_, Value::Null) | (FieldType::Any, _) => true,
        (FieldType::String, Value::String(_)) => true,
        (FieldType::Number, Value::Number(_)) => true,
        (FieldType::Integer, Value::Number(number)) => number.is_i64() || number.is_u64(),
        (FieldType::Boolean, Value::Bool(_)) => true,
        (FieldType::Object, Value::Object(_)) => true,
        (FieldType::Array, Value::Array(_)) => true,
        _ => false,
    }
}

/// Validate a JSON candidate against the declarative rules.
///
/// - Enumerations must include the candidate.
/// - Patterns, minimum length, and maximum length only apply to strings.
pub fn validate_candidate_value(candidate: &Value, validation: &WorkflowInputValidation) -> Result<(), String> {
    if !validation.allowed_values.is_empty() {
        let matches_allowed_value = validation
            .allowed_values
            .iter()
            .any(|allowed| json_values_match(allowed, candidate));
        if !matches_allowed_value {
            return Err("value is not in the allowed set".to_string());
        }
    }

    match candidate {
        Value::String(text) => {
            if let Some(min_length) = validation.min_length
                && text.chars().count() < min_length
            {
                return Err(format!("value must be at least {} characters", min_length));
            }

            if let Some(max_length) = validation.max_length
                && text.chars().count() > max_length
            {
                return Err(format!("value must be at most {} characters", max_length));
            }

            if let Some(pattern) = &validation.pattern {
                let regex = Regex::new(pattern).map_err(|error| format!("invalid pattern '{}': {}", pattern, error))?;
                if !regex.is_match(text) {
                    return Err(format!("value must match the pattern {}", pattern));
                }
            }
            Ok(())
        }
        _ if validation.pattern.is_some() || validation.min_length.is_some() || validation.max_length.is_some() => {
            Err("value must be text to satisfy validation rules".to_string())
        }
        _ => Ok(()),
    }
}

fn json_values_match(expected: &Value, candidate: &Value) -> bool {
    if expected == candidate {
        return true;
    }
    match (expected, candidate) {
        (Value::String(expected_text), Value::String(candidate_text)) => expected_text == candidate_text,
        (Value::String(expected_text), other) => expected_text == &other.to_string(),
        (other, Value::String(candidate_text)) => match serde_json::from_str::<Value>(candidate_text) {
            Ok(parsed) => other == &parsed,
            Err(_) => false,
        },
        _ => false,
    }
}
