//! Dot/bracket path traversal over JSON values.
//!
//! Paths look like `customer.orders[0].total`. A segment ending in `[]`
//! (for example `orders[].total`) maps the rest of the path over every element
//! of the array and collects the results. Missing keys, out-of-range indices and
//! type mismatches yield `None` ("undefined"); traversal never fails.

use serde_json::Value;

/// Selects a nested value by path. `None` or an empty path returns the value itself.
pub fn select_path(value: &Value, path: Option<&str>) -> Option<Value> {
    let Some(path) = path.map(str::trim).filter(|path| !path.is_empty()) else {
        return Some(value.clone());
    };
    let segments: Vec<&str> = path.split('.').filter(|segment| !segment.is_empty()).collect();
    select_segments(value, &segments)
}

fn select_segments(value: &Value, segments: &[&str]) -> Option<Value> {
    let Some((segment, rest)) = segments.split_first() else {
        return Some(value.clone());
    };

    let (key, indices, map_over_items) = parse_segment(segment)?;
    let mut current = value;
    if !key.is_empty() {
        current = current.get(key)?;
    }
    for index in indices {
        current = current.get(index)?;
    }

    if map_over_items {
        let items = current.as_array()?;
        let mapped = items
            .iter()
            .filter_map(|item| select_segments(item, rest))
            .collect::<Vec<_>>();
        return Some(Value::Array(mapped));
    }

    select_segments(current, rest)
}

/// Splits `key[1][2]` into the key and its indices; a trailing `[]` requests a map.
fn parse_segment(segment: &str) -> Option<(&str, Vec<usize>, bool)> {
    let key_end = segment.find('[').unwrap_or(segment.len());
    let key = &segment[..key_end];
    let mut indices = Vec::new();
    let mut map_over_items = false;

    let mut remainder = &segment[key_end..];
    while let Some(stripped) = remainder.strip_prefix('[') {
        let close = stripped.find(']')?;
        let inner = stripped[..close].trim();
        remainder = &stripped[close + 1..];
        if inner.is_empty() {
            // `[]` only makes sense as the final bracket of a segment.
            if !remainder.is_empty() {
                return None;
            }
            map_over_items = true;
        } else {
            indices.push(inner.parse::<usize>().ok()?);
        }
    }
    if !remainder.is_empty() {
        return None;
    }
    Some((key, indices, map_over_items))
}

/// Renders a JSON value the way it reads in a condition or a message.
pub fn format_json_value(value: &Value) -> String {
    match value {
        Value::String(string_value) => string_value.clone(),
        Value::Number(number_value) => number_value.to_string(),
        Value::Bool(boolean_value) => boolean_value.to_string(),
        Value::Null => String::new(),
        other_value => other_value.to_string(),
    }
}

/// Short type label used in error messages.
pub fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
