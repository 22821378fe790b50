//! Shared condition normalization and syntax validation.
//!
//! Branch conditions and loop predicates use the same small expression
//! language: `||`, `&&`, `!`, parentheses, the comparisons `==`, `!=`, `>`,
//! `>=`, `<`, `<=`, `.includes(...)` and JSON literals. Operands are either
//! literals or paths rooted at `inputs.*`, `steps.<id>.*` or a bare identifier
//! (a resolved input of the control step or a loop/foreach variable).
//!
//! The readiness check validates syntax here; the evaluator in
//! [`crate::resolve`] reuses the same splitting helpers so the two never drift.

use anyhow::{Result, bail};

/// Comparison operators in match priority order.
pub(crate) const COMPARISON_OPERATORS: [&str; 6] = ["==", "!=", ">=", "<=", ">", "<"];

/// Normalizes a condition string by trimming and unwrapping `${{ ... }}`.
pub fn normalize_condition_expression(raw_expression: &str) -> String {
    let trimmed = raw_expression.trim();
    if let Some(stripped) = trimmed.strip_prefix("${{") {
        let inner = stripped.trim();
        let inner = inner.strip_suffix("}}").unwrap_or(inner);
        inner.trim().to_string()
    } else {
        trimmed.to_string()
    }
}

/// Validates a condition expression against the supported syntax.
pub fn validate_condition_expression(expression: &str) -> Result<()> {
    let normalized = normalize_condition_expression(expression);
    if normalized.is_empty() {
        bail!("expression cannot be empty");
    }
    if contains_operator(&normalized, "===") || contains_operator(&normalized, "!==") {
        bail!("strict equality operators are unsupported; use '==' or '!='");
    }

    let mut operands = Vec::new();
    collect_operands(&normalized, &mut operands)?;
    for operand in operands {
        validate_operand_expression(operand)?;
    }
    Ok(())
}

/// Step ids referenced through `steps.<id>` operands of a well-formed expression.
pub fn referenced_step_ids(expression: &str) -> Vec<String> {
    let normalized = normalize_condition_expression(expression);
    let mut operands = Vec::new();
    if collect_operands(&normalized, &mut operands).is_err() {
        return Vec::new();
    }

    let mut step_ids: Vec<String> = operands
        .into_iter()
        .filter_map(|operand| operand.trim().strip_prefix("steps."))
        .filter_map(|rest| {
            let end = rest.find(['.', '[']).unwrap_or(rest.len());
            let step_id = &rest[..end];
            (!step_id.is_empty()).then(|| step_id.to_string())
        })
        .collect();
    step_ids.dedup();
    step_ids
}

fn collect_operands<'a>(expression: &'a str, operands: &mut Vec<&'a str>) -> Result<()> {
    let expression = strip_wrapping_parentheses(expression.trim());
    if expression.is_empty() {
        bail!("expression cannot be empty");
    }

    if let Some(parts) = split_expression(expression, "||") {
        for part in parts {
            collect_operands(part, operands)?;
        }
        return Ok(());
    }
    if let Some(parts) = split_expression(expression, "&&") {
        for part in parts {
            collect_operands(part, operands)?;
        }
        return Ok(());
    }

    let (negations, inner) = strip_leading_negations(expression);
    let inner = inner.trim();
    if inner.is_empty() {
        bail!("expression cannot end with negation operator");
    }
    if negations > 0 && is_wrapped_in_parentheses(inner) {
        return collect_operands(inner, operands);
    }

    if let Some((left_expression, right_expression)) = split_includes(inner) {
        if right_expression.is_empty() {
            bail!("includes expression is missing an argument");
        }
        operands.push(left_expression);
        operands.push(right_expression);
        return Ok(());
    }

    if let Some((position, operator)) = find_comparison(inner) {
        let left_expression = inner[..position].trim();
        let right_expression = inner[position + operator.len()..].trim();
        if left_expression.is_empty() || right_expression.is_empty() {
            bail!("comparison '{}' must include both left and right operands", operator);
        }
        operands.push(left_expression);
        operands.push(right_expression);
        return Ok(());
    }

    operands.push(inner);
    Ok(())
}

fn validate_operand_expression(expression: &str) -> Result<()> {
    let trimmed = expression.trim();
    if trimmed.is_empty() {
        bail!("operand cannot be empty");
    }
    if is_single_quoted_literal(trimmed) {
        return Ok(());
    }
    if looks_like_json_literal(trimmed) {
        if serde_json::from_str::<serde_json::Value>(trimmed).is_ok() {
            return Ok(());
        }
        bail!("malformed literal '{}'", trimmed);
    }
    if !is_supported_path_expression(trimmed) {
        bail!(
            "unsupported expression '{}'; use a literal, inputs.*, steps.<step_id>.* or a variable name",
            trimmed
        );
    }
    Ok(())
}

pub(crate) fn is_single_quoted_literal(expression: &str) -> bool {
    expression.len() >= 2 && expression.starts_with('\'') && expression.ends_with('\'')
}

pub(crate) fn looks_like_json_literal(expression: &str) -> bool {
    let starts_like_number = expression
        .chars()
        .next()
        .map(|character| character == '-' || character.is_ascii_digit())
        .unwrap_or(false);
    expression.starts_with('[')
        || expression.starts_with('{')
        || expression.starts_with('"')
        || expression == "null"
        || expression == "true"
        || expression == "false"
        || starts_like_number
}

fn is_supported_path_expression(expression: &str) -> bool {
    if expression.contains(char::is_whitespace) {
        return false;
    }
    if let Some(rest) = expression.strip_prefix("inputs.") {
        return validate_dot_path_segments(rest);
    }
    if let Some(rest) = expression.strip_prefix("steps.") {
        return validate_dot_path_segments(rest);
    }
    validate_dot_path_segments(expression)
}

fn validate_dot_path_segments(path: &str) -> bool {
    !path.is_empty() && path.split('.').all(validate_path_segment)
}

fn validate_path_segment(segment: &str) -> bool {
    if segment.is_empty() {
        return false;
    }

    let mut chars = segment.chars().peekable();
    let mut saw_base = false;
    while let Some(character) = chars.peek().copied() {
        if character == '[' {
            break;
        }
        if !is_identifier_character(character) {
            return false;
        }
        saw_base = true;
        chars.next();
    }

    if !saw_base {
        return false;
    }

    while let Some(character) = chars.next() {
        if character != '[' {
            return false;
        }
        let mut saw_digit = false;
        loop {
            let Some(next_character) = chars.next() else {
                return false;
            };
            if next_character == ']' {
                // `items[]` maps over the array.
                if !saw_digit && chars.peek().is_some() {
                    return false;
                }
                break;
            }
            if !next_character.is_ascii_digit() {
                return false;
            }
            saw_digit = true;
        }
    }

    true
}

fn is_identifier_character(character: char) -> bool {
    character.is_ascii_alphanumeric() || character == '_' || character == '-'
}

/// Splits `left.includes(right)` into its two operands.
pub(crate) fn split_includes(expression: &str) -> Option<(&str, &str)> {
    let includes_index = find_top_level_operator(expression, ".includes(")?;
    let (left_expression, right_expression_with_suffix) = expression.split_at(includes_index);
    let right_expression = right_expression_with_suffix.trim_start_matches(".includes(").trim();
    let right_expression = right_expression.strip_suffix(')').unwrap_or(right_expression).trim();
    Some((left_expression.trim(), right_expression))
}

/// Finds the first top-level comparison operator.
pub(crate) fn find_comparison(expression: &str) -> Option<(usize, &'static str)> {
    COMPARISON_OPERATORS
        .iter()
        .find_map(|operator| find_top_level_operator(expression, operator).map(|position| (position, *operator)))
}

pub(crate) fn split_expression<'a>(expression: &'a str, operator: &str) -> Option<Vec<&'a str>> {
    let mut parts = Vec::new();
    let mut start = 0usize;
    let length = expression.len();

    while start < length {
        if let Some(relative_index) = find_top_level_operator(&expression[start..], operator) {
            let absolute_index = start + relative_index;
            let part = expression[start..absolute_index].trim();
            if !part.is_empty() {
                parts.push(part);
            }
            start = absolute_index + operator.len();
        } else {
            let part = expression[start..].trim();
            if !part.is_empty() {
                parts.push(part);
            }
            break;
        }
    }

    if parts.len() > 1 { Some(parts) } else { None }
}

pub(crate) fn strip_leading_negations(expression: &str) -> (usize, &str) {
    let mut count = 0usize;
    let mut remainder = expression.trim_start();
    while let Some(stripped) = remainder.strip_prefix('!') {
        if stripped.starts_with('=') {
            break;
        }
        count += 1;
        remainder = stripped.trim_start();
    }
    (count, remainder)
}

/// True when the whole expression is enclosed by one matching pair of parentheses.
pub(crate) fn is_wrapped_in_parentheses(expression: &str) -> bool {
    if !expression.starts_with('(') || !expression.ends_with(')') {
        return false;
    }
    find_top_level_operator(&expression[1..], ")").map(|index| index + 1) == Some(expression.len() - 1)
}

pub(crate) fn strip_wrapping_parentheses(expression: &str) -> &str {
    let mut current = expression.trim();
    while is_wrapped_in_parentheses(current) {
        current = current[1..current.len() - 1].trim();
    }
    current
}

fn contains_operator(expression: &str, operator: &str) -> bool {
    find_top_level_operator(expression, operator).is_some()
}

/// Byte offset of `operator` outside quotes, parentheses and brackets.
pub(crate) fn find_top_level_operator(expression: &str, operator: &str) -> Option<usize> {
    let mut in_single_quote = false;
    let mut in_double_quote = false;
    let mut depth = 0i32;

    for (index, character) in expression.char_indices() {
        if !in_single_quote && !in_double_quote && depth == 0 && expression[index..].starts_with(operator) {
            return Some(index);
        }
        match character {
            '\'' if !in_double_quote => in_single_quote = !in_single_quote,
            '"' if !in_single_quote => in_double_quote = !in_double_quote,
            '(' | '[' | '{' if !in_single_quote && !in_double_quote => depth += 1,
            ')' | ']' | '}' if !in_single_quote && !in_double_quote => {
                if depth > 0 {
                    depth -= 1;
                }
            }
            _ => {}
        }
    }

    None
}
