//! Condition evaluation for branch and loop steps.
//!
//! Expressions are evaluated against three roots:
//!
//! - `inputs.<name>` reads a workflow input value,
//! - `steps.<step_id>.<path>` reads the output of a step visible from the
//!   control step (its predecessors and enclosing frames),
//! - a bare identifier (`x`, `item.total`, `iteration`) reads a resolved input
//!   of the control step or a loop/foreach variable.
//!
//! Unresolvable operands are undefined: they are falsy, equal only to `null`,
//! and never satisfy an ordering comparison. Evaluation never fails; syntax
//! problems are reported ahead of time by
//! [`validate_condition_expression`](crate::workflow::condition_syntax::validate_condition_expression).
//!
//! ```rust
//! use std::collections::HashMap;
//! use railyard_engine::resolve::{ConditionContext, eval_condition};
//! use serde_json::{Map, json};
//!
//! let mut locals = Map::new();
//! locals.insert("x".into(), json!(5));
//! let inputs = Map::new();
//! let steps = HashMap::new();
//! let context = ConditionContext::new(&inputs, &steps, &locals);
//!
//! assert!(!eval_condition("x > 10", &context));
//! assert!(eval_condition("x > 1 && x <= 5", &context));
//! ```

use std::cmp::Ordering;
use std::collections::HashMap;

use serde_json::{Map, Value};

use crate::field_paths::{format_json_value, select_path};
use crate::workflow::condition_syntax::{
    find_comparison, is_single_quoted_literal, is_wrapped_in_parentheses, looks_like_json_literal, normalize_condition_expression,
    split_expression, split_includes, strip_leading_negations, strip_wrapping_parentheses,
};

/// Read-only view of the values a condition may reference.
#[derive(Debug, Clone, Copy)]
pub struct ConditionContext<'a> {
    /// Workflow input values.
    pub inputs: &'a Map<String, Value>,
    /// Outputs of the steps visible from the control step.
    pub steps: &'a HashMap<String, Value>,
    /// Resolved inputs of the control step and loop/foreach variables.
    pub locals: &'a Map<String, Value>,
}

impl<'a> ConditionContext<'a> {
    pub fn new(inputs: &'a Map<String, Value>, steps: &'a HashMap<String, Value>, locals: &'a Map<String, Value>) -> Self {
        Self { inputs, steps, locals }
    }
}

/// Evaluates a condition expression to a boolean.
pub fn eval_condition(expression: &str, context: &ConditionContext<'_>) -> bool {
    let normalized = normalize_condition_expression(expression);
    if normalized.is_empty() {
        return false;
    }
    evaluate_node(&normalized, context)
}

fn evaluate_node(expression: &str, context: &ConditionContext<'_>) -> bool {
    let expression = strip_wrapping_parentheses(expression);

    if let Some(parts) = split_expression(expression, "||") {
        return parts.iter().any(|part| evaluate_node(part, context));
    }
    if let Some(parts) = split_expression(expression, "&&") {
        return parts.iter().all(|part| evaluate_node(part, context));
    }

    let (negations, inner) = strip_leading_negations(expression);
    let inner = inner.trim();
    let result = if negations > 0 && is_wrapped_in_parentheses(inner) {
        evaluate_node(inner, context)
    } else {
        evaluate_predicate(inner, context)
    };

    if negations % 2 == 1 { !result } else { result }
}

fn evaluate_predicate(expression: &str, context: &ConditionContext<'_>) -> bool {
    if let Some((left_expression, right_expression)) = split_includes(expression) {
        let haystack = resolve_operand(left_expression, context);
        let needle = resolve_operand(right_expression, context);
        return evaluate_includes(haystack.as_ref(), needle.as_ref());
    }

    if let Some((position, operator)) = find_comparison(expression) {
        let left = resolve_operand(&expression[..position], context);
        let right = resolve_operand(&expression[position + operator.len()..], context);
        return match operator {
            "==" => values_equal(left.as_ref(), right.as_ref()),
            "!=" => !values_equal(left.as_ref(), right.as_ref()),
            ">" => compare_values(left.as_ref(), right.as_ref()) == Some(Ordering::Greater),
            ">=" => matches!(compare_values(left.as_ref(), right.as_ref()), Some(Ordering::Greater | Ordering::Equal)),
            "<" => compare_values(left.as_ref(), right.as_ref()) == Some(Ordering::Less),
            "<=" => matches!(compare_values(left.as_ref(), right.as_ref()), Some(Ordering::Less | Ordering::Equal)),
            _ => false,
        };
    }

    is_truthy(resolve_operand(expression, context).as_ref())
}

fn evaluate_includes(haystack: Option<&Value>, needle: Option<&Value>) -> bool {
    let Some(needle) = needle else {
        return false;
    };
    match haystack {
        Some(Value::Array(items)) => items.iter().any(|item| values_equal(Some(item), Some(needle))),
        Some(Value::String(text)) => text.contains(&format_json_value(needle)),
        _ => false,
    }
}

/// Resolves an operand to a literal or a context value; `None` means undefined.
pub fn resolve_operand(expression: &str, context: &ConditionContext<'_>) -> Option<Value> {
    let trimmed = expression.trim();
    if trimmed.is_empty() {
        return None;
    }
    if is_single_quoted_literal(trimmed) {
        return Some(Value::String(trimmed[1..trimmed.len() - 1].to_string()));
    }
    if looks_like_json_literal(trimmed)
        && let Ok(literal) = serde_json::from_str::<Value>(trimmed)
    {
        return Some(literal);
    }

    if let Some(rest) = trimmed.strip_prefix("inputs.") {
        return lookup_rooted(rest, |key| context.inputs.get(key));
    }
    if let Some(rest) = trimmed.strip_prefix("steps.") {
        return lookup_rooted(rest, |key| context.steps.get(key));
    }
    lookup_rooted(trimmed, |key| context.locals.get(key))
}

/// Splits `root.rest` at the first `.` or `[`, looks up the root and walks the rest.
fn lookup_rooted<'v>(path: &str, root: impl FnOnce(&str) -> Option<&'v Value>) -> Option<Value> {
    let split = path.find(['.', '[']).unwrap_or(path.len());
    let (key, rest) = path.split_at(split);
    let base = root(key)?;
    let rest = rest.strip_prefix('.').unwrap_or(rest);
    select_path(base, Some(rest))
}

/// JavaScript-like truthiness; undefined and `null` are false.
pub fn is_truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(flag)) => *flag,
        Some(Value::Number(number)) => number.as_f64().is_some_and(|float| float != 0.0),
        Some(Value::String(text)) => !text.is_empty(),
        Some(Value::Array(_)) | Some(Value::Object(_)) => true,
    }
}

fn values_equal(left: Option<&Value>, right: Option<&Value>) -> bool {
    let left = left.unwrap_or(&Value::Null);
    let right = right.unwrap_or(&Value::Null);
    match (left, right) {
        (Value::Number(left_number), Value::Number(right_number)) => left_number.as_f64() == right_number.as_f64(),
        (Value::String(_), Value::Number(_) | Value::Bool(_)) | (Value::Number(_) | Value::Bool(_), Value::String(_)) => {
            format_json_value(left) == format_json_value(right)
        }
        _ => left == right,
    }
}

/// Orders two numbers or two strings; anything else is unordered.
fn compare_values(left: Option<&Value>, right: Option<&Value>) -> Option<Ordering> {
    match (left?, right?) {
        (Value::Number(left_number), Value::Number(right_number)) => left_number.as_f64()?.partial_cmp(&right_number.as_f64()?),
        (Value::String(left_text), Value::String(right_text)) => Some(left_text.cmp(right_text)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Fixture {
        inputs: Map<String, Value>,
        steps: HashMap<String, Value>,
        locals: Map<String, Value>,
    }

    impl Fixture {
        fn new() -> Self {
            let mut inputs = Map::new();
            inputs.insert("environment".into(), json!("production"));
            inputs.insert("perms".into(), json!(["view", "deploy"]));
            inputs.insert("limit".into(), json!(10));
            let mut steps = HashMap::new();
            steps.insert("build".into(), json!({ "status": "succeeded", "items": [ { "n": 1 }, { "n": 4 } ] }));
            let mut locals = Map::new();
            locals.insert("x".into(), json!(5));
            locals.insert("iteration".into(), json!(3));
            locals.insert("item".into(), json!({ "total": 12.5 }));
            Self { inputs, steps, locals }
        }

        fn eval(&self, expression: &str) -> bool {
            eval_condition(expression, &ConditionContext::new(&self.inputs, &self.steps, &self.locals))
        }
    }

    #[test]
    fn evaluates_equality_against_inputs_and_steps() {
        let fixture = Fixture::new();
        assert!(fixture.eval("inputs.environment == \"production\""));
        assert!(fixture.eval("inputs.environment == 'production'"));
        assert!(!fixture.eval("inputs.environment == \"development\""));
        assert!(fixture.eval("steps.build.status != 'failed'"));
        assert!(fixture.eval("steps.build.items[1].n == 4"));
        assert!(fixture.eval("${{ inputs.limit == 10 }}"));
    }

    #[test]
    fn evaluates_numeric_comparisons_on_bare_identifiers() {
        let fixture = Fixture::new();
        assert!(!fixture.eval("x > 10"));
        assert!(fixture.eval("x <= 5"));
        assert!(fixture.eval("item.total > inputs.limit"));
        assert!(fixture.eval("iteration >= 3 && iteration < 4"));
        assert!(!fixture.eval("missing > 1"));
        assert!(!fixture.eval("x > 'abc'"));
    }

    #[test]
    fn combines_logical_operators_and_parentheses() {
        let fixture = Fixture::new();
        assert!(fixture.eval("x > 10 || inputs.environment == 'production'"));
        assert!(!fixture.eval("!(x == 5)"));
        assert!(fixture.eval("!!x"));
        assert!(fixture.eval("(x > 10 || x < 6) && !missing"));
    }

    #[test]
    fn evaluates_includes_and_truthiness() {
        let fixture = Fixture::new();
        assert!(fixture.eval("inputs.perms.includes(\"deploy\")"));
        assert!(!fixture.eval("inputs.perms.includes('manage')"));
        assert!(fixture.eval("[\"succeeded\",\"failed\"].includes(steps.build.status)"));
        assert!(fixture.eval("steps.build.items[].n.includes(4)"));
        assert!(fixture.eval("inputs.environment"));
        assert!(!fixture.eval("steps.unknown.status"));
        assert!(!fixture.eval(""));
    }

    #[test]
    fn undefined_equals_only_null() {
        let fixture = Fixture::new();
        assert!(fixture.eval("missing == null"));
        assert!(!fixture.eval("missing == 0"));
    }
}
