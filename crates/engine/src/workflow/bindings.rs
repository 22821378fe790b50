//! Step input binding resolution and static binding validation.
//!
//! Every input field of a step may be bound to a prior step's output, a
//! workflow input, or a literal. At run time the [`BindingResolver`] turns
//! those bindings into the concrete input map handed to a step handler. Before
//! a run, [`validate_bindings`] checks the same bindings against the graph so
//! ordering defects surface as readiness errors instead of run failures.

use std::collections::HashMap;

use railyard_types::{ControlConfig, FieldBinding, FieldSchema, FieldType, Step, WorkflowInputDefinition};
use serde_json::{Map, Value};
use tracing::trace;

use crate::coercion::{Compatibility, coerce, compatibility};
use crate::error::{BindingError, RunError};
use crate::field_paths::select_path;
use crate::graph::StepGraph;

/// Resolves bindings against the values available at one point of a run.
pub struct BindingResolver<'context> {
    inputs: &'context Map<String, Value>,
    input_definitions: &'context [WorkflowInputDefinition],
    outputs: &'context HashMap<String, Value>,
}

impl<'context> BindingResolver<'context> {
    /// Creates a resolver over run inputs, their definitions (for defaults) and
    /// the outputs visible to the step being resolved.
    pub fn new(
        inputs: &'context Map<String, Value>,
        input_definitions: &'context [WorkflowInputDefinition],
        outputs: &'context HashMap<String, Value>,
    ) -> Self {
        Self {
            inputs,
            input_definitions,
            outputs,
        }
    }

    /// Computes the input map for `step`.
    ///
    /// Fields without a binding and bindings that resolve to undefined are
    /// omitted. A step-output binding whose source has not executed is fatal.
    pub fn resolve(&self, step: &Step) -> Result<Map<String, Value>, RunError> {
        let mut resolved = Map::new();
        for field in &step.input_schema {
            let Some(binding) = step.bindings.get(&field.name) else {
                trace!(step_id = %step.id, field = %field.name, "input field has no binding");
                continue;
            };
            let value = self.resolve_binding(binding, field.r#type).map_err(|source| RunError::Binding {
                step_id: step.id.clone(),
                field: field.name.clone(),
                source,
            })?;
            if let Some(value) = value {
                resolved.insert(field.name.clone(), value);
            }
        }
        Ok(resolved)
    }

    /// Resolves a single binding and coerces the result to `target`.
    pub fn resolve_binding(&self, binding: &FieldBinding, target: FieldType) -> Result<Option<Value>, BindingError> {
        let value = match binding {
            FieldBinding::StepOutput {
                source_step_id,
                source_path,
            } => {
                let output = self
                    .outputs
                    .get(source_step_id)
                    .ok_or_else(|| BindingError::SourceNotExecuted {
                        source_step_id: source_step_id.clone(),
                    })?;
                select_path(output, source_path.as_deref())
            }
            FieldBinding::WorkflowInput { workflow_input_name } => self.inputs.get(workflow_input_name).cloned().or_else(|| {
                self.input_definitions
                    .iter()
                    .find(|definition| &definition.name == workflow_input_name)
                    .and_then(|definition| definition.default_value.clone())
            }),
            FieldBinding::Literal { literal_value } => Some(literal_value.clone()),
        };
        Ok(value.map(|value| coerce(value, target)))
    }
}

/// Findings of [`validate_bindings`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BindingReport {
    /// Problems that block a run.
    pub errors: Vec<String>,
    /// Advisory findings such as type mismatches.
    pub warnings: Vec<String>,
}

impl BindingReport {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty() && self.warnings.is_empty()
    }
}

/// Checks every binding in the graph, including foreach array sources.
pub fn validate_bindings(graph: &StepGraph, input_definitions: &[WorkflowInputDefinition]) -> BindingReport {
    let mut report = BindingReport::default();

    for step in graph.steps() {
        for (field_name, binding) in &step.bindings {
            let label = format!("step '{}' input '{}'", step.id, field_name);
            let target = match step.input_field(field_name) {
                Some(field) => field.r#type,
                None => {
                    report
                        .warnings
                        .push(format!("{label}: field is not declared in the input schema"));
                    FieldType::Any
                }
            };
            check_binding(graph, input_definitions, step, binding, target, &label, &mut report);
        }

        if let Some(ControlConfig::Foreach(foreach)) = step.control() {
            let label = format!("step '{}' arraySource", step.id);
            check_binding(
                graph,
                input_definitions,
                step,
                &foreach.array_source,
                FieldType::Array,
                &label,
                &mut report,
            );
        }
    }

    report
}

fn check_binding(
    graph: &StepGraph,
    input_definitions: &[WorkflowInputDefinition],
    step: &Step,
    binding: &FieldBinding,
    target: FieldType,
    label: &str,
    report: &mut BindingReport,
) {
    let source_type = match binding {
        FieldBinding::StepOutput {
            source_step_id,
            source_path,
        } => {
            let Some(source) = graph.step(source_step_id) else {
                report
                    .errors
                    .push(format!("{label}: source step '{source_step_id}' does not exist"));
                return;
            };
            if !graph.is_predecessor(source_step_id, &step.id) {
                report.errors.push(format!(
                    "{label}: source step '{source_step_id}' does not run before '{}'",
                    step.id
                ));
                return;
            }
            declared_output_type(source, source_path.as_deref())
        }
        FieldBinding::WorkflowInput { workflow_input_name } => {
            let Some(definition) = input_definitions
                .iter()
                .find(|definition| &definition.name == workflow_input_name)
            else {
                report
                    .errors
                    .push(format!("{label}: workflow input '{workflow_input_name}' is not declared"));
                return;
            };
            Some(definition.r#type)
        }
        FieldBinding::Literal { literal_value } => FieldType::of_value(literal_value),
    };

    if let Some(source_type) = source_type
        && compatibility(source_type, target) == Compatibility::Incompatible
    {
        report.warnings.push(format!(
            "{label}: {} value is not compatible with {} field",
            source_type.as_str(),
            target.as_str()
        ));
    }
}

/// Declared type of a top-level output field, when the path names one.
fn declared_output_type(source: &Step, source_path: Option<&str>) -> Option<FieldType> {
    let path = source_path.map(str::trim).filter(|path| !path.is_empty())?;
    if path.contains(['.', '[']) {
        return None;
    }
    source.output_field(path).map(|field: &FieldSchema| field.r#type)
}

#[cfg(test)]
mod tests {
    use super::*;
    use railyard_types::{CustomCodeConfig, StepKind};
    use serde_json::json;

    fn code(id: &str, list_index: u32) -> Step {
        let mut step = Step::new(id, StepKind::CustomCode(CustomCodeConfig::default()));
        step.list_index = list_index;
        step
    }

    fn with_input(mut step: Step, name: &str, r#type: FieldType, binding: Option<FieldBinding>) -> Step {
        step.input_schema.push(FieldSchema::new(name, r#type, true));
        if let Some(binding) = binding {
            step.bindings.insert(name.to_string(), binding);
        }
        step
    }

    #[test]
    fn resolves_each_source_kind() {
        let step = with_input(
            with_input(
                with_input(
                    with_input(code("b", 1), "total", FieldType::Number, Some(FieldBinding::step_output("a", Some("total")))),
                    "amount",
                    FieldType::Number,
                    Some(FieldBinding::workflow_input("amount")),
                ),
                "label",
                FieldType::String,
                Some(FieldBinding::literal(json!(7))),
            ),
            "unbound",
            FieldType::String,
            None,
        );

        let inputs = Map::new();
        let mut amount = WorkflowInputDefinition::new("amount", FieldType::Number);
        amount.default_value = Some(json!(10));
        let definitions = vec![amount];
        let mut outputs = HashMap::new();
        outputs.insert("a".to_string(), json!({ "total": 42 }));

        let resolved = BindingResolver::new(&inputs, &definitions, &outputs)
            .resolve(&step)
            .expect("resolve inputs");
        assert_eq!(resolved.get("total"), Some(&json!(42)));
        assert_eq!(resolved.get("amount"), Some(&json!(10)));
        assert_eq!(resolved.get("label"), Some(&json!("7")));
        assert!(!resolved.contains_key("unbound"));
    }

    #[test]
    fn run_values_override_defaults_and_missing_paths_are_omitted() {
        let step = with_input(
            with_input(code("b", 1), "amount", FieldType::Integer, Some(FieldBinding::workflow_input("amount"))),
            "nested",
            FieldType::Any,
            Some(FieldBinding::step_output("a", Some("does.not.exist"))),
        );
        let mut inputs = Map::new();
        inputs.insert("amount".into(), json!("25"));
        let mut definition = WorkflowInputDefinition::new("amount", FieldType::Integer);
        definition.default_value = Some(json!(10));
        let definitions = vec![definition];
        let mut outputs = HashMap::new();
        outputs.insert("a".to_string(), json!({}));

        let resolved = BindingResolver::new(&inputs, &definitions, &outputs)
            .resolve(&step)
            .expect("resolve inputs");
        assert_eq!(resolved.get("amount"), Some(&json!(25)));
        assert!(!resolved.contains_key("nested"));
    }

    #[test]
    fn missing_source_output_is_fatal() {
        let step = with_input(code("b", 1), "total", FieldType::Number, Some(FieldBinding::step_output("a", None)));
        let inputs = Map::new();
        let outputs = HashMap::new();

        let error = BindingResolver::new(&inputs, &[], &outputs).resolve(&step).unwrap_err();
        assert_eq!(
            error,
            RunError::Binding {
                step_id: "b".into(),
                field: "total".into(),
                source: BindingError::SourceNotExecuted {
                    source_step_id: "a".into()
                },
            }
        );
    }

    #[test]
    fn validation_rejects_non_predecessor_sources() {
        let a = code("a", 0);
        let b = with_input(code("b", 1), "value", FieldType::Any, Some(FieldBinding::step_output("c", None)));
        let c = code("c", 2);
        let graph = StepGraph::from_steps(vec![a, b, c]).expect("graph");

        let report = validate_bindings(&graph, &[]);
        assert_eq!(report.errors.len(), 1);
        assert!(report.errors[0].contains("'c' does not run before 'b'"), "{:?}", report.errors);
    }

    #[test]
    fn validation_reports_unknown_sources_and_type_warnings() {
        let mut a = code("a", 0);
        a.output_schema.push(FieldSchema::new("rows", FieldType::Array, false));
        let b = with_input(
            with_input(
                with_input(code("b", 1), "count", FieldType::Number, Some(FieldBinding::step_output("a", Some("rows")))),
                "region",
                FieldType::String,
                Some(FieldBinding::workflow_input("region")),
            ),
            "ghost",
            FieldType::Any,
            Some(FieldBinding::step_output("nobody", None)),
        );
        let mut b = b;
        b.bindings.insert("extra".into(), FieldBinding::literal(json!(true)));
        let graph = StepGraph::from_steps(vec![a, b]).expect("graph");

        let report = validate_bindings(&graph, &[]);
        assert_eq!(report.errors.len(), 2, "{:?}", report.errors);
        assert!(report.errors.iter().any(|error| error.contains("'nobody' does not exist")));
        assert!(report.errors.iter().any(|error| error.contains("'region' is not declared")));
        assert_eq!(report.warnings.len(), 2, "{:?}", report.warnings);
        assert!(report.warnings.iter().any(|warning| warning.contains("array value is not compatible with number")));
        assert!(report.warnings.iter().any(|warning| warning.contains("'extra': field is not declared")));
    }
}
