//! Pre-flight readiness check.
//!
//! [`check_readiness`] collects every problem that would make a run fail for
//! structural reasons (graph defects, unbound required fields, misordered
//! bindings, missing connections, malformed conditions) into a
//! [`ReadinessReport`]. A passing report converts into a [`ReadyWorkflow`], the
//! only thing the runner accepts.

use std::collections::BTreeSet;

use railyard_types::{ControlConfig, ReadinessReport, StepKind, WorkflowDefinition};
use tracing::debug;

use crate::error::ReadinessError;
use crate::graph::StepGraph;
use crate::workflow::bindings::validate_bindings;
use crate::workflow::condition_syntax::{referenced_step_ids, validate_condition_expression};

/// Connections and tables the caller can provide to this run.
#[derive(Debug, Clone, Default)]
pub struct AvailableBindings {
    pub connections: BTreeSet<String>,
    pub tables: BTreeSet<String>,
}

impl AvailableBindings {
    pub fn new(connections: impl IntoIterator<Item = String>, tables: impl IntoIterator<Item = String>) -> Self {
        Self {
            connections: connections.into_iter().collect(),
            tables: tables.into_iter().collect(),
        }
    }
}

/// Checks whether `definition` can run with the `available` connections and tables.
pub fn check_readiness(definition: &WorkflowDefinition, available: &AvailableBindings) -> ReadinessReport {
    let mut report = ReadinessReport::default();

    let graph = match StepGraph::from_definition(definition) {
        Ok(graph) => graph,
        Err(error) => {
            report.errors.push(error.to_string());
            return finish(report);
        }
    };

    let mut missing = BTreeSet::new();
    let mut resolved = BTreeSet::new();

    for step in graph.steps() {
        match &step.kind {
            StepKind::ToolCall(tool) => match tool.connection_id.as_deref().map(str::trim).filter(|id| !id.is_empty()) {
                None => report
                    .errors
                    .push(format!("step '{}': tool-call has no connection", step.id)),
                Some(connection) if available.connections.contains(connection) => {
                    resolved.insert(connection.to_string());
                }
                Some(connection) => {
                    missing.insert(connection.to_string());
                }
            },
            StepKind::QueryTable(table) | StepKind::WriteTable(table) => {
                match table.table_id.as_deref().map(str::trim).filter(|id| !id.is_empty()) {
                    None => report
                        .errors
                        .push(format!("step '{}': {} has no table", step.id, step.step_type())),
                    Some(table_id) if available.tables.contains(table_id) => {
                        resolved.insert(format!("table:{table_id}"));
                    }
                    Some(table_id) => {
                        missing.insert(format!("table:{table_id}"));
                    }
                }
            }
            StepKind::Control(control) => check_conditions(&graph, step.id.as_str(), control, &mut report),
            StepKind::CustomCode(_) => {}
        }

        for field in step.input_schema.iter().filter(|field| field.required) {
            if !step.bindings.contains_key(&field.name) {
                report
                    .errors
                    .push(format!("step '{}' input '{}': required field has no binding", step.id, field.name));
            }
        }
    }

    let bindings = validate_bindings(&graph, &definition.inputs);
    report.errors.extend(bindings.errors);
    report.warnings.extend(bindings.warnings);

    report.missing_connections = missing.into_iter().collect();
    report.resolved_connections = resolved.into_iter().collect();
    finish(report)
}

fn check_conditions(graph: &StepGraph, step_id: &str, control: &ControlConfig, report: &mut ReadinessReport) {
    let expressions: Vec<&str> = match control {
        ControlConfig::Branch(branch) => branch.conditions.iter().map(|condition| condition.expression.as_str()).collect(),
        ControlConfig::Loop(config) => vec![config.condition.as_str()],
        _ => return,
    };

    for expression in expressions {
        if let Err(error) = validate_condition_expression(expression) {
            report
                .errors
                .push(format!("step '{step_id}': invalid condition '{expression}': {error}"));
            continue;
        }
        for referenced in referenced_step_ids(expression) {
            // A loop condition may read its own body; anything else must run first.
            let visible = referenced == step_id
                || graph.is_predecessor(&referenced, step_id)
                || (matches!(control, ControlConfig::Loop(_)) && graph.is_predecessor(step_id, &referenced));
            if !visible {
                report.warnings.push(format!(
                    "step '{step_id}': condition reads step '{referenced}' which does not run before it"
                ));
            }
        }
    }
}

fn finish(mut report: ReadinessReport) -> ReadinessReport {
    report.can_execute = report.errors.is_empty() && report.missing_connections.is_empty();
    debug!(
        can_execute = report.can_execute,
        errors = report.errors.len(),
        warnings = report.warnings.len(),
        missing = report.missing_connections.len(),
        "readiness checked"
    );
    report
}

/// A workflow that passed the readiness check.
///
/// Owns its own copy of the definition and the validated graph, so edits to
/// the source definition cannot affect a run in flight.
#[derive(Debug, Clone)]
pub struct ReadyWorkflow {
    definition: WorkflowDefinition,
    graph: StepGraph,
    report: ReadinessReport,
}

impl ReadyWorkflow {
    /// Runs the readiness check and keeps the workflow when it passes.
    pub fn check(definition: &WorkflowDefinition, available: &AvailableBindings) -> Result<Self, ReadinessError> {
        into_ready(check_readiness(definition, available), definition)
    }

    pub fn definition(&self) -> &WorkflowDefinition {
        &self.definition
    }

    pub fn graph(&self) -> &StepGraph {
        &self.graph
    }

    /// The passing report, including any warnings.
    pub fn report(&self) -> &ReadinessReport {
        &self.report
    }
}

// Only reachable with a report `check_readiness` just produced for `definition`.
fn into_ready(report: ReadinessReport, definition: &WorkflowDefinition) -> Result<ReadyWorkflow, ReadinessError> {
    if !report.can_execute {
        let mut problems = report.errors.clone();
        problems.extend(
            report
                .missing_connections
                .iter()
                .map(|connection| format!("connection '{connection}' is not available")),
        );
        return Err(ReadinessError { problems });
    }
    let graph = StepGraph::from_definition(definition).map_err(|error| ReadinessError {
        problems: vec![error.to_string()],
    })?;
    Ok(ReadyWorkflow {
        definition: definition.clone(),
        graph,
        report,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use railyard_types::{
        BranchCondition, BranchConfig, CustomCodeConfig, FieldBinding, FieldSchema, FieldType, Step, TableConfig, ToolCallConfig,
    };

    fn definition(steps: Vec<Step>) -> WorkflowDefinition {
        WorkflowDefinition {
            id: "wf".into(),
            name: None,
            description: None,
            inputs: Vec::new(),
            steps,
        }
    }

    fn at(mut step: Step, list_index: u32) -> Step {
        step.list_index = list_index;
        step
    }

    #[test]
    fn reports_connections_tables_and_unbound_fields() {
        let call = at(
            Step::new(
                "call",
                StepKind::ToolCall(ToolCallConfig {
                    tool_id: "crm.lookup".into(),
                    connection_id: Some("crm".into()),
                }),
            ),
            0,
        );
        let mut query = at(
            Step::new(
                "query",
                StepKind::QueryTable(TableConfig {
                    table_id: Some("orders".into()),
                }),
            ),
            1,
        );
        query.input_schema.push(FieldSchema::new("region", FieldType::String, true));
        let write = at(Step::new("write", StepKind::WriteTable(TableConfig::default())), 2);

        let available = AvailableBindings::new(["crm".to_string()], Vec::new());
        let report = check_readiness(&definition(vec![call, query, write]), &available);

        assert!(!report.can_execute);
        assert_eq!(report.resolved_connections, vec!["crm".to_string()]);
        assert_eq!(report.missing_connections, vec!["table:orders".to_string()]);
        assert_eq!(report.errors.len(), 2, "{:?}", report.errors);
        assert!(report.errors.iter().any(|error| error.contains("'region': required field has no binding")));
        assert!(report.errors.iter().any(|error| error.contains("write-table has no table")));
    }

    #[test]
    fn malformed_conditions_block_the_run() {
        let branch = at(
            Step::new(
                "pick",
                StepKind::Control(ControlConfig::Branch(BranchConfig {
                    conditions: vec![BranchCondition {
                        expression: "x === 1".into(),
                        label: None,
                    }],
                    has_else: false,
                })),
            ),
            0,
        );

        let report = check_readiness(&definition(vec![branch]), &AvailableBindings::default());
        assert!(!report.can_execute);
        assert!(report.errors[0].contains("invalid condition"), "{:?}", report.errors);
    }

    #[test]
    fn passing_report_yields_a_ready_workflow() {
        let a = at(Step::new("a", StepKind::CustomCode(CustomCodeConfig::default())), 0);
        let mut b = at(Step::new("b", StepKind::CustomCode(CustomCodeConfig::default())), 1);
        b.input_schema.push(FieldSchema::new("value", FieldType::Any, true));
        b.bindings.insert("value".into(), FieldBinding::step_output("a", None));
        let source = definition(vec![a, b]);

        let ready = ReadyWorkflow::check(&source, &AvailableBindings::default()).expect("ready");
        assert_eq!(ready.graph().len(), 2);
        assert!(ready.report().warnings.is_empty());
    }

    #[test]
    fn ready_workflow_carries_the_report_of_its_own_check() {
        let call = Step::new(
            "call",
            StepKind::ToolCall(ToolCallConfig {
                tool_id: "crm.lookup".into(),
                connection_id: Some("crm".into()),
            }),
        );
        let source = definition(vec![call]);
        let available = AvailableBindings::new(["crm".to_string()], Vec::new());

        let ready = ReadyWorkflow::check(&source, &available).expect("ready");
        assert_eq!(ready.report(), &check_readiness(&source, &available));
        assert!(ReadyWorkflow::check(&source, &AvailableBindings::default()).is_err());
    }

    #[test]
    fn failing_report_lists_every_problem() {
        let call = Step::new("call", StepKind::ToolCall(ToolCallConfig::default()));
        let error = ReadyWorkflow::check(&definition(vec![call]), &AvailableBindings::default()).expect_err("not ready");
        assert_eq!(error.problems, vec!["step 'call': tool-call has no connection".to_string()]);
    }
}
