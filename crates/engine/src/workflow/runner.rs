//! Asynchronous workflow runner that streams progress events and responds to
//! cancel/approve/reject controls.
//!
//! [`WorkflowRunner::run`] executes a [`ReadyWorkflow`] to completion and returns
//! a [`RunReport`]. [`drive_workflow_run`] wraps the same run so a caller can
//! steer it through a control channel while it is in flight.

use std::time::Instant;

use chrono::Utc;
use indexmap::IndexMap;
use railyard_types::workflow::validation::validate_input_value;
use railyard_types::{ProgressEvent, RunControl, RunStatus, StepProgress, WorkflowInputDefinition};
use railyard_util::EngineConfig;
use serde::Serialize;
use serde_json::{Map, Value};
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::RunError;
use crate::executor::{ExecutionScope, HandlerRegistry, Interpreter, SuspendDecision, SuspensionGate};
use crate::readiness::ReadyWorkflow;
use crate::workflow::state::ProgressEmitter;

/// Inputs of one run.
#[derive(Debug, Clone, Default)]
pub struct RunRequest {
    pub run_id: String,
    pub inputs: Map<String, Value>,
}

impl RunRequest {
    /// Request with a timestamp-derived run id.
    pub fn new(inputs: Map<String, Value>) -> Self {
        Self {
            run_id: format!("run-{}", Utc::now().format("%Y%m%dT%H%M%S%.3f")),
            inputs,
        }
    }
}

/// Final state of a run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub run_id: String,
    pub status: RunStatus,
    /// Top-level step id to output, present when the run completed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_step_id: Option<String>,
    /// Outputs of every step whose last run completed.
    pub partial_output: Value,
    pub progress: IndexMap<String, StepProgress>,
    pub total_duration_ms: u64,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Completed
    }
}

/// Executes ready workflows with a fixed handler registry and engine config.
#[derive(Debug, Clone)]
pub struct WorkflowRunner {
    handlers: HandlerRegistry,
    config: EngineConfig,
}

impl WorkflowRunner {
    pub fn new(handlers: HandlerRegistry, config: EngineConfig) -> Self {
        Self { handlers, config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Runs `workflow` to completion without external controls.
    pub async fn run(&self, workflow: &ReadyWorkflow, request: RunRequest, events: Option<UnboundedSender<ProgressEvent>>) -> RunReport {
        let cancel = CancellationToken::new();
        let gate = SuspensionGate::new();
        self.execute(workflow, request, events, &cancel, &gate).await
    }

    async fn execute(
        &self,
        workflow: &ReadyWorkflow,
        request: RunRequest,
        events: Option<UnboundedSender<ProgressEvent>>,
        cancel: &CancellationToken,
        gate: &SuspensionGate,
    ) -> RunReport {
        let started = Instant::now();
        let graph = workflow.graph();
        let definition = workflow.definition();
        let emitter = ProgressEmitter::new(graph, events);
        emitter.run_started();
        info!(run_id = %request.run_id, workflow_id = %definition.id, steps = graph.len(), "workflow run started");

        let inputs = match prepare_inputs(&definition.inputs, request.inputs) {
            Ok(inputs) => inputs,
            Err(error) => return finish_failed(&emitter, request.run_id, error, started),
        };

        let interpreter = Interpreter {
            run_id: &request.run_id,
            graph,
            input_definitions: &definition.inputs,
            run_inputs: &inputs,
            handlers: &self.handlers,
            emitter: &emitter,
            gate,
            config: &self.config,
        };
        let result = interpreter
            .execute_sequence(graph.top_level_steps(), ExecutionScope::new(cancel.child_token()))
            .await;

        match result {
            Ok(outcome) => {
                let output: Map<String, Value> = graph
                    .top_level_steps()
                    .into_iter()
                    .filter_map(|step| {
                        outcome
                            .scope
                            .outputs
                            .get(&step.id)
                            .map(|output| (step.id.clone(), output.clone()))
                    })
                    .collect();
                let output = Value::Object(output);
                let elapsed = started.elapsed();
                emitter.workflow_completed(output.clone(), elapsed);
                info!(run_id = %request.run_id, duration_ms = millis(elapsed), "workflow run completed");

                RunReport {
                    run_id: request.run_id,
                    status: emitter.status(),
                    output: Some(output),
                    error: None,
                    failed_step_id: None,
                    partial_output: emitter.partial_output(),
                    progress: emitter.snapshot(),
                    total_duration_ms: millis(elapsed),
                }
            }
            Err(error) => finish_failed(&emitter, request.run_id, error, started),
        }
    }
}

fn finish_failed(emitter: &ProgressEmitter, run_id: String, error: RunError, started: Instant) -> RunReport {
    let elapsed = started.elapsed();
    let message = error.to_string();
    let failed_step_id = error.failed_step_id().map(str::to_string);
    if error.is_cancelled() {
        info!(run_id = %run_id, "workflow run cancelled");
    } else {
        warn!(run_id = %run_id, error = %message, failed_step_id = failed_step_id.as_deref().unwrap_or_default(), "workflow run failed");
    }
    emitter.workflow_failed(&message, failed_step_id.clone(), error.is_cancelled(), elapsed);

    RunReport {
        run_id,
        status: emitter.status(),
        output: None,
        error: Some(message),
        failed_step_id,
        partial_output: emitter.partial_output(),
        progress: emitter.snapshot(),
        total_duration_ms: millis(elapsed),
    }
}

/// Applies defaults and validates provided values against the input definitions.
///
/// Inputs without a definition are passed through untouched. A `null` value
/// counts as missing.
pub fn prepare_inputs(definitions: &[WorkflowInputDefinition], provided: Map<String, Value>) -> Result<Map<String, Value>, RunError> {
    let mut prepared = provided;
    for definition in definitions {
        match prepared.get(&definition.name) {
            Some(value) if !value.is_null() => {
                validate_input_value(value, definition).map_err(|message| RunError::InvalidInput {
                    name: definition.name.clone(),
                    message,
                })?;
            }
            _ => match &definition.default_value {
                Some(default) => {
                    prepared.insert(definition.name.clone(), default.clone());
                }
                None if definition.required => {
                    return Err(RunError::InvalidInput {
                        name: definition.name.clone(),
                        message: "required input is missing".into(),
                    });
                }
                None => {}
            },
        }
    }
    Ok(prepared)
}

/// Drives a workflow run to completion while applying run controls.
///
/// `Cancel` cancels the run's token; `Approve`/`Reject` release the matching
/// suspended step. When the control channel closes the run simply continues.
pub async fn drive_workflow_run(
    runner: &WorkflowRunner,
    workflow: &ReadyWorkflow,
    request: RunRequest,
    mut control_rx: UnboundedReceiver<RunControl>,
    event_tx: UnboundedSender<ProgressEvent>,
) -> RunReport {
    let cancel = CancellationToken::new();
    let gate = SuspensionGate::new();
    let run = runner.execute(workflow, request, Some(event_tx), &cancel, &gate);
    tokio::pin!(run);

    let mut controls_open = true;
    loop {
        tokio::select! {
            report = &mut run => return report,
            control = control_rx.recv(), if controls_open => match control {
                Some(RunControl::Cancel) => {
                    info!("cancel requested");
                    cancel.cancel();
                }
                Some(RunControl::Approve { step_id, payload }) => {
                    let delivered = gate.resolve(&step_id, SuspendDecision::Approve(payload));
                    info!(step_id = %step_id, delivered, "approval received");
                }
                Some(RunControl::Reject { step_id, reason }) => {
                    let delivered = gate.resolve(&step_id, SuspendDecision::Reject(reason));
                    info!(step_id = %step_id, delivered, "rejection received");
                }
                None => controls_open = false,
            },
        }
    }
}

fn millis(elapsed: std::time::Duration) -> u64 {
    u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use railyard_types::{CustomCodeConfig, FieldType, Step, StepKind, WorkflowDefinition};
    use serde_json::json;
    use tokio::sync::mpsc;

    use crate::executor::EchoHandler;
    use crate::readiness::AvailableBindings;

    fn definition_with_inputs(inputs: Vec<WorkflowInputDefinition>) -> WorkflowDefinition {
        WorkflowDefinition {
            id: "wf".into(),
            inputs,
            steps: vec![Step::new("only", StepKind::CustomCode(CustomCodeConfig::default()))],
            ..WorkflowDefinition::default()
        }
    }

    #[test]
    fn prepare_inputs_applies_defaults_and_rejects_missing_required_values() {
        let mut region = WorkflowInputDefinition::new("region", FieldType::String);
        region.default_value = Some(json!("us"));
        let mut count = WorkflowInputDefinition::new("count", FieldType::Integer);
        count.required = true;

        let mut provided = Map::new();
        provided.insert("count".into(), json!(2));
        provided.insert("extra".into(), json!(true));
        let prepared = prepare_inputs(&[region.clone(), count.clone()], provided).expect("prepared");
        assert_eq!(prepared.get("region"), Some(&json!("us")));
        assert_eq!(prepared.get("extra"), Some(&json!(true)));

        let error = prepare_inputs(&[region, count], Map::new()).expect_err("count is required");
        assert_eq!(
            error,
            RunError::InvalidInput {
                name: "count".into(),
                message: "required input is missing".into()
            }
        );
    }

    #[tokio::test]
    async fn invalid_inputs_fail_before_any_step_runs() {
        let mut count = WorkflowInputDefinition::new("count", FieldType::Integer);
        count.required = true;
        let workflow = ReadyWorkflow::check(&definition_with_inputs(vec![count]), &AvailableBindings::default()).expect("ready");
        let runner = WorkflowRunner::new(HandlerRegistry::uniform(Arc::new(EchoHandler)), EngineConfig::default());
        let (sender, mut receiver) = mpsc::unbounded_channel();

        let mut inputs = Map::new();
        inputs.insert("count".into(), json!("many"));
        let report = runner.run(&workflow, RunRequest::new(inputs), Some(sender)).await;

        assert_eq!(report.status, RunStatus::Failed);
        assert_eq!(report.progress["only"].runs, 0);
        let first = receiver.try_recv().expect("one event");
        assert_eq!(first.kind(), "workflow-error");
    }

    #[tokio::test]
    async fn closed_control_channel_lets_the_run_finish() {
        let workflow = ReadyWorkflow::check(&definition_with_inputs(Vec::new()), &AvailableBindings::default()).expect("ready");
        let runner = WorkflowRunner::new(HandlerRegistry::uniform(Arc::new(EchoHandler)), EngineConfig::default());
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        drop(control_tx);
        let (event_tx, _event_rx) = mpsc::unbounded_channel();

        let report = drive_workflow_run(&runner, &workflow, RunRequest::new(Map::new()), control_rx, event_tx).await;
        assert!(report.is_success());
        assert_eq!(report.output, Some(json!({ "only": {} })));
    }
}
