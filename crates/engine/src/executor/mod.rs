//! Execution interpreter: walks the step graph, resolves inputs, dispatches
//! leaf steps to handlers and control steps to their control semantics, and
//! reports every transition through the progress emitter.
//!
//! - `handler::StepHandler` abstracts how a leaf step is executed
//! - `control` implements branch, parallel, loop, foreach, wait and suspend
//! - `suspend::SuspensionGate` connects suspend steps with approval controls
//!
//! Steps of one scope run strictly in `listIndex` order. Any step error fails
//! the enclosing scope immediately (fail-fast, no retry) and propagates up to
//! the run.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use railyard_types::{Step, StepKind, WorkflowInputDefinition};
use railyard_util::{EngineConfig, redact_sensitive};
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::RunError;
use crate::graph::StepGraph;
use crate::workflow::bindings::BindingResolver;
use crate::workflow::state::ProgressEmitter;

mod control;
pub mod handler;
pub mod suspend;

pub use handler::{EchoHandler, HandlerContext, HandlerRegistry, StepHandler};
pub use suspend::{SuspendDecision, SuspensionGate};

/// Values visible to the steps of one scope.
///
/// Parallel lanes and loop/foreach iterations run on private copies; lane and
/// loop outputs are merged back at the join, foreach iteration copies are
/// discarded once their result is collected.
#[derive(Debug, Clone)]
pub struct ExecutionScope {
    /// Outputs of completed steps plus the frame outputs of enclosing containers.
    pub outputs: HashMap<String, Value>,
    /// Loop and foreach variables (`iteration`, the item variable, `index`).
    pub variables: Map<String, Value>,
    /// Iteration key attached to progress events, e.g. `each[2]`.
    pub iteration: Option<String>,
    pub cancel: CancellationToken,
    /// Enclosing first-wins parallel steps with the token cancelled once a lane wins.
    races: Vec<(String, CancellationToken)>,
}

impl ExecutionScope {
    pub fn new(cancel: CancellationToken) -> Self {
        Self {
            outputs: HashMap::new(),
            variables: Map::new(),
            iteration: None,
            cancel,
            races: Vec::new(),
        }
    }

    /// Error reported when this scope's token fires.
    fn cancellation(&self) -> RunError {
        self.races
            .iter()
            .rev()
            .find(|(_, decided)| decided.is_cancelled())
            .map_or(RunError::Cancelled, |(parallel_step_id, _)| RunError::LaneSuperseded {
                parallel_step_id: parallel_step_id.clone(),
            })
    }

    /// Copy of this scope in which `container_id` exposes `frame` as its output.
    fn enter_frame(&self, container_id: &str, frame: Value) -> Self {
        let mut scope = self.clone();
        scope.outputs.insert(container_id.to_string(), frame);
        scope
    }

    /// Iteration key for the `index`-th run of `container_id`, nested under ours.
    fn child_iteration(&self, container_id: &str, index: usize) -> String {
        match &self.iteration {
            Some(parent) => format!("{parent}/{container_id}[{index}]"),
            None => format!("{container_id}[{index}]"),
        }
    }

    /// Bare identifiers visible to conditions: variables, then the control step's inputs.
    fn locals(&self, inputs: &Map<String, Value>) -> Map<String, Value> {
        let mut locals = self.variables.clone();
        locals.extend(inputs.iter().map(|(key, value)| (key.clone(), value.clone())));
        locals
    }

    fn merge_outputs(&mut self, other: ExecutionScope) {
        self.outputs.extend(other.outputs);
    }
}

/// Result of running one ordered scope to completion.
#[derive(Debug)]
pub struct SequenceOutcome {
    pub scope: ExecutionScope,
    /// Output of the last step, `None` for an empty scope.
    pub last_output: Option<Value>,
}

/// Interprets one run of a validated step graph.
pub struct Interpreter<'run> {
    pub(crate) run_id: &'run str,
    pub(crate) graph: &'run StepGraph,
    pub(crate) input_definitions: &'run [WorkflowInputDefinition],
    pub(crate) run_inputs: &'run Map<String, Value>,
    pub(crate) handlers: &'run HandlerRegistry,
    pub(crate) emitter: &'run ProgressEmitter,
    pub(crate) gate: &'run SuspensionGate,
    pub(crate) config: &'run EngineConfig,
}

impl<'run> Interpreter<'run> {
    /// Runs `steps` in order on `scope`, stopping at the first error.
    pub fn execute_sequence<'a>(&'a self, steps: Vec<&'run Step>, scope: ExecutionScope) -> BoxFuture<'a, Result<SequenceOutcome, RunError>> {
        async move {
            let mut scope = scope;
            let mut last_output = None;
            for step in steps {
                last_output = Some(self.execute_step(step, &mut scope).await?);
            }
            Ok(SequenceOutcome { scope, last_output })
        }
        .boxed()
    }

    async fn execute_step(&self, step: &'run Step, scope: &mut ExecutionScope) -> Result<Value, RunError> {
        if scope.cancel.is_cancelled() {
            return Err(scope.cancellation());
        }

        let iteration = scope.iteration.clone();
        let inputs = match BindingResolver::new(self.run_inputs, self.input_definitions, &scope.outputs).resolve(step) {
            Ok(inputs) => inputs,
            Err(error) => {
                // The step never dispatches; it still reports a start and an error.
                warn!(step_id = %step.id, error = %error, "step inputs could not be resolved");
                self.emitter.step_started(step, iteration.clone(), &Map::new());
                self.emitter.step_failed(step, iteration, &error.to_string(), Duration::ZERO);
                return Err(error);
            }
        };
        info!(
            run_id = %self.run_id,
            step_id = %step.id,
            step_type = %step.step_type(),
            iteration = iteration.as_deref().unwrap_or_default(),
            "step started"
        );
        self.emitter.step_started(step, iteration.clone(), &inputs);

        let started = Instant::now();
        let result = match &step.kind {
            StepKind::Control(control) => self.run_control(step, control, &inputs, scope).await,
            _ => self.run_handler(step, &inputs, scope).await,
        };
        let elapsed = started.elapsed();

        match result {
            Ok(output) => {
                info!(step_id = %step.id, duration_ms = elapsed.as_millis() as u64, "step completed");
                scope.outputs.insert(step.id.clone(), output.clone());
                self.emitter.step_completed(step, iteration, &output, elapsed);
                Ok(output)
            }
            Err(error) => {
                if error.is_cancelled() {
                    info!(step_id = %step.id, "step cancelled");
                } else {
                    warn!(step_id = %step.id, error = %error, "step failed");
                }
                self.emitter.step_failed(step, iteration, &error.to_string(), elapsed);
                Err(error)
            }
        }
    }

    async fn run_handler(&self, step: &Step, inputs: &Map<String, Value>, scope: &ExecutionScope) -> Result<Value, RunError> {
        let handler = self.handlers.get(step.step_type()).ok_or_else(|| RunError::MissingHandler {
            step_id: step.id.clone(),
            step_type: step.step_type().to_string(),
        })?;
        let context = HandlerContext {
            run_id: self.run_id,
            workflow_inputs: self.run_inputs,
            cancellation: scope.cancel.clone(),
        };

        tokio::select! {
            biased;
            _ = scope.cancel.cancelled() => Err(scope.cancellation()),
            result = handler.execute(step, inputs, &context) => result.map_err(|error| RunError::Handler {
                step_id: step.id.clone(),
                message: self.render_handler_error(&error),
            }),
        }
    }

    fn render_handler_error(&self, error: &anyhow::Error) -> String {
        let message = format!("{error:#}");
        if self.config.redact_step_errors {
            redact_sensitive(&message)
        } else {
            message
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use anyhow::bail;
    use async_trait::async_trait;
    use railyard_types::{CustomCodeConfig, FieldBinding, FieldSchema, FieldType, ProgressEvent};
    use serde_json::json;
    use tokio::sync::mpsc;

    struct FailingHandler;

    #[async_trait]
    impl StepHandler for FailingHandler {
        async fn execute(&self, step: &Step, _inputs: &Map<String, Value>, _context: &HandlerContext<'_>) -> anyhow::Result<Value> {
            if step.id == "b" {
                bail!("upstream rejected request: API_TOKEN=hunter2");
            }
            Ok(json!({ "ok": step.id }))
        }
    }

    fn code(id: &str, list_index: u32) -> Step {
        let mut step = Step::new(id, StepKind::CustomCode(CustomCodeConfig::default()));
        step.list_index = list_index;
        step
    }

    #[tokio::test]
    async fn sequence_stops_at_first_failure_and_redacts_errors() {
        let mut b = code("b", 1);
        b.input_schema.push(FieldSchema::new("from_a", FieldType::Any, false));
        b.bindings.insert("from_a".into(), FieldBinding::step_output("a", Some("ok")));
        let graph = StepGraph::from_steps(vec![code("a", 0), b, code("c", 2)]).expect("graph");
        let (sender, mut receiver) = mpsc::unbounded_channel();
        let emitter = ProgressEmitter::new(&graph, Some(sender));
        let handlers = HandlerRegistry::uniform(Arc::new(FailingHandler));
        let gate = SuspensionGate::new();
        let config = EngineConfig::default();
        let run_inputs = Map::new();
        let interpreter = Interpreter {
            run_id: "run-1",
            graph: &graph,
            input_definitions: &[],
            run_inputs: &run_inputs,
            handlers: &handlers,
            emitter: &emitter,
            gate: &gate,
            config: &config,
        };

        let error = interpreter
            .execute_sequence(graph.top_level_steps(), ExecutionScope::new(CancellationToken::new()))
            .await
            .expect_err("b fails");

        assert_eq!(error.failed_step_id(), Some("b"));
        assert!(!error.to_string().contains("hunter2"));

        let mut events = Vec::new();
        while let Ok(event) = receiver.try_recv() {
            events.push(event);
        }
        let started: Vec<_> = events
            .iter()
            .filter_map(|event| match event {
                ProgressEvent::StepStart { step_id, inputs, .. } => Some((step_id.clone(), inputs.clone())),
                _ => None,
            })
            .collect();
        assert_eq!(started.len(), 2);
        assert_eq!(started[1].1.get("from_a"), Some(&json!("a")));
        assert!(events.iter().all(|event| event.step_id() != Some("c")));
    }

    #[tokio::test]
    async fn cancelled_scope_starts_nothing() {
        let graph = StepGraph::from_steps(vec![code("a", 0)]).expect("graph");
        let emitter = ProgressEmitter::new(&graph, None);
        let handlers = HandlerRegistry::uniform(Arc::new(EchoHandler));
        let gate = SuspensionGate::new();
        let config = EngineConfig::default();
        let run_inputs = Map::new();
        let interpreter = Interpreter {
            run_id: "run-2",
            graph: &graph,
            input_definitions: &[],
            run_inputs: &run_inputs,
            handlers: &handlers,
            emitter: &emitter,
            gate: &gate,
            config: &config,
        };
        let token = CancellationToken::new();
        token.cancel();

        let error = interpreter
            .execute_sequence(graph.top_level_steps(), ExecutionScope::new(token))
            .await
            .expect_err("cancelled");
        assert_eq!(error, RunError::Cancelled);
        assert_eq!(emitter.snapshot()["a"].runs, 0);
    }

    #[tokio::test]
    async fn unresolved_inputs_still_report_start_and_error() {
        let mut b = code("b", 1);
        b.input_schema.push(FieldSchema::new("later", FieldType::Any, true));
        b.bindings.insert("later".into(), FieldBinding::step_output("c", None));
        let graph = StepGraph::from_steps(vec![code("a", 0), b, code("c", 2)]).expect("graph");
        let (sender, mut receiver) = mpsc::unbounded_channel();
        let emitter = ProgressEmitter::new(&graph, Some(sender));
        let handlers = HandlerRegistry::uniform(Arc::new(EchoHandler));
        let gate = SuspensionGate::new();
        let config = EngineConfig::default();
        let run_inputs = Map::new();
        let interpreter = Interpreter {
            run_id: "run-3",
            graph: &graph,
            input_definitions: &[],
            run_inputs: &run_inputs,
            handlers: &handlers,
            emitter: &emitter,
            gate: &gate,
            config: &config,
        };

        let error = interpreter
            .execute_sequence(graph.top_level_steps(), ExecutionScope::new(CancellationToken::new()))
            .await
            .expect_err("c has not run");
        assert_eq!(error.failed_step_id(), Some("b"));

        let mut kinds = Vec::new();
        while let Ok(event) = receiver.try_recv() {
            if event.step_id() == Some("b") {
                kinds.push(event.kind());
            }
        }
        assert_eq!(kinds, vec!["step-start", "step-error"]);
        assert_eq!(emitter.snapshot()["b"].status, railyard_types::StepRunStatus::Failed);
    }

    #[test]
    fn cancellation_names_the_decided_race() {
        let run = CancellationToken::new();
        let decided = CancellationToken::new();
        let mut scope = ExecutionScope::new(run.child_token());
        scope.races.push(("fan".into(), decided.clone()));
        assert_eq!(scope.cancellation(), RunError::Cancelled);

        decided.cancel();
        let error = scope.cancellation();
        assert!(error.is_cancelled());
        assert_eq!(error.to_string(), "lane cancelled: another lane of 'fan' finished first");
    }

    #[test]
    fn iteration_keys_nest() {
        let mut scope = ExecutionScope::new(CancellationToken::new());
        assert_eq!(scope.child_iteration("each", 2), "each[2]");
        scope.iteration = Some("outer[1]".into());
        assert_eq!(scope.child_iteration("each", 0), "outer[1]/each[0]");
    }
}
