//! Control-step semantics.
//!
//! Each construct receives the control step's resolved inputs and the scope it
//! runs in, executes its children through [`Interpreter::execute_sequence`], and
//! returns the control step's own output:
//!
//! - branch: `{ selectedLane, result }`
//! - parallel: `{ lanes }` when waiting for all, `{ winner, result }` otherwise
//! - loop: `{ iterations, lastOutput }`
//! - foreach: `{ results }` in array order
//! - wait: `{ waitedMs }`
//! - suspend: `{ approved, payload }`

use std::time::Duration;

use chrono::Utc;
use futures_util::stream::{self, FuturesUnordered};
use futures_util::{FutureExt, StreamExt};
use railyard_types::{
    BranchConfig, ControlConfig, FieldType, ForeachConfig, LoopConfig, LoopMode, ParallelConfig, Step, SuspendConfig, WaitConfig,
};
use serde_json::{Map, Value, json};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::suspend::SuspendDecision;
use super::{ExecutionScope, Interpreter};
use crate::error::RunError;
use crate::field_paths::json_type_name;
use crate::graph::LaneType;
use crate::resolve::{ConditionContext, eval_condition};
use crate::workflow::bindings::BindingResolver;

impl<'run> Interpreter<'run> {
    pub(super) async fn run_control(
        &self,
        step: &'run Step,
        control: &'run ControlConfig,
        inputs: &Map<String, Value>,
        scope: &mut ExecutionScope,
    ) -> Result<Value, RunError> {
        match control {
            ControlConfig::Branch(branch) => self.run_branch(step, branch, inputs, scope).await,
            ControlConfig::Parallel(parallel) => self.run_parallel(step, parallel, inputs, scope).await,
            ControlConfig::Loop(config) => self.run_loop(step, config, inputs, scope).await,
            ControlConfig::Foreach(foreach) => self.run_foreach(step, foreach, scope).await,
            ControlConfig::Wait(wait) => self.run_wait(step, wait, scope).await,
            ControlConfig::Suspend(suspend) => self.run_suspend(step, suspend, scope).await,
        }
    }

    async fn run_branch(
        &self,
        step: &'run Step,
        branch: &BranchConfig,
        inputs: &Map<String, Value>,
        scope: &mut ExecutionScope,
    ) -> Result<Value, RunError> {
        let selected = {
            let locals = scope.locals(inputs);
            let context = ConditionContext::new(self.run_inputs, &scope.outputs, &locals);
            branch
                .conditions
                .iter()
                .position(|condition| eval_condition(&condition.expression, &context))
                .or_else(|| branch.else_lane())
        };
        let Some(lane) = selected else {
            warn!(step_id = %step.id, "no branch condition matched and no else lane is configured");
            return Ok(Value::Object(Map::new()));
        };
        debug!(step_id = %step.id, lane, "branch lane selected");

        let lane_steps = self.graph.lane_children_of(&step.id, lane, LaneType::Branch);
        let lane_scope = scope.enter_frame(&step.id, Value::Object(inputs.clone()));
        let outcome = self.execute_sequence(lane_steps, lane_scope).await?;
        let result = outcome.last_output.unwrap_or(Value::Null);
        scope.merge_outputs(outcome.scope);

        Ok(json!({ "selectedLane": lane, "result": result }))
    }

    async fn run_parallel(
        &self,
        step: &'run Step,
        parallel: &ParallelConfig,
        inputs: &Map<String, Value>,
        scope: &mut ExecutionScope,
    ) -> Result<Value, RunError> {
        let group = scope.cancel.child_token();
        let decided = CancellationToken::new();
        let frame = Value::Object(inputs.clone());
        let lane_count = parallel.lanes.len();
        debug!(step_id = %step.id, lanes = lane_count, wait_for_all = parallel.wait_for_all, "parallel lanes started");

        let mut lanes = (0..lane_count)
            .map(|lane| {
                let mut lane_scope = scope.enter_frame(&step.id, frame.clone());
                lane_scope.cancel = group.clone();
                if !parallel.wait_for_all {
                    lane_scope.races.push((step.id.clone(), decided.clone()));
                }
                let lane_steps = self.graph.lane_children_of(&step.id, lane, LaneType::Parallel);
                self.execute_sequence(lane_steps, lane_scope).map(move |result| (lane, result))
            })
            .collect::<FuturesUnordered<_>>();

        if parallel.wait_for_all {
            let mut results = vec![Value::Null; lane_count];
            let mut finished = Vec::with_capacity(lane_count);
            let mut failure: Option<RunError> = None;
            while let Some((lane, result)) = lanes.next().await {
                match result {
                    Ok(outcome) => {
                        results[lane] = outcome.last_output.unwrap_or(Value::Null);
                        finished.push(outcome.scope);
                    }
                    Err(error) => {
                        group.cancel();
                        failure = Some(first_failure(failure, error));
                    }
                }
            }
            if let Some(error) = failure {
                return Err(error);
            }
            for lane_scope in finished {
                scope.merge_outputs(lane_scope);
            }
            return Ok(json!({ "lanes": results }));
        }

        let mut winner: Option<(usize, Value, ExecutionScope)> = None;
        let mut failure: Option<RunError> = None;
        while let Some((lane, result)) = lanes.next().await {
            // Once decided, the remaining lanes are only drained.
            if winner.is_some() || failure.is_some() {
                continue;
            }
            match result {
                Ok(outcome) => {
                    decided.cancel();
                    winner = Some((lane, outcome.last_output.unwrap_or(Value::Null), outcome.scope));
                }
                Err(error) => failure = Some(error),
            }
            group.cancel();
        }
        if let Some(error) = failure {
            return Err(error);
        }
        match winner {
            Some((lane, result, lane_scope)) => {
                debug!(step_id = %step.id, lane, "parallel lane won");
                scope.merge_outputs(lane_scope);
                Ok(json!({ "winner": lane, "result": result }))
            }
            None => Ok(json!({ "winner": null, "result": null })),
        }
    }

    async fn run_loop(
        &self,
        step: &'run Step,
        config: &LoopConfig,
        inputs: &Map<String, Value>,
        scope: &mut ExecutionScope,
    ) -> Result<Value, RunError> {
        let max_iterations = config.max_iterations.unwrap_or(self.config.default_max_iterations);
        let body = self.graph.children_of(&step.id);
        let mut iterations: u32 = 0;

        let last_output = loop {
            if scope.cancel.is_cancelled() {
                return Err(scope.cancellation());
            }
            if iterations >= max_iterations {
                warn!(step_id = %step.id, max_iterations, "loop reached its iteration cap");
                return Err(RunError::LoopLimitExceeded {
                    step_id: step.id.clone(),
                    max_iterations,
                });
            }
            let index = iterations as usize;
            iterations += 1;

            let mut body_scope = scope.enter_frame(&step.id, json!({ "iteration": iterations }));
            body_scope.variables.insert("iteration".into(), json!(iterations));
            body_scope.iteration = Some(scope.child_iteration(&step.id, index));
            let outcome = self.execute_sequence(body.clone(), body_scope).await?;
            let last_output = outcome.last_output.unwrap_or(Value::Null);
            scope.merge_outputs(outcome.scope);

            let holds = {
                let mut locals = scope.locals(inputs);
                locals.insert("iteration".into(), json!(iterations));
                let context = ConditionContext::new(self.run_inputs, &scope.outputs, &locals);
                eval_condition(&config.condition, &context)
            };
            let repeat = match config.mode {
                LoopMode::DoWhile => holds,
                LoopMode::DoUntil => !holds,
            };
            if !repeat {
                break last_output;
            }
        };

        info!(step_id = %step.id, iterations, "loop finished");
        Ok(json!({ "iterations": iterations, "lastOutput": last_output }))
    }

    async fn run_foreach(&self, step: &'run Step, foreach: &ForeachConfig, scope: &mut ExecutionScope) -> Result<Value, RunError> {
        let source = BindingResolver::new(self.run_inputs, self.input_definitions, &scope.outputs)
            .resolve_binding(&foreach.array_source, FieldType::Any)
            .map_err(|source| RunError::Binding {
                step_id: step.id.clone(),
                field: "arraySource".into(),
                source,
            })?;
        let items = match source {
            Some(Value::Array(items)) => items,
            other => {
                return Err(RunError::NotAnArray {
                    step_id: step.id.clone(),
                    found: other.as_ref().map_or("undefined", json_type_name).to_string(),
                });
            }
        };

        let concurrency = foreach.concurrency.clamp(1, self.config.max_foreach_concurrency.max(1));
        let total = items.len();
        debug!(step_id = %step.id, items = total, concurrency, "foreach started");

        let group = scope.cancel.child_token();
        let body = self.graph.children_of(&step.id);
        let parent: &ExecutionScope = scope;
        let mut iterations = stream::iter(items.into_iter().enumerate())
            .map(|(index, item)| {
                let mut frame = Map::new();
                frame.insert(foreach.item_variable.clone(), item.clone());
                frame.insert("index".into(), json!(index));

                let mut item_scope = parent.enter_frame(&step.id, Value::Object(frame.clone()));
                item_scope.variables.extend(frame);
                item_scope.iteration = Some(parent.child_iteration(&step.id, index));
                item_scope.cancel = group.clone();
                let body = body.clone();
                let group = group.clone();
                async move {
                    let result = self.execute_sequence(body, item_scope).await;
                    if let Err(error) = &result
                        && !error.is_cancelled()
                    {
                        group.cancel();
                    }
                    result.map(|outcome| outcome.last_output.unwrap_or(item))
                }
            })
            .buffered(concurrency);

        let mut results = Vec::with_capacity(total);
        let mut failure: Option<RunError> = None;
        while let Some(result) = iterations.next().await {
            match result {
                Ok(value) => results.push(value),
                Err(error) => {
                    group.cancel();
                    failure = Some(first_failure(failure, error));
                }
            }
        }
        if let Some(error) = failure {
            return Err(error);
        }

        Ok(json!({ "results": results }))
    }

    async fn run_wait(&self, step: &Step, wait: &WaitConfig, scope: &ExecutionScope) -> Result<Value, RunError> {
        let delay = match (wait.duration_ms, wait.until) {
            (Some(duration_ms), _) => Duration::from_millis(duration_ms),
            (None, Some(until)) => (until - Utc::now()).to_std().unwrap_or(Duration::ZERO),
            (None, None) => Duration::ZERO,
        };
        let waited_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        debug!(step_id = %step.id, waited_ms, "waiting");

        tokio::select! {
            biased;
            _ = scope.cancel.cancelled() => return Err(scope.cancellation()),
            _ = tokio::time::sleep(delay) => {}
        }
        Ok(json!({ "waitedMs": waited_ms }))
    }

    async fn run_suspend(&self, step: &Step, suspend: &SuspendConfig, scope: &ExecutionScope) -> Result<Value, RunError> {
        let receiver = self.gate.register(&step.id);
        self.emitter
            .step_suspended(step, scope.iteration.clone(), suspend.message.clone());
        info!(step_id = %step.id, "step suspended; waiting for approval");

        let decision = tokio::select! {
            biased;
            _ = scope.cancel.cancelled() => None,
            decision = receiver => decision.ok(),
        };
        self.emitter.step_resumed();

        match decision {
            Some(SuspendDecision::Approve(payload)) => {
                info!(step_id = %step.id, "suspended step approved");
                Ok(json!({ "approved": true, "payload": payload }))
            }
            Some(SuspendDecision::Reject(reason)) => Err(RunError::Rejected {
                step_id: step.id.clone(),
                reason,
            }),
            None => Err(scope.cancellation()),
        }
    }
}

/// Keeps the first real failure; cancellations caused by it are secondary.
fn first_failure(current: Option<RunError>, next: RunError) -> RunError {
    match current {
        Some(existing) if !existing.is_cancelled() => existing,
        _ => next,
    }
}
