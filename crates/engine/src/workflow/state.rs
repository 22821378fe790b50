//! Run state and progress emission.
//!
//! The [`ProgressEmitter`] owns everything a run reports to the outside: the
//! run status, the per-step [`StepProgress`] table and the optional event
//! channel. Every update takes the same lock, so events leave in causal order
//! even when parallel lanes or foreach iterations report concurrently.

use std::sync::Mutex;
use std::time::Duration;

use chrono::Utc;
use indexmap::IndexMap;
use railyard_types::{ProgressEvent, RunStatus, Step, StepProgress, StepRunStatus};
use serde_json::{Map, Value};
use tokio::sync::mpsc::UnboundedSender;
use tracing::debug;

use crate::graph::StepGraph;

#[derive(Debug)]
struct EmitterState {
    status: RunStatus,
    progress: IndexMap<String, StepProgress>,
    sender: Option<UnboundedSender<ProgressEvent>>,
    /// Suspend steps currently waiting for a decision.
    suspended: usize,
    finished: bool,
}

/// Ordered progress reporting for one run.
#[derive(Debug)]
pub struct ProgressEmitter {
    state: Mutex<EmitterState>,
}

impl ProgressEmitter {
    /// Creates a pending progress record for every step of the graph.
    pub fn new(graph: &StepGraph, sender: Option<UnboundedSender<ProgressEvent>>) -> Self {
        let progress = graph
            .steps()
            .map(|step| (step.id.clone(), StepProgress::pending(step.id.clone())))
            .collect();
        Self {
            state: Mutex::new(EmitterState {
                status: RunStatus::Idle,
                progress,
                sender,
                suspended: 0,
                finished: false,
            }),
        }
    }

    pub fn status(&self) -> RunStatus {
        self.state.lock().expect("progress lock").status
    }

    /// Moves an idle run to running.
    pub fn run_started(&self) {
        let mut state = self.state.lock().expect("progress lock");
        if state.status == RunStatus::Idle {
            state.status = RunStatus::Running;
        }
    }

    pub fn step_started(&self, step: &Step, iteration: Option<String>, inputs: &Map<String, Value>) {
        let now = Utc::now();
        let mut state = self.state.lock().expect("progress lock");
        let record = state
            .progress
            .entry(step.id.clone())
            .or_insert_with(|| StepProgress::pending(step.id.clone()));
        record.status = StepRunStatus::Running;
        record.started_at = Some(now);
        record.finished_at = None;
        record.duration_ms = None;
        record.error = None;
        record.runs += 1;

        send(
            &mut state,
            ProgressEvent::StepStart {
                step_id: step.id.clone(),
                step_name: step.display_name().to_string(),
                iteration,
                inputs: inputs.clone(),
                timestamp: now,
            },
        );
    }

    pub fn step_completed(&self, step: &Step, iteration: Option<String>, output: &Value, elapsed: Duration) {
        let now = Utc::now();
        let duration_ms = millis(elapsed);
        let mut state = self.state.lock().expect("progress lock");
        if let Some(record) = state.progress.get_mut(&step.id) {
            record.status = StepRunStatus::Completed;
            record.output = Some(output.clone());
            record.duration_ms = Some(duration_ms);
            record.finished_at = Some(now);
        }

        send(
            &mut state,
            ProgressEvent::StepComplete {
                step_id: step.id.clone(),
                step_name: step.display_name().to_string(),
                iteration,
                output: output.clone(),
                duration_ms,
                timestamp: now,
            },
        );
    }

    pub fn step_failed(&self, step: &Step, iteration: Option<String>, error: &str, elapsed: Duration) {
        let now = Utc::now();
        let duration_ms = millis(elapsed);
        let mut state = self.state.lock().expect("progress lock");
        if let Some(record) = state.progress.get_mut(&step.id) {
            record.status = StepRunStatus::Failed;
            record.error = Some(error.to_string());
            record.duration_ms = Some(duration_ms);
            record.finished_at = Some(now);
        }

        send(
            &mut state,
            ProgressEvent::StepError {
                step_id: step.id.clone(),
                step_name: step.display_name().to_string(),
                iteration,
                error: error.to_string(),
                duration_ms,
                timestamp: now,
            },
        );
    }

    /// Records that a suspend step is waiting and pauses the run.
    pub fn step_suspended(&self, step: &Step, iteration: Option<String>, message: Option<String>) {
        let mut state = self.state.lock().expect("progress lock");
        state.suspended += 1;
        if !state.status.is_terminal() {
            state.status = RunStatus::Paused;
        }

        send(
            &mut state,
            ProgressEvent::StepSuspended {
                step_id: step.id.clone(),
                step_name: step.display_name().to_string(),
                iteration,
                message,
                timestamp: Utc::now(),
            },
        );
    }

    /// Records that a suspend step received its decision (or was abandoned).
    pub fn step_resumed(&self) {
        let mut state = self.state.lock().expect("progress lock");
        state.suspended = state.suspended.saturating_sub(1);
        if state.suspended == 0 && state.status == RunStatus::Paused {
            state.status = RunStatus::Running;
        }
    }

    /// Emits `workflow-complete`. Only the first terminal event is emitted.
    pub fn workflow_completed(&self, output: Value, elapsed: Duration) {
        let mut state = self.state.lock().expect("progress lock");
        if state.finished {
            return;
        }
        state.finished = true;
        state.status = RunStatus::Completed;

        send(
            &mut state,
            ProgressEvent::WorkflowComplete {
                output,
                total_duration_ms: millis(elapsed),
                timestamp: Utc::now(),
            },
        );
    }

    /// Emits `workflow-error` carrying the outputs of completed steps.
    pub fn workflow_failed(&self, error: &str, failed_step_id: Option<String>, cancelled: bool, elapsed: Duration) {
        let mut state = self.state.lock().expect("progress lock");
        if state.finished {
            return;
        }
        state.finished = true;
        state.status = if cancelled { RunStatus::Cancelled } else { RunStatus::Failed };
        let partial_output = completed_outputs(&state.progress);

        send(
            &mut state,
            ProgressEvent::WorkflowError {
                error: error.to_string(),
                failed_step_id,
                cancelled,
                partial_output,
                total_duration_ms: millis(elapsed),
                timestamp: Utc::now(),
            },
        );
    }

    /// Map of step id to output for every step whose last run completed.
    pub fn partial_output(&self) -> Value {
        completed_outputs(&self.state.lock().expect("progress lock").progress)
    }

    /// Copy of the progress table in graph order.
    pub fn snapshot(&self) -> IndexMap<String, StepProgress> {
        self.state.lock().expect("progress lock").progress.clone()
    }
}

fn completed_outputs(progress: &IndexMap<String, StepProgress>) -> Value {
    let outputs = progress
        .iter()
        .filter(|(_, record)| record.status == StepRunStatus::Completed)
        .filter_map(|(step_id, record)| record.output.clone().map(|output| (step_id.clone(), output)))
        .collect::<Map<String, Value>>();
    Value::Object(outputs)
}

fn send(state: &mut EmitterState, event: ProgressEvent) {
    let Some(sender) = state.sender.as_ref() else {
        return;
    };
    if sender.send(event).is_err() {
        debug!("progress receiver dropped; continuing without events");
        state.sender = None;
    }
}

fn millis(elapsed: Duration) -> u64 {
    u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use railyard_types::{CustomCodeConfig, StepKind};
    use serde_json::json;
    use tokio::sync::mpsc;

    fn graph() -> StepGraph {
        let mut a = Step::new("a", StepKind::CustomCode(CustomCodeConfig::default()));
        a.name = Some("Fetch".into());
        let mut b = Step::new("b", StepKind::CustomCode(CustomCodeConfig::default()));
        b.list_index = 1;
        StepGraph::from_steps(vec![a, b]).expect("graph")
    }

    #[test]
    fn emits_events_in_order_and_tracks_progress() {
        let graph = graph();
        let (sender, mut receiver) = mpsc::unbounded_channel();
        let emitter = ProgressEmitter::new(&graph, Some(sender));
        let a = graph.step("a").expect("step a");
        let b = graph.step("b").expect("step b");

        emitter.run_started();
        emitter.step_started(a, None, &Map::new());
        emitter.step_completed(a, None, &json!({ "total": 1 }), Duration::from_millis(3));
        emitter.step_started(b, None, &Map::new());
        emitter.step_failed(b, None, "boom", Duration::from_millis(1));
        emitter.workflow_failed("boom", Some("b".into()), false, Duration::from_millis(5));
        emitter.workflow_completed(json!({}), Duration::from_millis(5));

        let mut kinds = Vec::new();
        while let Ok(event) = receiver.try_recv() {
            if let ProgressEvent::StepStart { step_name, .. } = &event
                && event.step_id() == Some("a")
            {
                assert_eq!(step_name, "Fetch");
            }
            if let ProgressEvent::WorkflowError { partial_output, .. } = &event {
                assert_eq!(partial_output, &json!({ "a": { "total": 1 } }));
            }
            kinds.push(event.kind());
        }
        assert_eq!(
            kinds,
            vec!["step-start", "step-complete", "step-start", "step-error", "workflow-error"]
        );

        let snapshot = emitter.snapshot();
        assert_eq!(snapshot["a"].status, StepRunStatus::Completed);
        assert_eq!(snapshot["a"].runs, 1);
        assert_eq!(snapshot["b"].error.as_deref(), Some("boom"));
        assert_eq!(emitter.status(), RunStatus::Failed);
    }

    #[test]
    fn suspension_pauses_and_resumes_the_run() {
        let graph = graph();
        let emitter = ProgressEmitter::new(&graph, None);
        let a = graph.step("a").expect("step a");

        emitter.run_started();
        emitter.step_suspended(a, None, Some("approve?".into()));
        assert_eq!(emitter.status(), RunStatus::Paused);
        emitter.step_resumed();
        assert_eq!(emitter.status(), RunStatus::Running);
    }
}
