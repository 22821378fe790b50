//! Run-time status, progress events and run controls.
//!
//! These types are produced by the engine during a run and consumed by a UI,
//! a log, or the CLI. They serialize to the JSON wire shape of the progress
//! stream (`type` discriminator, camelCase fields).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map as JsonMap, Value};

/// Lifecycle state of a whole run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    #[default]
    Idle,
    Running,
    /// A suspend step is waiting for an approval signal.
    Paused,
    Completed,
    Failed,
    /// Terminated by the cancellation signal; a failure variant.
    Cancelled,
}

impl RunStatus {
    /// True once the run can no longer change state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunStatus::Completed | RunStatus::Failed | RunStatus::Cancelled)
    }
}

/// Lifecycle state of a single step within a run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum StepRunStatus {
    #[default]
    Pending,
    Running,
    Completed,
    Failed,
}

/// Per-step runtime record, created at run start and updated as the run advances.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct StepProgress {
    pub step_id: String,
    pub status: StepRunStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    /// Number of times the step started (greater than one inside loops).
    #[serde(default)]
    pub runs: u32,
}

impl StepProgress {
    /// Creates a pending record for the given step.
    pub fn pending(step_id: impl Into<String>) -> Self {
        Self {
            step_id: step_id.into(),
            ..Default::default()
        }
    }
}

/// Ordered progress event emitted by a run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ProgressEvent {
    #[serde(rename_all = "camelCase")]
    StepStart {
        step_id: String,
        step_name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        iteration: Option<String>,
        inputs: JsonMap<String, Value>,
        timestamp: DateTime<Utc>,
    },
    #[serde(rename_all = "camelCase")]
    StepComplete {
        step_id: String,
        step_name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        iteration: Option<String>,
        output: Value,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },
    #[serde(rename_all = "camelCase")]
    StepError {
        step_id: String,
        step_name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        iteration: Option<String>,
        error: String,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },
    /// A suspend step is waiting for approval.
    #[serde(rename_all = "camelCase")]
    StepSuspended {
        step_id: String,
        step_name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        iteration: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
        timestamp: DateTime<Utc>,
    },
    #[serde(rename_all = "camelCase")]
    WorkflowComplete {
        output: Value,
        total_duration_ms: u64,
        timestamp: DateTime<Utc>,
    },
    #[serde(rename_all = "camelCase")]
    WorkflowError {
        error: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        failed_step_id: Option<String>,
        #[serde(default)]
        cancelled: bool,
        /// Outputs of the steps that completed before the failure.
        #[serde(default)]
        partial_output: Value,
        total_duration_ms: u64,
        timestamp: DateTime<Utc>,
    },
}

impl ProgressEvent {
    /// Step identifier for step-scoped events.
    pub fn step_id(&self) -> Option<&str> {
        match self {
            ProgressEvent::StepStart { step_id, .. }
            | ProgressEvent::StepComplete { step_id, .. }
            | ProgressEvent::StepError { step_id, .. }
            | ProgressEvent::StepSuspended { step_id, .. } => Some(step_id),
            ProgressEvent::WorkflowComplete { .. } | ProgressEvent::WorkflowError { .. } => None,
        }
    }

    /// Wire name of the event type.
    pub fn kind(&self) -> &'static str {
        match self {
            ProgressEvent::StepStart { .. } => "step-start",
            ProgressEvent::StepComplete { .. } => "step-complete",
            ProgressEvent::StepError { .. } => "step-error",
            ProgressEvent::StepSuspended { .. } => "step-suspended",
            ProgressEvent::WorkflowComplete { .. } => "workflow-complete",
            ProgressEvent::WorkflowError { .. } => "workflow-error",
        }
    }

    /// True for `workflow-complete` and `workflow-error`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ProgressEvent::WorkflowComplete { .. } | ProgressEvent::WorkflowError { .. })
    }

    /// True when the event belongs to an internal bookkeeping step whose id
    /// starts with `internal_prefix`; UIs filter these out.
    pub fn is_internal(&self, internal_prefix: &str) -> bool {
        !internal_prefix.is_empty() && self.step_id().is_some_and(|step_id| step_id.starts_with(internal_prefix))
    }
}

/// Control signal sent to an in-flight run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RunControl {
    /// Abort the run; in-flight handlers are asked to stop.
    Cancel,
    /// Release a suspended step.
    #[serde(rename_all = "camelCase")]
    Approve {
        step_id: String,
        #[serde(default)]
        payload: Value,
    },
    /// Fail a suspended step.
    #[serde(rename_all = "camelCase")]
    Reject { step_id: String, reason: String },
}

/// Result of the pre-flight readiness check.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ReadinessReport {
    pub can_execute: bool,
    pub errors: Vec<String>,
    /// Advisory findings that do not block the run (for example type mismatches).
    #[serde(default)]
    pub warnings: Vec<String>,
    pub missing_connections: Vec<String>,
    pub resolved_connections: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn step_events_serialize_to_wire_shape() {
        let event = ProgressEvent::StepComplete {
            step_id: "a".into(),
            step_name: "Fetch".into(),
            iteration: None,
            output: json!({ "total": 42 }),
            duration_ms: 5,
            timestamp: Utc::now(),
        };

        let value = serde_json::to_value(&event).expect("serialize event");
        assert_eq!(value["type"], "step-complete");
        assert_eq!(value["stepId"], "a");
        assert_eq!(value["stepName"], "Fetch");
        assert_eq!(value["durationMs"], 5);
        assert!(value.get("iteration").is_none());
    }

    #[test]
    fn internal_steps_are_detected_by_prefix() {
        let event = ProgressEvent::StepStart {
            step_id: "__mapping".into(),
            step_name: "mapping".into(),
            iteration: None,
            inputs: JsonMap::new(),
            timestamp: Utc::now(),
        };
        assert!(event.is_internal("__"));
        assert!(!event.is_internal(""));
        assert!(!event.is_terminal());
    }

    #[test]
    fn run_control_round_trips() {
        let control: RunControl =
            serde_json::from_value(json!({ "type": "approve", "stepId": "gate", "payload": { "ok": true } })).expect("parse");
        assert_eq!(
            control,
            RunControl::Approve {
                step_id: "gate".into(),
                payload: json!({ "ok": true })
            }
        );
    }
}
