//! Typed errors raised by the graph model, the binding resolver and the interpreter.

use thiserror::Error;

/// Structural problem in a workflow's step graph.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GraphError {
    #[error("duplicate step id '{0}'")]
    DuplicateStep(String),
    #[error("unknown step '{0}'")]
    UnknownStep(String),
    #[error("step '{step_id}' references missing parent '{parent_id}'")]
    DanglingParent { step_id: String, parent_id: String },
    #[error("step '{step_id}' cannot be nested under '{parent_id}': {control} steps do not own children")]
    InvalidParent {
        step_id: String,
        parent_id: String,
        control: String,
    },
    #[error("step '{step_id}' uses lane {lane} but '{parent_id}' declares {lane_count} lane(s)")]
    LaneOutOfRange {
        step_id: String,
        parent_id: String,
        lane: usize,
        lane_count: usize,
    },
    #[error("step '{0}' sets both branchConditionIndex and parallelLaneIndex")]
    LaneConflict(String),
    #[error("step '{step_id}' is nested under {control} '{parent_id}' but has no matching lane index")]
    MissingLane {
        step_id: String,
        parent_id: String,
        control: String,
    },
    #[error("step '{0}' carries a lane index that does not apply to its parent")]
    UnexpectedLane(String),
    #[error("steps '{first}' and '{second}' share listIndex {list_index} in the same scope")]
    DuplicateListIndex {
        first: String,
        second: String,
        list_index: u32,
    },
    #[error("step '{0}' is part of a parent cycle")]
    Cycle(String),
    #[error("container '{0}' still has child steps")]
    ContainerNotEmpty(String),
    #[error("invalid position {position} for a scope of {len} step(s)")]
    InvalidPosition { position: usize, len: usize },
}

/// Failure resolving one input binding at run time.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BindingError {
    /// A step-output binding points at a step that has not produced output yet.
    #[error("source step '{source_step_id}' has not executed")]
    SourceNotExecuted { source_step_id: String },
}

/// Terminal failure of a run.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RunError {
    #[error("invalid workflow input '{name}': {message}")]
    InvalidInput { name: String, message: String },
    #[error("step '{step_id}' input '{field}': {source}")]
    Binding {
        step_id: String,
        field: String,
        #[source]
        source: BindingError,
    },
    #[error("step '{step_id}' failed: {message}")]
    Handler { step_id: String, message: String },
    #[error("no handler registered for {step_type} step '{step_id}'")]
    MissingHandler { step_id: String, step_type: String },
    #[error("loop '{step_id}' exceeded {max_iterations} iteration(s)")]
    LoopLimitExceeded { step_id: String, max_iterations: u32 },
    #[error("foreach '{step_id}' source is not an array (found {found})")]
    NotAnArray { step_id: String, found: String },
    #[error("step '{step_id}' was rejected: {reason}")]
    Rejected { step_id: String, reason: String },
    #[error("run cancelled")]
    Cancelled,
    /// A first-wins parallel lane stopped because another lane finished first.
    #[error("lane cancelled: another lane of '{parallel_step_id}' finished first")]
    LaneSuperseded { parallel_step_id: String },
}

impl RunError {
    /// Step responsible for the failure, when one is.
    pub fn failed_step_id(&self) -> Option<&str> {
        match self {
            RunError::Binding { step_id, .. }
            | RunError::Handler { step_id, .. }
            | RunError::MissingHandler { step_id, .. }
            | RunError::LoopLimitExceeded { step_id, .. }
            | RunError::NotAnArray { step_id, .. }
            | RunError::Rejected { step_id, .. } => Some(step_id),
            RunError::InvalidInput { .. } | RunError::Cancelled | RunError::LaneSuperseded { .. } => None,
        }
    }

    /// True for both run cancellation and superseded first-wins lanes.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, RunError::Cancelled | RunError::LaneSuperseded { .. })
    }
}

/// The readiness check found blocking problems.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("workflow is not ready to run: {}", problems.join("; "))]
pub struct ReadinessError {
    pub problems: Vec<String>,
}
