//! Shared type definitions for Railyard workflows.
//!
//! - [`workflow`] holds the authored data model (steps, bindings, inputs).
//! - [`progress`] holds run-time status, progress events and run controls.

pub mod progress;
pub mod workflow;

pub use progress::{ProgressEvent, ReadinessReport, RunControl, RunStatus, StepProgress, StepRunStatus};
pub use workflow::{
    BranchCondition, BranchConfig, ControlConfig, CustomCodeConfig, FieldBinding, FieldSchema, FieldType, ForeachConfig, LoopConfig,
    LoopMode, ParallelConfig, ParallelLane, Step, StepKind, StepType, SuspendConfig, TableConfig, ToolCallConfig, WaitConfig,
    WorkflowDefinition, WorkflowInputDefinition, WorkflowInputValidation,
};
