//! # Railyard Engine
//!
//! The Railyard engine validates and executes step-graph workflows: ordered
//! rails of steps with branch, parallel, loop, foreach, wait and suspend
//! control steps, typed input bindings between steps, and a progress event
//! stream describing every transition of a run.
//!
//! ## Usage
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use railyard_engine::{
//!     AvailableBindings, EchoHandler, HandlerRegistry, ReadyWorkflow, RunRequest, WorkflowRunner, parse_workflow_document,
//! };
//! use railyard_util::EngineConfig;
//!
//! let bundle = parse_workflow_document(r#"
//! id: hello
//! steps:
//!   - id: greet
//!     type: custom-code
//!     code: "return 'hi'"
//! "#)?;
//! let workflow = ReadyWorkflow::check(bundle.select(None)?, &AvailableBindings::default())?;
//! let runner = WorkflowRunner::new(HandlerRegistry::uniform(Arc::new(EchoHandler)), EngineConfig::default());
//!
//! let runtime = tokio::runtime::Runtime::new()?;
//! let report = runtime.block_on(runner.run(&workflow, RunRequest::new(Default::default()), None));
//! assert!(report.is_success());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Architecture
//!
//! - **`graph`**: arena of steps with a scope index, ordering and nesting rules
//! - **`workflow::bindings`**: input binding resolution and static validation
//! - **`resolve`**: condition evaluation for branch and loop steps
//! - **`executor`**: the interpreter, handler trait and suspension gate
//! - **`workflow::runner`**: run preparation, controls and the final report
//! - **`readiness`**: the pre-flight check that gates every run

pub mod coercion;
pub mod error;
pub mod executor;
pub mod field_paths;
pub mod graph;
pub mod readiness;
pub mod resolve;
pub mod workflow;

pub use error::{BindingError, GraphError, ReadinessError, RunError};
pub use executor::{EchoHandler, HandlerContext, HandlerRegistry, StepHandler, SuspendDecision};
pub use graph::{Lane, LaneType, Scope, StepGraph};
pub use readiness::{AvailableBindings, ReadyWorkflow, check_readiness};
pub use workflow::bindings::{BindingReport, BindingResolver, validate_bindings};
pub use workflow::document::{WorkflowBundle, parse_workflow_document, parse_workflow_file};
pub use workflow::runner::{RunReport, RunRequest, WorkflowRunner, drive_workflow_run, prepare_inputs};
pub use workflow::state::ProgressEmitter;
