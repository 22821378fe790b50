//! Workflow-level runtime pieces.
//!
//! - `bindings` resolves and validates step input bindings
//! - `condition_syntax` validates branch and loop condition expressions
//! - `document` loads workflow documents from YAML or JSON
//! - `runner` drives a ready workflow to completion
//! - `state` owns run status, step progress and event emission

pub mod bindings;
pub mod condition_syntax;
pub mod document;
pub mod runner;
pub mod state;
