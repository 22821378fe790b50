//! Step handler abstraction.
//!
//! Leaf steps (`tool-call`, `custom-code`, `query-table`, `write-table`) are
//! executed by pluggable handlers so the interpreter stays agnostic of the
//! concrete tool, code or table backend. The [`EchoHandler`] echoes its inputs
//! back as output and is used for previews, tests and the CLI.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use railyard_types::{Step, StepType};
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;

/// Run-scoped information available to handlers.
#[derive(Debug, Clone)]
pub struct HandlerContext<'run> {
    pub run_id: &'run str,
    /// Prepared workflow input values of the run.
    pub workflow_inputs: &'run Map<String, Value>,
    /// Cancelled when the run (or the enclosing lane group) is cancelled.
    pub cancellation: CancellationToken,
}

/// Abstraction over leaf step execution.
#[async_trait]
pub trait StepHandler: Send + Sync {
    /// Executes `step` with its resolved `inputs` and returns the step output.
    async fn execute(&self, step: &Step, inputs: &Map<String, Value>, context: &HandlerContext<'_>) -> Result<Value>;
}

/// Maps leaf step types to handlers.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<StepType, Arc<dyn StepHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry that routes every leaf type to the same handler.
    pub fn uniform(handler: Arc<dyn StepHandler>) -> Self {
        let mut registry = Self::new();
        for step_type in [StepType::ToolCall, StepType::CustomCode, StepType::QueryTable, StepType::WriteTable] {
            registry.register(step_type, Arc::clone(&handler));
        }
        registry
    }

    /// Registers `handler` for `step_type`, replacing any previous one.
    pub fn register(&mut self, step_type: StepType, handler: Arc<dyn StepHandler>) -> &mut Self {
        self.handlers.insert(step_type, handler);
        self
    }

    pub fn with(mut self, step_type: StepType, handler: Arc<dyn StepHandler>) -> Self {
        self.register(step_type, handler);
        self
    }

    pub fn get(&self, step_type: StepType) -> Option<&Arc<dyn StepHandler>> {
        self.handlers.get(&step_type)
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut step_types: Vec<&str> = self.handlers.keys().map(StepType::as_str).collect();
        step_types.sort_unstable();
        formatter.debug_struct("HandlerRegistry").field("step_types", &step_types).finish()
    }
}

/// Handler that returns its resolved inputs as output.
#[derive(Debug, Default, Clone, Copy)]
pub struct EchoHandler;

#[async_trait]
impl StepHandler for EchoHandler {
    async fn execute(&self, _step: &Step, inputs: &Map<String, Value>, _context: &HandlerContext<'_>) -> Result<Value> {
        Ok(Value::Object(inputs.clone()))
    }
}
