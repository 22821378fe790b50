//! Strongly typed workflow schema definitions shared by the engine and the CLI.
//!
//! A workflow is authored as a flat list of steps. Nesting is expressed through
//! `parentId` plus an optional lane index, and sibling order through `listIndex`.
//! The engine turns that flat list into an indexed graph; these types only carry
//! the authored data and round-trip it through serde unchanged.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

pub mod validation;

/// Fully authored workflow definition.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowDefinition {
    /// Canonical workflow identifier.
    #[serde(default)]
    pub id: String,
    /// Optional human-readable name for menus.
    #[serde(default)]
    pub name: Option<String>,
    /// Optional descriptive copy.
    #[serde(default)]
    pub description: Option<String>,
    /// Declared run-time inputs, in authoring order.
    #[serde(default)]
    pub inputs: Vec<WorkflowInputDefinition>,
    /// Flat list of every step in the workflow.
    #[serde(default)]
    pub steps: Vec<Step>,
}

impl WorkflowDefinition {
    /// Looks up an input definition by name.
    pub fn input(&self, name: &str) -> Option<&WorkflowInputDefinition> {
        self.inputs.iter().find(|input| input.name == name)
    }
}

/// A single node of the workflow graph.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Step {
    /// Unique step identifier referenced by bindings.
    pub id: String,
    /// Optional display name surfaced in progress events.
    #[serde(default)]
    pub name: Option<String>,
    /// Sibling order within the parent scope.
    #[serde(default)]
    pub list_index: u32,
    /// Enclosing container or branching step.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    /// Branch lane owning this step when the parent is a `branch`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch_condition_index: Option<usize>,
    /// Parallel lane owning this step when the parent is a `parallel`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parallel_lane_index: Option<usize>,
    /// Type-specific payload.
    #[serde(flatten)]
    pub kind: StepKind,
    /// Input fields the step expects.
    #[serde(default)]
    pub input_schema: Vec<FieldSchema>,
    /// Output fields the step produces.
    #[serde(default)]
    pub output_schema: Vec<FieldSchema>,
    /// Input bindings keyed by input field name.
    #[serde(default)]
    pub bindings: IndexMap<String, FieldBinding>,
}

impl Step {
    /// Creates a step on the top-level rail with no schema or bindings.
    pub fn new(id: impl Into<String>, kind: StepKind) -> Self {
        Self {
            id: id.into(),
            name: None,
            list_index: 0,
            parent_id: None,
            branch_condition_index: None,
            parallel_lane_index: None,
            kind,
            input_schema: Vec::new(),
            output_schema: Vec::new(),
            bindings: IndexMap::new(),
        }
    }

    /// Name shown to users, falling back to the identifier.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().filter(|name| !name.trim().is_empty()).unwrap_or(&self.id)
    }

    /// Returns the step type discriminator.
    pub fn step_type(&self) -> StepType {
        self.kind.step_type()
    }

    /// Returns the control configuration for control steps.
    pub fn control(&self) -> Option<&ControlConfig> {
        match &self.kind {
            StepKind::Control(control) => Some(control),
            _ => None,
        }
    }

    /// True for `loop`, `foreach`, `branch` and `parallel` steps.
    pub fn is_container(&self) -> bool {
        self.control().is_some_and(ControlConfig::owns_children)
    }

    /// Finds a declared input field by name.
    pub fn input_field(&self, name: &str) -> Option<&FieldSchema> {
        self.input_schema.iter().find(|field| field.name == name)
    }

    /// Finds a declared output field by name.
    pub fn output_field(&self, name: &str) -> Option<&FieldSchema> {
        self.output_schema.iter().find(|field| field.name == name)
    }
}

/// Type-specific step payload, discriminated by `type`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum StepKind {
    /// Call to an external tool through a credential-bound connection.
    ToolCall(ToolCallConfig),
    /// User supplied code.
    CustomCode(CustomCodeConfig),
    /// Read rows from a table.
    QueryTable(TableConfig),
    /// Write rows to a table.
    WriteTable(TableConfig),
    /// Control-flow construct.
    Control(ControlConfig),
}

impl StepKind {
    /// Returns the step type discriminator.
    pub fn step_type(&self) -> StepType {
        match self {
            StepKind::ToolCall(_) => StepType::ToolCall,
            StepKind::CustomCode(_) => StepType::CustomCode,
            StepKind::QueryTable(_) => StepType::QueryTable,
            StepKind::WriteTable(_) => StepType::WriteTable,
            StepKind::Control(_) => StepType::Control,
        }
    }
}

/// Step type discriminator without payload.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum StepType {
    ToolCall,
    CustomCode,
    QueryTable,
    WriteTable,
    Control,
}

impl StepType {
    /// Wire name of the type (for example `tool-call`).
    pub fn as_str(&self) -> &'static str {
        match self {
            StepType::ToolCall => "tool-call",
            StepType::CustomCode => "custom-code",
            StepType::QueryTable => "query-table",
            StepType::WriteTable => "write-table",
            StepType::Control => "control",
        }
    }
}

impl std::fmt::Display for StepType {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Payload of a `tool-call` step.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallConfig {
    /// Identifier of the external tool to invoke.
    #[serde(default)]
    pub tool_id: String,
    /// Connection providing the upstream credential.
    #[serde(default)]
    pub connection_id: Option<String>,
}

/// Payload of a `custom-code` step.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct CustomCodeConfig {
    /// Source code executed by the custom-code handler.
    #[serde(default)]
    pub code: String,
    /// Optional language hint.
    #[serde(default)]
    pub language: Option<String>,
}

/// Payload shared by `query-table` and `write-table` steps.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct TableConfig {
    /// Referenced table.
    #[serde(default)]
    pub table_id: Option<String>,
}

/// Control-flow configuration, discriminated by `controlType` with the payload
/// carried in `controlConfig`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "controlType", content = "controlConfig", rename_all = "kebab-case")]
pub enum ControlConfig {
    Branch(BranchConfig),
    Parallel(ParallelConfig),
    Loop(LoopConfig),
    Foreach(ForeachConfig),
    Wait(WaitConfig),
    Suspend(SuspendConfig),
}

impl ControlConfig {
    /// Wire name of the control type.
    pub fn control_type(&self) -> &'static str {
        match self {
            ControlConfig::Branch(_) => "branch",
            ControlConfig::Parallel(_) => "parallel",
            ControlConfig::Loop(_) => "loop",
            ControlConfig::Foreach(_) => "foreach",
            ControlConfig::Wait(_) => "wait",
            ControlConfig::Suspend(_) => "suspend",
        }
    }

    /// True when the construct executes child steps.
    pub fn owns_children(&self) -> bool {
        matches!(
            self,
            ControlConfig::Branch(_) | ControlConfig::Parallel(_) | ControlConfig::Loop(_) | ControlConfig::Foreach(_)
        )
    }
}

/// Ordered branch conditions plus an optional else lane.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct BranchConfig {
    /// Conditions evaluated in order; condition `i` owns lane `i`.
    #[serde(default)]
    pub conditions: Vec<BranchCondition>,
    /// When true, lane `conditions.len()` runs if nothing matched.
    #[serde(default)]
    pub has_else: bool,
}

impl BranchConfig {
    /// Number of lanes declared, including the else lane.
    pub fn lane_count(&self) -> usize {
        self.conditions.len() + usize::from(self.has_else)
    }

    /// Index of the else lane, when configured.
    pub fn else_lane(&self) -> Option<usize> {
        self.has_else.then_some(self.conditions.len())
    }
}

/// One branch condition.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct BranchCondition {
    /// Expression evaluated against the branch scope.
    pub expression: String,
    /// Optional label shown in the editor.
    #[serde(default)]
    pub label: Option<String>,
}

/// Parallel lane list and join policy.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ParallelConfig {
    /// Declared lanes.
    #[serde(default)]
    pub lanes: Vec<ParallelLane>,
    /// Wait for every lane (default) or only the first one to finish.
    #[serde(default = "default_true")]
    pub wait_for_all: bool,
}

impl Default for ParallelConfig {
    fn default() -> Self {
        Self {
            lanes: Vec::new(),
            wait_for_all: true,
        }
    }
}

/// One parallel lane.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ParallelLane {
    #[serde(default)]
    pub name: Option<String>,
}

/// Loop predicate and safety cap.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct LoopConfig {
    /// Predicate evaluated after each iteration.
    pub condition: String,
    /// Whether the body repeats while or until the predicate holds.
    #[serde(default)]
    pub mode: LoopMode,
    /// Maximum number of body executions; the engine default applies when absent.
    #[serde(default)]
    pub max_iterations: Option<u32>,
}

/// Loop continuation mode.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum LoopMode {
    /// Repeat while the condition holds.
    #[default]
    DoWhile,
    /// Repeat until the condition holds.
    DoUntil,
}

/// Foreach array source, item variable and concurrency.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ForeachConfig {
    /// Binding producing the array to iterate.
    pub array_source: FieldBinding,
    /// Iterations allowed in flight at once; 1 runs strictly sequentially.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Name under which each element is exposed to the body.
    #[serde(default = "default_item_variable")]
    pub item_variable: String,
}

/// Fixed delay or wall-clock deadline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct WaitConfig {
    #[serde(default)]
    pub duration_ms: Option<u64>,
    #[serde(default)]
    pub until: Option<DateTime<Utc>>,
}

/// Human approval gate.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct SuspendConfig {
    /// Prompt shown to the approver.
    #[serde(default)]
    pub message: Option<String>,
}

/// Declared field of an input or output schema.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FieldSchema {
    pub name: String,
    #[serde(default)]
    pub r#type: FieldType,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub description: Option<String>,
}

impl FieldSchema {
    /// Creates a field with the given name and type.
    pub fn new(name: impl Into<String>, r#type: FieldType, required: bool) -> Self {
        Self {
            name: name.into(),
            r#type,
            required,
            description: None,
        }
    }
}

/// Primitive field types understood by the resolver.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    Number,
    Integer,
    Boolean,
    Object,
    Array,
    /// Untyped; matches anything exactly.
    #[default]
    Any,
}

impl FieldType {
    /// Infers the field type of a concrete JSON value. Returns `None` for null.
    pub fn of_value(value: &JsonValue) -> Option<FieldType> {
        match value {
            JsonValue::Null => None,
            JsonValue::Bool(_) => Some(FieldType::Boolean),
            JsonValue::Number(number) if number.is_i64() || number.is_u64() => Some(FieldType::Integer),
            JsonValue::Number(_) => Some(FieldType::Number),
            JsonValue::String(_) => Some(FieldType::String),
            JsonValue::Array(_) => Some(FieldType::Array),
            JsonValue::Object(_) => Some(FieldType::Object),
        }
    }

    /// Wire name of the type.
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::String => "string",
            FieldType::Number => "number",
            FieldType::Integer => "integer",
            FieldType::Boolean => "boolean",
            FieldType::Object => "object",
            FieldType::Array => "array",
            FieldType::Any => "any",
        }
    }
}

/// Source of one input field's value, discriminated by `sourceType`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "sourceType", rename_all = "kebab-case")]
pub enum FieldBinding {
    /// Value read from a prior step's output.
    #[serde(rename_all = "camelCase")]
    StepOutput {
        source_step_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        source_path: Option<String>,
    },
    /// Value read from a workflow-level input.
    #[serde(rename_all = "camelCase")]
    WorkflowInput { workflow_input_name: String },
    /// Fixed value coerced to the field's declared type.
    #[serde(rename_all = "camelCase")]
    Literal { literal_value: JsonValue },
}

impl FieldBinding {
    /// Shorthand for a step-output binding.
    pub fn step_output(source_step_id: impl Into<String>, source_path: Option<&str>) -> Self {
        FieldBinding::StepOutput {
            source_step_id: source_step_id.into(),
            source_path: source_path.map(str::to_string),
        }
    }

    /// Shorthand for a workflow-input binding.
    pub fn workflow_input(name: impl Into<String>) -> Self {
        FieldBinding::WorkflowInput {
            workflow_input_name: name.into(),
        }
    }

    /// Shorthand for a literal binding.
    pub fn literal(value: JsonValue) -> Self {
        FieldBinding::Literal { literal_value: value }
    }
}

/// Declared workflow-level input.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowInputDefinition {
    pub name: String,
    #[serde(default = "default_input_type")]
    pub r#type: FieldType,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub default_value: Option<JsonValue>,
    #[serde(default)]
    pub description: Option<String>,
    /// Declarative constraints checked against run-time values.
    #[serde(default)]
    pub validate: Option<WorkflowInputValidation>,
}

impl WorkflowInputDefinition {
    /// Creates an optional input of the given type without default.
    pub fn new(name: impl Into<String>, r#type: FieldType) -> Self {
        Self {
            name: name.into(),
            r#type,
            required: false,
            default_value: None,
            description: None,
            validate: None,
        }
    }
}

/// Declarative validation settings attached to an input.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowInputValidation {
    /// Enumerated set of allowed values, if constrained.
    #[serde(rename = "enum")]
    #[serde(default)]
    pub allowed_values: Vec<JsonValue>,
    /// Regular expression the value must match, when provided.
    #[serde(default)]
    pub pattern: Option<String>,
    #[serde(default)]
    pub min_length: Option<usize>,
    #[serde(default)]
    pub max_length: Option<usize>,
}

const fn default_true() -> bool {
    true
}

const fn default_concurrency() -> usize {
    1
}

fn default_item_variable() -> String {
    "item".to_string()
}

const fn default_input_type() -> FieldType {
    FieldType::String
}
