//! Workflow document loading.
//!
//! A document holds either a single workflow definition or a `workflows:` map
//! keyed by identifier. YAML is a superset of JSON, so both formats go through
//! `serde_yaml`. Authoring order of the map is preserved.

use std::{fs, path::Path};

use anyhow::{Context, Result, bail};
use indexmap::IndexMap;
use railyard_types::WorkflowDefinition;
use serde::Deserialize;
use tracing::debug;

/// Named workflows loaded from one document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorkflowBundle {
    pub workflows: IndexMap<String, WorkflowDefinition>,
}

impl WorkflowBundle {
    /// Picks a workflow by identifier, or the only one when `name` is `None`.
    pub fn select(&self, name: Option<&str>) -> Result<&WorkflowDefinition> {
        match name {
            Some(name) => self
                .workflows
                .get(name)
                .with_context(|| format!("workflow '{name}' is not defined in this document")),
            None if self.workflows.len() == 1 => self
                .workflows
                .values()
                .next()
                .context("document defines no workflows"),
            None => bail!(
                "document defines {} workflows; choose one of: {}",
                self.workflows.len(),
                self.workflows.keys().cloned().collect::<Vec<_>>().join(", ")
            ),
        }
    }
}

#[derive(Deserialize)]
struct MultiWorkflowDocument {
    workflows: IndexMap<String, WorkflowDefinition>,
}

/// Parses a workflow document from a string.
pub fn parse_workflow_document(content: &str) -> Result<WorkflowBundle> {
    // Multi-workflow documents go first so a `workflows:` map is never read as
    // a single definition with every field defaulted.
    if let Ok(document) = serde_yaml::from_str::<MultiWorkflowDocument>(content) {
        let mut workflows = IndexMap::with_capacity(document.workflows.len());
        for (key, mut definition) in document.workflows {
            if definition.id.trim().is_empty() {
                definition.id = key.clone();
            }
            workflows.insert(key, definition);
        }
        debug!(count = workflows.len(), "parsed multi-workflow document");
        return Ok(WorkflowBundle { workflows });
    }

    let mut definition: WorkflowDefinition = serde_yaml::from_str(content).context(
        "unsupported workflow document format; expected a workflow definition with 'id', 'inputs' and 'steps', \
         or a map of definitions under 'workflows'",
    )?;
    if definition.id.trim().is_empty() {
        definition.id = "default".to_string();
    }

    let mut workflows = IndexMap::new();
    workflows.insert(definition.id.clone(), definition);
    Ok(WorkflowBundle { workflows })
}

/// Loads a workflow document from the filesystem.
pub fn parse_workflow_file(file_path: impl AsRef<Path>) -> Result<WorkflowBundle> {
    let file_path = file_path.as_ref();
    let content = fs::read_to_string(file_path).with_context(|| format!("failed to read workflow file: {}", file_path.display()))?;
    parse_workflow_document(&content).with_context(|| format!("failed to parse workflow file: {}", file_path.display()))
}
