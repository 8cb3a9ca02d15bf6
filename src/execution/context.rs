//! Execution Context
//!
//! Holds the layered variable bindings available for interpolation during
//! one flow run: a flat variable map (environment parameters merged with the
//! flow's `env` block) and the outputs of previously completed steps.
//!
//! The context is extended only after a step completes, so a step can never
//! observe its own output or the output of a step that has not yet run.

use std::collections::HashMap;

use serde_json::Value;

use crate::flow::OutputData;

/// Layered variable bindings for one flow execution.
#[derive(Debug, Clone, Default)]
pub struct VariableContext {
    variables: HashMap<String, String>,
    step_outputs: HashMap<String, OutputData>,
}

impl VariableContext {
    /// Creates a context from caller-provided variables and the flow's
    /// `env` block. Caller variables win on name collisions.
    pub fn new(variables: &HashMap<String, String>, env: &HashMap<String, String>) -> Self {
        let mut merged = env.clone();
        for (key, value) in variables {
            merged.insert(key.clone(), value.clone());
        }

        Self {
            variables: merged,
            step_outputs: HashMap::new(),
        }
    }

    /// Looks up a plain variable by name.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.variables.get(key).map(String::as_str)
    }

    /// Sets a variable value.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.variables.insert(key.into(), value.into());
    }

    /// Records the output of a completed step.
    pub fn set_step_output(&mut self, step_id: &str, output: OutputData) {
        self.step_outputs.insert(step_id.to_string(), output);
    }

    /// Adds or overwrites a single key in a step's recorded output.
    ///
    /// Used for declared `output:` extractions, which overlay friendly keys
    /// on top of the raw action output.
    pub fn set_step_output_key(&mut self, step_id: &str, key: &str, value: Value) {
        self.step_outputs
            .entry(step_id.to_string())
            .or_default()
            .insert(key.to_string(), value);
    }

    /// Resolves a dot path rooted at a step id against recorded outputs.
    ///
    /// Numeric path segments index into arrays. Returns `None` when the
    /// step has not completed or the path does not exist.
    pub fn step_output_path(&self, step_id: &str, path: &str) -> Option<&Value> {
        let outputs = self.step_outputs.get(step_id)?;
        let mut segments = path.split('.');

        let first = segments.next()?;
        let mut current = outputs.get(first)?;

        for segment in segments {
            current = match current {
                Value::Object(map) => map.get(segment)?,
                Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }

        Some(current)
    }

    /// Returns true if the given step has recorded output.
    pub fn has_step_output(&self, step_id: &str) -> bool {
        self.step_outputs.contains_key(step_id)
    }
}
