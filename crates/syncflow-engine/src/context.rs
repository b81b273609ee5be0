//! Data threaded between the steps of one workflow run.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::value::resolve_path;

/// Run-scoped context passed from step to step.
///
/// Merge policy:
/// - `initial` holds the run's initial data and never changes.
/// - `data` is the current pipeline value. It starts as `initial` and is
///   replaced by the output of every step that produces data.
/// - `steps` records each step's output by step id, including steps that
///   do not replace `data` (notifications, bare condition outcomes).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct WorkflowContext {
    /// Workflow being executed.
    pub workflow_id: String,

    /// Unique id of this run.
    pub run_id: String,

    /// Initial data supplied by the caller.
    pub initial: Value,

    /// Current pipeline value.
    pub data: Value,

    /// Outputs by step id.
    #[serde(default)]
    pub steps: HashMap<String, Value>,

    /// Step currently executing.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_step: Option<String>,
}

impl WorkflowContext {
    /// Create a context for a new run.
    pub fn new(workflow_id: impl Into<String>, initial: Value) -> Self {
        Self {
            workflow_id: workflow_id.into(),
            run_id: uuid::Uuid::new_v4().to_string(),
            data: initial.clone(),
            initial,
            steps: HashMap::new(),
            current_step: None,
        }
    }

    /// Record a step output, replacing `data` when the step pipes it forward.
    pub fn record(&mut self, step_id: &str, output: Value, pipe: bool) {
        if pipe {
            self.data = output.clone();
        }
        self.steps.insert(step_id.to_string(), output);
    }

    /// Get a recorded step output.
    pub fn step_output(&self, step_id: &str) -> Option<&Value> {
        self.steps.get(step_id)
    }

    /// The scope visible to input paths and templates.
    pub fn scope(&self) -> Value {
        let steps: Map<String, Value> = self
            .steps
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        serde_json::json!({
            "workflow_id": self.workflow_id,
            "run_id": self.run_id,
            "initial": self.initial,
            "data": self.data,
            "steps": steps,
        })
    }

    /// Resolve a step input: the value at `path` in the scope, or `data`.
    pub fn input_for(&self, path: Option<&str>) -> Value {
        match path {
            Some(path) => resolve_path(&self.scope(), path)
                .cloned()
                .unwrap_or(Value::Null),
            None => self.data.clone(),
        }
    }

    /// Template context for rendering step configs.
    pub fn to_template_context(&self, input: &Value) -> HashMap<String, Value> {
        let mut ctx: HashMap<String, Value> = match self.scope() {
            Value::Object(map) => map.into_iter().collect(),
            _ => HashMap::new(),
        };
        ctx.insert("input".to_string(), input.clone());
        if let Some(ref step) = self.current_step {
            ctx.insert("step".to_string(), Value::String(step.clone()));
        }
        ctx
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_context_new() {
        let ctx = WorkflowContext::new("wf-1", json!({"since": "2024-01-01"}));
        assert_eq!(ctx.workflow_id, "wf-1");
        assert_eq!(ctx.data, ctx.initial);
        assert!(!ctx.run_id.is_empty());
    }

    #[test]
    fn test_record_pipe_policy() {
        let mut ctx = WorkflowContext::new("wf", json!({"n": 1}));
        ctx.record("fetch", json!([1, 2, 3]), true);
        assert_eq!(ctx.data, json!([1, 2, 3]));

        ctx.record("notify", json!({"sent": true}), false);
        assert_eq!(ctx.data, json!([1, 2, 3]));
        assert_eq!(ctx.step_output("notify"), Some(&json!({"sent": true})));
    }

    #[test]
    fn test_input_for_paths() {
        let mut ctx = WorkflowContext::new("wf", json!({"user": {"id": 7}}));
        ctx.record("fetch", json!({"records": [{"id": "r1"}]}), true);

        assert_eq!(ctx.input_for(None), json!({"records": [{"id": "r1"}]}));
        assert_eq!(ctx.input_for(Some("initial.user.id")), json!(7));
        assert_eq!(ctx.input_for(Some("steps.fetch.records.0.id")), json!("r1"));
        assert_eq!(ctx.input_for(Some("steps.missing")), Value::Null);
    }

    #[test]
    fn test_template_context() {
        let mut ctx = WorkflowContext::new("wf", json!({}));
        ctx.current_step = Some("post".to_string());
        let tctx = ctx.to_template_context(&json!({"name": "Ada"}));
        assert_eq!(tctx.get("input"), Some(&json!({"name": "Ada"})));
        assert_eq!(tctx.get("step"), Some(&json!("post")));
        assert_eq!(tctx.get("workflow_id"), Some(&json!("wf")));
    }
}
