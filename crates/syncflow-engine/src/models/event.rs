//! Append-only audit events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Event severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventSeverity {
    Critical,
    High,
    Medium,
    Low,
}

/// Kind of notable occurrence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    /// A workflow run aborted.
    WorkflowError,
    /// A workflow run finished.
    WorkflowCompleted,
    /// A step failed under the `continue` policy.
    StepError,
    /// A connection test failed.
    ConnectionFailed,
    /// A connection test succeeded after an error.
    ConnectionRestored,
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            EventType::WorkflowError => "workflow_error",
            EventType::WorkflowCompleted => "workflow_completed",
            EventType::StepError => "step_error",
            EventType::ConnectionFailed => "connection_failed",
            EventType::ConnectionRestored => "connection_restored",
        };
        write!(f, "{}", s)
    }
}

/// Audit log entry. Only `resolved` changes after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntegrationEvent {
    pub id: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub integration_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub workflow_id: Option<String>,

    pub event_type: EventType,

    pub severity: EventSeverity,

    pub title: String,

    pub description: String,

    #[serde(default)]
    pub payload: serde_json::Value,

    pub timestamp: DateTime<Utc>,

    #[serde(default)]
    pub resolved: bool,
}

impl IntegrationEvent {
    /// Create a new unresolved event.
    pub fn new(
        event_type: EventType,
        severity: EventSeverity,
        title: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            integration_id: None,
            workflow_id: None,
            event_type,
            severity,
            title: title.into(),
            description: description.into(),
            payload: serde_json::Value::Null,
            timestamp: Utc::now(),
            resolved: false,
        }
    }

    /// Attach the integration reference.
    pub fn with_integration(mut self, integration_id: impl Into<String>) -> Self {
        self.integration_id = Some(integration_id.into());
        self
    }

    /// Attach the workflow reference.
    pub fn with_workflow(mut self, workflow_id: impl Into<String>) -> Self {
        self.workflow_id = Some(workflow_id.into());
        self
    }

    /// Attach a payload.
    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }

    /// A workflow run aborted at `step_id`.
    pub fn workflow_error(workflow_id: &str, run_id: &str, step_id: &str, error: &str) -> Self {
        Self::new(
            EventType::WorkflowError,
            EventSeverity::High,
            "Workflow execution failed",
            format!("Workflow {} failed at step {}: {}", workflow_id, step_id, error),
        )
        .with_workflow(workflow_id)
        .with_payload(serde_json::json!({
            "run_id": run_id,
            "step_id": step_id,
            "error": error,
        }))
    }

    /// A step failed but the workflow continued.
    pub fn step_error(workflow_id: &str, run_id: &str, step_id: &str, error: &str) -> Self {
        Self::new(
            EventType::StepError,
            EventSeverity::Medium,
            "Workflow step failed",
            format!("Step {} of workflow {} failed: {}", step_id, workflow_id, error),
        )
        .with_workflow(workflow_id)
        .with_payload(serde_json::json!({
            "run_id": run_id,
            "step_id": step_id,
            "error": error,
        }))
    }
}
