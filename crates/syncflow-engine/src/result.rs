//! Step, run and connection-test result types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Status of one executed step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    /// Step executed successfully.
    Success,
    /// Step failed (error, `success: false` result, or timeout).
    Failed,
}

impl StepStatus {
    /// Returns true if the status indicates success.
    pub fn is_success(&self) -> bool {
        matches!(self, StepStatus::Success)
    }
}

impl std::fmt::Display for StepStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StepStatus::Success => write!(f, "success"),
            StepStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Result of one step within a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResult {
    pub step_id: String,

    /// Step type (api_call, data_transform, ...).
    pub kind: String,

    pub status: StepStatus,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Integration touched by an api_call step.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub integration_id: Option<String>,

    /// Number of attempts made (1 unless retried).
    pub attempts: u32,

    pub duration_ms: u64,
}

impl StepResult {
    /// Create a successful step result.
    pub fn success(step_id: impl Into<String>, kind: &str, data: serde_json::Value) -> Self {
        Self {
            step_id: step_id.into(),
            kind: kind.to_string(),
            status: StepStatus::Success,
            data: Some(data),
            error: None,
            integration_id: None,
            attempts: 1,
            duration_ms: 0,
        }
    }

    /// Create a failed step result.
    pub fn failed(step_id: impl Into<String>, kind: &str, error: impl Into<String>) -> Self {
        Self {
            step_id: step_id.into(),
            kind: kind.to_string(),
            status: StepStatus::Failed,
            data: None,
            error: Some(error.into()),
            integration_id: None,
            attempts: 1,
            duration_ms: 0,
        }
    }

    /// Set the execution duration.
    pub fn with_duration(mut self, duration_ms: u64) -> Self {
        self.duration_ms = duration_ms;
        self
    }

    /// Set the attempt count.
    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }

    /// Set the integration reference.
    pub fn with_integration(mut self, integration_id: Option<String>) -> Self {
        self.integration_id = integration_id;
        self
    }

    /// Returns true if the step succeeded.
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
}

/// Lifecycle of a single workflow run. There is no paused state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Pending,
    Running,
    Completed,
    Failed,
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunState::Pending => write!(f, "pending"),
            RunState::Running => write!(f, "running"),
            RunState::Completed => write!(f, "completed"),
            RunState::Failed => write!(f, "failed"),
        }
    }
}

/// Outcome of a completed workflow run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowRunResult {
    pub workflow_id: String,

    pub run_id: String,

    /// False when any step failed under the `continue` policy.
    pub success: bool,

    pub state: RunState,

    /// Per-step results in execution order.
    pub results: Vec<StepResult>,

    /// Data threaded out of the last producing step.
    pub output: serde_json::Value,

    /// Total wall-clock execution time in milliseconds.
    pub execution_time_ms: u64,
}

impl WorkflowRunResult {
    /// Results of failed steps.
    pub fn failed_steps(&self) -> impl Iterator<Item = &StepResult> {
        self.results.iter().filter(|r| !r.is_success())
    }
}

/// Ephemeral outcome of one connection test.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestResult {
    pub timestamp: DateTime<Utc>,

    pub success: bool,

    pub response_time_ms: u64,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TestResult {
    /// Successful test.
    pub fn passed(response_time_ms: u64) -> Self {
        Self {
            timestamp: Utc::now(),
            success: true,
            response_time_ms,
            status_code: Some(200),
            error: None,
        }
    }

    /// Failed test.
    pub fn failed(response_time_ms: u64, status_code: Option<u16>, error: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            success: false,
            response_time_ms,
            status_code,
            error: Some(error.into()),
        }
    }
}
