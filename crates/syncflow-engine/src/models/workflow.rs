//! Workflow definitions and step actions.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::condition::Condition;
use crate::error::{EngineError, EngineResult};
use crate::transform::TransformConfig;

/// Workflow status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    #[default]
    Active,
    Inactive,
    Running,
    Error,
}

impl std::fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkflowStatus::Active => write!(f, "active"),
            WorkflowStatus::Inactive => write!(f, "inactive"),
            WorkflowStatus::Running => write!(f, "running"),
            WorkflowStatus::Error => write!(f, "error"),
        }
    }
}

/// What the orchestrator does when a step fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ErrorHandling {
    /// Abort the run at the first failing step.
    #[default]
    Stop,
    /// Record the failure and move on to the next step.
    Continue,
    /// Re-run the failing step with backoff, then abort.
    Retry,
}

/// Retry configuration for the `retry` policy.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetryConfig {
    /// Maximum number of retries after the first attempt.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Initial delay between retries in milliseconds.
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,

    /// Maximum delay between retries in milliseconds.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Exponential backoff multiplier.
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
}

/// Upper bound accepted for `max_retries`.
pub const MAX_RETRIES: u32 = 100;

fn default_max_retries() -> u32 {
    3
}

fn default_initial_delay_ms() -> u64 {
    500
}

fn default_max_delay_ms() -> u64 {
    10000
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            backoff_multiplier: default_backoff_multiplier(),
        }
    }
}

impl RetryConfig {
    /// Delay before retry number `retry` (0-indexed), capped at `max_delay_ms`.
    pub fn delay_for(&self, retry: u32) -> Duration {
        let exponent = retry.min(i32::MAX as u32) as i32;
        let delay = self.initial_delay_ms as f64 * self.backoff_multiplier.powi(exponent);
        Duration::from_millis(delay.min(self.max_delay_ms as f64) as u64)
    }
}

/// Configuration for `api_call` steps.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApiCallConfig {
    /// Integration to call through.
    pub integration_id: String,

    /// Provider-relative endpoint (table, API method, resource path).
    pub endpoint: String,

    /// One of get, post, put, delete.
    #[serde(default = "default_api_method")]
    pub method: String,

    /// Query parameters for reads.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,

    /// Request body for writes; the step input is sent when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<serde_json::Value>,
}

fn default_api_method() -> String {
    "get".to_string()
}

/// Configuration for `condition` steps.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConditionStepConfig {
    #[serde(default)]
    pub conditions: Vec<Condition>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub true_action: Option<Box<StepAction>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub false_action: Option<Box<StepAction>>,
}

/// Configuration for `notification` steps, tagged by channel `type`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NotificationConfig {
    /// Email through the configured mail relay.
    Email {
        to: Vec<String>,
        subject: String,
        message: String,
    },
    /// Slack message via an incoming webhook or a Slack integration.
    Slack {
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        channel: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        webhook_url: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        integration_id: Option<String>,
    },
    /// JSON POST to an arbitrary URL.
    Webhook {
        url: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
}

/// Configuration for `webhook` steps.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WebhookConfig {
    pub url: String,

    #[serde(default = "default_webhook_method")]
    pub method: String,

    #[serde(default)]
    pub headers: HashMap<String, String>,

    /// JSON body; the step input is sent when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<serde_json::Value>,
}

fn default_webhook_method() -> String {
    "POST".to_string()
}

/// The work a step performs, tagged by `type` with its `config`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "config", rename_all = "snake_case")]
pub enum StepAction {
    ApiCall(ApiCallConfig),
    DataTransform(TransformConfig),
    Condition(ConditionStepConfig),
    Notification(NotificationConfig),
    Webhook(WebhookConfig),
}

impl StepAction {
    /// Step type name as it appears in definitions.
    pub fn kind(&self) -> &'static str {
        match self {
            StepAction::ApiCall(_) => "api_call",
            StepAction::DataTransform(_) => "data_transform",
            StepAction::Condition(_) => "condition",
            StepAction::Notification(_) => "notification",
            StepAction::Webhook(_) => "webhook",
        }
    }

    /// Collect integration ids this action (and nested actions) may touch.
    pub fn collect_integration_ids(&self, out: &mut BTreeSet<String>) {
        match self {
            StepAction::ApiCall(config) => {
                out.insert(config.integration_id.clone());
            }
            StepAction::Notification(NotificationConfig::Slack {
                integration_id: Some(id),
                ..
            }) => {
                out.insert(id.clone());
            }
            StepAction::Condition(config) => {
                for action in [&config.true_action, &config.false_action].into_iter().flatten() {
                    action.collect_integration_ids(out);
                }
            }
            _ => {}
        }
    }
}

/// One unit of work within a workflow.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkflowStep {
    /// Unique step id within the workflow.
    pub id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Execution position; steps run in ascending order.
    pub order: i64,

    /// Optional path into `{initial, data, steps}` selecting the step input.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<String>,

    /// Per-step timeout override in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<u64>,

    #[serde(flatten)]
    pub action: StepAction,
}

impl WorkflowStep {
    /// Create a step.
    pub fn new(id: impl Into<String>, order: i64, action: StepAction) -> Self {
        Self {
            id: id.into(),
            name: None,
            order,
            input: None,
            timeout_seconds: None,
            action,
        }
    }

    /// Set the input path.
    pub fn with_input(mut self, path: impl Into<String>) -> Self {
        self.input = Some(path.into());
        self
    }

    /// Set the timeout.
    pub fn with_timeout(mut self, seconds: u64) -> Self {
        self.timeout_seconds = Some(seconds);
        self
    }
}

/// An ordered sequence of steps executed against one or more integrations.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IntegrationWorkflow {
    pub id: String,

    #[serde(default)]
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default)]
    pub steps: Vec<WorkflowStep>,

    #[serde(default)]
    pub execution_count: u64,

    #[serde(default)]
    pub success_count: u64,

    #[serde(default)]
    pub status: WorkflowStatus,

    #[serde(default)]
    pub error_handling: ErrorHandling,

    #[serde(default)]
    pub retry: RetryConfig,

    /// Default per-step timeout in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<u64>,
}

impl IntegrationWorkflow {
    /// Create an empty workflow with the `stop` policy.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: None,
            steps: Vec::new(),
            execution_count: 0,
            success_count: 0,
            status: WorkflowStatus::Active,
            error_handling: ErrorHandling::Stop,
            retry: RetryConfig::default(),
            timeout_seconds: None,
        }
    }

    /// Append a step.
    pub fn with_step(mut self, step: WorkflowStep) -> Self {
        self.steps.push(step);
        self
    }

    /// Set the error handling policy.
    pub fn with_error_handling(mut self, policy: ErrorHandling) -> Self {
        self.error_handling = policy;
        self
    }

    /// Check structural invariants: non-empty unique step ids, unique orders,
    /// bounded retries and non-zero timeouts.
    pub fn validate(&self) -> EngineResult<()> {
        if self.id.trim().is_empty() {
            return Err(EngineError::Configuration("workflow id is required".to_string()));
        }
        if self.retry.max_retries > MAX_RETRIES {
            return Err(EngineError::Configuration(format!(
                "workflow {} sets max_retries {} (at most {} allowed)",
                self.id, self.retry.max_retries, MAX_RETRIES
            )));
        }
        if self.timeout_seconds == Some(0) {
            return Err(EngineError::Configuration(format!(
                "workflow {} has timeout_seconds 0",
                self.id
            )));
        }

        let mut ids = HashSet::new();
        let mut orders = HashMap::new();
        for step in &self.steps {
            if step.id.trim().is_empty() {
                return Err(EngineError::Configuration(format!(
                    "workflow {} has a step without an id",
                    self.id
                )));
            }
            if !ids.insert(step.id.as_str()) {
                return Err(EngineError::Configuration(format!(
                    "workflow {} has duplicate step id '{}'",
                    self.id, step.id
                )));
            }
            if step.timeout_seconds == Some(0) {
                return Err(EngineError::Configuration(format!(
                    "step '{}' has timeout_seconds 0",
                    step.id
                )));
            }
            if let Some(other) = orders.insert(step.order, step.id.as_str()) {
                return Err(EngineError::Configuration(format!(
                    "steps '{}' and '{}' share order {}",
                    other, step.id, step.order
                )));
            }
        }

        Ok(())
    }

    /// Steps in ascending `order`.
    pub fn sorted_steps(&self) -> Vec<&WorkflowStep> {
        let mut steps: Vec<&WorkflowStep> = self.steps.iter().collect();
        steps.sort_by_key(|step| step.order);
        steps
    }

    /// All integration ids referenced by the workflow, sorted.
    pub fn integration_ids(&self) -> BTreeSet<String> {
        let mut ids = BTreeSet::new();
        for step in &self.steps {
            step.action.collect_integration_ids(&mut ids);
        }
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn webhook_step(id: &str, order: i64) -> WorkflowStep {
        WorkflowStep::new(
            id,
            order,
            StepAction::Webhook(WebhookConfig {
                url: "http://localhost/hook".to_string(),
                method: "POST".to_string(),
                headers: HashMap::new(),
                body: None,
            }),
        )
    }

    #[test]
    fn test_step_deserialization() {
        let step: WorkflowStep = serde_json::from_value(json!({
            "id": "fetch",
            "order": 1,
            "type": "api_call",
            "config": {"integration_id": "crm", "endpoint": "Contacts"}
        }))
        .unwrap();

        assert_eq!(step.action.kind(), "api_call");
        match step.action {
            StepAction::ApiCall(config) => {
                assert_eq!(config.method, "get");
                assert_eq!(config.endpoint, "Contacts");
            }
            other => panic!("unexpected action: {:?}", other),
        }
    }

    #[test]
    fn test_transform_step_deserialization() {
        let step: WorkflowStep = serde_json::from_value(json!({
            "id": "shape",
            "order": 2,
            "type": "data_transform",
            "config": {"type": "map", "mapping": {"name": "fields.Name"}}
        }))
        .unwrap();
        assert!(matches!(step.action, StepAction::DataTransform(TransformConfig::Map { .. })));
    }

    #[test]
    fn test_unknown_step_type_is_rejected() {
        let result = serde_json::from_value::<WorkflowStep>(json!({
            "id": "x",
            "order": 1,
            "type": "ftp_upload",
            "config": {}
        }));
        let err = result.unwrap_err().to_string();
        assert!(err.contains("ftp_upload"), "{}", err);
    }

    #[test]
    fn test_nested_condition_actions() {
        let step: WorkflowStep = serde_json::from_value(json!({
            "id": "check",
            "order": 3,
            "type": "condition",
            "config": {
                "conditions": [{"field": "total", "operator": "greater_than", "value": 100}],
                "true_action": {
                    "type": "api_call",
                    "config": {"integration_id": "slack-main", "endpoint": "chat.postMessage", "method": "post"}
                },
                "false_action": {
                    "type": "notification",
                    "config": {"type": "slack", "message": "small order", "integration_id": "slack-ops"}
                }
            }
        }))
        .unwrap();

        let mut ids = BTreeSet::new();
        step.action.collect_integration_ids(&mut ids);
        assert_eq!(
            ids.into_iter().collect::<Vec<_>>(),
            vec!["slack-main".to_string(), "slack-ops".to_string()]
        );
    }

    #[test]
    fn test_sorted_steps() {
        let workflow = IntegrationWorkflow::new("wf", "Sync")
            .with_step(webhook_step("c", 30))
            .with_step(webhook_step("a", 10))
            .with_step(webhook_step("b", 20));

        let order: Vec<&str> = workflow.sorted_steps().iter().map(|s| s.id.as_str()).collect();
        assert_eq!(order, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_validate_rejects_duplicate_orders() {
        let workflow = IntegrationWorkflow::new("wf", "Sync")
            .with_step(webhook_step("a", 1))
            .with_step(webhook_step("b", 1));
        let err = workflow.validate().unwrap_err();
        assert!(err.to_string().contains("share order 1"));
    }

    #[test]
    fn test_validate_rejects_duplicate_ids() {
        let workflow = IntegrationWorkflow::new("wf", "Sync")
            .with_step(webhook_step("a", 1))
            .with_step(webhook_step("a", 2));
        assert!(workflow.validate().is_err());

        let workflow = IntegrationWorkflow::new("wf", "Sync").with_step(webhook_step("a", 1));
        assert!(workflow.validate().is_ok());
    }

    #[test]
    fn test_validate_bounds_retries() {
        let mut workflow = IntegrationWorkflow::new("wf", "Sync")
            .with_error_handling(ErrorHandling::Retry)
            .with_step(webhook_step("a", 1));
        workflow.retry.max_retries = MAX_RETRIES;
        assert!(workflow.validate().is_ok());

        workflow.retry.max_retries = u32::MAX;
        let err = workflow.validate().unwrap_err();
        assert!(err.to_string().contains("max_retries"), "{}", err);
    }

    #[test]
    fn test_validate_rejects_zero_timeouts() {
        let workflow = IntegrationWorkflow::new("wf", "Sync").with_step(webhook_step("a", 1).with_timeout(0));
        let err = workflow.validate().unwrap_err();
        assert!(err.to_string().contains("step 'a' has timeout_seconds 0"), "{}", err);

        let mut workflow = IntegrationWorkflow::new("wf", "Sync").with_step(webhook_step("a", 1));
        workflow.timeout_seconds = Some(0);
        assert!(workflow.validate().is_err());

        workflow.timeout_seconds = Some(1);
        assert!(workflow.validate().is_ok());
    }

    #[test]
    fn test_workflow_defaults() {
        let workflow: IntegrationWorkflow = serde_json::from_value(json!({
            "id": "wf",
            "name": "Nightly sync",
            "error_handling": "retry"
        }))
        .unwrap();
        assert_eq!(workflow.error_handling, ErrorHandling::Retry);
        assert_eq!(workflow.retry, RetryConfig::default());
        assert_eq!(workflow.status, WorkflowStatus::Active);
    }

    #[test]
    fn test_retry_delay_backoff() {
        let retry = RetryConfig {
            max_retries: 5,
            initial_delay_ms: 100,
            max_delay_ms: 1000,
            backoff_multiplier: 2.0,
        };
        assert_eq!(retry.delay_for(0), Duration::from_millis(100));
        assert_eq!(retry.delay_for(2), Duration::from_millis(400));
        assert_eq!(retry.delay_for(6), Duration::from_millis(1000));
        assert_eq!(retry.delay_for(u32::MAX), Duration::from_millis(1000));
    }
}
