//! Domain models: integrations, workflows, steps and audit events.

mod event;
mod integration;
mod workflow;

pub use event::{EventSeverity, EventType, IntegrationEvent};
pub use integration::{Integration, IntegrationStatus};
pub use workflow::{
    ApiCallConfig, ConditionStepConfig, ErrorHandling, IntegrationWorkflow, NotificationConfig,
    RetryConfig, StepAction, WebhookConfig, WorkflowStatus, WorkflowStep,
};
