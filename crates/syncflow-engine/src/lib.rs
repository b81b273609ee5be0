//! Syncflow Engine
//!
//! Workflow execution for third-party integrations.
//!
//! This crate provides:
//! - Provider adapters behind a uniform contract: airtable, slack, notion, stripe
//! - Provider registry keyed by provider id
//! - Data transforms (map, filter, aggregate, format) and condition evaluation
//! - Sequential workflow orchestration with stop/continue/retry policies
//! - Integration service with per-integration serialization, audit events and
//!   performance samples

pub mod condition;
pub mod config;
pub mod context;
pub mod error;
pub mod events;
pub mod executor;
pub mod metrics;
pub mod models;
pub mod orchestrator;
pub mod provider;
pub mod result;
pub mod sanitize;
pub mod service;
pub mod store;
pub mod template;
pub mod transform;
pub mod value;

pub use condition::{Condition, ConditionEvaluator, Operator};
pub use config::EngineConfig;
pub use context::WorkflowContext;
pub use error::{EngineError, EngineResult};
pub use events::{EventLog, EventSink};
pub use executor::{StepExecutor, StepOutput};
pub use metrics::{MetricsCollector, PerformanceSample};
pub use models::{
    Integration, IntegrationEvent, IntegrationStatus, IntegrationWorkflow, StepAction, WorkflowStep,
};
pub use orchestrator::WorkflowOrchestrator;
pub use provider::{ProviderAdapter, ProviderRegistry};
pub use result::{RunState, StepResult, TestResult, WorkflowRunResult};
pub use service::IntegrationService;
pub use transform::TransformConfig;
