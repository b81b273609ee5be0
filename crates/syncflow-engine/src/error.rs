//! Engine error types.

use thiserror::Error;

/// Errors that can occur while configuring or executing integrations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// No adapter is registered for the provider id.
    #[error("Provider not supported: {0}")]
    ProviderNotSupported(String),

    /// Integration id is unknown to the store.
    #[error("Integration not found: {0}")]
    IntegrationNotFound(String),

    /// Workflow id is unknown to the store.
    #[error("Workflow not found: {0}")]
    WorkflowNotFound(String),

    /// Integration exists but is not usable (inactive or disconnected).
    #[error("Integration {id} is {status}")]
    IntegrationUnavailable { id: String, status: String },

    /// Adapter-level configuration validation failed.
    #[error("Invalid configuration: {}", .0.join("; "))]
    InvalidConfig(Vec<String>),

    /// Generic configuration error (bad step config, bad workflow shape).
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// HTTP method not supported by the api_call step.
    #[error("Unsupported HTTP method: {0}")]
    UnsupportedMethod(String),

    /// Condition actions nested deeper than the configured limit.
    #[error("Condition actions nested deeper than {0} levels")]
    ActionDepthExceeded(usize),

    /// Transport-level HTTP failure.
    #[error("HTTP error: {0}")]
    Http(String),

    /// Remote returned a non-success status.
    #[error("HTTP {status}: {body}")]
    HttpStatus { status: u16, body: String },

    /// Provider answered with an application-level error.
    #[error("Provider error: {0}")]
    Provider(String),

    /// Step handler reported `success: false` or failed otherwise.
    #[error("Step {step_id} failed: {message}")]
    StepFailed { step_id: String, message: String },

    /// Step exceeded its time budget.
    #[error("Step {step_id} timed out after {seconds} seconds")]
    Timeout { step_id: String, seconds: u64 },

    /// Workflow aborted at a failing step.
    #[error("Workflow {workflow_id} failed at step {step_id}: {message}")]
    WorkflowFailed {
        workflow_id: String,
        step_id: String,
        message: String,
    },

    /// Template rendering error.
    #[error("Template error: {0}")]
    Template(String),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(String),

    /// Event sink failure.
    #[error("Event sink error: {0}")]
    EventSink(String),
}

impl EngineError {
    /// HTTP status code carried by the error, if any.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            EngineError::HttpStatus { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(e: serde_json::Error) -> Self {
        EngineError::Json(e.to_string())
    }
}

impl From<reqwest::Error> for EngineError {
    fn from(e: reqwest::Error) -> Self {
        EngineError::Http(e.to_string())
    }
}

impl From<minijinja::Error> for EngineError {
    fn from(e: minijinja::Error) -> Self {
        EngineError::Template(e.to_string())
    }
}

/// Result type alias using EngineError.
pub type EngineResult<T> = Result<T, EngineError>;
