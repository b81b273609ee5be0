//! Integration service: the entry point tying stores, providers, the
//! orchestrator, events and metrics together.
//!
//! Construct one per process and share it behind an `Arc`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use serde_json::{json, Value};
use tokio::sync::{broadcast, Mutex, OwnedMutexGuard};
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::events::{EventLog, EventSink};
use crate::executor::StepExecutor;
use crate::metrics::MetricsCollector;
use crate::models::{
    EventSeverity, EventType, Integration, IntegrationEvent, IntegrationStatus, IntegrationWorkflow,
    WorkflowStatus,
};
use crate::orchestrator::WorkflowOrchestrator;
use crate::provider::{ProviderClient, ProviderRegistry};
use crate::result::{TestResult, WorkflowRunResult};
use crate::store::{IntegrationStore, WorkflowStore};

/// Manages integrations and workflows and runs them.
pub struct IntegrationService {
    config: EngineConfig,
    registry: Arc<ProviderRegistry>,
    integrations: Arc<IntegrationStore>,
    workflows: WorkflowStore,
    orchestrator: WorkflowOrchestrator,
    events: Arc<EventLog>,
    metrics: MetricsCollector,
    /// One lock per integration id; runs touching the same integration are serialized.
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    schema_cache: Mutex<HashMap<String, (Instant, Value)>>,
}

impl IntegrationService {
    /// Create a service with the built-in providers.
    pub fn new(config: EngineConfig) -> Self {
        let client = ProviderClient::new(config.http_timeout());
        let registry = ProviderRegistry::with_builtin_providers(client.clone());
        Self::with_registry(config, registry, client)
    }

    /// Create a service with a custom provider registry.
    pub fn with_registry(config: EngineConfig, registry: ProviderRegistry, client: ProviderClient) -> Self {
        let registry = Arc::new(registry);
        let integrations = Arc::new(IntegrationStore::new());
        let events = Arc::new(EventLog::new(config.event_channel_capacity));

        let executor = StepExecutor::new(registry.clone(), integrations.clone(), client, config.clone());
        let orchestrator = WorkflowOrchestrator::new(
            Arc::new(executor),
            events.clone() as Arc<dyn EventSink>,
            config.default_step_timeout(),
        );

        Self {
            config,
            registry,
            integrations,
            workflows: WorkflowStore::new(),
            orchestrator,
            events,
            metrics: MetricsCollector::new(),
            locks: Mutex::new(HashMap::new()),
            schema_cache: Mutex::new(HashMap::new()),
        }
    }

    /// Registered provider ids.
    pub fn providers(&self) -> Vec<&str> {
        self.registry.list()
    }

    // ------------------------------------------------------------------
    // Integrations
    // ------------------------------------------------------------------

    /// Validate and store an integration.
    pub async fn add_integration(&self, integration: Integration) -> EngineResult<Integration> {
        let adapter = self.registry.resolve(&integration.provider)?;
        let errors = adapter.validate_config(&integration.config);
        if !errors.is_empty() {
            return Err(EngineError::InvalidConfig(errors));
        }

        info!(
            integration_id = %integration.id,
            provider = %integration.provider,
            "Integration added"
        );
        self.integrations.insert(integration.clone()).await;
        Ok(integration)
    }

    pub async fn get_integration(&self, id: &str) -> EngineResult<Integration> {
        self.integrations.get(id).await
    }

    pub async fn list_integrations(&self) -> Vec<Integration> {
        self.integrations.list().await
    }

    /// Mark an integration inactive. Integrations are never removed.
    pub async fn deactivate_integration(&self, id: &str) -> EngineResult<Integration> {
        let integration = self
            .integrations
            .update(id, |i| i.status = IntegrationStatus::Inactive)
            .await?;
        self.schema_cache.lock().await.remove(id);
        info!(integration_id = %id, "Integration deactivated");
        Ok(integration)
    }

    /// Test an integration's connection, updating its status.
    pub async fn test_connection(&self, id: &str) -> EngineResult<TestResult> {
        let integration = self.integrations.get(id).await?;
        let adapter = self.registry.resolve(&integration.provider)?;

        let started = Instant::now();
        let outcome = adapter.check_connection(&integration.config).await;
        let response_time_ms = started.elapsed().as_millis() as u64;
        self.metrics.record_request(outcome.is_ok());

        let keep_status = integration.status == IntegrationStatus::Inactive;
        let result = match outcome {
            Ok(()) => {
                if !keep_status {
                    self.integrations
                        .update(id, |i| i.status = IntegrationStatus::Active)
                        .await?;
                }
                if integration.status == IntegrationStatus::Error {
                    self.record_event(
                        IntegrationEvent::new(
                            EventType::ConnectionRestored,
                            EventSeverity::Low,
                            "Connection restored",
                            format!("{} is reachable again", integration.name),
                        )
                        .with_integration(id)
                        .with_payload(json!({"provider": integration.provider, "response_time_ms": response_time_ms})),
                    )
                    .await;
                }
                TestResult::passed(response_time_ms)
            }
            Err(e) => {
                let message = e.to_string();
                warn!(integration_id = %id, provider = %integration.provider, error = %message, "Connection test failed");
                if !keep_status {
                    self.integrations.update(id, |i| i.mark_error(message.clone())).await?;
                }
                self.record_event(
                    IntegrationEvent::new(
                        EventType::ConnectionFailed,
                        EventSeverity::High,
                        "Connection failed",
                        format!("{}: {}", integration.name, message),
                    )
                    .with_integration(id)
                    .with_payload(json!({
                        "provider": integration.provider,
                        "status_code": e.status_code(),
                        "error": message,
                    })),
                )
                .await;
                TestResult::failed(response_time_ms, e.status_code(), message)
            }
        };

        self.metrics.sample(id, response_time_ms);
        Ok(result)
    }

    /// Provider schema for an integration, cached for `schema_cache_ttl_secs`.
    pub async fn get_schema(&self, id: &str) -> EngineResult<Value> {
        let ttl = self.config.schema_cache_ttl();
        if let Some((fetched_at, schema)) = self.schema_cache.lock().await.get(id) {
            if fetched_at.elapsed() < ttl {
                self.metrics.record_cache_lookup(true);
                return Ok(schema.clone());
            }
        }
        self.metrics.record_cache_lookup(false);

        let integration = self.integrations.get(id).await?;
        let adapter = self.registry.resolve(&integration.provider)?;
        let outcome = adapter.get_schema(&integration.config).await;
        self.metrics.record_request(outcome.is_ok());
        let schema = outcome?;

        self.schema_cache
            .lock()
            .await
            .insert(id.to_string(), (Instant::now(), schema.clone()));
        debug!(integration_id = %id, "Schema cached");
        Ok(schema)
    }

    // ------------------------------------------------------------------
    // Workflows
    // ------------------------------------------------------------------

    /// Validate and store a workflow.
    pub async fn add_workflow(&self, workflow: IntegrationWorkflow) -> EngineResult<IntegrationWorkflow> {
        workflow.validate()?;
        info!(workflow_id = %workflow.id, steps = workflow.steps.len(), "Workflow added");
        self.workflows.insert(workflow.clone()).await;
        Ok(workflow)
    }

    pub async fn get_workflow(&self, id: &str) -> EngineResult<IntegrationWorkflow> {
        self.workflows.get(id).await
    }

    pub async fn list_workflows(&self) -> Vec<IntegrationWorkflow> {
        self.workflows.list().await
    }

    /// Run a stored workflow.
    ///
    /// Runs touching the same integration are serialized. Counters, the
    /// workflow status and the status of every referenced integration are
    /// updated when the run ends.
    pub async fn execute_workflow(&self, id: &str, data: Option<Value>) -> EngineResult<WorkflowRunResult> {
        let workflow = self.workflows.get(id).await?;
        if workflow.status == WorkflowStatus::Inactive {
            return Err(EngineError::Configuration(format!("workflow {} is inactive", id)));
        }

        let integration_ids = workflow.integration_ids();
        let _guards = self.lock_integrations(integration_ids.iter()).await;

        self.workflows
            .update(id, |w| w.status = WorkflowStatus::Running)
            .await?;
        for integration_id in &integration_ids {
            self.set_usable_status(integration_id, |i| i.status = IntegrationStatus::Syncing)
                .await;
        }

        let outcome = self.orchestrator.run(&workflow, data).await;
        let succeeded = matches!(outcome, Ok(ref result) if result.success);

        self.workflows
            .update(id, |w| {
                w.execution_count += 1;
                if succeeded {
                    w.success_count += 1;
                    w.status = WorkflowStatus::Active;
                } else {
                    w.status = WorkflowStatus::Error;
                }
            })
            .await?;

        let error = match &outcome {
            Ok(result) => result
                .failed_steps()
                .filter_map(|r| r.error.clone())
                .next(),
            Err(e) => Some(e.to_string()),
        };
        for integration_id in &integration_ids {
            match &error {
                None => self.set_usable_status(integration_id, Integration::mark_synced).await,
                Some(message) => {
                    self.set_usable_status(integration_id, |i| i.mark_error(message.clone()))
                        .await
                }
            }
        }

        outcome
    }

    // ------------------------------------------------------------------
    // Events and metrics
    // ------------------------------------------------------------------

    /// All recorded events, oldest first.
    pub fn events(&self) -> Vec<IntegrationEvent> {
        self.events.list()
    }

    pub fn unresolved_events(&self) -> Vec<IntegrationEvent> {
        self.events.unresolved()
    }

    /// Mark an event resolved. Returns false when the id is unknown.
    pub fn resolve_event(&self, event_id: &str) -> EngineResult<bool> {
        self.events.resolve(event_id)
    }

    /// Subscribe to the `integration_event` channel.
    pub fn subscribe_events(&self) -> broadcast::Receiver<IntegrationEvent> {
        self.events.subscribe()
    }

    pub fn metrics(&self) -> &MetricsCollector {
        &self.metrics
    }

    async fn record_event(&self, event: IntegrationEvent) {
        if let Err(e) = self.events.record(event).await {
            warn!(error = %e, "Failed to record event");
        }
    }

    /// Acquire the locks of `ids` in sorted order.
    async fn lock_integrations<'a, I>(&self, ids: I) -> Vec<OwnedMutexGuard<()>>
    where
        I: Iterator<Item = &'a String>,
    {
        let mut sorted: Vec<&String> = ids.collect();
        sorted.sort();
        sorted.dedup();

        let mut guards = Vec::with_capacity(sorted.len());
        for id in sorted {
            let lock = {
                let mut locks = self.locks.lock().await;
                locks.entry(id.clone()).or_default().clone()
            };
            guards.push(lock.lock_owned().await);
        }
        guards
    }

    /// Update an integration's status unless it is inactive or missing.
    async fn set_usable_status<F>(&self, id: &str, f: F)
    where
        F: FnOnce(&mut Integration),
    {
        let result = self
            .integrations
            .update(id, |i| {
                if i.status != IntegrationStatus::Inactive && i.status != IntegrationStatus::Disconnected {
                    f(i);
                }
            })
            .await;
        if let Err(e) = result {
            debug!(integration_id = %id, error = %e, "Integration status not updated");
        }
    }
}
