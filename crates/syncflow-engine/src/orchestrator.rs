//! Workflow orchestration.
//!
//! Runs a workflow's steps sequentially in ascending `order`, threading the
//! context from step to step and applying the workflow's error policy:
//! - `stop`: abort at the first failing step
//! - `continue`: record the failure and run the remaining steps
//! - `retry`: re-run the failing step with exponential backoff, then abort
//!
//! Each step is bounded by a timeout. There is no cancellation of a run in
//! progress.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::context::WorkflowContext;
use crate::error::{EngineError, EngineResult};
use crate::events::EventSink;
use crate::executor::{StepExecutor, StepOutput};
use crate::models::{ErrorHandling, EventSeverity, EventType, IntegrationEvent, IntegrationWorkflow, WorkflowStep};
use crate::result::{RunState, StepResult, WorkflowRunResult};

/// Sequential workflow runner.
pub struct WorkflowOrchestrator {
    executor: Arc<StepExecutor>,
    events: Arc<dyn EventSink>,
    default_timeout: Duration,
}

impl WorkflowOrchestrator {
    pub fn new(executor: Arc<StepExecutor>, events: Arc<dyn EventSink>, default_timeout: Duration) -> Self {
        Self {
            executor,
            events,
            default_timeout,
        }
    }

    /// Execute a workflow.
    ///
    /// Returns the run result when every step ran (steps may have failed
    /// under `continue`). Aborted runs record a `workflow_error` event and
    /// return [`EngineError::WorkflowFailed`].
    pub async fn run(&self, workflow: &IntegrationWorkflow, initial: Option<Value>) -> EngineResult<WorkflowRunResult> {
        workflow.validate()?;

        let started = Instant::now();
        let mut ctx = WorkflowContext::new(&workflow.id, initial.unwrap_or_else(|| json!({})));
        let mut results = Vec::with_capacity(workflow.steps.len());

        info!(
            workflow_id = %workflow.id,
            run_id = %ctx.run_id,
            steps = workflow.steps.len(),
            policy = ?workflow.error_handling,
            "Workflow run started"
        );

        for step in workflow.sorted_steps() {
            ctx.current_step = Some(step.id.clone());
            let step_started = Instant::now();
            let (outcome, attempts) = self.run_with_policy(workflow, step, &ctx).await;
            let duration_ms = step_started.elapsed().as_millis() as u64;

            match outcome {
                Ok(output) => {
                    debug!(step_id = %step.id, attempts, duration_ms, pipe = output.pipe, "Step completed");
                    results.push(
                        StepResult::success(&step.id, step.action.kind(), output.value.clone())
                            .with_integration(output.integration_id)
                            .with_attempts(attempts)
                            .with_duration(duration_ms),
                    );
                    ctx.record(&step.id, output.value, output.pipe);
                }
                Err(e) => {
                    let message = e.to_string();
                    results.push(
                        StepResult::failed(&step.id, step.action.kind(), &message)
                            .with_attempts(attempts)
                            .with_duration(duration_ms),
                    );

                    if workflow.error_handling == ErrorHandling::Continue {
                        warn!(workflow_id = %workflow.id, step_id = %step.id, error = %message, "Step failed, continuing");
                        self.emit(IntegrationEvent::step_error(&workflow.id, &ctx.run_id, &step.id, &message))
                            .await;
                        ctx.record(&step.id, json!({ "error": message }), false);
                        continue;
                    }

                    tracing::error!(
                        workflow_id = %workflow.id,
                        run_id = %ctx.run_id,
                        step_id = %step.id,
                        attempts,
                        error = %message,
                        "Workflow run failed"
                    );
                    self.emit(IntegrationEvent::workflow_error(&workflow.id, &ctx.run_id, &step.id, &message))
                        .await;
                    return Err(EngineError::WorkflowFailed {
                        workflow_id: workflow.id.clone(),
                        step_id: step.id.clone(),
                        message,
                    });
                }
            }
        }

        let success = results.iter().all(StepResult::is_success);
        let execution_time_ms = started.elapsed().as_millis() as u64;

        info!(
            workflow_id = %workflow.id,
            run_id = %ctx.run_id,
            success,
            execution_time_ms,
            "Workflow run completed"
        );

        let failed = results.iter().filter(|r| !r.is_success()).count();
        self.emit(
            IntegrationEvent::new(
                EventType::WorkflowCompleted,
                if success { EventSeverity::Low } else { EventSeverity::Medium },
                "Workflow execution completed",
                format!(
                    "Workflow {} ran {} steps ({} failed) in {} ms",
                    workflow.id,
                    results.len(),
                    failed,
                    execution_time_ms
                ),
            )
            .with_workflow(&workflow.id)
            .with_payload(json!({ "run_id": ctx.run_id, "success": success })),
        )
        .await;

        Ok(WorkflowRunResult {
            workflow_id: workflow.id.clone(),
            run_id: ctx.run_id.clone(),
            success,
            state: RunState::Completed,
            results,
            output: ctx.data,
            execution_time_ms,
        })
    }

    /// Run a step once, or with backoff under the `retry` policy.
    async fn run_with_policy(
        &self,
        workflow: &IntegrationWorkflow,
        step: &WorkflowStep,
        ctx: &WorkflowContext,
    ) -> (EngineResult<StepOutput>, u32) {
        let max_attempts = match workflow.error_handling {
            ErrorHandling::Retry => workflow.retry.max_retries.saturating_add(1),
            _ => 1,
        };
        let timeout = self.timeout_for(workflow, step);

        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.run_once(step, ctx, timeout).await {
                Err(e) if attempt < max_attempts => {
                    let delay = workflow.retry.delay_for(attempt - 1);
                    warn!(
                        step_id = %step.id,
                        attempt,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Step failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                outcome => return (outcome, attempt),
            }
        }
    }

    async fn run_once(&self, step: &WorkflowStep, ctx: &WorkflowContext, timeout: Duration) -> EngineResult<StepOutput> {
        match tokio::time::timeout(timeout, self.executor.execute_step(step, ctx)).await {
            Ok(outcome) => outcome,
            Err(_) => Err(EngineError::Timeout {
                step_id: step.id.clone(),
                seconds: timeout.as_secs(),
            }),
        }
    }

    /// Step timeout, else workflow timeout, else the engine default.
    fn timeout_for(&self, workflow: &IntegrationWorkflow, step: &WorkflowStep) -> Duration {
        step.timeout_seconds
            .or(workflow.timeout_seconds)
            .map(Duration::from_secs)
            .unwrap_or(self.default_timeout)
    }

    async fn emit(&self, event: IntegrationEvent) {
        if let Err(e) = self.events.record(event).await {
            warn!(error = %e, "Failed to record event");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::events::EventLog;
    use crate::models::{ApiCallConfig, Integration, RetryConfig, StepAction, WebhookConfig};
    use crate::provider::testing::serve;
    use crate::provider::{ProviderClient, ProviderRegistry};
    use crate::store::IntegrationStore;
    use crate::transform::{AggregateOp, FieldMapping, TransformConfig};
    use axum::http::StatusCode;
    use axum::routing::post;
    use axum::{Json, Router};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU32, Ordering};

    async fn orchestrator(integrations: Vec<Integration>) -> (WorkflowOrchestrator, Arc<EventLog>) {
        let client = ProviderClient::new(Duration::from_secs(5));
        let store = Arc::new(IntegrationStore::new());
        for integration in integrations {
            store.insert(integration).await;
        }
        let executor = StepExecutor::new(
            Arc::new(ProviderRegistry::with_builtin_providers(client.clone())),
            store,
            client,
            EngineConfig::default(),
        );
        let events = Arc::new(EventLog::new(16));
        let orchestrator = WorkflowOrchestrator::new(Arc::new(executor), events.clone(), Duration::from_secs(5));
        (orchestrator, events)
    }

    fn rename(id: &str, order: i64, from: &str, to: &str) -> WorkflowStep {
        let mut mapping = FieldMapping::new();
        mapping.insert(to.to_string(), from.to_string());
        WorkflowStep::new(id, order, StepAction::DataTransform(TransformConfig::Map { mapping }))
    }

    fn failing_call(id: &str, order: i64) -> WorkflowStep {
        WorkflowStep::new(
            id,
            order,
            StepAction::ApiCall(ApiCallConfig {
                integration_id: "missing".to_string(),
                endpoint: "records".to_string(),
                method: "get".to_string(),
                params: None,
                body: None,
            }),
        )
    }

    fn webhook(id: &str, order: i64, url: String) -> WorkflowStep {
        WorkflowStep::new(
            id,
            order,
            StepAction::Webhook(WebhookConfig {
                url,
                method: "POST".to_string(),
                headers: HashMap::new(),
                body: None,
            }),
        )
    }

    fn count_events(events: &EventLog, event_type: EventType) -> usize {
        events.list().iter().filter(|e| e.event_type == event_type).count()
    }

    #[tokio::test]
    async fn test_steps_run_in_order() {
        let (orchestrator, _) = orchestrator(vec![]).await;
        let workflow = IntegrationWorkflow::new("wf", "Rename")
            .with_step(rename("third", 3, "c", "d"))
            .with_step(rename("first", 1, "a", "b"))
            .with_step(rename("second", 2, "b", "c"));

        let result = orchestrator.run(&workflow, Some(json!({"a": 1}))).await.unwrap();

        let ids: Vec<&str> = result.results.iter().map(|r| r.step_id.as_str()).collect();
        assert_eq!(ids, vec!["first", "second", "third"]);
        assert!(result.success);
        assert_eq!(result.state, RunState::Completed);
        assert_eq!(result.output, json!({"d": 1}));
    }

    async fn counting_hook(path: &'static str) -> (String, Arc<AtomicU32>) {
        let hits = Arc::new(AtomicU32::new(0));
        let counter = hits.clone();
        let base = serve(Router::new().route(
            path,
            post(move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Json(json!({"received": true}))
                }
            }),
        ))
        .await;
        (format!("{}{}", base, path), hits)
    }

    #[tokio::test]
    async fn test_stop_policy_aborts_and_records_one_error() {
        let (url, hits) = counting_hook("/after").await;
        let (orchestrator, events) = orchestrator(vec![]).await;
        let workflow = IntegrationWorkflow::new("wf", "Stop")
            .with_step(rename("one", 1, "a", "b"))
            .with_step(failing_call("two", 2))
            .with_step(webhook("three", 3, url));

        let err = orchestrator.run(&workflow, Some(json!({"a": 1}))).await.unwrap_err();

        match err {
            EngineError::WorkflowFailed { workflow_id, step_id, message } => {
                assert_eq!(workflow_id, "wf");
                assert_eq!(step_id, "two");
                assert!(message.contains("Integration not found"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        assert_eq!(count_events(&events, EventType::WorkflowError), 1);
        assert_eq!(count_events(&events, EventType::WorkflowCompleted), 0);
        assert_eq!(events.list()[0].severity, EventSeverity::High);
    }

    #[tokio::test]
    async fn test_unbounded_retry_count_is_rejected() {
        let (url, hits) = counting_hook("/push").await;
        let (orchestrator, events) = orchestrator(vec![]).await;
        let mut workflow = IntegrationWorkflow::new("wf", "Retry")
            .with_error_handling(ErrorHandling::Retry)
            .with_step(webhook("push", 1, url));
        workflow.retry.max_retries = u32::MAX;

        let err = orchestrator.run(&workflow, None).await.unwrap_err();
        assert!(matches!(err, EngineError::Configuration(ref m) if m.contains("max_retries")), "{err}");
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        assert!(events.list().is_empty());
    }

    #[tokio::test]
    async fn test_zero_step_timeout_is_rejected() {
        let (url, hits) = counting_hook("/push").await;
        let (orchestrator, _) = orchestrator(vec![]).await;
        let workflow = IntegrationWorkflow::new("wf", "Zero").with_step(webhook("push", 1, url).with_timeout(0));

        let err = orchestrator.run(&workflow, None).await.unwrap_err();
        assert!(matches!(err, EngineError::Configuration(_)));
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_continue_policy_runs_remaining_steps() {
        let (orchestrator, events) = orchestrator(vec![]).await;
        let workflow = IntegrationWorkflow::new("wf", "Continue")
            .with_error_handling(ErrorHandling::Continue)
            .with_step(rename("one", 1, "a", "b"))
            .with_step(failing_call("two", 2))
            .with_step(rename("three", 3, "b", "c"));

        let result = orchestrator.run(&workflow, Some(json!({"a": 1}))).await.unwrap();

        assert!(!result.success);
        assert_eq!(result.results.len(), 3);
        assert_eq!(result.failed_steps().count(), 1);
        assert_eq!(result.output, json!({"c": 1}));
        assert_eq!(count_events(&events, EventType::StepError), 1);
        assert_eq!(count_events(&events, EventType::WorkflowError), 0);
    }

    #[tokio::test]
    async fn test_retry_policy_recovers() {
        let hits = Arc::new(AtomicU32::new(0));
        let counter = hits.clone();
        let base = serve(Router::new().route(
            "/flaky",
            post(move || {
                let counter = counter.clone();
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                        (StatusCode::SERVICE_UNAVAILABLE, Json(json!({"error": "busy"})))
                    } else {
                        (StatusCode::OK, Json(json!({"stored": true})))
                    }
                }
            }),
        ))
        .await;

        let (orchestrator, _) = orchestrator(vec![]).await;
        let mut workflow = IntegrationWorkflow::new("wf", "Retry")
            .with_error_handling(ErrorHandling::Retry)
            .with_step(webhook("push", 1, format!("{}/flaky", base)));
        workflow.retry = RetryConfig {
            max_retries: 3,
            initial_delay_ms: 1,
            max_delay_ms: 5,
            backoff_multiplier: 2.0,
        };

        let result = orchestrator.run(&workflow, None).await.unwrap();
        assert!(result.success);
        assert_eq!(result.results[0].attempts, 3);
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_policy_gives_up() {
        let hits = Arc::new(AtomicU32::new(0));
        let counter = hits.clone();
        let base = serve(Router::new().route(
            "/down",
            post(move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    (StatusCode::INTERNAL_SERVER_ERROR, "down")
                }
            }),
        ))
        .await;

        let (orchestrator, events) = orchestrator(vec![]).await;
        let mut workflow = IntegrationWorkflow::new("wf", "Retry")
            .with_error_handling(ErrorHandling::Retry)
            .with_step(webhook("push", 1, format!("{}/down", base)));
        workflow.retry.max_retries = 2;
        workflow.retry.initial_delay_ms = 1;

        let err = orchestrator.run(&workflow, None).await.unwrap_err();
        assert!(matches!(err, EngineError::WorkflowFailed { .. }));
        assert_eq!(hits.load(Ordering::SeqCst), 3);
        assert_eq!(count_events(&events, EventType::WorkflowError), 1);
    }

    #[tokio::test]
    async fn test_step_timeout() {
        let base = serve(Router::new().route(
            "/slow",
            post(|| async {
                tokio::time::sleep(Duration::from_secs(3)).await;
                "late"
            }),
        ))
        .await;

        let (orchestrator, _) = orchestrator(vec![]).await;
        let workflow = IntegrationWorkflow::new("wf", "Slow")
            .with_step(webhook("slow", 1, format!("{}/slow", base)).with_timeout(1));

        let err = orchestrator.run(&workflow, None).await.unwrap_err();
        match err {
            EngineError::WorkflowFailed { message, .. } => {
                assert_eq!(message, "Step slow timed out after 1 seconds");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_invalid_workflow_runs_nothing() {
        let (orchestrator, events) = orchestrator(vec![]).await;
        let workflow = IntegrationWorkflow::new("wf", "Dup")
            .with_step(rename("a", 1, "x", "y"))
            .with_step(rename("b", 1, "y", "z"));

        let err = orchestrator.run(&workflow, None).await.unwrap_err();
        assert!(matches!(err, EngineError::Configuration(_)));
        assert!(events.list().is_empty());
    }

    #[tokio::test]
    async fn test_unregistered_provider_fails_run() {
        let hub = Integration::new("hub", "hubspot", json!({}));
        let (orchestrator, _) = orchestrator(vec![hub]).await;
        let workflow = IntegrationWorkflow::new("wf", "Hub").with_step(WorkflowStep::new(
            "fetch",
            1,
            StepAction::ApiCall(ApiCallConfig {
                integration_id: "hub".to_string(),
                endpoint: "contacts".to_string(),
                method: "get".to_string(),
                params: None,
                body: None,
            }),
        ));

        let err = orchestrator.run(&workflow, None).await.unwrap_err();
        assert!(err.to_string().contains("Provider not supported: hubspot"));
    }

    #[tokio::test]
    async fn test_step_input_paths() {
        let (orchestrator, _) = orchestrator(vec![]).await;
        let total = WorkflowStep::new(
            "total",
            2,
            StepAction::DataTransform(TransformConfig::Aggregate {
                field: "amount".to_string(),
                operation: AggregateOp::Sum,
            }),
        )
        .with_input("initial.orders");
        let workflow = IntegrationWorkflow::new("wf", "Paths")
            .with_step(rename("noop", 1, "x", "y"))
            .with_step(total);

        let initial = json!({"x": 1, "orders": [{"amount": 4}, {"amount": 6}]});
        let result = orchestrator.run(&workflow, Some(initial)).await.unwrap();
        assert_eq!(result.output, json!(10));
    }
}
