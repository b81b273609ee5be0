//! Step executor.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::str::FromStr;
use std::sync::Arc;

use serde_json::{json, Value};

use crate::condition::ConditionEvaluator;
use crate::config::EngineConfig;
use crate::context::WorkflowContext;
use crate::error::{EngineError, EngineResult};
use crate::models::{ApiCallConfig, ConditionStepConfig, Integration, StepAction, WorkflowStep};
use crate::provider::{ProviderAdapter, ProviderClient, ProviderRegistry};
use crate::store::IntegrationStore;
use crate::template::TemplateEngine;

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Output of one executed action.
#[derive(Debug, Clone, PartialEq)]
pub struct StepOutput {
    pub value: Value,

    /// Whether the output replaces the context's current data.
    pub pipe: bool,

    /// Integration the action called through, if any.
    pub integration_id: Option<String>,
}

impl StepOutput {
    fn piped(value: Value) -> Self {
        Self {
            value,
            pipe: true,
            integration_id: None,
        }
    }

    fn side_effect(value: Value) -> Self {
        Self {
            value,
            pipe: false,
            integration_id: None,
        }
    }
}

/// HTTP method of an api_call step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiMethod {
    Get,
    Post,
    Put,
    Delete,
}

impl FromStr for ApiMethod {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "get" => Ok(ApiMethod::Get),
            "post" => Ok(ApiMethod::Post),
            "put" => Ok(ApiMethod::Put),
            "delete" => Ok(ApiMethod::Delete),
            _ => Err(EngineError::UnsupportedMethod(s.to_string())),
        }
    }
}

/// Runs individual step actions against the provider registry.
pub struct StepExecutor {
    pub(super) registry: Arc<ProviderRegistry>,
    pub(super) integrations: Arc<IntegrationStore>,
    pub(super) client: ProviderClient,
    pub(super) templates: TemplateEngine,
    pub(super) config: EngineConfig,
    evaluator: ConditionEvaluator,
}

impl StepExecutor {
    pub fn new(
        registry: Arc<ProviderRegistry>,
        integrations: Arc<IntegrationStore>,
        client: ProviderClient,
        config: EngineConfig,
    ) -> Self {
        Self {
            registry,
            integrations,
            client,
            templates: TemplateEngine::new(),
            config,
            evaluator: ConditionEvaluator::new(),
        }
    }

    /// Execute a workflow step against the context.
    ///
    /// A result object carrying `"success": false` is reported as a failure.
    pub async fn execute_step(&self, step: &WorkflowStep, ctx: &WorkflowContext) -> EngineResult<StepOutput> {
        let input = ctx.input_for(step.input.as_deref());

        tracing::debug!(
            workflow_id = %ctx.workflow_id,
            step_id = %step.id,
            kind = step.action.kind(),
            "Executing step"
        );

        let output = self.execute(&step.action, &input, ctx).await?;

        if output.value.get("success").and_then(Value::as_bool) == Some(false) {
            let message = output
                .value
                .get("error")
                .map(crate::value::to_text)
                .unwrap_or_else(|| "step reported success: false".to_string());
            return Err(EngineError::StepFailed {
                step_id: step.id.clone(),
                message,
            });
        }

        Ok(output)
    }

    /// Execute one action with an explicit input.
    pub async fn execute(&self, action: &StepAction, input: &Value, ctx: &WorkflowContext) -> EngineResult<StepOutput> {
        self.execute_action(action, input, ctx, 0).await
    }

    fn execute_action<'a>(
        &'a self,
        action: &'a StepAction,
        input: &'a Value,
        ctx: &'a WorkflowContext,
        depth: usize,
    ) -> BoxFuture<'a, EngineResult<StepOutput>> {
        Box::pin(async move {
            match action {
                StepAction::ApiCall(config) => self.api_call(config, input, ctx).await,
                StepAction::DataTransform(transform) => Ok(StepOutput::piped(transform.apply(input)?)),
                StepAction::Condition(config) => self.condition(config, input, ctx, depth).await,
                StepAction::Notification(config) => {
                    let value = self.notify(config, input, ctx).await?;
                    Ok(StepOutput::side_effect(value))
                }
                StepAction::Webhook(config) => {
                    let value = self.webhook(config, input, ctx).await?;
                    Ok(StepOutput::piped(value))
                }
            }
        })
    }

    async fn api_call(&self, config: &ApiCallConfig, input: &Value, ctx: &WorkflowContext) -> EngineResult<StepOutput> {
        let method = ApiMethod::from_str(&config.method)?;
        let (integration, adapter) = self.usable_integration(&config.integration_id).await?;

        let tctx = ctx.to_template_context(input);
        let endpoint = self.render_text(&config.endpoint, &tctx)?;
        let params = self.render_json(config.params.as_ref(), &tctx)?;
        let body = match self.render_json(config.body.as_ref(), &tctx)? {
            Some(body) => body,
            None => input.clone(),
        };

        tracing::debug!(
            integration_id = %integration.id,
            provider = %integration.provider,
            endpoint = %endpoint,
            method = ?method,
            "API call"
        );

        let value = match method {
            ApiMethod::Get => adapter.get_data(&integration.config, &endpoint, params.as_ref()).await?,
            ApiMethod::Post => adapter.post_data(&integration.config, &endpoint, &body).await?,
            ApiMethod::Put => adapter.put_data(&integration.config, &endpoint, &body).await?,
            ApiMethod::Delete => {
                let deleted = adapter.delete_data(&integration.config, &endpoint).await?;
                json!({ "deleted": deleted })
            }
        };

        Ok(StepOutput {
            value,
            pipe: true,
            integration_id: Some(integration.id),
        })
    }

    async fn condition(
        &self,
        config: &ConditionStepConfig,
        input: &Value,
        ctx: &WorkflowContext,
        depth: usize,
    ) -> EngineResult<StepOutput> {
        let matched = self.evaluator.evaluate(&config.conditions, input);
        let branch = if matched {
            config.true_action.as_deref()
        } else {
            config.false_action.as_deref()
        };

        let Some(action) = branch else {
            return Ok(StepOutput::side_effect(Value::Bool(matched)));
        };

        if depth >= self.config.max_action_depth {
            return Err(EngineError::ActionDepthExceeded(self.config.max_action_depth));
        }

        let nested = self.execute_action(action, input, ctx, depth + 1).await?;
        Ok(StepOutput {
            pipe: true,
            ..nested
        })
    }

    /// Look up an integration, refusing unusable ones, and resolve its adapter.
    pub(super) async fn usable_integration(
        &self,
        integration_id: &str,
    ) -> EngineResult<(Integration, Arc<dyn ProviderAdapter>)> {
        let integration = self.integrations.get(integration_id).await?;
        if !integration.status.is_usable() {
            return Err(EngineError::IntegrationUnavailable {
                id: integration.id.clone(),
                status: integration.status.to_string(),
            });
        }
        let adapter = self.registry.resolve(&integration.provider)?;
        Ok((integration, adapter))
    }

    pub(super) fn render_text(&self, text: &str, tctx: &HashMap<String, Value>) -> EngineResult<String> {
        if TemplateEngine::is_template(text) {
            self.templates.render(text, tctx)
        } else {
            Ok(text.to_string())
        }
    }

    pub(super) fn render_json(
        &self,
        value: Option<&Value>,
        tctx: &HashMap<String, Value>,
    ) -> EngineResult<Option<Value>> {
        value.map(|v| self.templates.render_value(v, tctx)).transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::{Condition, Operator};
    use crate::models::{IntegrationStatus, NotificationConfig};
    use crate::provider::testing::serve;
    use crate::transform::{AggregateOp, TransformConfig};
    use axum::extract::Path;
    use axum::routing::get;
    use axum::{Json, Router};
    use std::time::Duration;

    async fn executor_with(integrations: Vec<Integration>, config: EngineConfig) -> StepExecutor {
        let client = ProviderClient::new(Duration::from_secs(5));
        let store = Arc::new(IntegrationStore::new());
        for integration in integrations {
            store.insert(integration).await;
        }
        StepExecutor::new(
            Arc::new(ProviderRegistry::with_builtin_providers(client.clone())),
            store,
            client,
            config,
        )
    }

    async fn fake_airtable() -> String {
        let router = Router::new().route(
            "/{base}/{table}",
            get(|Path((_, table)): Path<(String, String)>| async move {
                Json(json!({"table": table, "records": [{"id": "rec1"}, {"id": "rec2"}]}))
            }),
        );
        serve(router).await
    }

    fn api_call(integration_id: &str, endpoint: &str, method: &str) -> StepAction {
        StepAction::ApiCall(ApiCallConfig {
            integration_id: integration_id.to_string(),
            endpoint: endpoint.to_string(),
            method: method.to_string(),
            params: None,
            body: None,
        })
    }

    #[test]
    fn test_api_method_parse() {
        assert_eq!(ApiMethod::from_str("GET").unwrap(), ApiMethod::Get);
        assert_eq!(ApiMethod::from_str("delete").unwrap(), ApiMethod::Delete);
        let err = ApiMethod::from_str("patch").unwrap_err();
        assert!(matches!(err, EngineError::UnsupportedMethod(ref m) if m == "patch"));
    }

    #[tokio::test]
    async fn test_api_call_renders_endpoint() {
        let base = fake_airtable().await;
        let crm = Integration::new("crm", "airtable", json!({"api_key": "k", "base_id": "app1", "base_url": base}));
        let executor = executor_with(vec![crm], EngineConfig::default()).await;

        let ctx = WorkflowContext::new("wf", json!({"table": "Contacts"}));
        let output = executor
            .execute(&api_call("crm", "{{ input.table }}", "get"), &json!({"table": "Contacts"}), &ctx)
            .await
            .unwrap();

        assert!(output.pipe);
        assert_eq!(output.integration_id.as_deref(), Some("crm"));
        assert_eq!(output.value["table"], "Contacts");
        assert_eq!(output.value["records"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_api_call_unknown_provider() {
        let hub = Integration::new("hub", "hubspot", json!({}));
        let executor = executor_with(vec![hub], EngineConfig::default()).await;
        let ctx = WorkflowContext::new("wf", json!({}));

        let err = executor
            .execute(&api_call("hub", "contacts", "get"), &json!({}), &ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::ProviderNotSupported(ref p) if p == "hubspot"));
    }

    #[tokio::test]
    async fn test_api_call_refuses_inactive_integration() {
        let mut crm = Integration::new("crm", "airtable", json!({}));
        crm.status = IntegrationStatus::Inactive;
        let executor = executor_with(vec![crm], EngineConfig::default()).await;
        let ctx = WorkflowContext::new("wf", json!({}));

        let err = executor
            .execute(&api_call("crm", "T", "get"), &json!({}), &ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::IntegrationUnavailable { .. }));

        let err = executor
            .execute(&api_call("missing", "T", "get"), &json!({}), &ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::IntegrationNotFound(_)));
    }

    #[tokio::test]
    async fn test_unsupported_method_names_method() {
        let crm = Integration::new("crm", "airtable", json!({}));
        let executor = executor_with(vec![crm], EngineConfig::default()).await;
        let ctx = WorkflowContext::new("wf", json!({}));

        let err = executor
            .execute(&api_call("crm", "T", "options"), &json!({}), &ctx)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Unsupported HTTP method: options");
    }

    #[tokio::test]
    async fn test_data_transform_pipes() {
        let executor = executor_with(vec![], EngineConfig::default()).await;
        let ctx = WorkflowContext::new("wf", json!({}));
        let action = StepAction::DataTransform(TransformConfig::Aggregate {
            field: "amount".to_string(),
            operation: AggregateOp::Sum,
        });

        let output = executor
            .execute(&action, &json!([{"amount": 2}, {"amount": 3}]), &ctx)
            .await
            .unwrap();
        assert!(output.pipe);
        assert_eq!(output.value, json!(5));
    }

    #[tokio::test]
    async fn test_condition_without_action_returns_bool() {
        let executor = executor_with(vec![], EngineConfig::default()).await;
        let ctx = WorkflowContext::new("wf", json!({}));
        let action = StepAction::Condition(ConditionStepConfig {
            conditions: vec![Condition::new("count", Operator::GreaterThan, Some(json!(0)))],
            true_action: None,
            false_action: None,
        });

        let output = executor.execute(&action, &json!({"count": 3}), &ctx).await.unwrap();
        assert_eq!(output.value, Value::Bool(true));
        assert!(!output.pipe);
    }

    #[tokio::test]
    async fn test_condition_runs_branch_action() {
        let executor = executor_with(vec![], EngineConfig::default()).await;
        let ctx = WorkflowContext::new("wf", json!({}));
        let count = StepAction::DataTransform(TransformConfig::Aggregate {
            field: "id".to_string(),
            operation: AggregateOp::Count,
        });
        let action = StepAction::Condition(ConditionStepConfig {
            conditions: vec![Condition::new("0.id", Operator::Exists, None)],
            true_action: Some(Box::new(count)),
            false_action: None,
        });

        let output = executor.execute(&action, &json!([{"id": 1}, {"id": 2}]), &ctx).await.unwrap();
        assert!(output.pipe);
        assert_eq!(output.value, json!(2));
    }

    #[tokio::test]
    async fn test_nested_actions_respect_depth_limit() {
        let config = EngineConfig {
            max_action_depth: 2,
            ..EngineConfig::default()
        };
        let executor = executor_with(vec![], config).await;
        let ctx = WorkflowContext::new("wf", json!({}));

        let mut action = StepAction::Condition(ConditionStepConfig {
            conditions: vec![],
            true_action: None,
            false_action: None,
        });
        for _ in 0..3 {
            action = StepAction::Condition(ConditionStepConfig {
                conditions: vec![],
                true_action: Some(Box::new(action)),
                false_action: None,
            });
        }

        let err = executor.execute(&action, &json!({}), &ctx).await.unwrap_err();
        assert!(matches!(err, EngineError::ActionDepthExceeded(2)));
    }

    #[tokio::test]
    async fn test_success_false_result_fails_step() {
        let base = serve(Router::new().route(
            "/hook",
            axum::routing::post(|| async { Json(json!({"success": false, "error": "quota exceeded"})) }),
        ))
        .await;
        let executor = executor_with(vec![], EngineConfig::default()).await;
        let ctx = WorkflowContext::new("wf", json!({}));
        let step = WorkflowStep::new(
            "hook",
            1,
            StepAction::Webhook(crate::models::WebhookConfig {
                url: format!("{}/hook", base),
                method: "POST".to_string(),
                headers: HashMap::new(),
                body: None,
            }),
        );

        let err = executor.execute_step(&step, &ctx).await.unwrap_err();
        assert!(matches!(err, EngineError::StepFailed { ref message, .. } if message == "quota exceeded"));
    }

    #[tokio::test]
    async fn test_notification_does_not_pipe() {
        let base = serve(Router::new().route(
            "/notify",
            axum::routing::post(|Json(body): Json<Value>| async move { Json(json!({"received": body["message"]})) }),
        ))
        .await;
        let executor = executor_with(vec![], EngineConfig::default()).await;
        let ctx = WorkflowContext::new("wf", json!({}));
        let action = StepAction::Notification(NotificationConfig::Webhook {
            url: format!("{}/notify", base),
            message: Some("Synced {{ input | length }} records".to_string()),
        });

        let output = executor.execute(&action, &json!([1, 2, 3]), &ctx).await.unwrap();
        assert!(!output.pipe);
        assert_eq!(output.value["response"]["received"], "Synced 3 records");
    }
}
