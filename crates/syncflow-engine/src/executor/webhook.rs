//! Outbound webhook steps.

use reqwest::Method;
use serde_json::Value;

use crate::context::WorkflowContext;
use crate::error::{EngineError, EngineResult};
use crate::models::WebhookConfig;
use crate::provider::{AuthCredentials, ProviderRequest};

use super::StepExecutor;

/// Parse a webhook method. Only the usual verbs are accepted.
fn parse_method(method: &str) -> EngineResult<Method> {
    match method.trim().to_uppercase().as_str() {
        "GET" => Ok(Method::GET),
        "POST" => Ok(Method::POST),
        "PUT" => Ok(Method::PUT),
        "PATCH" => Ok(Method::PATCH),
        "DELETE" => Ok(Method::DELETE),
        _ => Err(EngineError::UnsupportedMethod(method.to_string())),
    }
}

impl StepExecutor {
    /// Send the configured body (or the step input) as JSON and return the
    /// parsed response.
    pub(super) async fn webhook(
        &self,
        config: &WebhookConfig,
        input: &Value,
        ctx: &WorkflowContext,
    ) -> EngineResult<Value> {
        let method = parse_method(&config.method)?;
        let tctx = ctx.to_template_context(input);

        let url = self.render_text(&config.url, &tctx)?;
        let body = match self.render_json(config.body.as_ref(), &tctx)? {
            Some(body) => body,
            None => input.clone(),
        };

        let mut request = ProviderRequest::new(method.clone(), url.as_str(), AuthCredentials::None);
        for (name, value) in &config.headers {
            request = request.header(name.as_str(), self.render_text(value, &tctx)?);
        }
        if method != Method::GET {
            request = request.json(&body);
        }

        tracing::debug!(url = %url, method = %method, "Webhook");
        self.client.send(request).await
    }
}
