//! Notification steps: email relay, Slack and plain webhooks.

use reqwest::Method;
use serde_json::{json, Value};

use crate::context::WorkflowContext;
use crate::error::{EngineError, EngineResult};
use crate::models::NotificationConfig;
use crate::provider::{AuthCredentials, ProviderRequest};

use super::StepExecutor;

impl StepExecutor {
    /// Send a notification. The result is recorded but never replaces the
    /// pipeline data.
    pub(super) async fn notify(
        &self,
        config: &NotificationConfig,
        input: &Value,
        ctx: &WorkflowContext,
    ) -> EngineResult<Value> {
        let tctx = ctx.to_template_context(input);

        match config {
            NotificationConfig::Email { to, subject, message } => {
                let relay = self.config.email_api_url.as_deref().ok_or_else(|| {
                    EngineError::Configuration(
                        "email notifications need SYNCFLOW_EMAIL_API_URL".to_string(),
                    )
                })?;
                if to.is_empty() {
                    return Err(EngineError::Configuration(
                        "email notification has no recipients".to_string(),
                    ));
                }

                let auth = match self.config.email_api_key.as_deref() {
                    Some(key) => AuthCredentials::Bearer(key.to_string()),
                    None => AuthCredentials::None,
                };
                let body = json!({
                    "from": self.config.email_from,
                    "to": to,
                    "subject": self.render_text(subject, &tctx)?,
                    "text": self.render_text(message, &tctx)?,
                });
                self.client
                    .send(ProviderRequest::new(Method::POST, relay, auth).json(&body))
                    .await?;

                tracing::info!(recipients = to.len(), "Email notification sent");
                Ok(json!({"channel": "email", "sent": true, "recipients": to.len()}))
            }

            NotificationConfig::Slack {
                message,
                channel,
                webhook_url,
                integration_id,
            } => {
                let text = self.render_text(message, &tctx)?;

                if let Some(url) = webhook_url {
                    let url = self.render_text(url, &tctx)?;
                    let mut body = json!({"text": text});
                    if let Some(channel) = channel {
                        body["channel"] = json!(channel);
                    }
                    let response = self
                        .client
                        .send(ProviderRequest::new(Method::POST, url.as_str(), AuthCredentials::None).json(&body))
                        .await?;
                    return Ok(json!({"channel": "slack", "sent": true, "response": response}));
                }

                let Some(integration_id) = integration_id else {
                    return Err(EngineError::Configuration(
                        "slack notification needs webhook_url or integration_id".to_string(),
                    ));
                };
                let channel = channel.as_deref().ok_or_else(|| {
                    EngineError::Configuration(
                        "slack notification through an integration needs a channel".to_string(),
                    )
                })?;

                let (integration, adapter) = self.usable_integration(integration_id).await?;
                let response = adapter
                    .post_data(
                        &integration.config,
                        "chat.postMessage",
                        &json!({"channel": channel, "text": text}),
                    )
                    .await?;
                Ok(json!({"channel": "slack", "sent": true, "response": response}))
            }

            NotificationConfig::Webhook { url, message } => {
                let url = self.render_text(url, &tctx)?;
                let message = message
                    .as_deref()
                    .map(|m| self.render_text(m, &tctx))
                    .transpose()?;
                let body = json!({
                    "workflow_id": ctx.workflow_id,
                    "run_id": ctx.run_id,
                    "step": ctx.current_step,
                    "message": message,
                    "data": input,
                });
                let response = self
                    .client
                    .send(ProviderRequest::new(Method::POST, url.as_str(), AuthCredentials::None).json(&body))
                    .await?;
                Ok(json!({"channel": "webhook", "sent": true, "response": response}))
            }
        }
    }
}
