//! Slack Web API adapter.
//!
//! Slack answers HTTP 200 for most failures and signals them with
//! `"ok": false`, so every response goes through [`ensure_ok`].

use async_trait::async_trait;
use reqwest::Method;
use serde_json::{json, Value};

use crate::error::{EngineError, EngineResult};

use super::client::{base_url, config_str, join_url, require_str, AuthCredentials, ProviderClient, ProviderRequest};
use super::ProviderAdapter;

const DEFAULT_BASE_URL: &str = "https://slack.com/api";

/// Slack Web API. Endpoints are method names such as `chat.postMessage`.
pub struct SlackProvider {
    client: ProviderClient,
}

impl SlackProvider {
    /// Create a new Slack adapter.
    pub fn new(client: ProviderClient) -> Self {
        Self { client }
    }

    fn auth(config: &Value) -> EngineResult<AuthCredentials> {
        Ok(AuthCredentials::Bearer(require_str(config, "bot_token")?.to_string()))
    }

    fn url(config: &Value, method: &str) -> String {
        join_url(base_url(config, DEFAULT_BASE_URL), method)
    }

    async fn call(&self, request: ProviderRequest<'_>) -> EngineResult<Value> {
        let response = self.client.send(request).await?;
        ensure_ok(response)
    }
}

/// Fail when a Slack response carries `"ok": false`.
pub(crate) fn ensure_ok(response: Value) -> EngineResult<Value> {
    if response.get("ok").and_then(Value::as_bool) == Some(false) {
        let error = response
            .get("error")
            .and_then(Value::as_str)
            .unwrap_or("unknown_error");
        return Err(EngineError::Provider(format!("slack: {}", error)));
    }
    Ok(response)
}

#[async_trait]
impl ProviderAdapter for SlackProvider {
    fn id(&self) -> &'static str {
        "slack"
    }

    fn display_name(&self) -> &'static str {
        "Slack"
    }

    fn validate_config(&self, config: &Value) -> Vec<String> {
        match config_str(config, "bot_token") {
            None => vec!["Bot token is required".to_string()],
            Some(token) if !token.starts_with("xoxb-") => {
                vec!["Bot token must start with xoxb-".to_string()]
            }
            Some(_) => Vec::new(),
        }
    }

    async fn check_connection(&self, config: &Value) -> EngineResult<()> {
        let request = ProviderRequest::new(Method::POST, Self::url(config, "auth.test"), Self::auth(config)?);
        self.call(request).await?;
        Ok(())
    }

    async fn get_data(&self, config: &Value, endpoint: &str, params: Option<&Value>) -> EngineResult<Value> {
        let request = ProviderRequest::new(Method::GET, Self::url(config, endpoint), Self::auth(config)?)
            .query(params);
        self.call(request).await
    }

    async fn post_data(&self, config: &Value, endpoint: &str, body: &Value) -> EngineResult<Value> {
        let request = ProviderRequest::new(Method::POST, Self::url(config, endpoint), Self::auth(config)?)
            .json(body);
        self.call(request).await
    }

    async fn put_data(&self, config: &Value, endpoint: &str, body: &Value) -> EngineResult<Value> {
        // The Web API has no PUT; updates are POSTs to `*.update` methods.
        self.post_data(config, endpoint, body).await
    }

    async fn delete_data(&self, config: &Value, endpoint: &str) -> EngineResult<bool> {
        let request = ProviderRequest::new(Method::POST, Self::url(config, endpoint), Self::auth(config)?);
        let response = self.call(request).await?;
        Ok(response.get("ok").and_then(Value::as_bool).unwrap_or(true))
    }

    async fn get_schema(&self, config: &Value) -> EngineResult<Value> {
        let params = json!({"types": "public_channel,private_channel", "limit": 200});
        let request = ProviderRequest::new(Method::GET, Self::url(config, "conversations.list"), Self::auth(config)?)
            .query(Some(&params));
        let response = self.call(request).await?;

        let channels: Vec<Value> = response
            .get("channels")
            .and_then(Value::as_array)
            .map(|channels| {
                channels
                    .iter()
                    .map(|c| json!({"id": c.get("id"), "name": c.get("name")}))
                    .collect()
            })
            .unwrap_or_default();
        Ok(json!({"channels": channels}))
    }
}
