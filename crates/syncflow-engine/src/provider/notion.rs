//! Notion API adapter.

use async_trait::async_trait;
use reqwest::Method;
use serde_json::{json, Value};

use crate::error::EngineResult;

use super::client::{base_url, config_str, join_url, require_str, AuthCredentials, ProviderClient, ProviderRequest};
use super::ProviderAdapter;

const DEFAULT_BASE_URL: &str = "https://api.notion.com/v1";
const NOTION_VERSION: &str = "2022-06-28";

/// Notion API. Endpoints are paths such as `pages/{id}` or
/// `databases/{id}/query`.
pub struct NotionProvider {
    client: ProviderClient,
}

impl NotionProvider {
    /// Create a new Notion adapter.
    pub fn new(client: ProviderClient) -> Self {
        Self { client }
    }

    fn request<'a>(config: &Value, method: Method, endpoint: &str) -> EngineResult<ProviderRequest<'a>> {
        let auth = AuthCredentials::Bearer(require_str(config, "api_key")?.to_string());
        let url = join_url(base_url(config, DEFAULT_BASE_URL), endpoint);
        Ok(ProviderRequest::new(method, url, auth).header("Notion-Version", NOTION_VERSION))
    }
}

#[async_trait]
impl ProviderAdapter for NotionProvider {
    fn id(&self) -> &'static str {
        "notion"
    }

    fn display_name(&self) -> &'static str {
        "Notion"
    }

    fn validate_config(&self, config: &Value) -> Vec<String> {
        if config_str(config, "api_key").is_none() {
            return vec!["API key is required".to_string()];
        }
        Vec::new()
    }

    async fn check_connection(&self, config: &Value) -> EngineResult<()> {
        self.client
            .send(Self::request(config, Method::GET, "users/me")?)
            .await?;
        Ok(())
    }

    async fn get_data(&self, config: &Value, endpoint: &str, params: Option<&Value>) -> EngineResult<Value> {
        let request = Self::request(config, Method::GET, endpoint)?.query(params);
        self.client.send(request).await
    }

    async fn post_data(&self, config: &Value, endpoint: &str, body: &Value) -> EngineResult<Value> {
        let request = Self::request(config, Method::POST, endpoint)?.json(body);
        self.client.send(request).await
    }

    async fn put_data(&self, config: &Value, endpoint: &str, body: &Value) -> EngineResult<Value> {
        let request = Self::request(config, Method::PATCH, endpoint)?.json(body);
        self.client.send(request).await
    }

    async fn delete_data(&self, config: &Value, endpoint: &str) -> EngineResult<bool> {
        // Notion pages are archived, not deleted.
        let body = json!({"archived": true});
        let request = Self::request(config, Method::PATCH, endpoint)?.json(&body);
        let response = self.client.send(request).await?;
        Ok(response.get("archived").and_then(Value::as_bool).unwrap_or(true))
    }

    async fn get_schema(&self, config: &Value) -> EngineResult<Value> {
        let body = json!({"filter": {"property": "object", "value": "database"}});
        let request = Self::request(config, Method::POST, "search")?.json(&body);
        let response = self.client.send(request).await?;

        let databases: Vec<Value> = response
            .get("results")
            .and_then(Value::as_array)
            .map(|results| {
                results
                    .iter()
                    .map(|db| {
                        let title = db
                            .pointer("/title/0/plain_text")
                            .cloned()
                            .unwrap_or(Value::Null);
                        let properties: Vec<&String> = db
                            .get("properties")
                            .and_then(Value::as_object)
                            .map(|props| props.keys().collect())
                            .unwrap_or_default();
                        json!({"id": db.get("id"), "title": title, "properties": properties})
                    })
                    .collect()
            })
            .unwrap_or_default();
        Ok(json!({"databases": databases}))
    }
}
