//! Airtable adapter.

use async_trait::async_trait;
use reqwest::Method;
use serde_json::Value;

use crate::error::EngineResult;

use super::client::{base_url, config_str, join_url, require_str, AuthCredentials, ProviderClient, ProviderRequest};
use super::ProviderAdapter;

const DEFAULT_BASE_URL: &str = "https://api.airtable.com/v0";

/// Airtable REST API. Endpoints are table names (or `table/record_id`)
/// inside the configured base.
pub struct AirtableProvider {
    client: ProviderClient,
}

impl AirtableProvider {
    /// Create a new Airtable adapter.
    pub fn new(client: ProviderClient) -> Self {
        Self { client }
    }

    fn auth(config: &Value) -> EngineResult<AuthCredentials> {
        Ok(AuthCredentials::Bearer(require_str(config, "api_key")?.to_string()))
    }

    fn table_url(config: &Value, endpoint: &str) -> EngineResult<String> {
        let base_id = require_str(config, "base_id")?;
        Ok(join_url(
            base_url(config, DEFAULT_BASE_URL),
            &format!("{}/{}", base_id, endpoint.trim_start_matches('/')),
        ))
    }
}

#[async_trait]
impl ProviderAdapter for AirtableProvider {
    fn id(&self) -> &'static str {
        "airtable"
    }

    fn display_name(&self) -> &'static str {
        "Airtable"
    }

    fn validate_config(&self, config: &Value) -> Vec<String> {
        let mut errors = Vec::new();
        if config_str(config, "api_key").is_none() {
            errors.push("API key is required".to_string());
        }
        if config_str(config, "base_id").is_none() {
            errors.push("Base ID is required".to_string());
        }
        errors
    }

    async fn check_connection(&self, config: &Value) -> EngineResult<()> {
        let url = join_url(base_url(config, DEFAULT_BASE_URL), "meta/bases");
        self.client
            .send(ProviderRequest::new(Method::GET, url, Self::auth(config)?))
            .await?;
        Ok(())
    }

    async fn get_data(&self, config: &Value, endpoint: &str, params: Option<&Value>) -> EngineResult<Value> {
        let request = ProviderRequest::new(Method::GET, Self::table_url(config, endpoint)?, Self::auth(config)?)
            .query(params);
        self.client.send(request).await
    }

    async fn post_data(&self, config: &Value, endpoint: &str, body: &Value) -> EngineResult<Value> {
        let request = ProviderRequest::new(Method::POST, Self::table_url(config, endpoint)?, Self::auth(config)?)
            .json(body);
        self.client.send(request).await
    }

    async fn put_data(&self, config: &Value, endpoint: &str, body: &Value) -> EngineResult<Value> {
        // PATCH updates only the given fields; PUT would clear the rest.
        let request = ProviderRequest::new(Method::PATCH, Self::table_url(config, endpoint)?, Self::auth(config)?)
            .json(body);
        self.client.send(request).await
    }

    async fn delete_data(&self, config: &Value, endpoint: &str) -> EngineResult<bool> {
        let request = ProviderRequest::new(Method::DELETE, Self::table_url(config, endpoint)?, Self::auth(config)?);
        let response = self.client.send(request).await?;
        Ok(response.get("deleted").and_then(Value::as_bool).unwrap_or(true))
    }

    async fn get_schema(&self, config: &Value) -> EngineResult<Value> {
        let base_id = require_str(config, "base_id")?;
        let url = join_url(
            base_url(config, DEFAULT_BASE_URL),
            &format!("meta/bases/{}/tables", base_id),
        );
        self.client
            .send(ProviderRequest::new(Method::GET, url, Self::auth(config)?))
            .await
    }
}
