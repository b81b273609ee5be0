//! Stripe API adapter.
//!
//! Stripe takes form-encoded request bodies; nested JSON is flattened into
//! `key[sub]` / `key[0]` pairs.

use async_trait::async_trait;
use reqwest::Method;
use serde_json::{json, Value};

use crate::error::EngineResult;
use crate::value::to_text;

use super::client::{base_url, config_str, join_url, require_str, AuthCredentials, ProviderClient, ProviderRequest};
use super::ProviderAdapter;

const DEFAULT_BASE_URL: &str = "https://api.stripe.com/v1";

/// Objects reported by [`StripeProvider::get_schema`].
const OBJECTS: &[(&str, &str)] = &[
    ("customers", "Customer"),
    ("charges", "Charge"),
    ("payment_intents", "PaymentIntent"),
    ("invoices", "Invoice"),
    ("subscriptions", "Subscription"),
    ("products", "Product"),
    ("prices", "Price"),
];

/// Stripe REST API.
pub struct StripeProvider {
    client: ProviderClient,
}

impl StripeProvider {
    /// Create a new Stripe adapter.
    pub fn new(client: ProviderClient) -> Self {
        Self { client }
    }

    fn request<'a>(config: &Value, method: Method, endpoint: &str) -> EngineResult<ProviderRequest<'a>> {
        let auth = AuthCredentials::Bearer(require_str(config, "secret_key")?.to_string());
        let url = join_url(base_url(config, DEFAULT_BASE_URL), endpoint);
        Ok(ProviderRequest::new(method, url, auth))
    }
}

/// Flatten a JSON body into Stripe's form encoding.
pub fn form_pairs(body: &Value) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    if let Value::Object(map) = body {
        for (key, value) in map {
            flatten_into(key.clone(), value, &mut pairs);
        }
    }
    pairs
}

fn flatten_into(prefix: String, value: &Value, pairs: &mut Vec<(String, String)>) {
    match value {
        Value::Null => {}
        Value::Object(map) => {
            for (key, nested) in map {
                flatten_into(format!("{}[{}]", prefix, key), nested, pairs);
            }
        }
        Value::Array(items) => {
            for (i, nested) in items.iter().enumerate() {
                flatten_into(format!("{}[{}]", prefix, i), nested, pairs);
            }
        }
        scalar => pairs.push((prefix, to_text(scalar))),
    }
}

#[async_trait]
impl ProviderAdapter for StripeProvider {
    fn id(&self) -> &'static str {
        "stripe"
    }

    fn display_name(&self) -> &'static str {
        "Stripe"
    }

    fn validate_config(&self, config: &Value) -> Vec<String> {
        match config_str(config, "secret_key") {
            None => vec!["Secret key is required".to_string()],
            Some(key) if !(key.starts_with("sk_") || key.starts_with("rk_")) => {
                vec!["Secret key must start with sk_ or rk_".to_string()]
            }
            Some(_) => Vec::new(),
        }
    }

    async fn check_connection(&self, config: &Value) -> EngineResult<()> {
        self.client
            .send(Self::request(config, Method::GET, "balance")?)
            .await?;
        Ok(())
    }

    async fn get_data(&self, config: &Value, endpoint: &str, params: Option<&Value>) -> EngineResult<Value> {
        let request = Self::request(config, Method::GET, endpoint)?.query(params);
        self.client.send(request).await
    }

    async fn post_data(&self, config: &Value, endpoint: &str, body: &Value) -> EngineResult<Value> {
        let request = Self::request(config, Method::POST, endpoint)?.form(form_pairs(body));
        self.client.send(request).await
    }

    async fn put_data(&self, config: &Value, endpoint: &str, body: &Value) -> EngineResult<Value> {
        // Stripe updates are POSTs to the object URL.
        self.post_data(config, endpoint, body).await
    }

    async fn delete_data(&self, config: &Value, endpoint: &str) -> EngineResult<bool> {
        let response = self
            .client
            .send(Self::request(config, Method::DELETE, endpoint)?)
            .await?;
        Ok(response.get("deleted").and_then(Value::as_bool).unwrap_or(true))
    }

    async fn get_schema(&self, _config: &Value) -> EngineResult<Value> {
        let objects: Vec<Value> = OBJECTS
            .iter()
            .map(|(endpoint, name)| json!({"endpoint": endpoint, "name": name}))
            .collect();
        Ok(json!({"objects": objects}))
    }
}
