//! Third-party provider adapters.
//!
//! Each adapter wraps one vendor API behind [`ProviderAdapter`]:
//! - `airtable` - Airtable REST API
//! - `slack` - Slack Web API
//! - `notion` - Notion API
//! - `stripe` - Stripe API

mod airtable;
mod client;
mod notion;
mod registry;
mod slack;
mod stripe;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::EngineResult;

pub use self::airtable::AirtableProvider;
pub use self::client::{
    base_url, config_str, join_url, parse_body, query_pairs, require_str, AuthCredentials,
    ProviderClient, ProviderRequest, RequestBody,
};
pub use self::notion::NotionProvider;
pub use self::registry::ProviderRegistry;
pub use self::slack::SlackProvider;
pub use self::stripe::StripeProvider;

/// Uniform capability contract implemented by every provider.
///
/// `config` is the integration's configuration blob. Data methods issue a
/// single request with no retry and raise on transport or HTTP errors.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Unique provider id used as the registry key.
    fn id(&self) -> &'static str;

    /// Human-readable provider name.
    fn display_name(&self) -> &'static str;

    /// Local validation of the config. Empty when valid.
    fn validate_config(&self, config: &Value) -> Vec<String>;

    /// Verify credentials and reachability, reporting the failure.
    async fn check_connection(&self, config: &Value) -> EngineResult<()>;

    /// Verify credentials and reachability. Never fails; errors become `false`.
    async fn test_connection(&self, config: &Value) -> bool {
        match self.check_connection(config).await {
            Ok(()) => true,
            Err(e) => {
                tracing::debug!(provider = self.id(), error = %e, "Connection test failed");
                false
            }
        }
    }

    /// Read from `endpoint`.
    async fn get_data(&self, config: &Value, endpoint: &str, params: Option<&Value>)
        -> EngineResult<Value>;

    /// Create at `endpoint`.
    async fn post_data(&self, config: &Value, endpoint: &str, body: &Value) -> EngineResult<Value>;

    /// Update at `endpoint`.
    async fn put_data(&self, config: &Value, endpoint: &str, body: &Value) -> EngineResult<Value>;

    /// Delete at `endpoint`.
    async fn delete_data(&self, config: &Value, endpoint: &str) -> EngineResult<bool>;

    /// Describe the available tables/objects.
    async fn get_schema(&self, config: &Value) -> EngineResult<Value>;
}

#[cfg(test)]
pub(crate) mod testing {
    //! Local axum servers standing in for vendor APIs.

    use axum::Router;
    use tokio::net::TcpListener;

    /// Serve `router` on an ephemeral port and return its base URL.
    pub async fn serve(router: Router) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}", addr)
    }
}
