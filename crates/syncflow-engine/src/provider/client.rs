//! Shared HTTP plumbing for provider adapters.

use std::time::Duration;

use reqwest::Method;
use serde_json::Value;

use crate::error::{EngineError, EngineResult};
use crate::value::to_text;

/// Resolved authentication credentials.
#[derive(Debug, Clone)]
pub enum AuthCredentials {
    /// Bearer token.
    Bearer(String),
    /// Basic auth (username, password).
    Basic(String, String),
    /// API key (header name, value).
    ApiKey(String, String),
    /// No authentication.
    None,
}

impl AuthCredentials {
    /// Apply credentials to a reqwest request builder.
    pub fn apply_to_request(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self {
            AuthCredentials::Bearer(token) => request.bearer_auth(token),
            AuthCredentials::Basic(username, password) => {
                request.basic_auth(username, Some(password))
            }
            AuthCredentials::ApiKey(header, value) => request.header(header.as_str(), value.as_str()),
            AuthCredentials::None => request,
        }
    }
}

/// Request body encoding.
#[derive(Debug, Clone)]
pub enum RequestBody<'a> {
    None,
    Json(&'a Value),
    Form(Vec<(String, String)>),
}

/// One outgoing provider request.
#[derive(Debug, Clone)]
pub struct ProviderRequest<'a> {
    pub method: Method,
    pub url: String,
    pub auth: AuthCredentials,
    pub headers: Vec<(String, String)>,
    pub query: Vec<(String, String)>,
    pub body: RequestBody<'a>,
}

impl<'a> ProviderRequest<'a> {
    /// Create a request with no body or query.
    pub fn new(method: Method, url: impl Into<String>, auth: AuthCredentials) -> Self {
        Self {
            method,
            url: url.into(),
            auth,
            headers: Vec::new(),
            query: Vec::new(),
            body: RequestBody::None,
        }
    }

    /// Add a header.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Add query parameters from a JSON object.
    pub fn query(mut self, params: Option<&Value>) -> Self {
        if let Some(params) = params {
            self.query.extend(query_pairs(params));
        }
        self
    }

    /// Send a JSON body.
    pub fn json(mut self, body: &'a Value) -> Self {
        self.body = RequestBody::Json(body);
        self
    }

    /// Send a form-encoded body.
    pub fn form(mut self, pairs: Vec<(String, String)>) -> Self {
        self.body = RequestBody::Form(pairs);
        self
    }
}

/// HTTP client shared by all adapters. Each call is a single request.
#[derive(Debug, Clone)]
pub struct ProviderClient {
    http: reqwest::Client,
}

impl ProviderClient {
    /// Create a client with the given request timeout.
    pub fn new(timeout: Duration) -> Self {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        Self { http }
    }

    /// Send a request and decode the response.
    ///
    /// Non-2xx responses become [`EngineError::HttpStatus`]. JSON bodies are
    /// parsed; other bodies are returned as strings, empty bodies as null.
    pub async fn send(&self, request: ProviderRequest<'_>) -> EngineResult<Value> {
        tracing::debug!(method = %request.method, url = %request.url, "Provider request");

        let mut builder = self.http.request(request.method, &request.url);
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        builder = match request.body {
            RequestBody::None => builder,
            RequestBody::Json(body) => builder.json(body),
            RequestBody::Form(pairs) => builder.form(&pairs),
        };
        builder = request.auth.apply_to_request(builder);

        let response = builder.send().await?;
        let status = response.status();
        let text = response.text().await.unwrap_or_default();

        if !status.is_success() {
            return Err(EngineError::HttpStatus {
                status: status.as_u16(),
                body: text,
            });
        }

        Ok(parse_body(&text))
    }
}

/// Parse a response body: JSON when possible, otherwise text.
pub fn parse_body(text: &str) -> Value {
    if text.trim().is_empty() {
        return Value::Null;
    }
    serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string()))
}

/// Join a base URL and a relative path.
pub fn join_url(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}

/// Flatten a JSON object into query pairs. Arrays repeat the key.
pub fn query_pairs(params: &Value) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    if let Value::Object(map) = params {
        for (key, value) in map {
            match value {
                Value::Null => {}
                Value::Array(items) => {
                    pairs.extend(items.iter().map(|item| (key.clone(), to_text(item))));
                }
                other => pairs.push((key.clone(), to_text(other))),
            }
        }
    }
    pairs
}

/// Read a non-empty string field from a provider config.
pub fn config_str<'a>(config: &'a Value, key: &str) -> Option<&'a str> {
    config
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// Read a required string field, failing with a configuration error.
pub fn require_str<'a>(config: &'a Value, key: &str) -> EngineResult<&'a str> {
    config_str(config, key)
        .ok_or_else(|| EngineError::Configuration(format!("missing '{}' in integration config", key)))
}

/// Base URL for a provider, honouring a `base_url` override.
pub fn base_url<'a>(config: &'a Value, default: &'a str) -> &'a str {
    config_str(config, "base_url").unwrap_or(default)
}
