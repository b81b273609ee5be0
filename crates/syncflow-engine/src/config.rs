//! Engine configuration.

use std::time::Duration;

use serde::Deserialize;

/// Engine configuration loaded from environment variables.
///
/// Environment variables are prefixed with `SYNCFLOW_`:
/// - `SYNCFLOW_DEFAULT_STEP_TIMEOUT_SECS`: Step timeout when neither step nor workflow sets one (default: 30)
/// - `SYNCFLOW_MAX_ACTION_DEPTH`: Maximum nesting of condition actions (default: 8)
/// - `SYNCFLOW_HTTP_TIMEOUT_SECS`: Per-request HTTP timeout (default: 30)
/// - `SYNCFLOW_SCHEMA_CACHE_TTL_SECS`: Schema cache lifetime (default: 300)
/// - `SYNCFLOW_EVENT_CHANNEL_CAPACITY`: Broadcast buffer for event subscribers (default: 256)
/// - `SYNCFLOW_EMAIL_API_URL`: HTTP mail relay for email notifications (optional)
/// - `SYNCFLOW_EMAIL_API_KEY`: Bearer token for the mail relay (optional)
/// - `SYNCFLOW_EMAIL_FROM`: Sender address for email notifications (optional)
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_step_timeout")]
    pub default_step_timeout_secs: u64,

    #[serde(default = "default_max_action_depth")]
    pub max_action_depth: usize,

    #[serde(default = "default_http_timeout")]
    pub http_timeout_secs: u64,

    #[serde(default = "default_schema_cache_ttl")]
    pub schema_cache_ttl_secs: u64,

    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,

    #[serde(default)]
    pub email_api_url: Option<String>,

    #[serde(default)]
    pub email_api_key: Option<String>,

    #[serde(default)]
    pub email_from: Option<String>,
}

fn default_step_timeout() -> u64 {
    30
}

fn default_max_action_depth() -> usize {
    8
}

fn default_http_timeout() -> u64 {
    30
}

fn default_schema_cache_ttl() -> u64 {
    300
}

fn default_event_channel_capacity() -> usize {
    256
}

impl EngineConfig {
    /// Load configuration from `SYNCFLOW_`-prefixed environment variables.
    pub fn from_env() -> Result<Self, envy::Error> {
        envy::prefixed("SYNCFLOW_").from_env::<EngineConfig>()
    }

    pub fn default_step_timeout(&self) -> Duration {
        Duration::from_secs(self.default_step_timeout_secs)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn schema_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.schema_cache_ttl_secs)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_step_timeout_secs: default_step_timeout(),
            max_action_depth: default_max_action_depth(),
            http_timeout_secs: default_http_timeout(),
            schema_cache_ttl_secs: default_schema_cache_ttl(),
            event_channel_capacity: default_event_channel_capacity(),
            email_api_url: None,
            email_api_key: None,
            email_from: None,
        }
    }
}
