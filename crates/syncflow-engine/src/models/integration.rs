//! Configured provider connections.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::sanitize::sanitize_sensitive_data;

/// Connection status of an integration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum IntegrationStatus {
    #[default]
    Active,
    Inactive,
    Error,
    Syncing,
    Disconnected,
}

impl IntegrationStatus {
    /// Returns true if steps may call the integration.
    pub fn is_usable(&self) -> bool {
        matches!(self, IntegrationStatus::Active | IntegrationStatus::Error | IntegrationStatus::Syncing)
    }
}

impl std::fmt::Display for IntegrationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IntegrationStatus::Active => write!(f, "active"),
            IntegrationStatus::Inactive => write!(f, "inactive"),
            IntegrationStatus::Error => write!(f, "error"),
            IntegrationStatus::Syncing => write!(f, "syncing"),
            IntegrationStatus::Disconnected => write!(f, "disconnected"),
        }
    }
}

/// A configured connection to one third-party provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Integration {
    /// Unique integration id.
    pub id: String,

    /// Human-readable name.
    #[serde(default)]
    pub name: String,

    /// Provider id (e.g., "airtable", "slack").
    pub provider: String,

    /// Current status.
    #[serde(default)]
    pub status: IntegrationStatus,

    /// Provider configuration (API keys, base ids, base_url override).
    #[serde(default = "empty_object")]
    pub config: serde_json::Value,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_sync_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,

    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

fn empty_object() -> serde_json::Value {
    serde_json::Value::Object(serde_json::Map::new())
}

impl Integration {
    /// Create a new active integration.
    pub fn new(id: impl Into<String>, provider: impl Into<String>, config: serde_json::Value) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            provider: provider.into(),
            status: IntegrationStatus::Active,
            config,
            last_sync_at: None,
            last_error_at: None,
            last_error: None,
            created_at: Utc::now(),
        }
    }

    /// Set the display name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Record a successful interaction.
    pub fn mark_synced(&mut self) {
        self.status = IntegrationStatus::Active;
        self.last_sync_at = Some(Utc::now());
    }

    /// Record a failed interaction.
    pub fn mark_error(&mut self, error: impl Into<String>) {
        self.status = IntegrationStatus::Error;
        self.last_error_at = Some(Utc::now());
        self.last_error = Some(error.into());
    }

    /// Copy with secrets in `config` redacted, for display and logs.
    pub fn redacted(&self) -> Self {
        Self {
            config: sanitize_sensitive_data(&self.config),
            ..self.clone()
        }
    }
}
