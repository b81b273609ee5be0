//! Event sink and in-memory event log.
//!
//! Every recorded event is sanitized, appended to the log and published on
//! the `integration_event` broadcast channel.

use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::error::{EngineError, EngineResult};
use crate::models::IntegrationEvent;
use crate::sanitize::sanitize_sensitive_data;

/// Name of the channel events are published on.
pub const EVENT_CHANNEL: &str = "integration_event";

/// Destination for audit events.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Record an event.
    async fn record(&self, event: IntegrationEvent) -> EngineResult<()>;
}

/// Append-only event log with broadcast fan-out.
pub struct EventLog {
    events: Mutex<Vec<IntegrationEvent>>,
    sender: broadcast::Sender<IntegrationEvent>,
}

impl EventLog {
    /// Create a log whose broadcast channel buffers `capacity` events.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            events: Mutex::new(Vec::new()),
            sender,
        }
    }

    /// Subscribe to events recorded from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<IntegrationEvent> {
        self.sender.subscribe()
    }

    /// All events, oldest first.
    pub fn list(&self) -> Vec<IntegrationEvent> {
        self.lock().map(|events| events.clone()).unwrap_or_default()
    }

    /// Events not yet resolved.
    pub fn unresolved(&self) -> Vec<IntegrationEvent> {
        self.list().into_iter().filter(|e| !e.resolved).collect()
    }

    /// Mark an event resolved. Returns false when the id is unknown.
    pub fn resolve(&self, event_id: &str) -> EngineResult<bool> {
        let mut events = self.lock()?;
        match events.iter_mut().find(|e| e.id == event_id) {
            Some(event) => {
                event.resolved = true;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn lock(&self) -> EngineResult<std::sync::MutexGuard<'_, Vec<IntegrationEvent>>> {
        self.events
            .lock()
            .map_err(|e| EngineError::EventSink(format!("event log poisoned: {}", e)))
    }
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new(256)
    }
}

#[async_trait]
impl EventSink for EventLog {
    async fn record(&self, mut event: IntegrationEvent) -> EngineResult<()> {
        event.payload = sanitize_sensitive_data(&event.payload);

        tracing::info!(
            channel = EVENT_CHANNEL,
            event_type = %event.event_type,
            severity = ?event.severity,
            workflow_id = ?event.workflow_id,
            integration_id = ?event.integration_id,
            "{}",
            event.title
        );

        self.lock()?.push(event.clone());
        // No subscribers is not an error.
        let _ = self.sender.send(event);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EventSeverity, EventType};
    use serde_json::json;

    #[tokio::test]
    async fn test_record_and_resolve() {
        let log = EventLog::new(8);
        let event = IntegrationEvent::workflow_error("wf", "run", "s1", "boom");
        let id = event.id.clone();
        log.record(event).await.unwrap();

        assert_eq!(log.list().len(), 1);
        assert_eq!(log.unresolved().len(), 1);
        assert!(log.resolve(&id).unwrap());
        assert!(log.unresolved().is_empty());
        assert!(!log.resolve("missing").unwrap());
    }

    #[tokio::test]
    async fn test_payload_is_sanitized() {
        let log = EventLog::new(8);
        let event = IntegrationEvent::new(
            EventType::ConnectionFailed,
            EventSeverity::High,
            "Connection failed",
            "401",
        )
        .with_payload(json!({"config": {"api_key": "secret-value", "base_id": "app1"}}));
        log.record(event).await.unwrap();

        let stored = &log.list()[0];
        assert_eq!(stored.payload["config"]["base_id"], "app1");
        assert_ne!(stored.payload["config"]["api_key"], "secret-value");
    }

    #[tokio::test]
    async fn test_subscribers_receive_events() {
        let log = EventLog::new(8);
        let mut rx = log.subscribe();
        log.record(IntegrationEvent::step_error("wf", "run", "s2", "bad"))
            .await
            .unwrap();

        let received = rx.recv().await.unwrap();
        assert_eq!(received.event_type, EventType::StepError);
        assert_eq!(received.payload["step_id"], "s2");
    }
}
