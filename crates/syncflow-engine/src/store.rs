//! In-memory integration and workflow stores.

use std::collections::HashMap;

use tokio::sync::RwLock;

use crate::error::{EngineError, EngineResult};
use crate::models::{Integration, IntegrationWorkflow};

/// Integrations keyed by id.
#[derive(Debug, Default)]
pub struct IntegrationStore {
    integrations: RwLock<HashMap<String, Integration>>,
}

impl IntegrationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace an integration.
    pub async fn insert(&self, integration: Integration) {
        self.integrations
            .write()
            .await
            .insert(integration.id.clone(), integration);
    }

    pub async fn get(&self, id: &str) -> EngineResult<Integration> {
        self.integrations
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| EngineError::IntegrationNotFound(id.to_string()))
    }

    /// All integrations, sorted by id.
    pub async fn list(&self) -> Vec<Integration> {
        let mut all: Vec<Integration> = self.integrations.read().await.values().cloned().collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        all
    }

    /// Apply `f` to a stored integration and return the updated copy.
    pub async fn update<F>(&self, id: &str, f: F) -> EngineResult<Integration>
    where
        F: FnOnce(&mut Integration),
    {
        let mut integrations = self.integrations.write().await;
        let integration = integrations
            .get_mut(id)
            .ok_or_else(|| EngineError::IntegrationNotFound(id.to_string()))?;
        f(integration);
        Ok(integration.clone())
    }
}

/// Workflows keyed by id.
#[derive(Debug, Default)]
pub struct WorkflowStore {
    workflows: RwLock<HashMap<String, IntegrationWorkflow>>,
}

impl WorkflowStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a workflow.
    pub async fn insert(&self, workflow: IntegrationWorkflow) {
        self.workflows
            .write()
            .await
            .insert(workflow.id.clone(), workflow);
    }

    pub async fn get(&self, id: &str) -> EngineResult<IntegrationWorkflow> {
        self.workflows
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| EngineError::WorkflowNotFound(id.to_string()))
    }

    /// All workflows, sorted by id.
    pub async fn list(&self) -> Vec<IntegrationWorkflow> {
        let mut all: Vec<IntegrationWorkflow> = self.workflows.read().await.values().cloned().collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        all
    }

    /// Apply `f` to a stored workflow and return the updated copy.
    pub async fn update<F>(&self, id: &str, f: F) -> EngineResult<IntegrationWorkflow>
    where
        F: FnOnce(&mut IntegrationWorkflow),
    {
        let mut workflows = self.workflows.write().await;
        let workflow = workflows
            .get_mut(id)
            .ok_or_else(|| EngineError::WorkflowNotFound(id.to_string()))?;
        f(workflow);
        Ok(workflow.clone())
    }
}
