//! Loading of definition files and `--set` variables.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::Value;

use syncflow_engine::{Integration, IntegrationWorkflow};

/// An integrations file is either a list or `{integrations: [...]}`.
#[derive(Deserialize)]
#[serde(untagged)]
enum IntegrationsFile {
    List(Vec<Integration>),
    Wrapped { integrations: Vec<Integration> },
}

/// Parse YAML or JSON text. JSON is read as YAML.
pub fn parse_definition<T: serde::de::DeserializeOwned>(text: &str) -> Result<T> {
    Ok(serde_yaml::from_str(text)?)
}

pub fn load_workflow(path: &Path) -> Result<IntegrationWorkflow> {
    let text = fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    parse_definition(&text).with_context(|| format!("Invalid workflow definition in {}", path.display()))
}

pub fn load_integrations(path: &Path) -> Result<Vec<Integration>> {
    let text = fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let file: IntegrationsFile = parse_definition(&text)
        .with_context(|| format!("Invalid integration definitions in {}", path.display()))?;
    Ok(match file {
        IntegrationsFile::List(list) => list,
        IntegrationsFile::Wrapped { integrations } => integrations,
    })
}

/// Parse key=value variables
pub fn parse_variables(variables: &[String]) -> Result<HashMap<String, String>> {
    let mut vars = HashMap::new();
    for var in variables {
        let parts: Vec<&str> = var.splitn(2, '=').collect();
        if parts.len() != 2 {
            return Err(anyhow::anyhow!("Invalid variable format: {}. Expected key=value", var));
        }
        vars.insert(parts[0].to_string(), parts[1].to_string());
    }
    Ok(vars)
}

/// Merge variables into the initial data. Values that parse as JSON keep
/// their type; anything else is a string.
pub fn apply_variables(data: &mut Value, vars: &HashMap<String, String>) -> Result<()> {
    if vars.is_empty() {
        return Ok(());
    }
    let Value::Object(map) = data else {
        anyhow::bail!("--set needs the initial data to be a JSON object");
    };
    for (key, raw) in vars {
        let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.clone()));
        map.insert(key.clone(), value);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use syncflow_engine::StepAction;

    const WORKFLOW_YAML: &str = r#"
id: contacts-sync
name: Contacts sync
error_handling: continue
steps:
  - id: notify
    order: 3
    type: notification
    config:
      type: slack
      webhook_url: https://hooks.slack.com/services/T/B/X
      message: "Synced {{ input | length }} contacts"
  - id: fetch
    order: 1
    type: api_call
    config:
      integration_id: crm
      endpoint: Contacts
      params:
        maxRecords: 100
  - id: active
    order: 2
    type: data_transform
    config:
      type: filter
      conditions:
        - field: fields.Status
          operator: equals
          value: Active
"#;

    #[test]
    fn test_parse_workflow_yaml() {
        let workflow: IntegrationWorkflow = parse_definition(WORKFLOW_YAML).unwrap();
        workflow.validate().unwrap();

        let kinds: Vec<&str> = workflow.sorted_steps().iter().map(|s| s.action.kind()).collect();
        assert_eq!(kinds, vec!["api_call", "data_transform", "notification"]);
        assert!(matches!(workflow.steps[1].action, StepAction::ApiCall(ref c) if c.method == "get"));
        assert_eq!(workflow.integration_ids().into_iter().collect::<Vec<_>>(), vec!["crm"]);
    }

    #[test]
    fn test_unknown_step_type_is_rejected() {
        let text = r#"{"id": "wf", "steps": [{"id": "a", "order": 1, "type": "ftp_upload", "config": {}}]}"#;
        assert!(parse_definition::<IntegrationWorkflow>(text).is_err());
    }

    #[test]
    fn test_integrations_file_shapes() {
        let list: IntegrationsFile = parse_definition(
            r#"[{"id": "crm", "provider": "airtable", "config": {"api_key": "k", "base_id": "app1"}}]"#,
        )
        .unwrap();
        let wrapped: IntegrationsFile = parse_definition(
            "integrations:\n  - id: chat\n    provider: slack\n    config:\n      bot_token: xoxb-1\n",
        )
        .unwrap();

        assert!(matches!(list, IntegrationsFile::List(ref l) if l[0].id == "crm"));
        assert!(matches!(wrapped, IntegrationsFile::Wrapped { ref integrations } if integrations[0].provider == "slack"));
    }

    #[test]
    fn test_parse_variables() {
        let vars = parse_variables(&["table=Contacts".to_string(), "limit=10".to_string()]).unwrap();
        assert_eq!(vars.get("table").map(String::as_str), Some("Contacts"));
        assert!(parse_variables(&["novalue".to_string()]).is_err());
    }

    #[test]
    fn test_apply_variables_keeps_json_types() {
        let mut data = json!({"since": "2024-01-01"});
        let vars = parse_variables(&[
            "limit=10".to_string(),
            "dry_run=true".to_string(),
            "table=Contacts".to_string(),
        ])
        .unwrap();
        apply_variables(&mut data, &vars).unwrap();
        assert_eq!(
            data,
            json!({"since": "2024-01-01", "limit": 10, "dry_run": true, "table": "Contacts"})
        );

        let mut not_object = json!([1]);
        assert!(apply_variables(&mut not_object, &vars).is_err());
    }
}
