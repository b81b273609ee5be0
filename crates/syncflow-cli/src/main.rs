//! Syncflow CLI.
//!
//! Loads integration and workflow definitions (YAML or JSON), then runs
//! workflows, tests connections or validates definitions. Results are
//! printed as pretty JSON on stdout; logs go to stderr.

mod definitions;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use syncflow_engine::provider::ProviderClient;
use syncflow_engine::{EngineConfig, IntegrationService, ProviderRegistry};

use definitions::{apply_variables, load_integrations, load_workflow, parse_variables};

#[derive(Parser)]
#[command(name = "syncflow")]
#[command(version, about = "Syncflow - integration workflow runner", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a workflow against a set of integrations
    ///
    /// Examples:
    ///     syncflow run sync.yaml -i integrations.yaml
    ///     syncflow run sync.yaml -i integrations.yaml --data '{"since": "2024-01-01"}'
    ///     syncflow run sync.yaml -i integrations.yaml --set table=Contacts
    #[command(verbatim_doc_comment)]
    Run {
        /// Workflow definition file
        #[arg(value_name = "WORKFLOW")]
        workflow: PathBuf,

        /// Integration definitions file
        #[arg(short, long, value_name = "INTEGRATIONS")]
        integrations: PathBuf,

        /// Initial data as a JSON string
        #[arg(long, value_name = "JSON")]
        data: Option<String>,

        /// Set initial data fields (format: key=value), can be repeated
        #[arg(long = "set", value_name = "KEY=VALUE")]
        variables: Vec<String>,
    },

    /// Test provider connections
    Test {
        /// Integration definitions file
        #[arg(value_name = "INTEGRATIONS")]
        integrations: PathBuf,

        /// Only test the integration with this id
        #[arg(long)]
        id: Option<String>,
    },

    /// Validate a workflow definition
    Validate {
        /// Workflow definition file
        #[arg(value_name = "WORKFLOW")]
        workflow: PathBuf,

        /// Integration definitions file; checks that referenced integrations exist
        #[arg(short, long, value_name = "INTEGRATIONS")]
        integrations: Option<PathBuf>,
    },

    /// List supported providers
    Providers,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,syncflow_engine=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = EngineConfig::from_env().context("Failed to load SYNCFLOW_* configuration")?;

    match cli.command {
        Commands::Run {
            workflow,
            integrations,
            data,
            variables,
        } => run(config, workflow, integrations, data, variables).await,
        Commands::Test { integrations, id } => test(config, integrations, id).await,
        Commands::Validate {
            workflow,
            integrations,
        } => validate(workflow, integrations),
        Commands::Providers => providers(config),
    }
}

async fn run(
    config: EngineConfig,
    workflow_path: PathBuf,
    integrations_path: PathBuf,
    data: Option<String>,
    variables: Vec<String>,
) -> Result<()> {
    let workflow = load_workflow(&workflow_path)?;
    let integrations = load_integrations(&integrations_path)?;

    let mut initial = match data {
        Some(raw) => serde_json::from_str(&raw).context("--data is not valid JSON")?,
        None => json!({}),
    };
    apply_variables(&mut initial, &parse_variables(&variables)?)?;

    let service = IntegrationService::new(config);
    for integration in integrations {
        let id = integration.id.clone();
        service
            .add_integration(integration)
            .await
            .with_context(|| format!("Integration '{}' rejected", id))?;
    }
    let workflow = service.add_workflow(workflow).await?;

    tracing::info!(workflow_id = %workflow.id, "Running workflow");

    let outcome = tokio::select! {
        outcome = service.execute_workflow(&workflow.id, Some(initial)) => outcome,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received");
            anyhow::bail!("Interrupted");
        }
    };

    match outcome {
        Ok(result) => {
            print_json(&serde_json::to_value(&result)?)?;
            if !result.success {
                anyhow::bail!("Workflow {} completed with failed steps", workflow.id);
            }
            Ok(())
        }
        Err(e) => {
            print_json(&json!({ "error": e.to_string(), "events": service.events() }))?;
            Err(e).context(format!("Workflow {} failed", workflow.id))
        }
    }
}

async fn test(config: EngineConfig, integrations_path: PathBuf, only: Option<String>) -> Result<()> {
    let integrations = load_integrations(&integrations_path)?;
    let service = IntegrationService::new(config);

    let mut reports = Vec::new();
    let mut failures = 0;
    for integration in integrations {
        if only.as_deref().is_some_and(|id| id != integration.id) {
            continue;
        }
        let id = integration.id.clone();
        let provider = integration.provider.clone();

        let report = match service.add_integration(integration).await {
            Ok(_) => {
                let result = service.test_connection(&id).await?;
                if !result.success {
                    failures += 1;
                }
                json!({ "id": id, "provider": provider, "result": result })
            }
            Err(e) => {
                failures += 1;
                json!({ "id": id, "provider": provider, "error": e.to_string() })
            }
        };
        reports.push(report);
    }

    if let Some(id) = only {
        if reports.is_empty() {
            anyhow::bail!("No integration with id '{}'", id);
        }
    }

    print_json(&Value::Array(reports))?;
    if failures > 0 {
        anyhow::bail!("{} connection test(s) failed", failures);
    }
    Ok(())
}

fn validate(workflow_path: PathBuf, integrations_path: Option<PathBuf>) -> Result<()> {
    let workflow = load_workflow(&workflow_path)?;
    workflow.validate()?;

    let referenced: Vec<String> = workflow.integration_ids().into_iter().collect();
    if let Some(path) = integrations_path {
        let registry = ProviderRegistry::with_builtin_providers(ProviderClient::new(Duration::from_secs(1)));
        let known = load_integrations(&path)?;

        let mut problems = Vec::new();
        for id in &referenced {
            match known.iter().find(|i| &i.id == id) {
                None => problems.push(format!("integration '{}' is not defined", id)),
                Some(i) => match registry.resolve(&i.provider) {
                    Err(e) => problems.push(format!("integration '{}': {}", id, e)),
                    Ok(adapter) => {
                        for error in adapter.validate_config(&i.config) {
                            problems.push(format!("integration '{}': {}", id, error));
                        }
                    }
                },
            }
        }
        if !problems.is_empty() {
            print_json(&json!({ "valid": false, "problems": problems }))?;
            anyhow::bail!("Workflow {} is not valid", workflow.id);
        }
    }

    let steps: Vec<Value> = workflow
        .sorted_steps()
        .iter()
        .map(|s| json!({ "id": s.id, "order": s.order, "type": s.action.kind() }))
        .collect();
    print_json(&json!({
        "valid": true,
        "workflow_id": workflow.id,
        "steps": steps,
        "integrations": referenced,
    }))
}

fn providers(config: EngineConfig) -> Result<()> {
    let registry = ProviderRegistry::with_builtin_providers(ProviderClient::new(config.http_timeout()));
    let mut list = Vec::new();
    for id in registry.list() {
        let adapter = registry.resolve(id)?;
        list.push(json!({ "id": id, "name": adapter.display_name() }));
    }
    print_json(&Value::Array(list))
}

fn print_json(value: &Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
