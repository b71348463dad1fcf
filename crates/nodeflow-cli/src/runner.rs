use anyhow::{Context, Result};
use nodeflow_graph::{FunctionTool, Graph, GraphBuilder, ProviderRegistry, ToolRegistry};
use nodeflow_llm::{ClientFactory, ProviderConfig, ProviderType, ToolDefinition};
use nodeflow_types::{GraphConfig, GraphDefinition, RunEvent, RunRequest, RunStatus};
use serde_json::json;
use std::collections::HashMap;
use std::io::Write;
use std::path::Path;

pub fn load_graph(path: &Path) -> Result<GraphDefinition> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read graph file {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("Invalid graph definition in {}", path.display()))
}

/// Prompt table: a JSON object of prompt id to prompt text
pub fn load_prompts(path: &Path) -> Result<HashMap<String, String>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read prompts file {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("Invalid prompt table in {}", path.display()))
}

/// Every enabled provider with credentials in the environment
pub fn build_providers(enabled: &[ProviderType]) -> Result<ProviderRegistry> {
    let mut registry = ProviderRegistry::new();
    for provider in enabled {
        match ProviderConfig::from_env(*provider) {
            Ok(config) => {
                registry.register(*provider, ClientFactory::create_provider(config)?);
                tracing::info!(provider = %provider, "Provider registered");
            }
            Err(e) => tracing::warn!(provider = %provider, "Skipping provider: {}", e),
        }
    }
    Ok(registry)
}

/// Tools shipped with the runner
pub fn builtin_tools() -> ToolRegistry {
    let current_time = FunctionTool::new(
        ToolDefinition::new(
            "current_time",
            "Current date and time in UTC, RFC 3339 formatted",
            json!({"type": "object", "properties": {}}),
        ),
        |_args| async move { Ok(json!({ "utc": chrono::Utc::now().to_rfc3339() })) },
    );

    ToolRegistry::new().with_tool(current_time)
}

pub fn build_graph(definition: GraphDefinition, providers: ProviderRegistry, config: GraphConfig) -> Result<Graph> {
    GraphBuilder::new(definition)
        .providers(providers)
        .tools(builtin_tools())
        .config(config)
        .build()
        .context("Invalid graph")
}

/// Run the graph, writing each event as one JSON line; returns the final status
pub async fn run_graph(graph: &Graph, request: RunRequest, out: &mut impl Write) -> Result<RunStatus> {
    let (mut events, handle, cancel) = graph.spawn_run(request);

    let interrupt = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Interrupted, cancelling run");
                cancel.cancel();
            }
        })
    };

    while let Some(event) = events.recv().await {
        write_event(out, &event)?;
    }

    let outcome = handle.await.context("Run task failed")?;
    interrupt.abort();

    tracing::info!(
        execution_id = %outcome.execution_id,
        status = ?outcome.status,
        duration_ms = outcome.duration_ms,
        "Run complete"
    );
    Ok(outcome.status)
}

fn write_event(out: &mut impl Write, event: &RunEvent) -> Result<()> {
    serde_json::to_writer(&mut *out, event)?;
    writeln!(out)?;
    out.flush()?;
    Ok(())
}
