use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use nodeflow_graph::ProviderRegistry;
use nodeflow_types::{GraphConfig, RunRequest, RunStatus};

mod config;
mod runner;

use crate::config::Config;

/// Run Nodeflow agent graphs from the command line
#[derive(Parser, Debug)]
#[command(name = "nodeflow-cli", version, about)]
struct Cli {
    /// Directory holding default.toml and {ENV}.toml
    #[arg(long, env = "NODEFLOW_CONFIG_DIR", default_value = "config", global = true)]
    config_dir: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Execute a graph and print every run event as a JSON line
    Run(RunArgs),
    /// Build a graph without running it and print its execution order
    Validate {
        #[arg(long)]
        graph: PathBuf,
    },
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Graph definition (JSON)
    #[arg(long)]
    graph: PathBuf,

    /// User message the run answers
    #[arg(long)]
    message: String,

    /// Prompt table (JSON object of prompt id to text)
    #[arg(long)]
    prompts: Option<PathBuf>,

    /// Scope granted to the run; repeatable
    #[arg(long = "scope")]
    scopes: Vec<String>,

    #[arg(long)]
    execution_id: Option<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env file
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let config = match Config::load(&cli.config_dir) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };

    init_logging(&config);

    match execute(cli.command, &config).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn execute(command: Command, config: &Config) -> anyhow::Result<ExitCode> {
    let graph_config = GraphConfig::from(&config.graph);

    match command {
        Command::Validate { graph } => {
            let definition = runner::load_graph(&graph)?;
            let graph = runner::build_graph(definition, ProviderRegistry::new(), graph_config)?;
            println!("{}", graph.node_ids().join(" -> "));
            Ok(ExitCode::SUCCESS)
        }
        Command::Run(args) => {
            let definition = runner::load_graph(&args.graph)?;
            let providers = runner::build_providers(&config.providers.enabled)?;
            let graph = runner::build_graph(definition, providers, graph_config)?;

            let mut request = RunRequest::from_user_message(args.message);
            if let Some(path) = &args.prompts {
                request = request.with_prompts(runner::load_prompts(path)?);
            }
            if let Some(id) = args.execution_id {
                request = request.with_execution_id(id);
            }
            for scope in args.scopes {
                request = request.with_scope(scope);
            }

            let status = runner::run_graph(&graph, request, &mut std::io::stdout()).await?;

            Ok(match status {
                RunStatus::Success => ExitCode::SUCCESS,
                RunStatus::Failed | RunStatus::Cancelled => ExitCode::FAILURE,
            })
        }
    }
}

/// Logs go to stderr; stdout carries the event stream
fn init_logging(config: &Config) {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.logging.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(env_filter);

    match config.logging.format.as_str() {
        "json" => {
            registry
                .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        _ => {
            registry
                .with(tracing_subscriber::fmt::layer().pretty().with_writer(std::io::stderr))
                .init();
        }
    }
}
