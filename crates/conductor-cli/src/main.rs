mod config;

use clap::{Parser, Subcommand};
use conductor_agent::build_directory;
use conductor_gateway::GatewayServer;
use conductor_orchestrator::{parse_decomposition, Orchestrator, MAX_CONCURRENT_TASKS_ENV};
use config::{ConductorConfig, DEFAULT_CONFIG_PATH};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "conductor", about = "Conductor: dependency-aware task orchestration for agents")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the scheduler and the HTTP API
    Serve {
        /// Host to bind to (overrides config)
        #[arg(long)]
        host: Option<String>,
        /// Port to listen on (overrides config)
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Parse a planning document into task drafts and print them as JSON
    Parse {
        /// Planning text to parse
        file: PathBuf,
    },
    /// List configured agents
    Agents,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            return Err(e.into());
        }
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { host, port } => {
            let config = ConductorConfig::load(&cli.config)
                .await?
                .with_env_override(std::env::var(MAX_CONCURRENT_TASKS_ENV).ok().as_deref())?;
            serve(config, host, port).await?;
        }
        Commands::Parse { file } => {
            let text = tokio::fs::read_to_string(&file).await.map_err(|e| {
                anyhow::anyhow!("Failed to read planning file '{}': {e}", file.display())
            })?;
            let drafts = parse_decomposition(&text);
            println!("{}", serde_json::to_string_pretty(&drafts)?);
        }
        Commands::Agents => {
            let config = ConductorConfig::load(&cli.config).await?;
            if config.agents.is_empty() {
                println!("No agents configured.");
                println!("Configure agents in {} under [[agents]]", cli.config.display());
            } else {
                println!("Configured agents:");
                for agent in &config.agents {
                    println!("  {} -> {}", agent.id, agent.endpoint);
                    if !agent.capabilities.is_empty() {
                        let caps: Vec<&str> = agent.capabilities.iter().map(|c| c.as_str()).collect();
                        println!("    capabilities: {}", caps.join(", "));
                    }
                    if !agent.skills.is_empty() {
                        println!("    skills: {}", agent.skills.join(", "));
                    }
                    if let Some(secs) = agent.timeout_secs {
                        println!("    timeout: {secs}s");
                    }
                }
                println!("\nTotal: {} agent(s)", config.agents.len());
            }
        }
    }

    Ok(())
}

async fn serve(config: ConductorConfig, host: Option<String>, port: Option<u16>) -> anyhow::Result<()> {
    let host = host.unwrap_or_else(|| config.server.host.clone());
    let port = port.unwrap_or(config.server.port);

    let directory = Arc::new(build_directory(&config.agents)?);
    if config.agents.is_empty() {
        warn!("No agents configured; tasks will stay pending");
    }
    info!(agents = config.agents.len(), "Agent directory ready");

    let orchestrator = Arc::new(Orchestrator::with_hooks(
        &config.orchestrator,
        directory,
        config.hooks(),
    ));
    info!(
        max_concurrent_tasks = config.orchestrator.max_concurrent_tasks,
        tick_interval_secs = config.orchestrator.tick_interval_secs,
        git = config.git.enabled,
        "Orchestrator initialised"
    );
    let scheduler = orchestrator.start_scheduler();

    let app = GatewayServer::build(Arc::clone(&orchestrator));
    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Conductor listening on {}", addr);

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(async {
            match tokio::signal::ctrl_c().await {
                Ok(()) => info!("Shutdown requested"),
                Err(e) => {
                    warn!(error = %e, "Failed to listen for Ctrl-C");
                    std::future::pending::<()>().await;
                }
            }
        })
        .await;

    scheduler.stop().await;
    info!("Scheduler stopped");
    served?;
    Ok(())
}
