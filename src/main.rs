use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{CommandFactory, Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use graphrun_core::config::AppConfig;
use graphrun_core::types::Event;
use graphrun_engine::{Backend, RunOutcome, RunRequest};
use graphrun_gateway::GatewayServer;
use graphrun_nodes::NodeRegistry;

const DEFAULT_CONFIG: &str = "graphrun.toml";

#[derive(Parser)]
#[command(name = "graphrun", version, about = "Computation graph execution service")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = DEFAULT_CONFIG)]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP + SSE server (default)
    Serve {
        /// Address to listen on, overriding the config file
        #[arg(long)]
        bind: Option<String>,
    },
    /// Run a graph file once and print its events as JSON lines
    Run {
        /// Run request JSON (`{"data": [...], "options": {...}}`)
        file: PathBuf,
        /// Attach preview payloads to node-finish events
        #[arg(long)]
        broadcast: bool,
    },
    /// Show the effective configuration
    Config,
    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("graphrun=info,warn")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();

    // Handle completions before config loading
    if let Some(Commands::Completions { shell }) = &cli.command {
        let mut cmd = Cli::command();
        clap_complete::generate(*shell, &mut cmd, "graphrun", &mut std::io::stdout());
        return Ok(());
    }

    let config = load_config(&cli.config)?;

    match cli.command {
        Some(Commands::Config) => {
            println!("{}", toml::to_string_pretty(&config)?);
        }
        Some(Commands::Run { file, broadcast }) => {
            run_file(config, &file, broadcast).await?;
        }
        Some(Commands::Serve { bind }) => serve(config, bind).await?,
        None => serve(config, None).await?,
        Some(Commands::Completions { .. }) => {}
    }

    Ok(())
}

/// An explicit path must exist; the default one may be absent.
fn load_config(path: &Path) -> anyhow::Result<AppConfig> {
    if path.exists() {
        info!(path = %path.display(), "Loading config");
        return Ok(AppConfig::load(path)?);
    }
    if path != Path::new(DEFAULT_CONFIG) {
        anyhow::bail!("Config file not found: {}", path.display());
    }
    Ok(AppConfig::default())
}

async fn serve(mut config: AppConfig, bind: Option<String>) -> anyhow::Result<()> {
    if let Some(bind) = bind {
        config.server.bind = bind;
    }
    info!(bind = %config.server.bind, workers = config.engine.workers, "Starting graphrun server");

    let backend = Arc::new(Backend::new(config));
    let server = GatewayServer::new(backend);
    let cancel = tokio_util::sync::CancellationToken::new();
    let cancel_clone = cancel.clone();

    // Graceful shutdown on Ctrl-C
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Shutting down server...");
        cancel_clone.cancel();
    });

    server.run(cancel).await
}

/// Nobody follows the setup channel on a one-shot run, so its handshake
/// events must not wait for a consumer.
fn one_shot(mut config: AppConfig) -> AppConfig {
    config.engine.setup_event_timeout_ms = 0;
    config
}

async fn run_file(config: AppConfig, file: &Path, broadcast: bool) -> anyhow::Result<()> {
    let text = std::fs::read_to_string(file)
        .with_context(|| format!("reading {}", file.display()))?;
    let mut request: RunRequest = serde_json::from_str(&text)
        .with_context(|| format!("parsing {}", file.display()))?;
    request.send_broadcast_data |= broadcast;

    let backend = Arc::new(Backend::new(one_shot(config)));
    backend.setup(|| Ok(NodeRegistry::with_builtins())).await?;

    let mut events = backend.queue().subscribe();
    let printer = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            println!("{}", event.to_json());
            if matches!(event, Event::Finish(_) | Event::ExecutionError(_)) {
                break;
            }
        }
    });

    let killer = {
        let backend = backend.clone();
        tokio::spawn(async move {
            tokio::signal::ctrl_c().await.ok();
            warn!("Interrupted, killing run");
            backend.kill().await.ok();
        })
    };

    let result = backend.run(request).await;
    killer.abort();
    printer.await.ok();

    match result? {
        RunOutcome::Completed => info!("Run completed"),
        RunOutcome::Aborted => info!("Run killed"),
    }
    Ok(())
}
