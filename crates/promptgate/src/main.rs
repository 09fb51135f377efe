//! Promptgate daemon - HTTP relay for chat completions over rotating proxies

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use promptgate::PromptgateError;
use promptgate::config::{Config, default_config_paths};
use promptgate::error::Result;
use promptgate::proxy::build_source;
use promptgate::server::{AppState, Server};

/// Promptgate - chat-completion relay with a rotating outbound proxy pool
#[derive(Parser)]
#[command(name = "promptgate")]
#[command(about = "A small HTTP relay for chat completions with a rotating outbound proxy pool")]
#[command(version)]
pub struct Cli {
    /// Path to config file
    #[arg(long, short = 'c', global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Start the HTTP server (default command)
    #[command(name = "serve")]
    Serve,
    /// Acquire one proxy from the configured source and print it
    #[command(name = "check-proxy")]
    CheckProxy,
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    init_logging();

    let cli = Cli::parse();
    let config = load_config(cli.config)?;
    config.validate()?;
    tracing::debug!("Config loaded: {:?}", config);

    match cli.command {
        None | Some(Command::Serve) => serve(&config).await,
        Some(Command::CheckProxy) => check_proxy(&config).await,
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,promptgate=debug"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn load_config(config_path: Option<PathBuf>) -> Result<Config> {
    if let Some(path) = config_path {
        tracing::info!("Loading config from: {}", path.display());
        return Config::from_file(&path);
    }

    for path in default_config_paths() {
        if path.exists() {
            tracing::info!("Loading config from: {}", path.display());
            return Config::from_file(&path);
        }
    }

    tracing::info!("No config file found, using defaults");
    Ok(Config::default())
}

async fn serve(config: &Config) -> Result<()> {
    tracing::info!("Starting Promptgate");

    let state = AppState::from_config(config)?;
    Server::new(config, state).serve().await?;

    tracing::info!("Promptgate stopped");
    Ok(())
}

async fn check_proxy(config: &Config) -> Result<()> {
    let Some(source) = build_source(&config.proxy)? else {
        println!("Proxy mode is 'direct': no proxy is used");
        return Ok(());
    };

    let timeout = std::time::Duration::from_secs(config.proxy.acquire_timeout_secs);
    let proxy = tokio::time::timeout(timeout, source.acquire())
        .await
        .map_err(|_| {
            PromptgateError::Proxy(format!("Acquisition timed out after {timeout:?}"))
        })??;

    println!("{} proxy: {}", source.name(), proxy);
    Ok(())
}
