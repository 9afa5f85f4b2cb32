//! browser-relay - Slack bot binary.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use relay_cli::{RelayConfig, run_with_shutdown};
use relay_slack::SlackConfig;

/// Run browser automation tasks from Slack threads
#[derive(Parser)]
#[command(name = "browser-relay")]
#[command(about = "Slack bot that runs browser automation tasks on request")]
#[command(version)]
struct Args {
    /// Configuration file path (TOML)
    #[arg(short, long, env = "BROWSER_RELAY_CONFIG")]
    config: Option<PathBuf>,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Enable JSON logging
    #[arg(long)]
    json_logs: bool,

    /// Command prefix, overrides config and environment
    #[arg(long)]
    prefix: Option<String>,

    /// Agent command line, overrides config and environment
    #[arg(long)]
    agent_command: Option<String>,

    /// Step budget per task
    #[arg(long)]
    max_steps: Option<u32>,

    /// Wall-clock budget per task in seconds
    #[arg(long)]
    task_timeout_secs: Option<u64>,
}

fn setup_logging(level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if json {
        subscriber
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        subscriber
            .with(tracing_subscriber::fmt::layer().pretty())
            .init();
    }
}

/// Resolves on Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    let dotenv = dotenvy::dotenv();

    setup_logging(&args.log_level, args.json_logs);

    if let Err(e) = dotenv
        && !e.not_found()
    {
        warn!("Failed to read .env file: {}", e);
    }

    let mut config =
        match RelayConfig::resolve(args.config.as_deref(), |key| std::env::var(key).ok()) {
            Ok(c) => c,
            Err(e) => {
                error!("Failed to load configuration: {}", e);
                return ExitCode::FAILURE;
            }
        };

    if let Some(prefix) = args.prefix {
        config.bot.command_prefix = prefix;
    }
    if let Some(command) = args.agent_command {
        config.agent.command = command;
    }
    if let Some(max_steps) = args.max_steps {
        config.bot.max_steps = max_steps;
    }
    if let Some(timeout) = args.task_timeout_secs {
        config.bot.task_timeout_secs = timeout;
    }

    if let Err(e) = config.validate() {
        error!("Invalid configuration: {}", e);
        return ExitCode::FAILURE;
    }

    let slack = match SlackConfig::from_env() {
        Ok(s) => s,
        Err(e) => {
            error!("Invalid Slack credentials: {}", e);
            return ExitCode::FAILURE;
        }
    };

    info!("Press Ctrl+C to stop");

    if let Err(e) = run_with_shutdown(config, slack, shutdown_signal()).await {
        error!("browser-relay failed: {:#}", e);
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}
