// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! # crewlink CLI
//!
//! The `crewlink` binary runs the orchestrator daemon and talks to it.
//!
//! - **Daemon mode**: `crewlink daemon start --foreground` (or the hidden
//!   `--daemon` flag used when re-exec'ing in the background) serves the
//!   registry, bus, channel and crew routes.
//! - **Client mode**: every other command is an HTTP call against a running
//!   orchestrator.
//!
//! ## Commands
//!
//! - `crewlink daemon start|status` - Manage the orchestrator process
//! - `crewlink agent list|register|heartbeat|deregister` - Registry operations
//! - `crewlink crew show|assemble|phase|handoff|plan|workflow|execute|task` - Crew coordination
//! - `crewlink config show|validate` - Configuration management

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use std::path::PathBuf;
use tracing::info;

use crewlink_cli::commands::{self, AgentCommand, ConfigCommand, CrewCommand, DaemonCommand, Endpoint};
use crewlink_cli::daemon::{self, DaemonOptions};

/// crewlink - coordination fabric for crews of AI agents
#[derive(Parser)]
#[command(name = "crewlink")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Run the orchestrator in the foreground (used by `daemon start`)
    #[arg(long, global = true, hide = true)]
    daemon: bool,

    /// Path to configuration file (overrides discovery)
    #[arg(
        short,
        long,
        global = true,
        env = "CREWLINK_CONFIG_PATH",
        value_name = "FILE"
    )]
    config: Option<PathBuf>,

    /// Orchestrator host (default: from orchestrator_url in config)
    #[arg(long, global = true, env = "CREWLINK_HOST")]
    host: Option<String>,

    /// Orchestrator port (default: from config)
    #[arg(long, global = true, env = "CREWLINK_PORT")]
    port: Option<u16>,

    /// API key sent as X-API-Key (default: from config)
    #[arg(long, global = true, env = "CREWLINK_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, env = "CREWLINK_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Log output format
    #[arg(long, global = true, env = "CREWLINK_LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Serve Prometheus metrics on this port (daemon only)
    #[arg(long, global = true, env = "CREWLINK_METRICS_PORT")]
    metrics_port: Option<u16>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage the orchestrator daemon
    #[command(name = "daemon")]
    Daemon {
        #[command(subcommand)]
        command: DaemonCommand,
    },

    /// Agent registry operations
    #[command(name = "agent")]
    Agent {
        #[command(subcommand)]
        command: AgentCommand,
    },

    /// Crew, phase, handoff and task operations
    #[command(name = "crew")]
    Crew {
        #[command(subcommand)]
        command: CrewCommand,
    },

    /// Configuration management
    #[command(name = "config")]
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env is fine; a malformed one is worth knowing about.
    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            eprintln!("{}", format!("Ignoring unreadable .env file: {e}").yellow());
        }
    }

    let cli = Cli::parse();

    init_logging(&cli.log_level, cli.log_format)?;

    let options = DaemonOptions {
        config_path: cli.config.clone(),
        host: cli.host.clone(),
        port: cli.port,
        metrics_port: cli.metrics_port,
    };

    if cli.daemon {
        info!("Starting crewlink orchestrator in daemon mode");
        return daemon::start_daemon(options).await;
    }

    let endpoint = Endpoint {
        config_path: cli.config,
        host: cli.host,
        port: cli.port,
        api_key: cli.api_key,
    };

    match cli.command {
        Some(Commands::Daemon { command }) => {
            commands::daemon::handle_command(command, options, &endpoint).await
        }
        Some(Commands::Agent { command }) => commands::agent::handle_command(command, &endpoint).await,
        Some(Commands::Crew { command }) => commands::crew::handle_command(command, &endpoint).await,
        Some(Commands::Config { command }) => {
            commands::config::handle_command(command, endpoint.config_path).await
        }
        None => {
            eprintln!("{}", "No command specified. Use --help for usage.".yellow());
            std::process::exit(1);
        }
    }
}

/// Initialize tracing subscriber for logging. `RUST_LOG` wins over `--log-level`.
fn init_logging(level: &str, format: LogFormat) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .context("Failed to create log filter")?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    match format {
        LogFormat::Json => builder.json().with_current_span(false).init(),
        LogFormat::Text => builder.with_target(false).compact().init(),
    }

    Ok(())
}
