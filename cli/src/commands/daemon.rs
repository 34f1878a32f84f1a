// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Daemon lifecycle management commands
//!
//! Commands: start, status

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use tracing::{info, warn};

use crate::commands::Endpoint;
use crate::daemon::{check_daemon_running, start_daemon, DaemonOptions, DaemonStatus};
use crewlink_core::domain::config::{FabricConfig, LlmProviderKind};

#[derive(Subcommand)]
pub enum DaemonCommand {
    /// Start the orchestrator (if not already running)
    Start {
        /// Stay attached to the terminal instead of running in the background
        #[arg(short, long)]
        foreground: bool,
    },

    /// Check orchestrator status
    Status,
}

pub async fn handle_command(command: DaemonCommand, options: DaemonOptions, endpoint: &Endpoint) -> Result<()> {
    match command {
        DaemonCommand::Start { foreground } => start(options, endpoint, foreground).await,
        DaemonCommand::Status => status(endpoint).await,
    }
}

async fn start(options: DaemonOptions, endpoint: &Endpoint, foreground: bool) -> Result<()> {
    // Fail here rather than in a detached process nobody is watching.
    let config = FabricConfig::load_or_default(options.config_path.clone())
        .context("Failed to load configuration")?;
    config.validate().context("Configuration validation failed")?;

    if config.llm.provider == LlmProviderKind::None {
        println!("{}", "No LLM provider configured: plans fan out one sub-task per crew role.".yellow());
    }

    let base_url = local_url(&config, &options, endpoint)?;
    info!("Checking if orchestrator is already running at {}...", base_url);

    match check_daemon_running(&base_url).await {
        Ok(DaemonStatus::Running { .. }) => {
            println!("{}", format!("✓ Orchestrator already running at {}", base_url).green());
            return Ok(());
        }
        Ok(DaemonStatus::Unhealthy { error }) => {
            println!(
                "{}",
                format!("⚠ Something answers at {} but is unhealthy: {}", base_url, error).yellow()
            );
            anyhow::bail!("port in use by an unhealthy process");
        }
        Ok(DaemonStatus::Stopped) => {}
        Err(e) => warn!("Failed to check orchestrator status: {}", e),
    }

    if foreground {
        return start_daemon(options).await;
    }

    // Re-exec self with --daemon flag
    let current_exe = std::env::current_exe().context("Failed to get current executable path")?;

    let mut cmd = std::process::Command::new(current_exe);
    cmd.arg("--daemon");
    if let Some(config) = &options.config_path {
        cmd.arg("--config").arg(config);
    }
    if let Some(host) = &options.host {
        cmd.arg("--host").arg(host);
    }
    if let Some(port) = options.port {
        cmd.arg("--port").arg(port.to_string());
    }
    if let Some(metrics_port) = options.metrics_port {
        cmd.arg("--metrics-port").arg(metrics_port.to_string());
    }

    // Spawn detached process
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        cmd.process_group(0);
    }

    let temp_dir = std::env::temp_dir();
    let stdout_path = temp_dir.join("crewlink.out");
    let stderr_path = temp_dir.join("crewlink.err");

    let stdout_file = std::fs::File::create(&stdout_path).context("Failed to create stdout log file")?;
    let stderr_file = std::fs::File::create(&stderr_path).context("Failed to create stderr log file")?;

    cmd.stdin(std::process::Stdio::null())
        .stdout(stdout_file)
        .stderr(stderr_file);

    println!("Redirecting logs to: {}", stderr_path.display());

    let child = cmd.spawn().context("Failed to spawn orchestrator process")?;

    println!("{}", format!("✓ Orchestrator starting (PID: {})", child.id()).green());
    println!("Check status with: crewlink daemon status");

    Ok(())
}

/// URL a freshly started daemon would answer on, as seen from this host.
fn local_url(config: &FabricConfig, options: &DaemonOptions, endpoint: &Endpoint) -> Result<String> {
    if options.host.is_none() && options.port.is_none() {
        return Ok(format!("http://127.0.0.1:{}", config.server.port));
    }
    let local = Endpoint {
        host: options.host.clone().filter(|h| h != "0.0.0.0"),
        port: options.port.or(Some(config.server.port)),
        ..endpoint.clone()
    };
    local.base_url()
}

async fn status(endpoint: &Endpoint) -> Result<()> {
    let base_url = endpoint.base_url()?;

    match check_daemon_running(&base_url).await {
        Ok(DaemonStatus::Running { uptime, health }) => {
            println!("{}", format!("✓ Orchestrator is running at {}", base_url).green());
            if let Some(uptime) = uptime {
                println!("  Uptime: {}", format_duration(uptime));
            }
            let agents = &health["agents"];
            println!(
                "  Agents: {} active, {} registered, {} unreachable",
                agents["active"].as_u64().unwrap_or(0),
                agents["registered"].as_u64().unwrap_or(0),
                agents["unreachable"].as_u64().unwrap_or(0)
            );
            println!(
                "  Connected channels: {}",
                health["connected_channels"].as_u64().unwrap_or(0)
            );
        }
        Ok(DaemonStatus::Stopped) => {
            println!("{}", format!("✗ Orchestrator is not running at {}", base_url).red());
        }
        Ok(DaemonStatus::Unhealthy { error }) => {
            println!("{}", format!("⚠ Orchestrator unhealthy at {}", base_url).yellow());
            println!("  HTTP API check failed: {}", error);
            println!("  Check logs at {}", std::env::temp_dir().join("crewlink.err").display());
        }
        Err(e) => {
            println!("{}", format!("✗ Failed to check status: {}", e).red());
            return Err(e);
        }
    }

    Ok(())
}

fn format_duration(secs: u64) -> String {
    let days = secs / 86400;
    let hours = (secs % 86400) / 3600;
    let minutes = (secs % 3600) / 60;

    if days > 0 {
        format!("{}d {}h {}m", days, hours, minutes)
    } else if hours > 0 {
        format!("{}h {}m", hours, minutes)
    } else {
        format!("{}m", minutes)
    }
}
