// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Configuration management commands
//!
//! Commands: show, validate

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::PathBuf;

use crewlink_core::domain::config::{FabricConfig, LlmProviderKind};

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show the effective configuration
    Show {
        /// Show config file paths checked
        #[arg(long)]
        paths: bool,

        /// Print the effective configuration as YAML
        #[arg(long)]
        yaml: bool,
    },

    /// Validate configuration file
    Validate {
        /// Path to config file (default: discover)
        #[arg(value_name = "FILE")]
        file: Option<PathBuf>,
    },
}

pub async fn handle_command(command: ConfigCommand, config_override: Option<PathBuf>) -> Result<()> {
    match command {
        ConfigCommand::Show { paths, yaml } => show(config_override, paths, yaml),
        ConfigCommand::Validate { file } => validate(file.or(config_override)),
    }
}

fn show(config_override: Option<PathBuf>, show_paths: bool, as_yaml: bool) -> Result<()> {
    let config = FabricConfig::load_or_default(config_override.clone())
        .context("Failed to load configuration")?;

    if show_paths {
        println!("{}", "Configuration discovery paths:".bold());
        if let Some(path) = &config_override {
            println!("  1. --config flag: {}", path.display());
        } else {
            println!("  1. --config flag: {}", "(not set)".dimmed());
        }
        println!(
            "  2. CREWLINK_CONFIG_PATH: {}",
            std::env::var("CREWLINK_CONFIG_PATH")
                .unwrap_or_else(|_| "(not set)".to_string())
                .dimmed()
        );
        println!("  3. ./crewlink.yaml");
        println!("  4. ~/.crewlink/config.yaml");
        println!();
    }

    if as_yaml {
        let mut redacted = config.clone();
        if redacted.api_key.is_some() {
            redacted.api_key = Some("********".into());
        }
        if redacted.llm.api_key.is_some() {
            redacted.llm.api_key = Some("********".into());
        }
        print!("{}", redacted.to_yaml_string()?);
        return Ok(());
    }

    println!("{}", "Current configuration:".bold());
    println!();

    println!("{}", "Server:".bold());
    println!("  Bind: {}:{}", config.server.bind_address, config.server.port);
    println!("  Orchestrator URL: {}", config.orchestrator_url);
    println!(
        "  API key: {}",
        if config.api_key.is_some() { "set" } else { "(none, auth disabled)" }
    );
    println!();

    println!("{}", "Bus:".bold());
    println!("  URL: {}", config.bus.url);
    println!("  Capacity per topic: {}", config.bus.capacity);
    println!();

    println!("{}", "Liveness:".bold());
    println!("  Heartbeat interval: {}s", config.liveness.heartbeat_interval().as_secs());
    println!("  Liveness timeout: {}s", config.liveness.liveness_timeout().as_secs());
    println!("  Sweep interval: {}s", config.liveness.sweep_interval().as_secs());
    println!();

    println!("{}", "Agent channel:".bold());
    println!(
        "  Reconnect: {}s (x{}, max {}s)",
        config.channel.reconnect_delay_secs,
        config.channel.backoff_factor,
        config.channel.max_reconnect_delay_secs
    );
    println!();

    println!("{}", "LLM:".bold());
    if config.llm.provider == LlmProviderKind::None {
        println!("  {}", "(none, plans fan out across the crew)".dimmed());
    } else {
        println!("  Provider: {:?}", config.llm.provider);
        println!("  Model: {}", config.llm.model.as_deref().unwrap_or("(unset)"));
        if let Some(endpoint) = &config.llm.endpoint {
            println!("  Endpoint: {}", endpoint);
        }
    }
    println!();

    println!("{}", "Crew:".bold());
    println!("  Initial phase: {}", config.crew.initial_phase);
    for (phase, roster) in &config.crew.phases {
        println!("  {} → {}", phase, roster.primary.join(", "));
    }

    Ok(())
}

fn validate(config_path: Option<PathBuf>) -> Result<()> {
    println!("Validating configuration...");

    let config = FabricConfig::load_or_default(config_path).context("Failed to load configuration")?;

    config.validate().context("Configuration validation failed")?;

    println!("{}", "✓ Configuration is valid".green());

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_rejects_short_liveness_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("crewlink.yaml");
        std::fs::write(
            &path,
            "liveness:\n  heartbeat_interval_secs: 30\n  liveness_timeout_secs: 10\n",
        )
        .unwrap();

        let err = validate(Some(path)).unwrap_err();
        assert!(format!("{err:#}").contains("liveness timeout"));
    }

    #[test]
    fn test_validate_missing_explicit_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(validate(Some(dir.path().join("absent.yaml"))).is_err());
    }
}
