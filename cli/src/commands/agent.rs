// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;

use crewlink_core::domain::agent::{AgentFilter, AgentId, AgentRecord, AgentRegistration, AgentStatus};

use crate::commands::Endpoint;

#[derive(Subcommand)]
pub enum AgentCommand {
    /// List registered agents
    List {
        /// Only agents carrying all of these tags (comma-separated)
        #[arg(short, long, value_delimiter = ',')]
        tag: Vec<String>,

        /// Only agents in this state (registered, active, unreachable, deregistered)
        #[arg(short, long)]
        status: Option<AgentStatus>,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Register an agent by hand
    Register {
        #[arg(long)]
        name: String,

        /// Base URL the agent serves on
        #[arg(long)]
        endpoint: String,

        #[arg(long, default_value = "")]
        description: String,

        #[arg(long, default_value = "1.0.0")]
        version: String,

        /// Role tags (repeat or comma-separate)
        #[arg(short, long, value_delimiter = ',')]
        tag: Vec<String>,

        #[arg(long, value_delimiter = ',')]
        capability: Vec<String>,
    },

    /// Send one heartbeat on behalf of an agent
    Heartbeat {
        #[arg(value_name = "AGENT_ID")]
        agent_id: String,

        /// Self-reported status
        #[arg(long, default_value = "active")]
        status: String,

        /// Load between 0.0 and 1.0
        #[arg(long)]
        load: Option<f64>,
    },

    /// Remove an agent from the registry
    Deregister {
        #[arg(value_name = "AGENT_ID")]
        agent_id: String,
    },
}

pub async fn handle_command(command: AgentCommand, endpoint: &Endpoint) -> Result<()> {
    let client = endpoint.client()?;

    match command {
        AgentCommand::List { tag, status, json } => {
            let filter = AgentFilter { tags: tag, status };
            let agents = client.list_agents(&filter).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&agents)?);
            } else {
                print_agents(&agents);
            }
        }
        AgentCommand::Register {
            name,
            endpoint,
            description,
            version,
            tag,
            capability,
        } => {
            let record = client
                .register(&AgentRegistration {
                    name,
                    description,
                    version,
                    endpoint,
                    tags: tag,
                    capabilities: capability,
                })
                .await?;
            println!("{}", format!("✓ Agent registered: {}", record.id).green());
            println!("  Send heartbeats with: crewlink agent heartbeat {}", record.id);
        }
        AgentCommand::Heartbeat { agent_id, status, load } => {
            let record = client.heartbeat(parse_id(&agent_id)?, Some(&status), load).await?;
            println!(
                "{}",
                format!("✓ Heartbeat accepted for {} ({})", record.name, record.status).green()
            );
        }
        AgentCommand::Deregister { agent_id } => {
            let record = client.deregister(parse_id(&agent_id)?).await?;
            println!("{}", format!("✓ Agent {} deregistered", record.id).green());
        }
    }

    Ok(())
}

fn parse_id(raw: &str) -> Result<AgentId> {
    AgentId::from_string(raw).with_context(|| format!("'{}' is not a valid agent id", raw))
}

fn print_agents(agents: &[AgentRecord]) {
    if agents.is_empty() {
        println!("{}", "No agents found".yellow());
        return;
    }

    println!("{} agents found:", agents.len());
    println!(
        "{:<38} {:<20} {:<13} {:<6} {}",
        "ID", "NAME", "STATUS", "LOAD", "TAGS"
    );

    for agent in agents {
        let status = match agent.status {
            AgentStatus::Active => agent.status.as_str().green(),
            AgentStatus::Unreachable => agent.status.as_str().red(),
            _ => agent.status.as_str().normal(),
        };
        println!(
            "{:<38} {:<20} {:<13} {:<6.2} {}",
            agent.id,
            agent.name.bold(),
            status,
            agent.load,
            agent.tags.iter().cloned().collect::<Vec<_>>().join(",")
        );
    }
}
