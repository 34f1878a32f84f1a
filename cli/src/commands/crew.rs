// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Crew coordination commands
//!
//! Commands: show, assemble, phase, readiness, handoff, plan, workflow, execute, task

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use serde::Serialize;

use crewlink_core::domain::agent::AgentId;
use crewlink_swarm::domain::{CrewId, CrewView, HandoffRequest, PhaseReadiness, Readiness, TaskEntry};

use crate::commands::{parse_context, Endpoint};

#[derive(Subcommand)]
pub enum CrewCommand {
    /// Show the current phase crew, or a crew by id
    Show {
        #[arg(value_name = "CREW_ID")]
        crew_id: Option<String>,

        #[arg(long)]
        json: bool,
    },

    /// Assemble an ad hoc crew for a mission
    Assemble {
        /// Roles to seat (repeat or comma-separate)
        #[arg(short, long = "role", value_delimiter = ',', required = true)]
        roles: Vec<String>,

        #[arg(short, long)]
        mission: String,

        #[arg(long)]
        name: Option<String>,
    },

    /// Move the fabric to a lifecycle phase
    Phase {
        /// planning, architecture, development, testing, deployment or maintenance
        #[arg(value_name = "PHASE")]
        phase: String,

        /// Switch even when required roles are missing
        #[arg(long)]
        force: bool,

        /// Refuse to switch unless every required role is seated
        #[arg(long, conflicts_with = "force")]
        require_ready: bool,
    },

    /// Check whether a phase could be staffed right now, without switching
    Readiness {
        #[arg(value_name = "PHASE")]
        phase: String,

        #[arg(long)]
        json: bool,
    },

    /// Hand a task from one agent to another
    Handoff {
        #[arg(long = "from", value_name = "AGENT_ID")]
        source: String,

        #[arg(long = "to", value_name = "AGENT_ID")]
        target: String,

        #[arg(long = "task", value_name = "TASK_ID")]
        task_id: String,

        /// JSON object passed to the target
        #[arg(long)]
        context: Option<String>,

        /// Artifact references (repeatable)
        #[arg(long = "artifact")]
        artifacts: Vec<String>,

        /// Crew the handoff belongs to (default: current phase crew)
        #[arg(long)]
        crew: Option<String>,
    },

    /// Plan a task and delegate it to the best-fitting role
    Plan {
        #[arg(value_name = "TASK")]
        task: String,

        /// JSON object with extra context
        #[arg(long)]
        context: Option<String>,
    },

    /// Start a workflow (feature, bugfix, refactor, security_audit)
    Workflow {
        #[arg(value_name = "TYPE")]
        workflow_type: String,

        #[arg(value_name = "DESCRIPTION")]
        description: String,
    },

    /// Send a task straight to the agent filling a role
    Execute {
        #[arg(value_name = "ROLE")]
        role: String,

        #[arg(value_name = "MESSAGE")]
        message: String,

        /// JSON object with extra context
        #[arg(long)]
        context: Option<String>,
    },

    /// Show a planned task and its handoffs
    Task {
        #[arg(value_name = "TASK_ID")]
        task_id: String,

        #[arg(long)]
        json: bool,
    },
}

pub async fn handle_command(command: CrewCommand, endpoint: &Endpoint) -> Result<()> {
    let client = endpoint.client()?;

    match command {
        CrewCommand::Show { crew_id, json } => {
            let crew = match crew_id {
                Some(raw) => {
                    let id = CrewId::from_string(&raw)
                        .with_context(|| format!("'{}' is not a valid crew id", raw))?;
                    client.crew_by_id(id).await?
                }
                None => client.crew().await?,
            };
            if json {
                println!("{}", serde_json::to_string_pretty(&crew)?);
            } else {
                print_crew(&crew);
            }
        }
        CrewCommand::Assemble { roles, mission, name } => {
            let crew = client.assemble(&roles, &mission, name.as_deref()).await?;
            println!("{}", format!("✓ Crew {} assembled ({})", crew.name, crew.id).green());
            print_crew(&crew);
        }
        CrewCommand::Phase {
            phase,
            force,
            require_ready,
        } => {
            let crew = client.transition(&phase, force, require_ready).await?;
            println!("{}", format!("✓ Phase is now {}", crew.phase).green());
            print_crew(&crew);
        }
        CrewCommand::Readiness { phase, json } => {
            let check = client.phase_readiness(&phase).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&check)?);
            } else {
                print_readiness(&check);
            }
        }
        CrewCommand::Handoff {
            source,
            target,
            task_id,
            context,
            artifacts,
            crew,
        } => {
            let context = match parse_context(context.as_deref())? {
                serde_json::Value::Object(map) => map,
                _ => serde_json::Map::new(),
            };
            let crew_id = crew
                .map(|raw| CrewId::from_string(&raw).with_context(|| format!("'{}' is not a valid crew id", raw)))
                .transpose()?;
            let request = HandoffRequest {
                source_agent: parse_agent(&source)?,
                target_agent: parse_agent(&target)?,
                task_id,
                context,
                artifacts,
                crew_id,
            };

            let receipt = client.handoff(&request).await?;
            println!("{}", format!("✓ Handoff {} recorded", receipt.handoff_id).green());
            println!("  Topic: {}", receipt.topic);
            println!(
                "  Delivered: {}  Nudged: {}",
                yes_no(receipt.delivered),
                yes_no(receipt.nudged)
            );
        }
        CrewCommand::Plan { task, context } => {
            let entry = client.plan(&task, parse_context(context.as_deref())?).await?;
            println!("{}", format!("✓ Task {} planned", entry.task_id).green());
            print_task(&entry);
        }
        CrewCommand::Workflow {
            workflow_type,
            description,
        } => {
            let ticket = client.start_workflow(&workflow_type, &description).await?;
            println!("{}", format!("✓ Workflow {} started", ticket.workflow_id).green());
            println!("  Roles: {}", ticket.roles.join(" → "));
            print_crew(&ticket.crew);
        }
        CrewCommand::Execute { role, message, context } => {
            let receipt = client
                .execute(&role, &message, parse_context(context.as_deref())?)
                .await?;
            println!(
                "{}",
                format!("✓ Sent to {} ({})", receipt.role, receipt.agent_id).green()
            );
        }
        CrewCommand::Task { task_id, json } => {
            let entry = client.task(&task_id).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&entry)?);
            } else {
                print_task(&entry);
            }
        }
    }

    Ok(())
}

fn parse_agent(raw: &str) -> Result<AgentId> {
    AgentId::from_string(raw).with_context(|| format!("'{}' is not a valid agent id", raw))
}

fn yes_no(value: bool) -> &'static str {
    if value {
        "yes"
    } else {
        "no"
    }
}

/// Wire name of a serde enum, e.g. `Readiness::Degraded` -> "degraded".
fn label<T: Serialize>(value: &T) -> String {
    serde_json::to_value(value)
        .ok()
        .and_then(|v| v.as_str().map(String::from))
        .unwrap_or_default()
}

fn colored_readiness(readiness: Readiness) -> colored::ColoredString {
    match readiness {
        Readiness::Ready => label(&readiness).green(),
        Readiness::Degraded => label(&readiness).yellow(),
        Readiness::Forced => label(&readiness).cyan(),
    }
}

fn print_readiness(check: &PhaseReadiness) {
    println!(
        "{} {} (current: {})  Readiness: {}",
        "Phase".bold(),
        check.phase,
        check.current_phase,
        colored_readiness(check.readiness)
    );
    for member in &check.members {
        println!("  {:<24} {}", member.role, member.agent_id);
    }
    if !check.missing_roles.is_empty() {
        println!("  Missing roles: {}", check.missing_roles.join(", ").red());
    }
}

fn print_crew(crew: &CrewView) {
    let readiness = colored_readiness(crew.readiness);

    println!("{} {} ({})", "Crew".bold(), crew.name.bold(), crew.id);
    println!("  Phase: {}  Readiness: {}", crew.phase, readiness);
    if let Some(mission) = &crew.mission {
        println!("  Mission: {}", mission);
    }
    if let Some(gatekeeper) = &crew.gatekeeper {
        println!("  Gatekeeper: {}", gatekeeper);
    }

    if crew.members.is_empty() {
        println!("  {}", "No members seated".yellow());
    } else {
        println!("  {:<24} {:<38} {}", "ROLE", "AGENT", "STATUS");
        for member in &crew.members {
            let (name, status) = match &member.agent {
                Some(record) => (record.name.as_str(), record.status.as_str()),
                None => ("?", "unknown"),
            };
            println!(
                "  {:<24} {:<38} {} ({})",
                member.role,
                member.agent_id.to_string(),
                status,
                name
            );
        }
    }

    if !crew.missing_roles.is_empty() {
        println!("  Missing roles: {}", crew.missing_roles.join(", ").red());
    }
}

fn print_task(entry: &TaskEntry) {
    println!("{} {}", "Task".bold(), entry.task_id);
    println!("  Description: {}", entry.description);
    println!("  Status: {}", label(&entry.status));
    if let Some(role) = &entry.assigned_role {
        println!("  Assigned role: {}", role);
    }

    if !entry.subtasks.is_empty() {
        println!("  Sub-tasks:");
        for (i, subtask) in entry.subtasks.iter().enumerate() {
            println!("    {}. [{}] {}", i + 1, subtask.role, subtask.description);
        }
    }

    if !entry.handoffs.is_empty() {
        println!("  Handoffs:");
        for handoff in &entry.handoffs {
            println!(
                "    {} → {} ({}, delivered: {})",
                handoff.source_agent,
                handoff.target_agent,
                handoff.recorded_at.format("%Y-%m-%d %H:%M:%S"),
                yes_no(handoff.delivered)
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crewlink_swarm::domain::TaskStatus;

    #[test]
    fn test_label_uses_wire_names() {
        assert_eq!(label(&Readiness::Degraded), "degraded");
        assert_eq!(label(&TaskStatus::HandedOff), "handed_off");
    }
}
