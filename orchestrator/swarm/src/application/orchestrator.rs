// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Crew Orchestrator
//!
//! Assembles crews from the registry, moves the project between phases,
//! mediates handoffs and records planned tasks.
//!
//! State lives behind a single `parking_lot::RwLock` that is never held
//! across an `.await`: every operation reads the registry first, mutates
//! state in one short critical section, then publishes.

use chrono::Utc;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crewlink_core::application::registry::AgentRegistry;
use crewlink_core::domain::agent::{normalize_role, AgentFilter, AgentId, AgentRecord, AgentStatus};
use crewlink_core::domain::error::FabricError;
use crewlink_core::domain::events::{message_types, topics};
use crewlink_core::infrastructure::channel_hub::ChannelHub;
use crewlink_core::infrastructure::event_bus::EventBus;

use crate::application::planner::{CrewFanoutPlanner, TaskPlanner};
use crate::domain::crew::{seat_roles, Crew, CrewId, CrewView, NetworkConfig, PhaseReadiness, Readiness};
use crate::domain::handoff::{HandoffReceipt, HandoffRequest};
use crate::domain::phase::{Phase, RosterTable};
use crate::domain::task::{recommend_role, HandoffRecord, TaskEntry, TaskLedger, TaskStatus};

/// Role lists for the predefined workflows.
pub fn workflow_template(workflow_type: &str) -> Option<&'static [&'static str]> {
    let roles: &'static [&'static str] = match workflow_type {
        "feature" => &[
            "project_strategist",
            "system_architect",
            "frontend_specialist",
            "backend_specialist",
            "database_architect",
            "qa_engineer",
            "devops_engineer",
        ],
        "bugfix" => &[
            "project_strategist",
            "qa_engineer",
            "backend_specialist",
            "frontend_specialist",
        ],
        "refactor" => &[
            "system_architect",
            "backend_specialist",
            "frontend_specialist",
            "qa_engineer",
        ],
        "security_audit" => &["security_engineer", "backend_specialist", "database_architect"],
        _ => return None,
    };
    Some(roles)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowTicket {
    pub workflow_id: String,
    pub workflow_type: String,
    pub roles: Vec<String>,
    pub crew: CrewView,
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionReceipt {
    pub role: String,
    pub agent_id: AgentId,
    pub crew_id: CrewId,
    pub dispatched_at: chrono::DateTime<Utc>,
}

struct OrchestratorState {
    phase: Phase,
    phase_crew: CrewId,
    crews: HashMap<CrewId, Crew>,
    max_crews: usize,
    ledger: TaskLedger,
}

impl OrchestratorState {
    /// Drop the oldest ad hoc crews beyond `max_crews`.
    fn evict_crews(&mut self) {
        let phase_crew = self.phase_crew;
        while self.crews.len() > self.max_crews + 1 {
            let oldest = self
                .crews
                .values()
                .filter(|crew| crew.id != phase_crew)
                .min_by_key(|crew| crew.created_at)
                .map(|crew| crew.id);
            match oldest {
                Some(crew_id) => {
                    self.crews.remove(&crew_id);
                    debug!(%crew_id, "Crew evicted");
                }
                None => break,
            }
        }
    }

    fn phase_crew(&self) -> Result<Crew, FabricError> {
        self.crews
            .get(&self.phase_crew)
            .cloned()
            .ok_or_else(|| FabricError::Internal("phase crew missing from state".into()))
    }
}

pub struct CrewOrchestrator {
    registry: Arc<AgentRegistry>,
    bus: EventBus,
    hub: ChannelHub,
    planner: Arc<dyn TaskPlanner>,
    rosters: RosterTable,
    state: RwLock<OrchestratorState>,
}

impl CrewOrchestrator {
    /// Start in `initial_phase` with an empty crew. Nothing is seated until
    /// the first transition.
    pub fn new(
        registry: Arc<AgentRegistry>,
        bus: EventBus,
        hub: ChannelHub,
        planner: Arc<dyn TaskPlanner>,
        rosters: RosterTable,
        initial_phase: Phase,
    ) -> Self {
        let roster = rosters.roster(initial_phase);
        let crew = Crew {
            id: CrewId::new(),
            name: initial_phase.to_string(),
            phase: initial_phase,
            mission: None,
            members: Vec::new(),
            readiness: if roster.primary.is_empty() {
                Readiness::Ready
            } else {
                Readiness::Degraded
            },
            missing_roles: roster.primary.clone(),
            gatekeeper: roster.gatekeeper.clone(),
            network_config: NetworkConfig::default(),
            created_at: Utc::now(),
        };

        let state = OrchestratorState {
            phase: initial_phase,
            phase_crew: crew.id,
            crews: HashMap::from([(crew.id, crew)]),
            max_crews: usize::MAX - 1,
            ledger: TaskLedger::new(),
        };

        Self {
            registry,
            bus,
            hub,
            planner,
            rosters,
            state: RwLock::new(state),
        }
    }

    /// Orchestrator using the crew fan-out planner and built-in rosters.
    pub fn with_defaults(registry: Arc<AgentRegistry>, bus: EventBus, hub: ChannelHub) -> Self {
        Self::new(
            registry,
            bus,
            hub,
            Arc::new(CrewFanoutPlanner),
            RosterTable::builtin(),
            Phase::Planning,
        )
    }

    /// Cap the ad hoc crews and task ledger entries held in memory.
    pub fn with_retention(self, max_crews: usize, max_tasks: usize) -> Self {
        {
            let mut state = self.state.write();
            state.max_crews = max_crews.clamp(1, usize::MAX - 1);
            state.ledger.set_limit(max_tasks);
            state.evict_crews();
        }
        self
    }

    pub fn current_phase(&self) -> Phase {
        self.state.read().phase
    }

    /// Seat the roster of `phase` from the agents active right now without
    /// changing anything.
    pub async fn readiness(&self, phase: Phase) -> Result<PhaseReadiness, FabricError> {
        let roster = self.rosters.roster(phase);
        let active = self.registry.list(&AgentFilter::active()).await?;
        let seating = seat_roles(&roster.roles(), &active);

        let missing_roles: Vec<String> = seating
            .unfilled
            .iter()
            .filter(|role| roster.is_primary(role))
            .cloned()
            .collect();

        Ok(PhaseReadiness {
            phase,
            current_phase: self.current_phase(),
            readiness: if missing_roles.is_empty() {
                Readiness::Ready
            } else {
                Readiness::Degraded
            },
            missing_roles,
            members: seating.members,
            gatekeeper: roster.gatekeeper,
        })
    }

    /// Seat the roster of `phase` from active agents and make it the phase crew.
    pub async fn transition(&self, phase: Phase, force: bool, require_ready: bool) -> Result<CrewView, FabricError> {
        let check = self.readiness(phase).await?;
        let readiness = if force { Readiness::Forced } else { check.readiness };

        if readiness == Readiness::Degraded {
            if require_ready {
                return Err(FabricError::PhaseNotReady {
                    phase: phase.to_string(),
                    missing_roles: check.missing_roles,
                });
            }
            warn!(%phase, missing = ?check.missing_roles, "Phase crew is missing required roles");
        }

        let crew = Crew {
            id: CrewId::new(),
            name: phase.to_string(),
            phase,
            mission: None,
            members: check.members,
            missing_roles: check.missing_roles,
            readiness,
            gatekeeper: check.gatekeeper,
            network_config: NetworkConfig::default(),
            created_at: Utc::now(),
        };

        let from = {
            let mut state = self.state.write();
            let from = state.phase;
            let previous = state.phase_crew;
            state.crews.remove(&previous);
            state.phase = phase;
            state.phase_crew = crew.id;
            state.crews.insert(crew.id, crew.clone());
            from
        };

        info!(%from, to = %phase, crew_id = %crew.id, members = crew.members.len(), ?readiness, "Phase transition");
        metrics::counter!("crewlink_phase_transitions_total", "phase" => phase.as_str()).increment(1);

        let payload = json!({
            "from": from,
            "to": phase,
            "crew_id": crew.id,
            "force": force,
            "readiness": crew.readiness,
            "missing_roles": crew.missing_roles,
            "members": crew.members,
        });
        if let Err(e) = self
            .bus
            .publish(topics::CREW_PHASES, message_types::PHASE_CHANGED, payload, None)
            .await
        {
            debug!(error = %e, "phase_changed not published");
        }

        self.resolve(&crew).await
    }

    /// Build an ad hoc crew for a mission in the current phase.
    pub async fn assemble(
        &self,
        roles: &[String],
        mission: &str,
        name: Option<String>,
    ) -> Result<CrewView, FabricError> {
        let mut wanted: Vec<String> = Vec::new();
        for role in roles.iter().map(|r| normalize_role(r)) {
            if !role.is_empty() && !wanted.contains(&role) {
                wanted.push(role);
            }
        }
        if wanted.is_empty() {
            return Err(FabricError::Validation("agent_roles must name at least one role".into()));
        }

        let active = self.registry.list(&AgentFilter::active()).await?;
        let seating = seat_roles(&wanted, &active);

        let phase = self.current_phase();
        let id = CrewId::new();
        let mission = mission.trim();
        let crew = Crew {
            id,
            name: name
                .filter(|n| !n.trim().is_empty())
                .unwrap_or_else(|| format!("crew-{}", &id.to_string()[..8])),
            phase,
            mission: (!mission.is_empty()).then(|| mission.to_string()),
            members: seating.members,
            readiness: if seating.unfilled.is_empty() {
                Readiness::Ready
            } else {
                Readiness::Degraded
            },
            missing_roles: seating.unfilled,
            gatekeeper: None,
            network_config: NetworkConfig::default(),
            created_at: Utc::now(),
        };

        if !crew.missing_roles.is_empty() {
            warn!(crew_id = %crew.id, missing = ?crew.missing_roles, "Assembled crew is missing roles");
        }

        {
            let mut state = self.state.write();
            state.crews.insert(crew.id, crew.clone());
            state.evict_crews();
        }
        info!(crew_id = %crew.id, %phase, members = crew.members.len(), "Crew assembled");

        let payload = json!({
            "crew_id": crew.id,
            "name": crew.name,
            "mission": crew.mission,
            "phase": phase,
            "roles": wanted,
            "members": crew.members,
            "missing_roles": crew.missing_roles,
        });
        if let Err(e) = self
            .bus
            .publish(topics::CREW_MISSIONS, message_types::MISSION_STARTED, payload, None)
            .await
        {
            debug!(error = %e, "mission_started not published");
        }

        self.resolve(&crew).await
    }

    /// Record a task handoff and announce it on the crew's handoff topic.
    ///
    /// Both agents must be active. On any validation failure nothing is
    /// recorded and nothing is published.
    pub async fn handoff(&self, request: HandoffRequest) -> Result<HandoffReceipt, FabricError> {
        let task_id = request.task_id.trim().to_string();
        if task_id.is_empty() {
            return Err(FabricError::Validation("task_id must not be empty".into()));
        }
        if request.source_agent == request.target_agent {
            return Err(FabricError::InvalidHandoff(
                "source and target agents must differ".into(),
            ));
        }

        let crew_id = {
            let state = self.state.read();
            match request.crew_id {
                Some(id) if state.crews.contains_key(&id) => id,
                Some(id) => return Err(FabricError::not_found("crew", id)),
                None => state.phase_crew,
            }
        };

        self.require_active(request.source_agent, "source").await?;
        self.require_active(request.target_agent, "target").await?;

        let handoff_id = Uuid::new_v4();
        let recorded_at = Utc::now();
        self.state.write().ledger.record_handoff(
            &task_id,
            HandoffRecord {
                handoff_id,
                source_agent: request.source_agent,
                target_agent: request.target_agent,
                crew_id,
                artifacts: request.artifacts.clone(),
                delivered: false,
                recorded_at,
            },
        );

        let topic = topics::crew_handoffs(crew_id);
        let payload = request.event_payload(handoff_id);
        let published = self
            .bus
            .publish(&topic, message_types::HANDOFF, payload.clone(), Some(task_id.clone()))
            .await;
        let (delivered, event_id) = match &published {
            Ok(event) => (true, Some(event.id)),
            Err(e) => {
                warn!(%task_id, error = %e, "Handoff recorded but not published");
                (false, None)
            }
        };
        self.state
            .write()
            .ledger
            .mark_handoff_delivered(&task_id, handoff_id, delivered);

        let mut nudge = payload;
        nudge["crew_id"] = json!(crew_id);
        let nudged = match self.hub.push(request.target_agent, message_types::HANDOFF, nudge) {
            Ok(()) => true,
            Err(e) => {
                debug!(target_agent = %request.target_agent, error = %e, "Handoff target not nudged");
                false
            }
        };

        info!(
            %task_id,
            source = %request.source_agent,
            target = %request.target_agent,
            %crew_id,
            delivered,
            nudged,
            "Handoff recorded"
        );
        metrics::counter!(
            "crewlink_handoffs_total",
            "outcome" => if delivered { "delivered" } else { "undelivered" }
        )
        .increment(1);

        Ok(HandoffReceipt {
            handoff_id,
            task_id,
            crew_id,
            topic,
            event_id,
            delivered,
            nudged,
            recorded_at,
        })
    }

    /// Decompose a task for the phase crew, record it and delegate it to the
    /// agent holding the recommended role when one is connected.
    ///
    /// The returned entry is the `planning` snapshot; a later delegation is
    /// only visible through [`CrewOrchestrator::task`].
    pub async fn plan(&self, task: &str, context: Value) -> Result<TaskEntry, FabricError> {
        let task = task.trim();
        if task.is_empty() {
            return Err(FabricError::Validation("task must not be empty".into()));
        }

        let crew = self.state.read().phase_crew()?;
        let subtasks = match self.planner.decompose(task, &context, &crew).await {
            Ok(subtasks) => subtasks,
            Err(e) => {
                warn!(error = %e, "Planner failed, using crew fan-out");
                CrewFanoutPlanner::fan_out(task, &crew)
            }
        };

        let role = recommend_role(task).to_string();
        let now = Utc::now();
        let task_id = format!("task-{}", Uuid::new_v4());
        let entry = TaskEntry {
            task_id: task_id.clone(),
            description: task.to_string(),
            status: TaskStatus::Planning,
            context: context.clone(),
            crew_id: Some(crew.id),
            assigned_role: Some(role.clone()),
            subtasks,
            handoffs: Vec::new(),
            created_at: now,
            updated_at: now,
        };
        self.state.write().ledger.insert(entry.clone());
        metrics::counter!("crewlink_tasks_planned_total").increment(1);

        let payload = json!({
            "task_id": task_id,
            "task": task,
            "crew_id": crew.id,
            "assigned_role": role,
            "subtasks": entry.subtasks,
        });
        if let Err(e) = self
            .bus
            .publish(topics::CREW_TASKS, message_types::TASK_PLANNED, payload, Some(task_id.clone()))
            .await
        {
            debug!(error = %e, "task_planned not published");
        }

        if let Some(agent_id) = self.agent_for_role(&crew, &role).await? {
            let command = json!({
                "task_id": task_id,
                "task": task,
                "context": context,
                "subtasks": entry.subtasks,
            });
            match self.hub.push(agent_id, "plan", command) {
                Ok(()) => {
                    self.state.write().ledger.set_status(&task_id, TaskStatus::Delegated);
                    info!(%task_id, %role, %agent_id, "Task delegated");
                }
                Err(e) => debug!(%task_id, %role, error = %e, "Task not delegated"),
            }
        }

        Ok(entry)
    }

    /// Current phase crew.
    pub async fn crew(&self) -> Result<CrewView, FabricError> {
        let crew = self.state.read().phase_crew()?;
        self.resolve(&crew).await
    }

    pub async fn crew_by_id(&self, crew_id: CrewId) -> Result<CrewView, FabricError> {
        let crew = self
            .state
            .read()
            .crews
            .get(&crew_id)
            .cloned()
            .ok_or_else(|| FabricError::not_found("crew", crew_id))?;
        self.resolve(&crew).await
    }

    pub fn task(&self, task_id: &str) -> Result<TaskEntry, FabricError> {
        self.state
            .read()
            .ledger
            .get(task_id)
            .cloned()
            .ok_or_else(|| FabricError::not_found("task", task_id))
    }

    /// Assemble the template crew for a predefined workflow.
    pub async fn start_workflow(&self, workflow_type: &str, description: &str) -> Result<WorkflowTicket, FabricError> {
        let workflow_type = workflow_type.trim().to_ascii_lowercase();
        let roles: Vec<String> = workflow_template(&workflow_type)
            .ok_or_else(|| FabricError::Validation(format!("unknown workflow '{workflow_type}'")))?
            .iter()
            .map(|r| r.to_string())
            .collect();

        let workflow_id = format!("workflow_{workflow_type}_{}", Utc::now().format("%Y%m%d_%H%M%S"));
        let crew = self
            .assemble(&roles, description, Some(workflow_id.clone()))
            .await?;

        info!(%workflow_id, crew_id = %crew.id, "Workflow initiated");
        Ok(WorkflowTicket {
            workflow_id,
            workflow_type,
            roles,
            crew,
            status: "initiated".into(),
        })
    }

    /// Push a `task` command to the agent in `role`.
    pub async fn execute(&self, role: &str, message: &str, context: Value) -> Result<ExecutionReceipt, FabricError> {
        let role = normalize_role(role);
        let crew = self.state.read().phase_crew()?;
        let agent_id = self
            .agent_for_role(&crew, &role)
            .await?
            .ok_or_else(|| FabricError::not_found("agent for role", &role))?;

        self.hub.push(
            agent_id,
            "task",
            json!({
                "role": role,
                "message": message,
                "context": context,
                "crew_id": crew.id,
            }),
        )?;

        info!(%role, %agent_id, "Task dispatched");
        Ok(ExecutionReceipt {
            role,
            agent_id,
            crew_id: crew.id,
            dispatched_at: Utc::now(),
        })
    }

    async fn require_active(&self, agent_id: AgentId, side: &str) -> Result<AgentRecord, FabricError> {
        let record = match self.registry.get(agent_id).await {
            Ok(record) => record,
            Err(FabricError::NotFound { .. }) => {
                return Err(FabricError::InvalidHandoff(format!(
                    "{side} agent {agent_id} is not registered"
                )))
            }
            Err(e) => return Err(e),
        };
        if record.status != AgentStatus::Active {
            return Err(FabricError::InvalidHandoff(format!(
                "{side} agent {agent_id} is {}",
                record.status
            )));
        }
        Ok(record)
    }

    /// The crew member seated in `role` if still active, else the first
    /// active agent that fills it.
    async fn agent_for_role(&self, crew: &Crew, role: &str) -> Result<Option<AgentId>, FabricError> {
        let active = self.registry.list(&AgentFilter::active()).await?;
        let seated = crew
            .members
            .iter()
            .filter(|m| m.role == role)
            .map(|m| m.agent_id)
            .find(|id| active.iter().any(|a| a.id == *id));

        Ok(seated.or_else(|| active.iter().find(|a| a.fills_role(role)).map(|a| a.id)))
    }

    async fn resolve(&self, crew: &Crew) -> Result<CrewView, FabricError> {
        let records = self.registry.list(&AgentFilter::default()).await?;
        Ok(CrewView::resolve(crew, &records))
    }
}
