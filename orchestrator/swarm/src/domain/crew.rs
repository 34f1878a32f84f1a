// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Crew Aggregate
//!
//! A [`Crew`] is a set of registered agents seated in roles for one phase or
//! one mission. Members are held by [`AgentId`] only; every read resolves
//! them through the registry into a [`CrewView`].
//!
//! # Invariants
//!
//! - Every seated agent was `active` in the registry when it was seated.
//! - `missing_roles` lists required roles no eligible agent could fill.
//! - `readiness` is `forced` only when the transition was forced.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crewlink_core::domain::agent::{AgentId, AgentRecord};

use crate::domain::phase::Phase;

/// Unique identifier for a [`Crew`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CrewId(pub Uuid);

impl CrewId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_string(s: &str) -> Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

impl Default for CrewId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CrewId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrewMember {
    pub agent_id: AgentId,
    pub role: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Readiness {
    /// Every required role is seated.
    Ready,
    /// At least one required role is missing.
    Degraded,
    /// Readiness was not evaluated.
    Forced,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub shared_context: bool,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            shared_context: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Crew {
    pub id: CrewId,
    pub name: String,
    pub phase: Phase,
    pub mission: Option<String>,
    pub members: Vec<CrewMember>,
    pub missing_roles: Vec<String>,
    pub readiness: Readiness,
    pub gatekeeper: Option<String>,
    pub network_config: NetworkConfig,
    pub created_at: DateTime<Utc>,
}

impl Crew {
    pub fn agent_for_role(&self, role: &str) -> Option<AgentId> {
        self.members
            .iter()
            .find(|m| m.role == role)
            .map(|m| m.agent_id)
    }

    pub fn seats(&self, agent_id: AgentId) -> bool {
        self.members.iter().any(|m| m.agent_id == agent_id)
    }

    /// Distinct seated roles in seating order.
    pub fn seated_roles(&self) -> Vec<String> {
        let mut roles: Vec<String> = Vec::new();
        for member in &self.members {
            if !roles.contains(&member.role) {
                roles.push(member.role.clone());
            }
        }
        roles
    }
}

/// Dry-run answer to "could the fabric move to this phase right now".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseReadiness {
    pub phase: Phase,
    pub current_phase: Phase,
    /// `ready` or `degraded`; never `forced`.
    pub readiness: Readiness,
    pub missing_roles: Vec<String>,
    /// Agents that would be seated.
    pub members: Vec<CrewMember>,
    pub gatekeeper: Option<String>,
}

/// Result of seating a list of roles from a candidate pool.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Seating {
    pub members: Vec<CrewMember>,
    pub unfilled: Vec<String>,
}

/// Seat each role with the first candidate that fills it, in candidate
/// order. An agent already seated in this crew is only reused when no
/// unseated candidate fills the role.
pub fn seat_roles(roles: &[String], candidates: &[AgentRecord]) -> Seating {
    let mut seating = Seating::default();

    for role in roles {
        let eligible: Vec<&AgentRecord> = candidates
            .iter()
            .filter(|agent| agent.fills_role(role))
            .collect();
        let chosen = eligible
            .iter()
            .find(|agent| !seating.members.iter().any(|m| m.agent_id == agent.id))
            .or_else(|| eligible.first())
            .copied();

        match chosen {
            Some(agent) => seating.members.push(CrewMember {
                agent_id: agent.id,
                role: role.clone(),
            }),
            None => seating.unfilled.push(role.clone()),
        }
    }

    seating
}

/// A crew with its members resolved against the registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrewView {
    pub id: CrewId,
    pub name: String,
    pub phase: Phase,
    pub mission: Option<String>,
    pub members: Vec<MemberView>,
    pub missing_roles: Vec<String>,
    pub readiness: Readiness,
    pub gatekeeper: Option<String>,
    pub network_config: NetworkConfig,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberView {
    pub agent_id: AgentId,
    pub role: String,
    /// Current registry record. `None` only if the registry lost the record.
    pub agent: Option<AgentRecord>,
}

impl CrewView {
    pub fn resolve(crew: &Crew, records: &[AgentRecord]) -> Self {
        let members = crew
            .members
            .iter()
            .map(|member| MemberView {
                agent_id: member.agent_id,
                role: member.role.clone(),
                agent: records.iter().find(|r| r.id == member.agent_id).cloned(),
            })
            .collect();

        Self {
            id: crew.id,
            name: crew.name.clone(),
            phase: crew.phase,
            mission: crew.mission.clone(),
            members,
            missing_roles: crew.missing_roles.clone(),
            readiness: crew.readiness,
            gatekeeper: crew.gatekeeper.clone(),
            network_config: crew.network_config,
            created_at: crew.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crewlink_core::domain::agent::AgentRegistration;

    fn agent(name: &str, tags: &[&str]) -> AgentRecord {
        AgentRecord::from_registration(
            AgentRegistration {
                name: name.into(),
                endpoint: "http://agent:8000".into(),
                tags: tags.iter().map(|t| t.to_string()).collect(),
                ..Default::default()
            },
            Utc::now(),
        )
    }

    fn roles(names: &[&str]) -> Vec<String> {
        names.iter().map(|r| r.to_string()).collect()
    }

    #[test]
    fn test_seating_prefers_unseated_agents() {
        let fullstack = agent("fullstack", &["frontend_specialist", "backend_specialist"]);
        let backend = agent("backend", &["backend_specialist"]);
        let seating = seat_roles(
            &roles(&["frontend_specialist", "backend_specialist"]),
            &[fullstack.clone(), backend.clone()],
        );

        assert!(seating.unfilled.is_empty());
        assert_eq!(seating.members[0].agent_id, fullstack.id);
        assert_eq!(seating.members[1].agent_id, backend.id);
    }

    #[test]
    fn test_seating_reuses_agent_when_no_one_else_fits() {
        let fullstack = agent("fullstack", &["frontend_specialist", "backend_specialist"]);
        let seating = seat_roles(
            &roles(&["frontend_specialist", "backend_specialist", "qa_engineer"]),
            &[fullstack.clone()],
        );

        assert_eq!(seating.members.len(), 2);
        assert!(seating.members.iter().all(|m| m.agent_id == fullstack.id));
        assert_eq!(seating.unfilled, vec!["qa_engineer"]);
    }

    #[test]
    fn test_view_resolves_current_records() {
        let coder = agent("coder", &["backend_specialist"]);
        let crew = Crew {
            id: CrewId::new(),
            name: "mission".into(),
            phase: Phase::Development,
            mission: Some("Build login form".into()),
            members: vec![CrewMember {
                agent_id: coder.id,
                role: "backend_specialist".into(),
            }],
            missing_roles: vec![],
            readiness: Readiness::Ready,
            gatekeeper: None,
            network_config: NetworkConfig::default(),
            created_at: Utc::now(),
        };

        let view = CrewView::resolve(&crew, &[coder.clone()]);
        assert_eq!(view.members[0].agent.as_ref().unwrap().name, "coder");
        assert_eq!(crew.agent_for_role("backend_specialist"), Some(coder.id));
        assert!(crew.seats(coder.id));
        assert!(CrewView::resolve(&crew, &[]).members[0].agent.is_none());
    }
}
