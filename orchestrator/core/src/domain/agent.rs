// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AgentId(pub Uuid);

impl AgentId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_string(s: &str) -> Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

impl Default for AgentId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Liveness status of a registered agent.
///
/// `Unreachable` is written only by the liveness sweep; `Active` only by a
/// heartbeat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Registered,
    Active,
    Unreachable,
    Deregistered,
}

impl AgentStatus {
    /// Whether the sweep should consider this record at all.
    pub fn is_live(&self) -> bool {
        matches!(self, Self::Registered | Self::Active)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Registered => "registered",
            Self::Active => "active",
            Self::Unreachable => "unreachable",
            Self::Deregistered => "deregistered",
        }
    }
}

impl fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AgentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "registered" => Ok(Self::Registered),
            "active" => Ok(Self::Active),
            "unreachable" => Ok(Self::Unreachable),
            "deregistered" => Ok(Self::Deregistered),
            other => Err(format!("unknown agent status: {other}")),
        }
    }
}

/// Registry entry for one agent process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentRecord {
    pub id: AgentId,
    pub name: String,
    pub description: String,
    pub version: String,
    pub endpoint: String,
    pub tags: BTreeSet<String>,
    pub capabilities: BTreeSet<String>,
    pub status: AgentStatus,
    pub last_heartbeat: DateTime<Utc>,
    /// Last load figure reported with a heartbeat.
    #[serde(default)]
    pub load: f64,
    pub registered_at: DateTime<Utc>,
}

impl AgentRecord {
    /// Fields are kept exactly as supplied.
    pub fn from_registration(registration: AgentRegistration, now: DateTime<Utc>) -> Self {
        Self {
            id: AgentId::new(),
            name: registration.name,
            description: registration.description,
            version: registration.version,
            endpoint: registration.endpoint,
            tags: registration.tags.into_iter().collect(),
            capabilities: registration.capabilities.into_iter().collect(),
            status: AgentStatus::Registered,
            last_heartbeat: now,
            load: 0.0,
            registered_at: now,
        }
    }

    /// Whether this agent can be seated in `role`.
    ///
    /// Matches a tag or capability equal to the role, or a name that
    /// normalizes to it ("Frontend Specialist" fills `frontend_specialist`).
    pub fn fills_role(&self, role: &str) -> bool {
        let role = normalize_role(role);
        self.tags.iter().any(|t| normalize_role(t) == role)
            || self.capabilities.iter().any(|c| normalize_role(c) == role)
            || normalize_role(&self.name) == role
    }

    pub fn has_tags(&self, tags: &[String]) -> bool {
        tags.iter().all(|t| self.tags.contains(t))
    }
}

/// Lowercase and collapse `-` and whitespace into `_`.
pub fn normalize_role(value: &str) -> String {
    value
        .trim()
        .to_ascii_lowercase()
        .split(|c: char| c == '-' || c == '_' || c.is_whitespace())
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("_")
}

/// Fields supplied by an agent when it registers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentRegistration {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub endpoint: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub capabilities: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatRequest {
    pub agent_id: AgentId,
    /// Self-reported state, e.g. "active" or "busy". Informational only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub load: Option<f64>,
}

/// Query for `AgentRegistry::list`. Empty filter matches everything.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentFilter {
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub status: Option<AgentStatus>,
}

impl AgentFilter {
    pub fn active() -> Self {
        Self {
            tags: Vec::new(),
            status: Some(AgentStatus::Active),
        }
    }

    pub fn matches(&self, record: &AgentRecord) -> bool {
        self.status.map_or(true, |s| record.status == s) && record.has_tags(&self.tags)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(name: &str, tags: &[&str]) -> AgentRecord {
        AgentRecord::from_registration(
            AgentRegistration {
                name: name.to_string(),
                endpoint: "http://agent:5000".to_string(),
                tags: tags.iter().map(|t| t.to_string()).collect(),
                ..Default::default()
            },
            Utc::now(),
        )
    }

    #[test]
    fn test_role_matching_uses_tags_and_name() {
        let by_tag = record("Coder", &["backend_specialist"]);
        assert!(by_tag.fills_role("backend_specialist"));
        assert!(!by_tag.fills_role("frontend_specialist"));

        let by_name = record("Frontend Specialist", &[]);
        assert!(by_name.fills_role("frontend_specialist"));
        assert!(by_name.fills_role("frontend-specialist"));
    }

    #[test]
    fn test_filter_requires_all_tags() {
        let agent = record("Coder", &["code", "python"]);
        let filter = AgentFilter {
            tags: vec!["code".to_string(), "python".to_string()],
            status: None,
        };
        assert!(filter.matches(&agent));

        let filter = AgentFilter {
            tags: vec!["code".to_string(), "rust".to_string()],
            status: None,
        };
        assert!(!filter.matches(&agent));
        assert!(!AgentFilter::active().matches(&agent));
    }

    #[test]
    fn test_status_round_trips_through_strings() {
        assert_eq!("Unreachable".parse::<AgentStatus>().unwrap(), AgentStatus::Unreachable);
        assert!("sleeping".parse::<AgentStatus>().is_err());
        assert_eq!(
            serde_json::to_string(&AgentStatus::Deregistered).unwrap(),
            "\"deregistered\""
        );
    }
}
