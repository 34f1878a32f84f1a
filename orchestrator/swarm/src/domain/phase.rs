// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Phases and Rosters
//!
//! - [`Phase`] - the operating phases a project moves through.
//! - [`PhaseRoster`] - roles a phase requires (primary), may use (support),
//!   and the role that gates leaving it.
//! - [`RosterTable`] - the built-in rosters with configuration overrides applied.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crewlink_core::domain::agent::normalize_role;
use crewlink_core::domain::config::CrewConfig;
use crewlink_core::domain::error::FabricError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Planning,
    Architecture,
    Development,
    Testing,
    Deployment,
    Maintenance,
}

impl Phase {
    pub const ALL: [Phase; 6] = [
        Phase::Planning,
        Phase::Architecture,
        Phase::Development,
        Phase::Testing,
        Phase::Deployment,
        Phase::Maintenance,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Planning => "planning",
            Self::Architecture => "architecture",
            Self::Development => "development",
            Self::Testing => "testing",
            Self::Deployment => "deployment",
            Self::Maintenance => "maintenance",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Phase {
    type Err = FabricError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|phase| phase.as_str() == wanted)
            .ok_or_else(|| FabricError::Validation(format!("unknown phase '{s}'")))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PhaseRoster {
    pub primary: Vec<String>,
    pub support: Vec<String>,
    pub gatekeeper: Option<String>,
}

impl PhaseRoster {
    fn new(primary: &[&str], support: &[&str], gatekeeper: Option<&str>) -> Self {
        Self {
            primary: primary.iter().map(|r| r.to_string()).collect(),
            support: support.iter().map(|r| r.to_string()).collect(),
            gatekeeper: gatekeeper.map(String::from),
        }
    }

    /// Primary roles first, then support roles.
    pub fn roles(&self) -> Vec<String> {
        self.primary.iter().chain(&self.support).cloned().collect()
    }

    pub fn is_primary(&self, role: &str) -> bool {
        self.primary.iter().any(|r| r == role)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RosterTable {
    rosters: BTreeMap<Phase, PhaseRoster>,
}

impl RosterTable {
    pub fn builtin() -> Self {
        let rosters = BTreeMap::from([
            (
                Phase::Planning,
                PhaseRoster::new(
                    &["project_strategist", "idea_alchemist"],
                    &["hyper_research", "hyper_narrator"],
                    Some("project_strategist"),
                ),
            ),
            (
                Phase::Architecture,
                PhaseRoster::new(
                    &["system_architect", "database_architect"],
                    &["security_engineer", "helix_bio_architect"],
                    Some("system_architect"),
                ),
            ),
            (
                Phase::Development,
                PhaseRoster::new(
                    &["frontend_specialist", "backend_specialist"],
                    &["hyper_ux_flow", "doc_syncer", "manifest_enforcer"],
                    Some("qa_engineer"),
                ),
            ),
            (
                Phase::Testing,
                PhaseRoster::new(
                    &["qa_engineer", "security_engineer"],
                    &["hyper_flow_dimmer"],
                    Some("qa_engineer"),
                ),
            ),
            (
                Phase::Deployment,
                PhaseRoster::new(
                    &["devops_engineer"],
                    &["doc_syncer", "hyper_narrator"],
                    Some("security_engineer"),
                ),
            ),
            (Phase::Maintenance, PhaseRoster::default()),
        ]);
        Self { rosters }
    }

    /// Built-in rosters with per-phase replacements from configuration.
    pub fn from_config(config: &CrewConfig) -> Result<Self, FabricError> {
        let mut table = Self::builtin();
        for (name, roster) in &config.phases {
            let phase: Phase = name.parse()?;
            table.rosters.insert(
                phase,
                PhaseRoster {
                    primary: roster.primary.iter().map(|r| normalize_role(r)).collect(),
                    support: roster.support.iter().map(|r| normalize_role(r)).collect(),
                    gatekeeper: roster.gatekeeper.as_deref().map(normalize_role),
                },
            );
        }
        Ok(table)
    }

    pub fn roster(&self, phase: Phase) -> PhaseRoster {
        self.rosters.get(&phase).cloned().unwrap_or_default()
    }
}

impl Default for RosterTable {
    fn default() -> Self {
        Self::builtin()
    }
}
