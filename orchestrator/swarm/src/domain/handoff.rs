// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use uuid::Uuid;

use crewlink_core::domain::agent::AgentId;

use crate::domain::crew::CrewId;

/// Transfer of a task between two agents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandoffRequest {
    pub source_agent: AgentId,
    pub target_agent: AgentId,
    pub task_id: String,
    #[serde(default)]
    pub context: Map<String, Value>,
    /// Artifact references, order preserved.
    #[serde(default)]
    pub artifacts: Vec<String>,
    /// Defaults to the current phase crew.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crew_id: Option<CrewId>,
}

impl HandoffRequest {
    /// Payload of the `handoff` event.
    pub fn event_payload(&self, handoff_id: Uuid) -> Value {
        json!({
            "handoff_id": handoff_id,
            "source_agent": self.source_agent,
            "target_agent": self.target_agent,
            "task_id": self.task_id,
            "context": self.context,
            "artifacts": self.artifacts,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandoffReceipt {
    pub handoff_id: Uuid,
    pub task_id: String,
    pub crew_id: CrewId,
    pub topic: String,
    /// Id of the published event, when publishing succeeded.
    pub event_id: Option<Uuid>,
    pub delivered: bool,
    /// Whether the target was also notified over its channel.
    pub nudged: bool,
    pub recorded_at: DateTime<Utc>,
}
