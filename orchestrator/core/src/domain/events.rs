// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Event envelope carried on the bus, plus the well-known topics and message
//! types the fabric itself publishes.
//!
//! One `Event` is serialized as one JSON document per bus message.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::agent::AgentId;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub sender_id: String,
    pub message_type: String,
    pub payload: serde_json::Value,
    #[serde(default)]
    pub correlation_id: Option<String>,
}

impl Event {
    /// Stamp a new event. The id and timestamp are assigned here, once.
    pub fn new(
        sender_id: impl Into<String>,
        message_type: impl Into<String>,
        payload: serde_json::Value,
        correlation_id: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            sender_id: sender_id.into(),
            message_type: message_type.into(),
            payload,
            correlation_id,
        }
    }

    pub fn to_wire(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_wire(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }
}

/// Well-known topic names.
pub mod topics {
    use super::AgentId;

    /// Registration, deregistration and liveness transitions.
    pub const AGENT_LIFECYCLE: &str = "agents.lifecycle";
    pub const CREW_PHASES: &str = "crew.phases";
    pub const CREW_MISSIONS: &str = "crew.missions";
    pub const CREW_TASKS: &str = "crew.tasks";
    /// Broadcast channel the original agents emit their own events on.
    pub const AGENT_EVENTS: &str = "agent.events";

    /// Per-crew handoff topic.
    pub fn crew_handoffs(crew_id: impl std::fmt::Display) -> String {
        format!("crew.{crew_id}.handoffs")
    }

    /// Frames an agent sends over its channel that are not heartbeats.
    pub fn agent_inbound(agent_id: AgentId) -> String {
        format!("agents.{agent_id}.inbound")
    }

    /// Topic names are dot-separated words of `[A-Za-z0-9_-]`.
    pub fn is_valid(topic: &str) -> bool {
        !topic.is_empty()
            && topic.len() <= 256
            && topic.split('.').all(|segment| {
                !segment.is_empty()
                    && segment
                        .chars()
                        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
            })
    }
}

/// Message types published by the fabric.
pub mod message_types {
    pub const AGENT_REGISTERED: &str = "agent_registered";
    pub const AGENT_DEREGISTERED: &str = "agent_deregistered";
    pub const AGENT_UNREACHABLE: &str = "agent_unreachable";
    pub const PHASE_CHANGED: &str = "phase_changed";
    pub const MISSION_STARTED: &str = "mission_started";
    pub const TASK_PLANNED: &str = "task_planned";
    pub const HANDOFF: &str = "handoff";
    pub const CHANNEL_MESSAGE: &str = "message";
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_wire_format_matches_envelope_shape() {
        let event = Event::new("orchestrator", "handoff", json!({"k": 1}), Some("task-1".into()));
        let value: serde_json::Value = serde_json::from_str(&event.to_wire().unwrap()).unwrap();

        for field in ["id", "timestamp", "sender_id", "message_type", "payload", "correlation_id"] {
            assert!(value.get(field).is_some(), "missing {field}");
        }
        assert_eq!(value["correlation_id"], "task-1");
    }

    #[test]
    fn test_missing_correlation_id_deserializes_as_none() {
        let raw = r#"{"id":"6f1c2a52-8f9e-4a40-9d43-7c1e0c3f2a10","timestamp":"2026-01-01T00:00:00Z",
            "sender_id":"coder","message_type":"agent_startup","payload":{}}"#;
        let event = Event::from_wire(raw).unwrap();
        assert_eq!(event.correlation_id, None);
        assert_eq!(event.sender_id, "coder");
    }

    #[test]
    fn test_topic_validation() {
        assert!(topics::is_valid("crew.phases"));
        assert!(topics::is_valid(&topics::crew_handoffs(uuid::Uuid::new_v4())));
        assert!(!topics::is_valid(""));
        assert!(!topics::is_valid("crew..phases"));
        assert!(!topics::is_valid("crew/phases"));
    }
}
