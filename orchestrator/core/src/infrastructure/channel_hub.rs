// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Channel Hub - Command senders for connected agents
//
// Each WebSocket channel task attaches an mpsc sender here; the orchestrator
// pushes command frames to an agent without knowing which task serves it.
// A newer connection for the same agent replaces the older one, and a stale
// task detaching later leaves the newer entry in place.

use dashmap::DashMap;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::domain::agent::AgentId;
use crate::domain::error::FabricError;

/// Outbound frames buffered per agent before `push` reports backpressure.
pub const COMMAND_BUFFER: usize = 64;

/// Identifies one physical connection for an agent.
pub type ConnectionId = u64;

#[derive(Clone, Default)]
pub struct ChannelHub {
    connections: Arc<DashMap<AgentId, (ConnectionId, mpsc::Sender<String>)>>,
    next_connection: Arc<AtomicU64>,
}

impl ChannelHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection and return its id plus the receiving end the
    /// socket task drains.
    pub fn attach(&self, agent_id: AgentId) -> (ConnectionId, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(COMMAND_BUFFER);
        let conn_id = self.next_connection.fetch_add(1, Ordering::Relaxed);
        if self.connections.insert(agent_id, (conn_id, tx)).is_some() {
            info!(agent_id = %agent_id, "Channel superseded by a newer connection");
        }
        debug!(agent_id = %agent_id, conn_id, "Channel attached");
        (conn_id, rx)
    }

    /// Remove the entry only if it still belongs to `conn_id`.
    pub fn detach(&self, agent_id: AgentId, conn_id: ConnectionId) {
        if self
            .connections
            .remove_if(&agent_id, |_, (current, _)| *current == conn_id)
            .is_some()
        {
            debug!(agent_id = %agent_id, conn_id, "Channel detached");
        }
    }

    pub fn is_connected(&self, agent_id: AgentId) -> bool {
        self.connections
            .get(&agent_id)
            .map(|entry| !entry.1.is_closed())
            .unwrap_or(false)
    }

    pub fn connected_count(&self) -> usize {
        self.connections.len()
    }

    /// Queue a `{"type": kind, "payload": payload}` frame for the agent.
    pub fn push(&self, agent_id: AgentId, kind: &str, payload: Value) -> Result<(), FabricError> {
        let frame = json!({ "type": kind, "payload": payload }).to_string();

        let sender = self
            .connections
            .get(&agent_id)
            .map(|entry| entry.1.clone())
            .ok_or_else(|| {
                FabricError::Transport(format!("agent {agent_id} has no open channel"))
            })?;

        sender.try_send(frame).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => {
                FabricError::Transport(format!("channel to agent {agent_id} is full"))
            }
            mpsc::error::TrySendError::Closed(_) => {
                FabricError::Transport(format!("channel to agent {agent_id} is closed"))
            }
        })?;

        metrics::counter!("crewlink_channel_commands_total", "type" => kind.to_string())
            .increment(1);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_push_reaches_attached_connection() {
        let hub = ChannelHub::new();
        let agent = AgentId::new();
        let (_conn, mut rx) = hub.attach(agent);

        hub.push(agent, "task", json!({"message": "build"})).unwrap();

        let frame: Value = serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
        assert_eq!(frame["type"], "task");
        assert_eq!(frame["payload"]["message"], "build");
    }

    #[test]
    fn test_push_without_connection_is_transport_error() {
        let hub = ChannelHub::new();
        let err = hub.push(AgentId::new(), "task", Value::Null).unwrap_err();
        assert_eq!(err.kind(), "transport");
    }

    #[test]
    fn test_stale_detach_keeps_newer_connection() {
        let hub = ChannelHub::new();
        let agent = AgentId::new();
        let (old_conn, _old_rx) = hub.attach(agent);
        let (_new_conn, _new_rx) = hub.attach(agent);

        hub.detach(agent, old_conn);
        assert!(hub.is_connected(agent));
        assert_eq!(hub.connected_count(), 1);
    }
}
