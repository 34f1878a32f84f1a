// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Orchestrator side of the agent channel.
//
// One task per connected agent owns the socket. It answers `ping` text frames
// with `pong` after recording a heartbeat, relays every other frame onto the
// agent's inbound topic, and forwards command frames queued in the
// `ChannelHub`. When a newer connection for the same agent attaches, the hub
// drops this task's sender and the older socket is closed.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    response::{IntoResponse, Response},
};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::domain::agent::{AgentId, AgentStatus};
use crate::domain::error::FabricError;
use crate::domain::events::{message_types, topics};
use crate::infrastructure::event_bus::EventBus;
use crate::presentation::api::{parse_agent_id, FabricState};
use crate::presentation::error::ApiError;

pub const PING: &str = "ping";
pub const PONG: &str = "pong";

pub async fn channel_handler(
    ws: WebSocketUpgrade,
    State(state): State<FabricState>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let agent_id = parse_agent_id(&id)?;
    let record = state.registry.get(agent_id).await?;
    if record.status == AgentStatus::Deregistered {
        return Err(FabricError::not_found("agent", agent_id).into());
    }

    Ok(ws
        .on_upgrade(move |socket| serve_channel(socket, state, agent_id))
        .into_response())
}

async fn serve_channel(mut socket: WebSocket, state: FabricState, agent_id: AgentId) {
    let (conn_id, mut commands) = state.hub.attach(agent_id);
    let agent_bus = state.bus.with_sender(agent_id.to_string());
    info!(agent_id = %agent_id, conn_id, "Agent channel connected");

    loop {
        tokio::select! {
            frame = socket.recv() => {
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        match handle_text(&state, &agent_bus, agent_id, text.as_str()).await {
                            Ok(Some(reply)) => {
                                if socket.send(Message::Text(reply.into())).await.is_err() {
                                    break;
                                }
                            }
                            Ok(None) => {}
                            Err(e) => {
                                warn!(agent_id = %agent_id, "Closing channel: {}", e);
                                break;
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {} // Ping/Pong control frames handled by axum
                    Some(Err(e)) => {
                        debug!(agent_id = %agent_id, error = %e, "Channel read failed");
                        break;
                    }
                }
            }
            command = commands.recv() => {
                match command {
                    Some(frame) => {
                        if socket.send(Message::Text(frame.into())).await.is_err() {
                            break;
                        }
                    }
                    None => {
                        debug!(agent_id = %agent_id, conn_id, "Channel superseded");
                        break;
                    }
                }
            }
        }
    }

    state.hub.detach(agent_id, conn_id);
    let _ = socket.send(Message::Close(None)).await;
    info!(agent_id = %agent_id, conn_id, "Agent channel disconnected");
}

/// Returns the reply frame, if any. An error closes the channel.
async fn handle_text(
    state: &FabricState,
    agent_bus: &EventBus,
    agent_id: AgentId,
    text: &str,
) -> Result<Option<String>, FabricError> {
    if text.trim() == PING {
        state.registry.heartbeat(agent_id, None, None).await?;
        return Ok(Some(PONG.to_string()));
    }

    let (message_type, payload, correlation_id) = decode_frame(text);
    if let Err(e) = agent_bus
        .publish(&topics::agent_inbound(agent_id), &message_type, payload, correlation_id)
        .await
    {
        debug!(agent_id = %agent_id, "Inbound frame not relayed: {}", e);
    }
    Ok(None)
}

/// Split a frame into (type, payload, correlation id). Frames that are not
/// JSON objects are wrapped as `{"text": ...}` messages.
fn decode_frame(text: &str) -> (String, Value, Option<String>) {
    match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(mut fields)) => {
            let message_type = fields
                .get("type")
                .and_then(Value::as_str)
                .unwrap_or(message_types::CHANNEL_MESSAGE)
                .to_string();
            let correlation_id = fields
                .get("correlation_id")
                .and_then(Value::as_str)
                .map(String::from);
            let payload = fields
                .remove("payload")
                .unwrap_or_else(|| Value::Object(fields));
            (message_type, payload, correlation_id)
        }
        _ => (
            message_types::CHANNEL_MESSAGE.to_string(),
            json!({ "text": text }),
            None,
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_typed_frame() {
        let (kind, payload, correlation) =
            decode_frame(r#"{"type":"task_result","payload":{"ok":true},"correlation_id":"t-1"}"#);
        assert_eq!(kind, "task_result");
        assert_eq!(payload, json!({"ok": true}));
        assert_eq!(correlation.as_deref(), Some("t-1"));
    }

    #[test]
    fn test_decode_untyped_frames() {
        let (kind, payload, _) = decode_frame(r#"{"progress":0.5}"#);
        assert_eq!(kind, "message");
        assert_eq!(payload["progress"], 0.5);

        let (kind, payload, _) = decode_frame("hello");
        assert_eq!(kind, "message");
        assert_eq!(payload["text"], "hello");
    }
}
