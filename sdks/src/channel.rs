// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Agent Channel
//!
//! Keeps one WebSocket open to `/agents/{id}/channel` for the lifetime of an
//! agent process.
//!
//! ```text
//! Disconnected ──► Connecting ──► Connected
//!      ▲               │              │
//!      └── delay ◄─────┴──────────────┘  (handshake failure, ack timeout,
//!                                         transport error, close)
//! ```
//!
//! While connected the manager sends a `ping` text frame every heartbeat
//! period and expects `pong` within the acknowledgment timeout. Every other
//! inbound frame is decoded into a [`ChannelMessage`] and handed to the
//! [`MessageHandler`] on its own task, so a slow or failing handler never
//! stalls the socket.
//!
//! Every suspension point observes the [`CancellationToken`]; cancelling it
//! closes the socket and ends [`ChannelManager::run`] promptly.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep, sleep_until, timeout, Instant, MissedTickBehavior};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crewlink_core::domain::agent::AgentId;
use crewlink_core::domain::config::FabricConfig;
use crewlink_core::domain::error::FabricError;
use crewlink_core::presentation::API_KEY_HEADER;

const PING: &str = "ping";
const PONG: &str = "pong";
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const OUTBOUND_BUFFER: usize = 64;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelState {
    Disconnected,
    Connecting,
    Connected,
}

/// A frame received from the orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelMessage {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub payload: Value,
}

impl ChannelMessage {
    /// `{"type", "payload"}` frames decode directly; any other JSON becomes a
    /// `message` with the whole value as payload, and plain text becomes
    /// `{"text": ...}`.
    pub fn decode(text: &str) -> Self {
        match serde_json::from_str::<Value>(text) {
            Ok(Value::Object(mut object)) => match object.remove("type") {
                Some(Value::String(kind)) => {
                    let payload = object.remove("payload").unwrap_or(Value::Object(object));
                    Self { kind, payload }
                }
                Some(other) => {
                    object.insert("type".into(), other);
                    Self::message(Value::Object(object))
                }
                None => Self::message(Value::Object(object)),
            },
            Ok(value) => Self::message(value),
            Err(_) => Self::message(json!({ "text": text })),
        }
    }

    fn message(payload: Value) -> Self {
        Self {
            kind: "message".into(),
            payload,
        }
    }
}

#[async_trait]
pub trait MessageHandler: Send + Sync + 'static {
    async fn handle(&self, message: ChannelMessage) -> anyhow::Result<()>;
}

/// Delay before each reconnect attempt. A factor of 1.0 keeps it fixed.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectPolicy {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_factor: f64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(5),
            max_delay: Duration::from_secs(60),
            backoff_factor: 1.0,
        }
    }
}

impl ReconnectPolicy {
    pub fn next_delay(&self, current: Duration) -> Duration {
        if self.backoff_factor.is_nan() || self.backoff_factor <= 1.0 {
            return current;
        }
        let ceiling = self.max_delay.max(self.initial_delay);
        Duration::try_from_secs_f64(current.as_secs_f64() * self.backoff_factor)
            .map_or(ceiling, |next| next.min(ceiling))
    }
}

#[derive(Debug, Clone)]
pub struct ChannelOptions {
    pub heartbeat_interval: Duration,
    pub ack_timeout: Duration,
    pub reconnect: ReconnectPolicy,
    pub api_key: Option<String>,
}

impl Default for ChannelOptions {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(30),
            ack_timeout: Duration::from_secs(30),
            reconnect: ReconnectPolicy::default(),
            api_key: None,
        }
    }
}

impl ChannelOptions {
    pub fn from_config(config: &FabricConfig) -> Self {
        let heartbeat_interval = config.liveness.heartbeat_interval();
        Self {
            heartbeat_interval,
            ack_timeout: config
                .channel
                .ack_timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(heartbeat_interval),
            reconnect: ReconnectPolicy {
                initial_delay: Duration::from_secs(config.channel.reconnect_delay_secs),
                max_delay: Duration::from_secs(config.channel.max_reconnect_delay_secs),
                backoff_factor: config.channel.backoff_factor,
            },
            api_key: config.resolved_api_key(),
        }
    }
}

/// `ws(s)://{base}/agents/{id}/channel` from an `http(s)` orchestrator URL.
pub fn channel_url(base_url: &str, agent_id: AgentId) -> Result<String, FabricError> {
    let mut url = url::Url::parse(base_url)
        .map_err(|e| FabricError::Validation(format!("invalid orchestrator url '{base_url}': {e}")))?;

    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => {
            return Err(FabricError::Validation(format!(
                "cannot open a channel over '{other}'"
            )))
        }
    };
    url.set_scheme(scheme)
        .map_err(|_| FabricError::Validation(format!("cannot upgrade '{base_url}' to {scheme}")))?;

    Ok(format!(
        "{}/agents/{agent_id}/channel",
        url.as_str().trim_end_matches('/')
    ))
}

/// Queues frames for the orchestrator. Frames wait in the buffer while the
/// channel is reconnecting.
#[derive(Clone)]
pub struct ChannelSender {
    tx: mpsc::Sender<String>,
}

impl ChannelSender {
    pub async fn send(&self, kind: &str, payload: Value) -> Result<(), FabricError> {
        let frame = json!({ "type": kind, "payload": payload }).to_string();
        self.tx
            .send(frame)
            .await
            .map_err(|_| FabricError::Transport("channel manager has stopped".into()))
    }
}

enum SessionEnd {
    Shutdown,
    AckTimeout,
    Closed,
    Failed(String),
}

pub struct ChannelManager {
    url: String,
    agent_id: AgentId,
    options: ChannelOptions,
    handler: Arc<dyn MessageHandler>,
    state: watch::Sender<ChannelState>,
    outbound_tx: mpsc::Sender<String>,
    outbound_rx: mpsc::Receiver<String>,
    shutdown: CancellationToken,
}

impl ChannelManager {
    pub fn new(
        base_url: &str,
        agent_id: AgentId,
        options: ChannelOptions,
        handler: Arc<dyn MessageHandler>,
        shutdown: CancellationToken,
    ) -> Result<Self, FabricError> {
        let url = channel_url(base_url, agent_id)?;
        let (state, _) = watch::channel(ChannelState::Disconnected);
        let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_BUFFER);

        Ok(Self {
            url,
            agent_id,
            options,
            handler,
            state,
            outbound_tx,
            outbound_rx,
            shutdown,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn state(&self) -> watch::Receiver<ChannelState> {
        self.state.subscribe()
    }

    pub fn sender(&self) -> ChannelSender {
        ChannelSender {
            tx: self.outbound_tx.clone(),
        }
    }

    pub fn start(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Connect and reconnect until the shutdown token is cancelled.
    pub async fn run(mut self) {
        let policy = self.options.reconnect.clone();
        let mut delay = policy.initial_delay;
        let mut attempt = 0u32;

        loop {
            if self.shutdown.is_cancelled() {
                break;
            }

            self.set_state(ChannelState::Connecting);
            let connected = tokio::select! {
                _ = self.shutdown.cancelled() => break,
                result = self.connect() => result,
            };

            match connected {
                Ok(socket) => {
                    attempt = 0;
                    delay = policy.initial_delay;
                    self.set_state(ChannelState::Connected);
                    info!(agent_id = %self.agent_id, "Channel connected");

                    let end = self.session(socket).await;
                    self.set_state(ChannelState::Disconnected);
                    match end {
                        SessionEnd::Shutdown => break,
                        SessionEnd::AckTimeout => {
                            warn!(agent_id = %self.agent_id, "No pong within ack timeout, reconnecting")
                        }
                        SessionEnd::Closed => {
                            info!(agent_id = %self.agent_id, "Channel closed by orchestrator")
                        }
                        SessionEnd::Failed(e) => {
                            warn!(agent_id = %self.agent_id, error = %e, "Channel failed")
                        }
                    }
                }
                Err(e) => {
                    attempt += 1;
                    self.set_state(ChannelState::Disconnected);
                    warn!(
                        agent_id = %self.agent_id,
                        error = %e,
                        attempt,
                        delay_secs = delay.as_secs_f64(),
                        "Channel connection failed, retrying"
                    );
                }
            }

            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = sleep(delay) => {}
            }
            delay = policy.next_delay(delay);
        }

        self.set_state(ChannelState::Disconnected);
        debug!(agent_id = %self.agent_id, "Channel manager stopped");
    }

    fn set_state(&self, state: ChannelState) {
        self.state.send_if_modified(|current| {
            if *current == state {
                false
            } else {
                *current = state;
                true
            }
        });
    }

    async fn connect(&self) -> Result<Socket, FabricError> {
        let mut request = self
            .url
            .as_str()
            .into_client_request()
            .map_err(|e| FabricError::Validation(e.to_string()))?;

        if let Some(key) = &self.options.api_key {
            let value = HeaderValue::from_str(key)
                .map_err(|_| FabricError::Validation("API key is not a valid header value".into()))?;
            request.headers_mut().insert(API_KEY_HEADER, value);
        }

        let (socket, _response) = timeout(CONNECT_TIMEOUT, connect_async(request))
            .await
            .map_err(|_| FabricError::Transport("channel handshake timed out".into()))?
            .map_err(|e| FabricError::Transport(e.to_string()))?;
        Ok(socket)
    }

    async fn session(&mut self, socket: Socket) -> SessionEnd {
        let (mut sink, mut stream) = socket.split();
        let mut heartbeat = interval(self.options.heartbeat_interval);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut pong_deadline: Option<Instant> = None;

        loop {
            let ack_wait = async move {
                match pong_deadline {
                    Some(deadline) => sleep_until(deadline).await,
                    None => std::future::pending::<()>().await,
                }
            };

            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    let _ = sink.send(Message::Close(None)).await;
                    return SessionEnd::Shutdown;
                }
                _ = heartbeat.tick() => {
                    if let Err(e) = sink.send(Message::Text(PING.into())).await {
                        return SessionEnd::Failed(e.to_string());
                    }
                    if pong_deadline.is_none() {
                        pong_deadline = Some(Instant::now() + self.options.ack_timeout);
                    }
                }
                _ = ack_wait => return SessionEnd::AckTimeout,
                Some(frame) = self.outbound_rx.recv() => {
                    if let Err(e) = sink.send(Message::Text(frame.into())).await {
                        return SessionEnd::Failed(e.to_string());
                    }
                }
                inbound = stream.next() => match inbound {
                    Some(Ok(Message::Text(text))) => {
                        if text.as_str() == PONG {
                            pong_deadline = None;
                        } else {
                            self.dispatch(ChannelMessage::decode(text.as_str()));
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => return SessionEnd::Closed,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return SessionEnd::Failed(e.to_string()),
                }
            }
        }
    }

    fn dispatch(&self, message: ChannelMessage) {
        let handler = self.handler.clone();
        let agent_id = self.agent_id;
        tokio::spawn(async move {
            let kind = message.kind.clone();
            if let Err(e) = handler.handle(message).await {
                warn!(%agent_id, kind = %kind, error = %e, "Message handler failed");
            }
        });
    }
}
