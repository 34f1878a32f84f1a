// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # crewlink SDK
//!
//! Everything an agent process needs to join the fabric:
//!
//! - [`FabricClient`]: the orchestrator's HTTP API.
//! - [`RemoteBusTransport`]: publish and subscribe through the orchestrator's broker.
//! - [`ChannelManager`]: the persistent WebSocket channel with heartbeats and reconnects.
//! - [`AgentRuntime`]: registration, channel and heartbeat backstop wired together.

pub mod agent;
pub mod bus;
pub mod channel;
pub mod client;

pub use agent::AgentRuntime;
pub use bus::{connect_bus, RemoteBusTransport};
pub use channel::{
    channel_url, ChannelManager, ChannelMessage, ChannelOptions, ChannelSender, ChannelState,
    MessageHandler, ReconnectPolicy,
};
pub use client::{is_not_found, ApiFailure, FabricClient};
