// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # `crewlink-core`
//!
//! Liveness and messaging substrate for the crewlink coordination fabric.
//!
//! | Module | Layer | Contents |
//! |--------|-------|----------|
//! | [`domain`] | Domain | `AgentRecord`, `Event`, `FabricError`, `FabricConfig`, LLM contract |
//! | [`application`] | Application | `AgentRegistry`, `LivenessMonitor` |
//! | [`infrastructure`] | Infrastructure | `EventBus`, `InMemoryBroker`, `ChannelHub`, repositories, LLM providers |
//! | [`presentation`] | Presentation | axum routes for agents, bus and channels |
//!
//! The crew orchestrator lives in `crewlink-swarm` and builds on the registry
//! and bus exported here.

pub mod domain;
pub mod application;
pub mod infrastructure;
pub mod presentation;

pub use domain::*;
