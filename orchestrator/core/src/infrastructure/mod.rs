// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod channel_hub;
pub mod event_bus;
pub mod llm;
pub mod repositories;

pub use channel_hub::ChannelHub;
pub use event_bus::{BusTransport, EventBus, EventStream, InMemoryBroker, TransportError, WireStream};
pub use llm::LlmProvider;
pub use repositories::InMemoryAgentRepository;
