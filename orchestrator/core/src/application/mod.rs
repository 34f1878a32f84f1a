// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod liveness;
pub mod registry;

pub use liveness::LivenessMonitor;
pub use registry::AgentRegistry;
