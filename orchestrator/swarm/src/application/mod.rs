// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod orchestrator;
pub mod planner;

pub use orchestrator::{workflow_template, CrewOrchestrator, ExecutionReceipt, WorkflowTicket};
pub use planner::{CrewFanoutPlanner, LlmTaskPlanner, TaskPlanner};
