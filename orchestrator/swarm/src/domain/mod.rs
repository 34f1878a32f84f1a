// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod crew;
pub mod handoff;
pub mod phase;
pub mod task;

pub use crew::{
    seat_roles, Crew, CrewId, CrewMember, CrewView, MemberView, NetworkConfig, PhaseReadiness, Readiness, Seating,
};
pub use handoff::{HandoffReceipt, HandoffRequest};
pub use phase::{Phase, PhaseRoster, RosterTable};
pub use task::{recommend_role, HandoffRecord, SubTask, TaskEntry, TaskLedger, TaskStatus};
