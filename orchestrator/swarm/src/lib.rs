// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # `crewlink-swarm` - Crew Orchestration
//!
//! Groups registered agents into crews, moves the project through its
//! operating phases and mediates task handoffs between agents.
//!
//! ## Crate Layout
//!
//! | Module | Layer | Contents |
//! |--------|-------|----------|
//! | [`domain`] | Domain | `Crew`, `Phase`, `RosterTable`, `HandoffRequest`, `TaskLedger` |
//! | [`application`] | Application | `CrewOrchestrator`, `TaskPlanner` implementations |
//! | [`presentation`] | Presentation | axum routes for crews, phases, handoffs and plans |
//!
//! ## Key Concepts
//!
//! - **Phase crew**: the crew seated by the last phase transition. Handoffs
//!   and plans default to it.
//! - **Ad hoc crew**: assembled for one mission or workflow; lives alongside
//!   the phase crew until the process exits.
//! - **Readiness**: `degraded` when a primary role has no active agent. A
//!   degraded crew is still usable unless the caller asked for readiness.
//!
//! Crews and the task ledger are held in memory only.

pub mod domain;
pub mod application;
pub mod presentation;

pub use domain::*;
