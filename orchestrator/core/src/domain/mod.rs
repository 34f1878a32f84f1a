// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Domain types shared by every crewlink component.
//!
//! No I/O lives here; repositories and transports are traits implemented in
//! `crate::infrastructure`.

pub mod agent;
pub mod config;
pub mod error;
pub mod events;
pub mod llm;
pub mod repository;

pub use error::FabricError;
