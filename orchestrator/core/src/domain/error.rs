// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Error taxonomy for the coordination fabric.
//!
//! Only domain-validation failures are meant to reach callers.
//! `Transport` is recoverable: channels reconnect and the bus logs and drops.
//! A missing crew role is not an error at all; it is reported on the crew.

use crate::domain::llm::LlmError;
use crate::domain::repository::RepositoryError;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FabricError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Invalid handoff: {0}")]
    InvalidHandoff(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Phase '{phase}' is not ready, missing roles: {}", missing_roles.join(", "))]
    PhaseNotReady {
        phase: String,
        missing_roles: Vec<String>,
    },

    #[error("Missing or invalid API key")]
    Unauthorized,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl FabricError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Stable identifier carried in HTTP error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "not_found",
            Self::InvalidHandoff(_) => "invalid_handoff",
            Self::Transport(_) => "transport",
            Self::Validation(_) => "validation",
            Self::PhaseNotReady { .. } => "phase_not_ready",
            Self::Unauthorized => "unauthorized",
            Self::Internal(_) => "internal",
        }
    }
}

impl From<RepositoryError> for FabricError {
    fn from(err: RepositoryError) -> Self {
        Self::Internal(err.to_string())
    }
}

impl From<LlmError> for FabricError {
    fn from(err: LlmError) -> Self {
        match err {
            LlmError::Network(_) | LlmError::RateLimit => Self::Transport(err.to_string()),
            other => Self::Internal(other.to_string()),
        }
    }
}
