// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Agent repository contract
//!
//! The registry is the single writer of `AgentRecord`. Every mutation goes
//! through [`AgentRepository::update`] or [`AgentRepository::update_matching`],
//! which apply a closure under the repository's own lock so that a
//! read-modify-write is atomic with respect to concurrent heartbeats and the
//! liveness sweep.
//!
//! Implemented in `crate::infrastructure::repositories`.

use async_trait::async_trait;
use crate::domain::agent::{AgentId, AgentRecord};

/// Mutation applied to a single record under the repository lock.
pub type RecordUpdate<'a> = &'a (dyn Fn(&mut AgentRecord) + Send + Sync);

/// Predicate evaluated under the repository lock.
pub type RecordPredicate<'a> = &'a (dyn Fn(&AgentRecord) -> bool + Send + Sync);

#[async_trait]
pub trait AgentRepository: Send + Sync {
    /// Insert or replace a record.
    async fn save(&self, record: &AgentRecord) -> Result<(), RepositoryError>;

    async fn find_by_id(&self, id: AgentId) -> Result<Option<AgentRecord>, RepositoryError>;

    async fn list_all(&self) -> Result<Vec<AgentRecord>, RepositoryError>;

    /// Apply `apply` to the record with `id`, returning the updated snapshot,
    /// or `None` when no such record exists.
    async fn update(
        &self,
        id: AgentId,
        apply: RecordUpdate<'_>,
    ) -> Result<Option<AgentRecord>, RepositoryError>;

    /// Apply `apply` to every record matching `predicate` in one critical
    /// section. Returns the updated snapshots.
    async fn update_matching(
        &self,
        predicate: RecordPredicate<'_>,
        apply: RecordUpdate<'_>,
    ) -> Result<Vec<AgentRecord>, RepositoryError>;
}

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("Storage backend error: {0}")]
    Backend(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}
