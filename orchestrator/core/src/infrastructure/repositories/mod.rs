// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Repository Implementations
//!
//! Infrastructure implementations of the repository abstractions defined in
//! the domain layer.
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure
//! - **Purpose:** Hold registry records for the lifetime of the daemon
//! - **Pattern:** Repository (DDD), Adapter (Hexagonal Architecture)
//!
//! Records are process-local. Agents re-register after a daemon restart
//! because their next heartbeat is answered with 404.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

use crate::domain::agent::{AgentId, AgentRecord};
use crate::domain::repository::{AgentRepository, RecordPredicate, RecordUpdate, RepositoryError};

#[derive(Clone, Default)]
pub struct InMemoryAgentRepository {
    agents: Arc<RwLock<HashMap<AgentId, AgentRecord>>>,
}

impl InMemoryAgentRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AgentRepository for InMemoryAgentRepository {
    async fn save(&self, record: &AgentRecord) -> Result<(), RepositoryError> {
        self.agents.write().insert(record.id, record.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: AgentId) -> Result<Option<AgentRecord>, RepositoryError> {
        Ok(self.agents.read().get(&id).cloned())
    }

    async fn list_all(&self) -> Result<Vec<AgentRecord>, RepositoryError> {
        Ok(self.agents.read().values().cloned().collect())
    }

    async fn update(
        &self,
        id: AgentId,
        apply: RecordUpdate<'_>,
    ) -> Result<Option<AgentRecord>, RepositoryError> {
        let mut agents = self.agents.write();
        Ok(agents.get_mut(&id).map(|record| {
            apply(record);
            record.clone()
        }))
    }

    async fn update_matching(
        &self,
        predicate: RecordPredicate<'_>,
        apply: RecordUpdate<'_>,
    ) -> Result<Vec<AgentRecord>, RepositoryError> {
        let mut agents = self.agents.write();
        Ok(agents
            .values_mut()
            .filter(|record| predicate(record))
            .map(|record| {
                apply(record);
                record.clone()
            })
            .collect())
    }
}
