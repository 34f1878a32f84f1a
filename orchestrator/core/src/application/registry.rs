// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Agent Registry
//!
//! Owns every `AgentRecord`: identity, metadata and liveness.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Registration, heartbeats, deregistration and the liveness sweep
//!
//! Status transitions:
//!
//! ```text
//! registered --heartbeat--> active --sweep--> unreachable --heartbeat--> active
//!      \___________________________________________________--deregister--> deregistered
//! ```
//!
//! Records are never removed; `deregistered` is terminal and a returning
//! agent registers again under a new id.

use chrono::{DateTime, Utc};
use serde_json::json;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::domain::agent::{AgentFilter, AgentId, AgentRecord, AgentRegistration, AgentStatus};
use crate::domain::error::FabricError;
use crate::domain::events::{message_types, topics};
use crate::domain::repository::AgentRepository;
use crate::infrastructure::event_bus::EventBus;

pub struct AgentRegistry {
    repository: Arc<dyn AgentRepository>,
    bus: EventBus,
    liveness_timeout: Duration,
}

impl AgentRegistry {
    pub fn new(repository: Arc<dyn AgentRepository>, bus: EventBus, liveness_timeout: Duration) -> Self {
        Self {
            repository,
            bus,
            liveness_timeout,
        }
    }

    pub fn liveness_timeout(&self) -> Duration {
        self.liveness_timeout
    }

    pub async fn register(&self, registration: AgentRegistration) -> Result<AgentRecord, FabricError> {
        validate_registration(&registration)?;

        let record = AgentRecord::from_registration(registration, Utc::now());
        self.repository.save(&record).await?;

        metrics::counter!("crewlink_agent_registrations_total").increment(1);
        info!(agent_id = %record.id, name = %record.name, endpoint = %record.endpoint, "Agent registered");
        self.announce(message_types::AGENT_REGISTERED, &record).await;
        Ok(record)
    }

    pub async fn heartbeat(
        &self,
        agent_id: AgentId,
        reported_status: Option<&str>,
        load: Option<f64>,
    ) -> Result<AgentRecord, FabricError> {
        self.heartbeat_at(agent_id, reported_status, load, Utc::now()).await
    }

    pub async fn heartbeat_at(
        &self,
        agent_id: AgentId,
        reported_status: Option<&str>,
        load: Option<f64>,
        now: DateTime<Utc>,
    ) -> Result<AgentRecord, FabricError> {
        let recovered = AtomicBool::new(false);
        let updated = self
            .repository
            .update(agent_id, &|record| {
                if record.status == AgentStatus::Deregistered {
                    return;
                }
                if record.status == AgentStatus::Unreachable {
                    recovered.store(true, Ordering::Relaxed);
                }
                record.status = AgentStatus::Active;
                record.last_heartbeat = now;
                if let Some(load) = load {
                    record.load = load;
                }
            })
            .await?;

        let record = match updated {
            Some(record) if record.status != AgentStatus::Deregistered => record,
            _ => return Err(FabricError::not_found("agent", agent_id)),
        };

        metrics::counter!("crewlink_agent_heartbeats_total").increment(1);
        if recovered.load(Ordering::Relaxed) {
            info!(agent_id = %agent_id, name = %record.name, "Unreachable agent is heartbeating again");
        }
        debug!(agent_id = %agent_id, reported_status, load = record.load, "Heartbeat");
        Ok(record)
    }

    /// Idempotent for known ids. Only the first call publishes an event.
    pub async fn deregister(&self, agent_id: AgentId) -> Result<AgentRecord, FabricError> {
        let changed = AtomicBool::new(false);
        let record = self
            .repository
            .update(agent_id, &|record| {
                if record.status != AgentStatus::Deregistered {
                    record.status = AgentStatus::Deregistered;
                    changed.store(true, Ordering::Relaxed);
                }
            })
            .await?
            .ok_or_else(|| FabricError::not_found("agent", agent_id))?;

        if changed.load(Ordering::Relaxed) {
            info!(agent_id = %agent_id, name = %record.name, "Agent deregistered");
            self.announce(message_types::AGENT_DEREGISTERED, &record).await;
        }
        Ok(record)
    }

    pub async fn get(&self, agent_id: AgentId) -> Result<AgentRecord, FabricError> {
        self.repository
            .find_by_id(agent_id)
            .await?
            .ok_or_else(|| FabricError::not_found("agent", agent_id))
    }

    /// Records matching `filter`, sorted by name then id.
    pub async fn list(&self, filter: &AgentFilter) -> Result<Vec<AgentRecord>, FabricError> {
        let mut records: Vec<AgentRecord> = self
            .repository
            .list_all()
            .await?
            .into_iter()
            .filter(|record| filter.matches(record))
            .collect();
        records.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        Ok(records)
    }

    pub async fn sweep(&self) -> Result<Vec<AgentId>, FabricError> {
        self.sweep_at(Utc::now()).await
    }

    /// Mark live records whose last heartbeat is strictly older than the
    /// liveness timeout as unreachable. Returns the ids that transitioned.
    pub async fn sweep_at(&self, now: DateTime<Utc>) -> Result<Vec<AgentId>, FabricError> {
        let timeout = chrono::Duration::from_std(self.liveness_timeout)
            .unwrap_or_else(|_| chrono::Duration::days(36_500));
        let cutoff = now - timeout;

        let stale = self
            .repository
            .update_matching(
                &|record| record.status.is_live() && record.last_heartbeat < cutoff,
                &|record| record.status = AgentStatus::Unreachable,
            )
            .await?;

        for record in &stale {
            warn!(
                agent_id = %record.id,
                name = %record.name,
                last_heartbeat = %record.last_heartbeat,
                "Agent missed its heartbeats, marking unreachable"
            );
            self.announce(message_types::AGENT_UNREACHABLE, record).await;
        }
        if !stale.is_empty() {
            metrics::counter!("crewlink_agents_unreachable_total").increment(stale.len() as u64);
        }

        Ok(stale.into_iter().map(|record| record.id).collect())
    }

    /// Lifecycle events are best effort; the bus already logs failures.
    async fn announce(&self, message_type: &str, record: &AgentRecord) {
        let payload = json!({
            "agent_id": record.id,
            "name": record.name,
            "status": record.status,
            "tags": record.tags,
        });
        if self
            .bus
            .publish(topics::AGENT_LIFECYCLE, message_type, payload, None)
            .await
            .is_err()
        {
            debug!(agent_id = %record.id, message_type, "Lifecycle event not delivered");
        }
    }
}

fn validate_registration(registration: &AgentRegistration) -> Result<(), FabricError> {
    if registration.name.trim().is_empty() {
        return Err(FabricError::Validation("agent name must not be empty".into()));
    }
    let endpoint = registration.endpoint.trim();
    if endpoint.is_empty() {
        return Err(FabricError::Validation("agent endpoint must not be empty".into()));
    }
    match url::Url::parse(endpoint) {
        Ok(url) if url.has_host() => Ok(()),
        _ => Err(FabricError::Validation(format!(
            "agent endpoint '{endpoint}' is not an absolute URL"
        ))),
    }
}
