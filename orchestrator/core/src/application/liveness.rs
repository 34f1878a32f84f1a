// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Liveness Monitor - Background task running the registry sweep
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Periodically mark agents that stopped heartbeating as unreachable

use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::application::registry::AgentRegistry;

pub struct LivenessMonitor {
    registry: Arc<AgentRegistry>,
    sweep_interval: Duration,
    shutdown_token: CancellationToken,
}

impl LivenessMonitor {
    pub fn new(
        registry: Arc<AgentRegistry>,
        sweep_interval: Duration,
        shutdown_token: CancellationToken,
    ) -> Self {
        Self {
            registry,
            sweep_interval,
            shutdown_token,
        }
    }

    /// Get a handle to trigger shutdown
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown_token.clone()
    }

    pub fn start(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            self.run().await;
        })
    }

    async fn run(&self) {
        info!(
            sweep_interval_secs = self.sweep_interval.as_secs(),
            liveness_timeout_secs = self.registry.liveness_timeout().as_secs(),
            "Starting liveness monitor"
        );

        let mut tick = interval(self.sweep_interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = tick.tick() => {
                    match self.registry.sweep().await {
                        Ok(swept) if swept.is_empty() => debug!("Liveness sweep found no stale agents"),
                        Ok(swept) => info!(count = swept.len(), "Liveness sweep marked agents unreachable"),
                        Err(e) => warn!("Liveness sweep failed: {}", e),
                    }
                }
                _ = self.shutdown_token.cancelled() => {
                    info!("Liveness monitor shutting down");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::agent::{AgentRegistration, AgentStatus};
    use crate::infrastructure::event_bus::EventBus;
    use crate::infrastructure::repositories::InMemoryAgentRepository;

    #[tokio::test]
    async fn test_monitor_sweeps_and_stops_on_cancel() {
        let registry = Arc::new(AgentRegistry::new(
            Arc::new(InMemoryAgentRepository::new()),
            EventBus::in_memory(8, "registry"),
            Duration::from_millis(20),
        ));
        let record = registry
            .register(AgentRegistration {
                name: "tester".into(),
                endpoint: "http://tester:9000".into(),
                ..Default::default()
            })
            .await
            .unwrap();

        let token = CancellationToken::new();
        let handle =
            LivenessMonitor::new(registry.clone(), Duration::from_millis(10), token.clone()).start();

        tokio::time::sleep(Duration::from_millis(120)).await;
        assert_eq!(
            registry.get(record.id).await.unwrap().status,
            AgentStatus::Unreachable
        );

        token.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("monitor did not stop")
            .unwrap();
    }
}
