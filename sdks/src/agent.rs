// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Agent runtime: registration, channel and heartbeat backstop for one agent
// process.
//
// The channel's ping frames keep the registry record active while the socket
// is up. When it is not, the runtime falls back to HTTP heartbeats; a 404 there
// means the orchestrator lost the record (restart), so the agent registers
// again and reopens its channel under the new id.

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crewlink_core::domain::agent::{AgentRecord, AgentRegistration};
use crewlink_core::infrastructure::event_bus::EventBus;

use crate::bus::RemoteBusTransport;
use crate::channel::{ChannelManager, ChannelOptions, ChannelSender, ChannelState, MessageHandler};
use crate::client::{is_not_found, FabricClient};

struct ActiveChannel {
    token: CancellationToken,
    handle: JoinHandle<()>,
    state: watch::Receiver<ChannelState>,
    sender: ChannelSender,
}

impl ActiveChannel {
    async fn stop(self) {
        self.token.cancel();
        if let Err(e) = self.handle.await {
            warn!(error = %e, "Channel task ended abnormally");
        }
    }
}

pub struct AgentRuntime {
    client: FabricClient,
    registration: AgentRegistration,
    options: ChannelOptions,
    shutdown: CancellationToken,
}

impl AgentRuntime {
    pub fn new(client: FabricClient, registration: AgentRegistration, options: ChannelOptions) -> Self {
        Self {
            client,
            registration,
            options,
            shutdown: CancellationToken::new(),
        }
    }

    /// Cancelling this token stops the runtime and deregisters the agent.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn client(&self) -> &FabricClient {
        &self.client
    }

    /// Bus reaching the orchestrator's broker, publishing as this agent.
    pub fn bus(&self) -> EventBus {
        EventBus::new(
            Arc::new(RemoteBusTransport::new(self.client.clone())),
            self.registration.name.clone(),
        )
    }

    /// Register, retrying with the reconnect policy until it succeeds or the
    /// runtime is shut down.
    pub async fn register(&self) -> Result<AgentRecord> {
        let policy = &self.options.reconnect;
        let mut delay = policy.initial_delay;

        loop {
            match self.client.register(&self.registration).await {
                Ok(record) => {
                    info!(agent_id = %record.id, name = %record.name, "Registered with orchestrator");
                    return Ok(record);
                }
                Err(e) => {
                    warn!(error = %e, delay_secs = delay.as_secs_f64(), "Registration failed, retrying");
                }
            }

            tokio::select! {
                _ = self.shutdown.cancelled() => anyhow::bail!("shut down before registration completed"),
                _ = sleep(delay) => {}
            }
            delay = policy.next_delay(delay);
        }
    }

    fn open_channel(&self, record: &AgentRecord, handler: Arc<dyn MessageHandler>) -> Result<ActiveChannel> {
        let token = self.shutdown.child_token();
        let manager = ChannelManager::new(
            self.client.base_url(),
            record.id,
            self.options.clone(),
            handler,
            token.clone(),
        )
        .context("Failed to configure agent channel")?;

        let state = manager.state();
        let sender = manager.sender();
        let handle = manager.start();
        Ok(ActiveChannel {
            token,
            handle,
            state,
            sender,
        })
    }

    /// Run until the shutdown token is cancelled.
    ///
    /// `on_connect` receives the sender for each channel the runtime opens,
    /// including the one opened after a re-registration.
    pub async fn run<F>(self, handler: Arc<dyn MessageHandler>, on_connect: F) -> Result<()>
    where
        F: Fn(&AgentRecord, ChannelSender) + Send,
    {
        let mut record = self.register().await?;
        let mut channel = self.open_channel(&record, handler.clone())?;
        on_connect(&record, channel.sender.clone());

        let mut heartbeat = interval(self.options.heartbeat_interval);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
        heartbeat.tick().await;

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = heartbeat.tick() => {}
            }

            if *channel.state.borrow() == ChannelState::Connected {
                continue;
            }

            match self.client.heartbeat(record.id, Some("active"), None).await {
                Ok(_) => {}
                Err(e) if is_not_found(&e) => {
                    warn!(agent_id = %record.id, "Orchestrator no longer knows this agent, registering again");
                    channel.stop().await;
                    record = match self.register().await {
                        Ok(record) => record,
                        Err(_) if self.shutdown.is_cancelled() => return Ok(()),
                        Err(e) => return Err(e),
                    };
                    channel = self.open_channel(&record, handler.clone())?;
                    on_connect(&record, channel.sender.clone());
                }
                Err(e) => warn!(agent_id = %record.id, error = %e, "Heartbeat failed"),
            }
        }

        channel.stop().await;
        match self.client.deregister(record.id).await {
            Ok(_) => info!(agent_id = %record.id, "Deregistered"),
            Err(e) => error!(agent_id = %record.id, error = %e, "Deregistration failed"),
        }
        Ok(())
    }
}
