// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Daemon HTTP server implementation

use anyhow::{Context, Result};
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crewlink_core::{
    application::{liveness::LivenessMonitor, registry::AgentRegistry},
    domain::config::FabricConfig,
    infrastructure::{
        channel_hub::ChannelHub, event_bus::EventBus, llm::LlmProvider,
        repositories::InMemoryAgentRepository,
    },
    presentation::{self, FabricState},
};
use crewlink_sdk::connect_bus;
use crewlink_swarm::application::{CrewFanoutPlanner, CrewOrchestrator, LlmTaskPlanner, TaskPlanner};
use crewlink_swarm::domain::{Phase, RosterTable};

use super::DaemonOptions;

/// Sender id the orchestrator publishes under.
const ORCHESTRATOR_SENDER: &str = "orchestrator";

/// Everything the daemon serves, wired from one configuration.
pub struct Fabric {
    pub config: FabricConfig,
    pub registry: Arc<AgentRegistry>,
    pub bus: EventBus,
    pub hub: ChannelHub,
    pub orchestrator: Arc<CrewOrchestrator>,
    shutdown: CancellationToken,
}

impl Fabric {
    pub fn build(config: FabricConfig) -> Result<Self> {
        config.validate().context("Configuration validation failed")?;

        let bus = connect_bus(
            &config.bus.url,
            config.resolved_api_key(),
            config.bus.capacity,
            ORCHESTRATOR_SENDER,
        )
        .context("Failed to set up event bus")?;
        let hub = ChannelHub::new();
        let registry = Arc::new(AgentRegistry::new(
            Arc::new(InMemoryAgentRepository::new()),
            bus.clone(),
            config.liveness.liveness_timeout(),
        ));

        let planner: Arc<dyn TaskPlanner> = match LlmProvider::from_config(&config.llm)
            .context("Failed to initialize LLM provider")?
        {
            Some(provider) => Arc::new(LlmTaskPlanner::new(Arc::new(provider))),
            None => {
                info!("No LLM provider configured, plans fan out across the crew");
                Arc::new(CrewFanoutPlanner)
            }
        };

        let rosters = RosterTable::from_config(&config.crew).context("Invalid crew rosters")?;
        let initial_phase: Phase = config
            .crew
            .initial_phase
            .parse()
            .context("Invalid crew.initial_phase")?;

        let orchestrator = Arc::new(
            CrewOrchestrator::new(
                registry.clone(),
                bus.clone(),
                hub.clone(),
                planner,
                rosters,
                initial_phase,
            )
            .with_retention(config.crew.max_crews, config.crew.max_tasks),
        );

        Ok(Self {
            config,
            registry,
            bus,
            hub,
            orchestrator,
            shutdown: CancellationToken::new(),
        })
    }

    /// Registry, bus, channel and crew routes behind the API key, with request tracing.
    pub fn router(&self) -> Router {
        let routes = presentation::router(FabricState::new(
            self.registry.clone(),
            self.bus.clone(),
            self.hub.clone(),
        ))
        .merge(crewlink_swarm::presentation::router(self.orchestrator.clone()));

        presentation::protect(routes, self.config.resolved_api_key()).layer(TraceLayer::new_for_http())
    }

    /// Spawn the liveness sweep. It stops when the fabric shuts down.
    pub fn start_liveness(&self) -> JoinHandle<()> {
        LivenessMonitor::new(
            self.registry.clone(),
            self.config.liveness.sweep_interval(),
            self.shutdown.child_token(),
        )
        .start()
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }
}

pub async fn start_daemon(options: DaemonOptions) -> Result<()> {
    let mut config = FabricConfig::load_or_default(options.config_path.clone())
        .context("Failed to load configuration")?;
    if let Some(host) = options.host {
        config.server.bind_address = host;
    }
    if let Some(port) = options.port {
        config.server.port = port;
    }

    info!(
        bus = %config.bus.url,
        heartbeat_interval_secs = config.liveness.heartbeat_interval_secs,
        liveness_timeout_secs = config.liveness.liveness_timeout().as_secs(),
        auth = config.api_key.is_some(),
        "Configuration loaded"
    );

    if let Some(metrics_port) = options.metrics_port {
        metrics_exporter_prometheus::PrometheusBuilder::new()
            .with_http_listener(SocketAddr::from(([0, 0, 0, 0], metrics_port)))
            .install()
            .context("Failed to start Prometheus exporter")?;
        info!("Metrics exposed on 0.0.0.0:{}/metrics", metrics_port);
    }

    let fabric = Fabric::build(config)?;
    let liveness = fabric.start_liveness();
    let shutdown = fabric.shutdown_token();
    let app = fabric.router();

    let addr = format!("{}:{}", fabric.config.server.bind_address, fabric.config.server.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    info!("Orchestrator listening on {}", addr);

    let serve_shutdown = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            serve_shutdown.cancel();
        })
        .await
        .context("HTTP server failed")?;

    shutdown.cancel();
    if let Err(e) = liveness.await {
        error!("Liveness monitor ended abnormally: {}", e);
    }

    info!("Orchestrator shut down");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            info!("Received SIGTERM signal");
        },
    }
}
