// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Daemon mode implementation
//!
//! Handles:
//! - Building the orchestrator from configuration
//! - HTTP health checks
//! - Graceful shutdown

use anyhow::Result;
use std::path::PathBuf;
use std::time::Duration;

pub mod server;

pub use server::{start_daemon, Fabric};

/// Process-level options that override the configuration file.
#[derive(Debug, Clone, Default)]
pub struct DaemonOptions {
    pub config_path: Option<PathBuf>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub metrics_port: Option<u16>,
}

#[derive(Debug, Clone)]
pub enum DaemonStatus {
    Running { uptime: Option<u64>, health: serde_json::Value },
    Stopped,
    Unhealthy { error: String },
}

/// Check whether an orchestrator answers `/health` at `base_url`.
pub async fn check_daemon_running(base_url: &str) -> Result<DaemonStatus> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_millis(500)) // Fast timeout for local checks
        .build()?;

    let health_url = format!("{}/health", base_url.trim_end_matches('/'));

    match client.get(&health_url).send().await {
        Ok(resp) if resp.status().is_success() => {
            let health = resp.json::<serde_json::Value>().await.unwrap_or_default();
            let uptime = health["uptime_seconds"].as_u64();
            Ok(DaemonStatus::Running { uptime, health })
        }
        Ok(resp) => Ok(DaemonStatus::Unhealthy {
            error: format!("HTTP {}", resp.status()),
        }),
        Err(e) if e.is_connect() => Ok(DaemonStatus::Stopped),
        Err(e) => Ok(DaemonStatus::Unhealthy { error: e.to_string() }),
    }
}
