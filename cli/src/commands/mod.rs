// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Command implementations for the crewlink CLI

pub mod agent;
pub mod config;
pub mod crew;
pub mod daemon;

pub use self::agent::AgentCommand;
pub use self::config::ConfigCommand;
pub use self::crew::CrewCommand;
pub use self::daemon::DaemonCommand;

use anyhow::{Context, Result};
use std::path::PathBuf;

use crewlink_core::domain::config::FabricConfig;
use crewlink_sdk::FabricClient;

/// Where client commands send their requests.
///
/// `--host`/`--port` win; otherwise `orchestrator_url` from the configuration
/// is used. The API key follows the same order.
#[derive(Debug, Clone, Default)]
pub struct Endpoint {
    pub config_path: Option<PathBuf>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub api_key: Option<String>,
}

impl Endpoint {
    fn config(&self) -> Result<FabricConfig> {
        FabricConfig::load_or_default(self.config_path.clone()).context("Failed to load configuration")
    }

    pub fn base_url(&self) -> Result<String> {
        if self.host.is_none() && self.port.is_none() {
            return Ok(self.config()?.orchestrator_url);
        }

        let host = self.host.as_deref().unwrap_or("127.0.0.1");
        let port = self.port.unwrap_or(8000);
        Ok(if host.starts_with("http://") || host.starts_with("https://") {
            format!("{}:{}", host.trim_end_matches('/'), port)
        } else {
            format!("http://{}:{}", host, port)
        })
    }

    pub fn client(&self) -> Result<FabricClient> {
        let api_key = match &self.api_key {
            Some(key) => Some(key.clone()),
            None => self.config()?.resolved_api_key(),
        };
        Ok(FabricClient::new(self.base_url()?)?.with_api_key(api_key))
    }
}

/// Parse a `--context` argument as a JSON object. Absent means `{}`.
pub(crate) fn parse_context(raw: Option<&str>) -> Result<serde_json::Value> {
    match raw {
        None => Ok(serde_json::json!({})),
        Some(text) => {
            let value: serde_json::Value =
                serde_json::from_str(text).context("--context must be valid JSON")?;
            anyhow::ensure!(value.is_object(), "--context must be a JSON object");
            Ok(value)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_from_host_and_port() {
        let endpoint = Endpoint {
            host: Some("orchestrator".into()),
            port: Some(9000),
            ..Default::default()
        };
        assert_eq!(endpoint.base_url().unwrap(), "http://orchestrator:9000");

        let endpoint = Endpoint {
            host: Some("https://crew.example.com/".into()),
            ..Default::default()
        };
        assert_eq!(endpoint.base_url().unwrap(), "https://crew.example.com:8000");
    }

    #[test]
    fn test_base_url_from_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("crewlink.yaml");
        std::fs::write(&path, "orchestrator_url: http://fabric:8123\n").unwrap();

        let endpoint = Endpoint {
            config_path: Some(path),
            ..Default::default()
        };
        // CREWLINK_ORCHESTRATOR_URL in the environment would override the file.
        if std::env::var("CREWLINK_ORCHESTRATOR_URL").is_err() {
            assert_eq!(endpoint.base_url().unwrap(), "http://fabric:8123");
        }
    }

    #[test]
    fn test_parse_context() {
        assert_eq!(parse_context(None).unwrap(), serde_json::json!({}));
        assert_eq!(
            parse_context(Some(r#"{"repo":"api"}"#)).unwrap()["repo"],
            "api"
        );
        assert!(parse_context(Some("[1,2]")).is_err());
        assert!(parse_context(Some("not json")).is_err());
    }
}
