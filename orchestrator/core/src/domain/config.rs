// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Fabric Configuration
//
// YAML schema for a crewlink node, covering:
// - HTTP server bind address
// - Bus transport selection (in-process broker or remote HTTP bus)
// - Heartbeat and liveness timing
// - Agent channel reconnect policy
// - Optional LLM provider used for task planning
// - Per-phase crew roster overrides

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::domain::error::FabricError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FabricConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub bus: BusConfig,

    /// Base URL agents and the CLI use to reach the orchestrator.
    #[serde(default = "default_orchestrator_url")]
    pub orchestrator_url: String,

    #[serde(default)]
    pub liveness: LivenessConfig,

    #[serde(default)]
    pub channel: ChannelConfig,

    /// Shared API key (supports "env:VAR_NAME"). No key disables auth.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default)]
    pub llm: LlmConfig,

    #[serde(default)]
    pub crew: CrewConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusConfig {
    /// `memory://` for the in-process broker, `http(s)://host` for a remote bus.
    #[serde(default = "default_bus_url")]
    pub url: String,

    /// Per-topic buffer. Subscribers further behind than this skip messages.
    #[serde(default = "default_bus_capacity")]
    pub capacity: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LivenessConfig {
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_secs: u64,

    /// Defaults to three heartbeat intervals.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub liveness_timeout_secs: Option<u64>,

    /// Defaults to the heartbeat interval.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sweep_interval_secs: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelConfig {
    #[serde(default = "default_reconnect_delay")]
    pub reconnect_delay_secs: u64,

    /// Upper bound on the reconnect delay when `backoff_factor > 1.0`.
    #[serde(default = "default_max_reconnect_delay")]
    pub max_reconnect_delay_secs: u64,

    #[serde(default = "default_backoff_factor")]
    pub backoff_factor: f64,

    /// Time allowed for a `pong` after each `ping`. Defaults to the heartbeat interval.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ack_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmProviderKind {
    #[default]
    None,
    Ollama,
    OpenAi,
    Perplexity,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default)]
    pub provider: LlmProviderKind,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// Supports "env:VAR_NAME".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrewConfig {
    #[serde(default = "default_initial_phase")]
    pub initial_phase: String,

    /// Roster overrides keyed by phase name. Phases not listed keep the
    /// built-in roster.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub phases: BTreeMap<String, RosterConfig>,

    /// Ad hoc crews kept before the oldest is dropped. The phase crew is
    /// never dropped.
    #[serde(default = "default_max_crews")]
    pub max_crews: usize,

    /// Task ledger entries kept before the least recently updated is dropped.
    #[serde(default = "default_max_tasks")]
    pub max_tasks: usize,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RosterConfig {
    #[serde(default)]
    pub primary: Vec<String>,
    #[serde(default)]
    pub support: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gatekeeper: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config at {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

impl From<ConfigError> for FabricError {
    fn from(err: ConfigError) -> Self {
        FabricError::Validation(err.to_string())
    }
}

fn default_orchestrator_url() -> String {
    "http://127.0.0.1:8000".to_string()
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_bus_url() -> String {
    "memory://".to_string()
}

fn default_bus_capacity() -> usize {
    1024
}

fn default_heartbeat_interval() -> u64 {
    30
}

fn default_reconnect_delay() -> u64 {
    5
}

fn default_max_reconnect_delay() -> u64 {
    60
}

fn default_backoff_factor() -> f64 {
    1.0
}

fn default_llm_timeout() -> u64 {
    60
}

fn default_initial_phase() -> String {
    "planning".to_string()
}

fn default_max_crews() -> usize {
    1_000
}

fn default_max_tasks() -> usize {
    10_000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
        }
    }
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            url: default_bus_url(),
            capacity: default_bus_capacity(),
        }
    }
}

impl Default for LivenessConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_secs: default_heartbeat_interval(),
            liveness_timeout_secs: None,
            sweep_interval_secs: None,
        }
    }
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            reconnect_delay_secs: default_reconnect_delay(),
            max_reconnect_delay_secs: default_max_reconnect_delay(),
            backoff_factor: default_backoff_factor(),
            ack_timeout_secs: None,
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: LlmProviderKind::None,
            endpoint: None,
            model: None,
            api_key: None,
            timeout_secs: default_llm_timeout(),
        }
    }
}

impl Default for CrewConfig {
    fn default() -> Self {
        Self {
            initial_phase: default_initial_phase(),
            phases: BTreeMap::new(),
            max_crews: default_max_crews(),
            max_tasks: default_max_tasks(),
        }
    }
}

impl Default for FabricConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            bus: BusConfig::default(),
            orchestrator_url: default_orchestrator_url(),
            liveness: LivenessConfig::default(),
            channel: ChannelConfig::default(),
            api_key: None,
            llm: LlmConfig::default(),
            crew: CrewConfig::default(),
        }
    }
}

impl LivenessConfig {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    pub fn liveness_timeout(&self) -> Duration {
        Duration::from_secs(
            self.liveness_timeout_secs
                .unwrap_or(self.heartbeat_interval_secs.saturating_mul(3)),
        )
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(
            self.sweep_interval_secs
                .unwrap_or(self.heartbeat_interval_secs),
        )
    }
}

impl FabricConfig {
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&content)
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn to_yaml_string(&self) -> Result<String, ConfigError> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Discover configuration file using precedence order
    /// 1. CREWLINK_CONFIG_PATH environment variable
    /// 2. ./crewlink.yaml (working directory)
    /// 3. ~/.crewlink/config.yaml (user home)
    pub fn discover_config() -> Option<PathBuf> {
        if let Ok(path) = std::env::var("CREWLINK_CONFIG_PATH") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        let cwd = PathBuf::from("./crewlink.yaml");
        if cwd.exists() {
            return Some(cwd);
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".crewlink").join("config.yaml");
            if user_config.exists() {
                return Some(user_config);
            }
        }

        None
    }

    /// Load configuration with discovery, fallback to default.
    ///
    /// An explicit path must exist and parse. Environment overrides are
    /// applied last in every case.
    pub fn load_or_default(cli_path: Option<PathBuf>) -> Result<Self, ConfigError> {
        let mut config = if let Some(path) = cli_path {
            tracing::info!("Loading configuration from explicit path: {:?}", path);
            Self::from_yaml_file(&path)?
        } else if let Some(path) = Self::discover_config() {
            tracing::info!("Loading configuration from discovered path: {:?}", path);
            Self::from_yaml_file(&path)?
        } else {
            tracing::warn!("No configuration file found in standard locations. Using defaults.");
            Self::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides, for container deployments.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("CREWLINK_BUS_URL") {
            tracing::info!("Environment override: CREWLINK_BUS_URL={}", val);
            self.bus.url = val;
        }

        if let Ok(val) = std::env::var("CREWLINK_ORCHESTRATOR_URL") {
            tracing::info!("Environment override: CREWLINK_ORCHESTRATOR_URL={}", val);
            self.orchestrator_url = val;
        }

        if let Ok(val) = std::env::var("CREWLINK_HEARTBEAT_INTERVAL_SECS") {
            match val.parse::<u64>() {
                Ok(secs) => self.liveness.heartbeat_interval_secs = secs,
                Err(_) => tracing::warn!(
                    "Invalid value for CREWLINK_HEARTBEAT_INTERVAL_SECS: '{}'. Ignoring.",
                    val
                ),
            }
        }

        if let Ok(val) = std::env::var("CREWLINK_LIVENESS_TIMEOUT_SECS") {
            match val.parse::<u64>() {
                Ok(secs) => self.liveness.liveness_timeout_secs = Some(secs),
                Err(_) => tracing::warn!(
                    "Invalid value for CREWLINK_LIVENESS_TIMEOUT_SECS: '{}'. Ignoring.",
                    val
                ),
            }
        }

        if let Ok(val) = std::env::var("CREWLINK_API_KEY") {
            self.api_key = Some(val);
        }
    }

    /// The API key with any `env:` indirection resolved.
    pub fn resolved_api_key(&self) -> Option<String> {
        self.api_key.as_deref().and_then(resolve_secret)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let liveness = &self.liveness;
        if liveness.heartbeat_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "liveness.heartbeat_interval_secs must be greater than zero".into(),
            ));
        }
        if liveness.sweep_interval_secs == Some(0) {
            return Err(ConfigError::Invalid(
                "liveness.sweep_interval_secs must be greater than zero".into(),
            ));
        }
        if liveness.liveness_timeout() <= liveness.heartbeat_interval() {
            return Err(ConfigError::Invalid(format!(
                "liveness timeout ({}s) must be larger than the heartbeat interval ({}s)",
                liveness.liveness_timeout().as_secs(),
                liveness.heartbeat_interval_secs
            )));
        }

        if self.channel.reconnect_delay_secs == 0 {
            return Err(ConfigError::Invalid(
                "channel.reconnect_delay_secs must be greater than zero".into(),
            ));
        }
        if !self.channel.backoff_factor.is_finite() || self.channel.backoff_factor < 1.0 {
            return Err(ConfigError::Invalid(
                "channel.backoff_factor must be a finite number of at least 1.0".into(),
            ));
        }

        if self.crew.max_crews == 0 || self.crew.max_tasks == 0 {
            return Err(ConfigError::Invalid(
                "crew.max_crews and crew.max_tasks must be greater than zero".into(),
            ));
        }

        if self.bus.capacity == 0 {
            return Err(ConfigError::Invalid("bus.capacity must be greater than zero".into()));
        }
        let scheme = self.bus.url.split("://").next().unwrap_or_default();
        if !matches!(scheme, "memory" | "http" | "https") || !self.bus.url.contains("://") {
            return Err(ConfigError::Invalid(format!(
                "Unsupported bus url '{}'. Expected memory:// or http(s)://",
                self.bus.url
            )));
        }

        url::Url::parse(&self.orchestrator_url).map_err(|e| {
            ConfigError::Invalid(format!(
                "orchestrator_url '{}' is not a valid URL: {}",
                self.orchestrator_url, e
            ))
        })?;

        if self.llm.provider != LlmProviderKind::None && self.llm.model.is_none() {
            return Err(ConfigError::Invalid(
                "llm.model is required when an llm provider is configured".into(),
            ));
        }

        for (phase, roster) in &self.crew.phases {
            if roster.primary.iter().chain(&roster.support).any(|r| r.trim().is_empty()) {
                return Err(ConfigError::Invalid(format!(
                    "crew.phases.{phase} contains an empty role name"
                )));
            }
        }

        Ok(())
    }
}

/// Resolve `env:VAR_NAME` references; plain values pass through.
pub fn resolve_secret(value: &str) -> Option<String> {
    match value.strip_prefix("env:") {
        Some(var) => std::env::var(var).ok(),
        None => Some(value.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = FabricConfig::default();
        assert_eq!(config.bus.url, "memory://");
        assert_eq!(config.server.port, 8000);
        assert_eq!(config.liveness.heartbeat_interval(), Duration::from_secs(30));
        assert_eq!(config.liveness.liveness_timeout(), Duration::from_secs(90));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_yaml_fills_defaults() {
        let yaml = r#"
bus:
  url: http://orchestrator:8000
liveness:
  heartbeat_interval_secs: 10
crew:
  phases:
    deployment:
      primary: [devops_engineer, sre]
"#;
        let config = FabricConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(config.bus.capacity, 1024);
        assert_eq!(config.liveness.liveness_timeout(), Duration::from_secs(30));
        assert_eq!(config.crew.initial_phase, "planning");
        assert_eq!(config.crew.phases["deployment"].primary.len(), 2);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation() {
        let mut config = FabricConfig::default();
        config.liveness.liveness_timeout_secs = Some(30);
        assert!(config.validate().is_err());

        let mut config = FabricConfig::default();
        config.liveness.heartbeat_interval_secs = 0;
        assert!(config.validate().is_err());

        let mut config = FabricConfig::default();
        config.bus.url = "redis://localhost:6379".to_string();
        assert!(config.validate().is_err());

        let mut config = FabricConfig::default();
        config.crew.max_tasks = 0;
        assert!(config.validate().is_err());

        for factor in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY, 0.5] {
            let mut config = FabricConfig::default();
            config.channel.backoff_factor = factor;
            assert!(config.validate().is_err(), "backoff_factor {factor} accepted");
        }

        let mut config = FabricConfig::default();
        config.llm.provider = LlmProviderKind::Ollama;
        assert!(config.validate().is_err());
        config.llm.model = Some("llama3".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_resolve_secret_passes_plain_values_through() {
        assert_eq!(resolve_secret("abc").as_deref(), Some("abc"));
        assert_eq!(resolve_secret("env:CREWLINK_TEST_UNSET_VARIABLE_XYZ"), None);
    }
}
