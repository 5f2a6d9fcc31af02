//! Agent configuration

use anyhow::{Context, Result};
use perf_agent_lib::MonitoredEntity;
use serde::Deserialize;
use std::collections::HashSet;
use std::time::Duration;
use url::Url;

/// Environment variable naming the optional configuration file
pub const CONFIG_PATH_VAR: &str = "AGENT_CONFIG";

const DEFAULT_CONFIG_PATH: &str = "perf-agent.yaml";

/// Agent configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    /// Instance name reported in lifecycle events
    #[serde(default = "default_instance_name")]
    pub instance_name: String,

    /// API server port for health/metrics
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// Organization owning every source created by this agent
    pub org_id: String,

    /// Poll cadence in seconds
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Oldest sample a replayed window may reach back to, in seconds
    #[serde(default = "default_max_replay")]
    pub max_replay_secs: u64,

    /// Source registry backend
    pub registry: BackendConfig,

    /// Ingestion backend
    pub ingestion: BackendConfig,

    /// Endpoints to poll
    #[serde(default)]
    pub monitored_entities: Vec<MonitoredEntity>,
}

/// Connection settings of an HTTP backend
#[derive(Clone, Deserialize)]
pub struct BackendConfig {
    pub base_url: Url,
    pub api_key: String,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

impl BackendConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl std::fmt::Debug for BackendConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendConfig")
            .field("base_url", &self.base_url.as_str())
            .field("api_key", &"<redacted>")
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

fn default_instance_name() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "perf-agent".to_string())
}

fn default_api_port() -> u16 {
    8080
}

fn default_poll_interval() -> u64 {
    20
}

fn default_max_replay() -> u64 {
    300
}

fn default_timeout() -> u64 {
    30
}

impl AgentConfig {
    /// Load configuration from the config file and environment
    pub fn load() -> Result<Self> {
        let path =
            std::env::var(CONFIG_PATH_VAR).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Self::load_from(&path)
    }

    /// Load from `path` (if it exists) overlaid by `AGENT__*` variables
    pub fn load_from(path: &str) -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(config::Environment::with_prefix("AGENT").separator("__"))
            .build()
            .with_context(|| format!("Failed to read configuration from {}", path))?;

        let config: AgentConfig = config
            .try_deserialize()
            .context("Invalid agent configuration")?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.monitored_entities.is_empty() {
            anyhow::bail!("No monitored entities configured");
        }
        if self.poll_interval_secs == 0 {
            anyhow::bail!("poll_interval_secs must be greater than zero");
        }

        let mut names = HashSet::new();
        for entity in &self.monitored_entities {
            if !names.insert(entity.name.as_str()) {
                anyhow::bail!("Duplicate monitored entity name: {}", entity.name);
            }
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn max_replay(&self) -> Duration {
        Duration::from_secs(self.max_replay_secs)
    }
}
