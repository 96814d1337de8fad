//! Gateway configuration
//!
//! Configuration is read from a TOML file. Every section is optional and falls
//! back to the defaults the gateway has always used (10s health cadence, 30s
//! staleness, 5s probe timeout, 3-failure circuit with a 5 minute cooldown,
//! one retry, 3600s task timeout).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Main gateway configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct GatewayConfig {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub health: HealthSection,
    #[serde(default)]
    pub circuit: CircuitSection,
    #[serde(default)]
    pub forwarding: ForwardingSection,
    #[serde(default)]
    pub storage: StorageSection,
    #[serde(default)]
    pub routing: RoutingSection,
}

/// HTTP listener settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerSection {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// URL teams are told to use when talking to the gateway
    #[serde(default = "default_public_url")]
    pub public_url: String,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            public_url: default_public_url(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_public_url() -> String {
    "http://localhost:8080".to_string()
}

/// Health monitor cadence
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HealthSection {
    /// How often the monitor wakes up
    #[serde(default = "default_check_interval")]
    pub check_interval_secs: u64,
    /// A team is probed once its last check is older than this
    #[serde(default = "default_stale_after")]
    pub stale_after_secs: u64,
    /// Per-probe timeout
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_secs: u64,
}

impl Default for HealthSection {
    fn default() -> Self {
        Self {
            check_interval_secs: default_check_interval(),
            stale_after_secs: default_stale_after(),
            probe_timeout_secs: default_probe_timeout(),
        }
    }
}

fn default_check_interval() -> u64 {
    10
}

fn default_stale_after() -> u64 {
    30
}

fn default_probe_timeout() -> u64 {
    5
}

/// Circuit breaker thresholds
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CircuitSection {
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    #[serde(default = "default_cooldown")]
    pub cooldown_secs: u64,
}

impl Default for CircuitSection {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            cooldown_secs: default_cooldown(),
        }
    }
}

fn default_failure_threshold() -> u32 {
    3
}

fn default_cooldown() -> u64 {
    300 // 5 minutes
}

/// Task forwarding behavior
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ForwardingSection {
    /// Timeout used when a request does not carry one
    #[serde(default = "default_task_timeout")]
    pub default_timeout_secs: u64,
    /// Re-routes attempted after a capability-routed forward fails
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Largest accepted request body
    #[serde(default = "default_body_limit")]
    pub request_body_limit_bytes: u64,
}

impl Default for ForwardingSection {
    fn default() -> Self {
        Self {
            default_timeout_secs: default_task_timeout(),
            max_retries: default_max_retries(),
            request_body_limit_bytes: default_body_limit(),
        }
    }
}

fn default_task_timeout() -> u64 {
    3600
}

fn default_max_retries() -> u32 {
    1
}

fn default_body_limit() -> u64 {
    1024 * 1024
}

/// Durable mirror location; absent means in-memory only
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct StorageSection {
    pub data_dir: Option<PathBuf>,
}

/// Keyword inference table overrides
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RoutingSection {
    /// keyword -> capabilities; empty means use the built-in table
    #[serde(default)]
    pub keywords: BTreeMap<String, Vec<String>>,
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("Invalid environment variable {name}: {value}")]
    InvalidEnvVar { name: String, value: String },
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl GatewayConfig {
    /// Load configuration from TOML file and apply environment overrides
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let mut config: GatewayConfig = toml::from_str(&content)?;

        config.apply_env_overrides()?;
        config.validate()?;

        Ok(config)
    }

    /// Defaults plus environment overrides, for running without a file
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `HOST`, `PORT`, `GATEWAY_URL` and `GATEWAY_DATA_DIR`
    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(host) = Self::get_env_var_optional("HOST") {
            self.server.host = host;
        }
        if let Some(port) = Self::get_env_var_optional("PORT") {
            self.server.port = port.parse().map_err(|_| ConfigError::InvalidEnvVar {
                name: "PORT".to_string(),
                value: port.clone(),
            })?;
        }
        if let Some(public_url) = Self::get_env_var_optional("GATEWAY_URL") {
            self.server.public_url = public_url;
        }
        if let Some(data_dir) = Self::get_env_var_optional("GATEWAY_DATA_DIR") {
            self.storage.data_dir = Some(PathBuf::from(data_dir));
        }
        Ok(())
    }

    fn get_env_var_optional(name: &str) -> Option<String> {
        std::env::var(name).ok().filter(|value| !value.is_empty())
    }

    /// Validate value ranges
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.health.check_interval_secs == 0 {
            return Err(ConfigError::InvalidConfig(
                "health.check_interval_secs must be greater than 0".to_string(),
            ));
        }
        if self.health.probe_timeout_secs == 0 {
            return Err(ConfigError::InvalidConfig(
                "health.probe_timeout_secs must be greater than 0".to_string(),
            ));
        }
        if self.circuit.failure_threshold == 0 {
            return Err(ConfigError::InvalidConfig(
                "circuit.failure_threshold must be greater than 0".to_string(),
            ));
        }
        if self.forwarding.default_timeout_secs == 0 {
            return Err(ConfigError::InvalidConfig(
                "forwarding.default_timeout_secs must be greater than 0".to_string(),
            ));
        }
        if let Some((keyword, _)) = self
            .routing
            .keywords
            .iter()
            .find(|(keyword, caps)| keyword.trim().is_empty() || caps.is_empty())
        {
            return Err(ConfigError::InvalidConfig(format!(
                "routing keyword '{keyword}' must be non-empty and map to at least one capability"
            )));
        }
        Ok(())
    }

    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.health.check_interval_secs)
    }

    pub fn stale_after(&self) -> Duration {
        Duration::from_secs(self.health.stale_after_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.health.probe_timeout_secs)
    }

    pub fn circuit_cooldown(&self) -> Duration {
        Duration::from_secs(self.circuit.cooldown_secs)
    }
}
