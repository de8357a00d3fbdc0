//! Rebalancer configuration
//!
//! Configuration loaded from environment variables and command line.

use std::time::Duration;
use thiserror::Error;

use crate::strategy::BY_AGENT_COUNT;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

/// Analyzer load-balancing strategy as configured
///
/// The algorithm name stays a raw string here; it is only validated when an
/// analyzer rebalance is requested.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadBalancingStrategy {
    /// `by-ingested-data` or `by-agent-count`
    pub algorithm: String,
    /// Traffic sampling window (traffic strategy only)
    pub data_duration: Duration,
}

impl Default for LoadBalancingStrategy {
    fn default() -> Self {
        Self {
            algorithm: BY_AGENT_COUNT.to_string(),
            data_duration: Duration::from_secs(300),
        }
    }
}

/// Rebalancer configuration
#[derive(Debug, Clone)]
pub struct RebalancerConfig {
    /// PostgreSQL database URL (unset when running from a snapshot file)
    pub database_url: Option<String>,

    /// Analyzer strategy
    pub strategy: LoadBalancingStrategy,

    /// Hold a headroom unit on the chosen node even when the agent stays put
    pub reserve_on_stay: bool,
}

impl Default for RebalancerConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            strategy: LoadBalancingStrategy::default(),
            reserve_on_stay: true,
        }
    }
}

impl RebalancerConfig {
    /// Create configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Create configuration from any variable source
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let database_url = lookup("DATABASE_URL").filter(|v| !v.is_empty());

        let algorithm =
            lookup("FLEETBALANCE_ANALYZER_ALGORITHM").unwrap_or_else(|| BY_AGENT_COUNT.to_string());

        let data_duration_secs = match lookup("FLEETBALANCE_DATA_DURATION_SECS") {
            Some(v) => v.parse::<u64>().map_err(|_| {
                ConfigError::InvalidValue("FLEETBALANCE_DATA_DURATION_SECS".to_string(), v)
            })?,
            None => 300,
        };

        let reserve_on_stay = match lookup("FLEETBALANCE_RESERVE_ON_STAY") {
            Some(v) => parse_flag("FLEETBALANCE_RESERVE_ON_STAY", v)?,
            None => true,
        };

        Ok(Self {
            database_url,
            strategy: LoadBalancingStrategy {
                algorithm,
                data_duration: Duration::from_secs(data_duration_secs),
            },
            reserve_on_stay,
        })
    }

    /// Database URL, or an error naming the variable to set
    pub fn require_database_url(&self) -> Result<&str, ConfigError> {
        self.database_url
            .as_deref()
            .ok_or_else(|| ConfigError::MissingEnvVar("DATABASE_URL".to_string()))
    }
}

/// `true`/`false` in any case, or `1`/`0`
fn parse_flag(name: &str, value: String) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" => Ok(true),
        "false" | "0" => Ok(false),
        _ => Err(ConfigError::InvalidValue(name.to_string(), value)),
    }
}
