//! Configuration types for rondo

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::{RondoError, RondoResult};

/// Main proxy configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    /// Inbound listener configuration
    pub listener: ListenerConfig,
    /// Ordered upstream base addresses
    pub upstreams: Vec<String>,
    /// Health check configuration
    pub health: HealthCheckConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

impl ProxyConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> RondoResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| RondoError::Config(format!("Failed to read config file: {}", e)))?;
        toml::from_str(&content)
            .map_err(|e| RondoError::Config(format!("Failed to parse config: {}", e)))
    }

    /// Check the values that would make the proxy unusable
    pub fn validate(&self) -> RondoResult<()> {
        if self.upstreams.is_empty() {
            return Err(RondoError::Config(
                "at least one upstream address is required".to_string(),
            ));
        }
        self.health.validate()
    }
}

/// Inbound listener configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Address to bind
    pub address: String,
    /// Port to bind
    pub port: u16,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            address: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

/// Active health check configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthCheckConfig {
    /// Seconds between probe cycles
    pub interval_secs: u64,
    /// Per-attempt probe timeout in seconds
    pub timeout_secs: u64,
    /// Probe attempts per cycle
    pub attempts: u32,
    /// Pause between failed attempts in milliseconds
    pub retry_backoff_ms: u64,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            interval_secs: 10,
            timeout_secs: 2,
            attempts: 3,
            retry_backoff_ms: 1000,
        }
    }
}

impl HealthCheckConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    fn validate(&self) -> RondoResult<()> {
        if self.interval_secs == 0 {
            return Err(RondoError::Config(
                "health.interval_secs must be greater than zero".to_string(),
            ));
        }
        if self.timeout_secs == 0 {
            return Err(RondoError::Config(
                "health.timeout_secs must be greater than zero".to_string(),
            ));
        }
        if self.attempts == 0 {
            return Err(RondoError::Config(
                "health.attempts must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level
    pub level: String,
    /// Log format
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
        }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Text,
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = RondoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => Err(RondoError::Config(format!("unknown log format: {other}"))),
        }
    }
}
