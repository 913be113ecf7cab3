//! Configuration management for Pairlink
//!
//! Environment-based configuration with defaults and validation. The relay
//! section carries the connection parameters a concrete transport needs; the
//! events section sizes the domain-event fan-out.

use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

mod error;

pub use error::ConfigError;

/// Main client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Relay connection configuration
    pub relay: RelayConfig,

    /// Domain-event configuration
    pub events: EventsConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Relay connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Relay hostname
    pub hostname: String,

    /// Relay port
    pub port: u16,

    /// Multiplex several logical clients over one connection
    pub multiplex: bool,

    /// Automatic reconnection behaviour
    pub reconnect: ReconnectConfig,
}

/// Automatic reconnection behaviour for the relay connection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconnectConfig {
    /// Random jitter added to each reconnect delay
    #[serde(with = "humantime_serde")]
    pub randomness: Duration,

    /// Backoff multiplier applied per attempt
    pub multiplier: f64,

    /// Upper bound on the reconnect delay
    #[serde(with = "humantime_serde")]
    pub max_delay: Duration,
}

/// Domain-event configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventsConfig {
    /// Buffer capacity of the event broadcast channel
    pub buffer: usize,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Include target module
    pub with_target: bool,

    /// Enable JSON formatting
    pub json_format: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            relay: RelayConfig::default(),
            events: EventsConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            hostname: "localhost".to_string(),
            port: 9009,
            multiplex: false,
            reconnect: ReconnectConfig::default(),
        }
    }
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            randomness: Duration::from_millis(1000),
            multiplier: 1.5,
            max_delay: Duration::from_millis(7000),
        }
    }
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self { buffer: 100 }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            with_target: true,
            json_format: false,
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    ///
    /// Environment variables follow the pattern: PAIRLINK_<SECTION>_<KEY>
    /// Example: PAIRLINK_RELAY_HOSTNAME=relay.example.net
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(hostname) = env::var("PAIRLINK_RELAY_HOSTNAME") {
            config.relay.hostname = hostname;
        }
        if let Ok(port) = env::var("PAIRLINK_RELAY_PORT") {
            config.relay.port = port
                .parse()
                .map_err(|e| ConfigError::InvalidValue(format!("invalid relay port: {}", e)))?;
        }
        if let Ok(multiplex) = env::var("PAIRLINK_RELAY_MULTIPLEX") {
            config.relay.multiplex = multiplex
                .parse()
                .map_err(|e| ConfigError::InvalidValue(format!("invalid multiplex flag: {}", e)))?;
        }
        if let Ok(buffer) = env::var("PAIRLINK_EVENTS_BUFFER") {
            config.events.buffer = buffer
                .parse()
                .map_err(|e| ConfigError::InvalidValue(format!("invalid event buffer: {}", e)))?;
        }
        if let Ok(level) = env::var("PAIRLINK_LOGGING_LEVEL") {
            config.logging.level = level;
        }

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.relay.hostname.is_empty() {
            return Err(ConfigError::ValidationFailed(
                "relay hostname must not be empty".to_string(),
            ));
        }
        if self.relay.port == 0 {
            return Err(ConfigError::ValidationFailed(
                "relay port must be non-zero".to_string(),
            ));
        }
        if self.relay.reconnect.multiplier < 1.0 {
            return Err(ConfigError::ValidationFailed(
                "reconnect multiplier must be >= 1.0".to_string(),
            ));
        }
        if self.events.buffer == 0 {
            return Err(ConfigError::ValidationFailed(
                "event buffer must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}
