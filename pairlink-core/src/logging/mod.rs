//! Logging subsystem for Pairlink
//!
//! Thin wrapper over the `tracing` crate: all modules log through `tracing`
//! macros, and the host initializes a subscriber once at startup via
//! [`init_logging`] or [`init_logging_with_config`].

use tracing_subscriber::{fmt, EnvFilter};

mod level;

pub use level::LogLevel;

/// Configuration for the logging subsystem
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Minimum level to display when `RUST_LOG` is not set
    pub level: LogLevel,
    /// Include the target module in each line
    pub with_target: bool,
    /// Use JSON formatting
    pub json_format: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            with_target: true,
            json_format: false,
        }
    }
}

/// Errors that can occur while initializing logging
#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    /// A global subscriber was already installed
    #[error("failed to initialize logging: {0}")]
    InitializationFailed(String),
}

/// Initialize the logging subsystem with default configuration
pub fn init_logging() -> Result<(), LoggingError> {
    init_logging_with_config(LogConfig::default())
}

/// Initialize the logging subsystem with custom configuration
///
/// The `RUST_LOG` environment variable, when present, overrides the
/// configured level.
pub fn init_logging_with_config(config: LogConfig) -> Result<(), LoggingError> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.as_str()));

    let builder = fmt()
        .with_env_filter(env_filter)
        .with_target(config.with_target);

    let result = if config.json_format {
        builder.json().try_init()
    } else {
        builder.try_init()
    };

    result.map_err(|e| LoggingError::InitializationFailed(e.to_string()))
}
