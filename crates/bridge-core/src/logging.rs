//! Tracing subscriber setup for processes embedding the bridge

use std::str::FromStr;

use tracing::Level;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;

use crate::error::{BridgeError, BridgeResult};

/// Output format of the log lines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    /// One JSON object per event, for log shippers
    Json,
}

/// Level and format of the bridge's logs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoggingConfig {
    /// Default level; `RUST_LOG` directives refine it
    pub level: Level,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            format: LogFormat::Text,
        }
    }
}

/// Install the global subscriber.
///
/// Fails if another subscriber is already installed.
pub fn setup_logging(config: &LoggingConfig) -> BridgeResult<()> {
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::from_level(config.level).into())
        .from_env_lossy();
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    let installed = match config.format {
        LogFormat::Text => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
    installed.map_err(|e| BridgeError::config(format!("failed to install log subscriber: {}", e)))?;

    tracing::info!(version = crate::VERSION, level = %config.level, "Voice bridge logging ready");
    Ok(())
}

/// Parse a log level from a string
pub fn parse_log_level(level: &str) -> BridgeResult<Level> {
    Level::from_str(level.trim()).map_err(|_| BridgeError::config(format!("Invalid log level: {}", level)))
}
