//! Error types for the voice bridge

use thiserror::Error;

/// Result type for bridge operations
pub type BridgeResult<T> = Result<T, BridgeError>;

/// Errors that can occur in the bridge
#[derive(Debug, Error)]
pub enum BridgeError {
    /// Missing or invalid configuration
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// A participant, channel or guild could not be resolved
    #[error("Lookup failed for {what}")]
    Lookup { what: String },

    /// A platform adapter reported a failure
    #[error("{platform} error: {message}")]
    Platform { platform: String, message: String },

    /// The mixer side of a speaker stream is gone
    #[error("Speaker stream closed: {speaker}")]
    StreamClosed { speaker: String },

    /// Invalid state error
    #[error("Invalid state: {message}")]
    InvalidState { message: String },

    /// I/O error while reading configuration
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed configuration file
    #[error("Config file parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl BridgeError {
    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a lookup error
    pub fn lookup(what: impl Into<String>) -> Self {
        Self::Lookup { what: what.into() }
    }

    /// Create a platform error
    pub fn platform(platform: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Platform {
            platform: platform.into(),
            message: message.into(),
        }
    }

    /// Create a stream closed error
    pub fn stream_closed(speaker: impl Into<String>) -> Self {
        Self::StreamClosed {
            speaker: speaker.into(),
        }
    }

    /// Create an invalid state error
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState {
            message: message.into(),
        }
    }
}
