//! Bridge configuration
//!
//! `BridgeConfig` is built once at startup, either from a TOML file or from
//! command-line flags with environment fallbacks (`BridgeArgs`), and is
//! read-only afterwards.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use clap::{ArgAction, Parser};
use serde::{Deserialize, Serialize};

use crate::audio::MixerConfig;
use crate::error::{BridgeError, BridgeResult};
use crate::logging::{parse_log_level, LogFormat, LoggingConfig};
use crate::types::{ChannelId, GuildId};

/// How relay start/stop decisions are made
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BridgeMode {
    /// Linked once at startup and never unlinked by command
    Constant,
    /// Linked and unlinked by chat commands
    Manual,
    /// Linked while the watched channel is occupied
    Auto,
}

impl Default for BridgeMode {
    fn default() -> Self {
        BridgeMode::Constant
    }
}

impl fmt::Display for BridgeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BridgeMode::Constant => write!(f, "constant"),
            BridgeMode::Manual => write!(f, "manual"),
            BridgeMode::Auto => write!(f, "auto"),
        }
    }
}

impl FromStr for BridgeMode {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "constant" => Ok(BridgeMode::Constant),
            "manual" => Ok(BridgeMode::Manual),
            "auto" => Ok(BridgeMode::Auto),
            other => Err(BridgeError::config(format!("invalid bridge mode: {:?}", other))),
        }
    }
}

fn default_command_prefix() -> String {
    "!mumble-discord".to_string()
}

fn default_true() -> bool {
    true
}

fn default_refresh_grace_ms() -> u64 {
    5_000
}

fn default_status_interval_secs() -> u64 {
    30
}

fn default_silence_timeout_ms() -> u64 {
    5_000
}

/// Immutable bridge configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Chat platform guild the bridge serves
    pub guild_id: GuildId,
    /// Watched chat platform voice channel
    pub voice_channel_id: ChannelId,
    /// Prefix commands must start with, e.g. `!mumble-discord link`
    #[serde(default = "default_command_prefix")]
    pub command_prefix: String,
    /// Announce chat platform joins/leaves on the voice server
    #[serde(default = "default_true")]
    pub announce: bool,
    /// Voice server channel to move into after connecting
    #[serde(default)]
    pub voice_server_channel: Option<String>,
    /// Chat platform text channel receiving voice server joins/leaves
    #[serde(default)]
    pub announce_channel_id: Option<ChannelId>,
    /// Starting mode
    #[serde(default)]
    pub mode: BridgeMode,
    /// Upper bound on waiting for a session to stop during `refresh`
    #[serde(default = "default_refresh_grace_ms")]
    pub refresh_grace_ms: u64,
    /// Status line refresh period, 0 disables it
    #[serde(default = "default_status_interval_secs")]
    pub status_interval_secs: u64,
    /// Silence after which a speaker stream is dropped from the mixer
    #[serde(default = "default_silence_timeout_ms")]
    pub silence_timeout_ms: u64,
    /// Clamp mixed samples to the i16 range instead of wrapping
    #[serde(default = "default_true")]
    pub clamp_mix: bool,
}

impl BridgeConfig {
    /// Create a configuration with defaults for everything but the watched channel
    pub fn new(guild_id: impl Into<GuildId>, voice_channel_id: impl Into<ChannelId>) -> Self {
        Self {
            guild_id: guild_id.into(),
            voice_channel_id: voice_channel_id.into(),
            command_prefix: default_command_prefix(),
            announce: true,
            voice_server_channel: None,
            announce_channel_id: None,
            mode: BridgeMode::default(),
            refresh_grace_ms: default_refresh_grace_ms(),
            status_interval_secs: default_status_interval_secs(),
            silence_timeout_ms: default_silence_timeout_ms(),
            clamp_mix: true,
        }
    }

    pub fn with_mode(mut self, mode: BridgeMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_announce(mut self, announce: bool) -> Self {
        self.announce = announce;
        self
    }

    pub fn with_command_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.command_prefix = prefix.into();
        self
    }

    /// Parse a TOML document
    pub fn from_toml_str(s: &str) -> BridgeResult<Self> {
        let config: BridgeConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> BridgeResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    /// Reject configurations the bridge cannot start with
    pub fn validate(&self) -> BridgeResult<()> {
        if self.guild_id.as_str().trim().is_empty() {
            return Err(BridgeError::config("missing guild id"));
        }
        if self.voice_channel_id.as_str().trim().is_empty() {
            return Err(BridgeError::config("missing voice channel id"));
        }
        if self.command_prefix.trim().is_empty() || self.command_prefix.chars().any(char::is_whitespace) {
            return Err(BridgeError::config(format!(
                "invalid command prefix: {:?}",
                self.command_prefix
            )));
        }
        if self.silence_timeout_ms == 0 {
            return Err(BridgeError::config("silence timeout must be positive"));
        }
        Ok(())
    }

    pub fn refresh_grace(&self) -> Duration {
        Duration::from_millis(self.refresh_grace_ms)
    }

    /// `None` when status updates are disabled
    pub fn status_interval(&self) -> Option<Duration> {
        (self.status_interval_secs > 0).then(|| Duration::from_secs(self.status_interval_secs))
    }

    /// Mixer settings derived from this configuration
    pub fn mixer_config(&self) -> MixerConfig {
        MixerConfig {
            silence_timeout: Duration::from_millis(self.silence_timeout_ms),
            clamp: self.clamp_mix,
            ..MixerConfig::default()
        }
    }
}

/// Command-line flags, each with an environment variable fallback
#[derive(Parser, Debug, Clone, Default)]
#[command(name = "voice-bridge")]
#[command(about = "Relay voice between a chat platform voice channel and a voice server")]
pub struct BridgeArgs {
    /// TOML configuration file; flags override its values
    #[arg(long, env = "BRIDGE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Chat platform guild id
    #[arg(long, env = "BRIDGE_GUILD_ID")]
    pub guild_id: Option<String>,

    /// Watched chat platform voice channel id
    #[arg(long, env = "BRIDGE_CHANNEL_ID")]
    pub channel_id: Option<String>,

    /// Command prefix
    #[arg(long, env = "BRIDGE_COMMAND_PREFIX")]
    pub command_prefix: Option<String>,

    /// Announce chat platform joins on the voice server
    #[arg(long, env = "BRIDGE_ANNOUNCE", action = ArgAction::Set)]
    pub announce: Option<bool>,

    /// Voice server channel to start in
    #[arg(long, env = "BRIDGE_VOICE_SERVER_CHANNEL")]
    pub voice_server_channel: Option<String>,

    /// Starting mode: constant, manual or auto
    #[arg(long, env = "BRIDGE_MODE")]
    pub mode: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "BRIDGE_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Emit JSON logs
    #[arg(long, env = "BRIDGE_LOG_JSON")]
    pub log_json: bool,
}

impl BridgeArgs {
    /// Build and validate the bridge configuration
    pub fn load(&self) -> BridgeResult<BridgeConfig> {
        let mut config = match &self.config {
            Some(path) => BridgeConfig::from_file(path)?,
            None => {
                let guild = self
                    .guild_id
                    .clone()
                    .ok_or_else(|| BridgeError::config("missing guild id"))?;
                let channel = self
                    .channel_id
                    .clone()
                    .ok_or_else(|| BridgeError::config("missing voice channel id"))?;
                BridgeConfig::new(guild, channel)
            }
        };

        if let Some(guild) = &self.guild_id {
            config.guild_id = GuildId::new(guild.clone());
        }
        if let Some(channel) = &self.channel_id {
            config.voice_channel_id = ChannelId::new(channel.clone());
        }
        if let Some(prefix) = &self.command_prefix {
            config.command_prefix = prefix.clone();
        }
        if let Some(announce) = self.announce {
            config.announce = announce;
        }
        if let Some(channel) = &self.voice_server_channel {
            config.voice_server_channel = Some(channel.clone());
        }
        if let Some(mode) = &self.mode {
            config.mode = mode.parse()?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Logging settings selected by the flags
    pub fn logging_config(&self) -> BridgeResult<LoggingConfig> {
        let format = if self.log_json { LogFormat::Json } else { LogFormat::Text };
        Ok(LoggingConfig {
            level: parse_log_level(&self.log_level)?,
            format,
        })
    }
}
