//! # Voice Bridge Core
//!
//! Relays live voice audio between a chat platform voice channel (Platform A)
//! and a voice server channel (Platform B):
//!
//! - **audio**: fixed-cadence mixer combining every voice server speaker into
//!   one stream for the chat platform
//! - **relay**: one session per linked channel, moving audio both ways
//! - **presence**: who is in the watched channel on each side, with join/leave
//!   announcements
//! - **controller**: Constant, Manual and Auto lifecycle driven by chat
//!   commands and occupancy
//!
//! Platform SDKs stay outside this crate. Adapters implement
//! [`ChatPlatform`] and [`VoiceServer`] and feed events into the
//! [`BridgeController`].
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use voice_bridge_core::{BridgeArgs, BridgeController};
//! use clap::Parser;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let args = BridgeArgs::parse();
//!     voice_bridge_core::setup_logging(&args.logging_config()?)?;
//!     let config = args.load()?;
//!
//!     let bridge = BridgeController::new(config, chat_adapter(), voice_adapter());
//!     bridge.start().await?;
//!
//!     // Forward adapter callbacks:
//!     // bridge.handle_message(&message).await;
//!     // bridge.handle_voice_state_update(&update).await;
//!     // bridge.handle_voice_server_change().await;
//!
//!     tokio::signal::ctrl_c().await?;
//!     bridge.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod audio;
pub mod config;
pub mod controller;
pub mod error;
pub mod events;
pub mod logging;
pub mod platform;
pub mod presence;
pub mod relay;
pub mod status;
pub mod types;

// Re-export main types
pub use audio::{mix_frames, AudioMixer, MixerConfig, MixerStats, MixerStatsSnapshot, SpeakerHandle};
pub use config::{BridgeArgs, BridgeConfig, BridgeMode};
pub use controller::{BridgeCommand, BridgeController};
pub use error::{BridgeError, BridgeResult};
pub use events::BridgeEvent;
pub use logging::{setup_logging, LogFormat, LoggingConfig};
pub use platform::{ChatPlatform, SpeakerStreamStart, VoiceConnection, VoiceServer};
pub use presence::PresenceTracker;
pub use relay::{RelayContext, RelaySession};
pub use types::{
    ChannelId, ChatMessage, GuildId, PcmFrame, PlatformSide, SessionId, SpeakerId, UserId, VoiceState,
    VoiceStateUpdate, FRAME_SAMPLES, SAMPLE_RATE, TICK_INTERVAL,
};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
